use async_trait::async_trait;
use grblkit_communication::firmware::grbl::streamer::prepare_program;
use grblkit_communication::{AckLink, ProgramStreamer, ResponseMessage, StreamSummary};
use grblkit_core::Result;
use proptest::prelude::*;

/// Firmware stand-in that acknowledges every line once its last byte is in
#[derive(Default)]
struct AckEveryLine {
    writes: Vec<Vec<u8>>,
    acknowledged: usize,
}

impl AckEveryLine {
    fn complete_lines(&self) -> usize {
        self.writes.iter().flatten().filter(|&&b| b == b'\n').count()
    }
}

#[async_trait]
impl AckLink for AckEveryLine {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.writes.push(chunk.to_vec());
        Ok(())
    }

    async fn next_acknowledgment(&mut self) -> Result<ResponseMessage> {
        assert!(
            self.acknowledged < self.complete_lines(),
            "streamer waited for an acknowledgment no line can produce"
        );
        self.acknowledged += 1;
        Ok(ResponseMessage::Ok)
    }
}

fn stream(program: &str, rx_buffer: usize) -> (ProgramStreamer<AckEveryLine>, Result<StreamSummary>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mut streamer = ProgramStreamer::new(AckEveryLine::default(), rx_buffer);
    let result = runtime.block_on(streamer.run(program.as_bytes(), std::future::pending::<()>()));
    (streamer, result)
}

fn program_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        (
            prop::sample::select(vec!["G0", "G1", "G2", "M3"]),
            prop::collection::vec(
                (prop::sample::select(vec!['X', 'Y', 'Z', 'F']), "[1-9][0-9]{0,5}"),
                0..4,
            ),
        )
            .prop_map(|(command, args)| {
                let mut line = command.to_string();
                for (letter, number) in args {
                    line.push(letter);
                    line.push_str(&number);
                }
                line
            }),
        0..40,
    )
}

proptest! {
    #[test]
    fn streamer_ends_balanced(lines in program_strategy(), extra in 0usize..100) {
        let longest = lines.iter().map(|l| l.len() + 1).max().unwrap_or(1);
        let rx_buffer = longest + extra;
        let program = lines.join("\n");

        let (streamer, result) = stream(&program, rx_buffer);
        let summary = result.unwrap();

        prop_assert!(streamer.is_balanced());
        prop_assert_eq!(streamer.available_buffer_bytes(), rx_buffer);
        prop_assert_eq!(streamer.in_flight(), 0);
        prop_assert_eq!(summary.lines, lines.len());

        let link = streamer.into_link();
        prop_assert!(link.writes.iter().all(|w| !w.is_empty() && w.len() <= rx_buffer));
        let expected: String = lines.iter().map(|l| format!("{}\n", l)).collect();
        prop_assert_eq!(link.writes.concat(), expected.into_bytes());
        prop_assert_eq!(link.acknowledged, lines.len());
    }

    #[test]
    fn writes_never_exceed_free_buffer(lines in program_strategy(), rx_buffer in 24usize..64) {
        let program = lines.join("\n");

        let (streamer, result) = stream(&program, rx_buffer);
        let summary = result.unwrap();
        let link = streamer.into_link();

        // Replay the accounting: each write must fit in what was free at
        // the time, given the acknowledgments received before it.
        let mut in_flight: usize = 0;
        let mut line_lengths = std::collections::VecDeque::new();
        let mut current = 0usize;
        let mut acknowledged = 0usize;
        let mut splits = 0usize;
        for write in &link.writes {
            while in_flight + write.len() > rx_buffer {
                let freed: usize = line_lengths.pop_front().expect("acknowledgment available");
                in_flight -= freed;
                acknowledged += 1;
            }
            in_flight += write.len();
            current += write.len();
            if write.last() == Some(&b'\n') {
                line_lengths.push_back(current);
                current = 0;
            } else {
                splits += 1;
            }
        }
        prop_assert!(acknowledged <= summary.acknowledgment_waits);
        prop_assert_eq!(summary.writes, lines.len() + splits);
    }
}

#[test]
fn long_line_is_split_at_the_buffer_edge() {
    let (streamer, result) = stream("G1X1\nG1X12345\n", 10);
    let summary = result.unwrap();
    let sizes: Vec<usize> = streamer.link().writes.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![5, 5, 4]);
    assert_eq!(summary.writes, 3);
    assert_eq!(summary.acknowledgment_waits, 2);
}

#[test]
fn line_exactly_filling_the_buffer_is_one_write() {
    let (streamer, result) = stream("G1X12345\n", 9);
    assert_eq!(result.unwrap().writes, 1);
    assert!(streamer.is_balanced());
}

#[test]
fn eeprom_commands_are_refused_up_front() {
    for program in ["$10=0", "$N0=G20", "G10 L20 P1 X0", "G28.1", "G30.1", "$RST=*", "$I=mill"] {
        let err = prepare_program(program.as_bytes(), 128).unwrap_err();
        assert!(err.is_gcode_error(), "{} was accepted", program);
    }
    assert_eq!(
        prepare_program("$J=G91X1F100\n$H\n".as_bytes(), 128).unwrap(),
        vec!["$J=G91X1F100\n".to_string(), "$H\n".to_string()]
    );
}
