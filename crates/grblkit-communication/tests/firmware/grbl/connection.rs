use grblkit_communication::firmware::grbl::*;
use grblkit_communication::ConnectionParams;
use grblkit_core::{ConnectionError, ControllerError, Error, GcodeError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(2);

/// The controller end of an in-memory wire
struct FakeGrbl {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeGrbl {
    async fn line(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("host sent nothing")
            .unwrap();
        line
    }

    async fn byte(&mut self) -> u8 {
        tokio::time::timeout(WAIT, self.reader.read_u8())
            .await
            .expect("host sent nothing")
            .unwrap()
    }

    async fn send(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).await.unwrap();
    }
}

async fn connected(config: ConnectionConfig) -> (GrblConnection, mpsc::Receiver<PushMessage>, FakeGrbl) {
    let (host, device) = tokio::io::duplex(4096);
    let connection = GrblConnection::new(ConnectionParams::default(), config);
    let pushes = connection.connect_with(Box::new(host)).await.unwrap();
    let (reader, writer) = tokio::io::split(device);
    let grbl = FakeGrbl {
        reader: BufReader::new(reader),
        writer,
    };
    (connection, pushes, grbl)
}

async fn next_push(pushes: &mut mpsc::Receiver<PushMessage>) -> Option<PushMessage> {
    tokio::time::timeout(WAIT, pushes.recv())
        .await
        .expect("no push message")
}

#[tokio::test]
async fn test_command_is_sent_compact_and_acknowledged() {
    let (connection, _pushes, mut grbl) = connected(ConnectionConfig::default()).await;

    let (response, _) = tokio::join!(
        connection.send_command("g1 x10 (cut) f100", WAIT),
        async {
            assert_eq!(grbl.line().await, "G1X10F100\n");
            grbl.send("ok\r\n").await;
        }
    );
    assert_eq!(response.unwrap(), ResponseMessage::Ok);
}

#[tokio::test]
async fn test_firmware_error_is_a_response() {
    let (connection, _pushes, mut grbl) = connected(ConnectionConfig::default()).await;

    let (response, _) = tokio::join!(connection.send_command("G5", WAIT), async {
        grbl.line().await;
        grbl.send("error:20\r\n").await;
    });
    let response = response.unwrap();
    assert_eq!(response, ResponseMessage::Error { code: 20 });
    assert_eq!(
        response.error().unwrap(),
        "Unsupported or invalid g-code command found in block."
    );
    assert!(!connection.is_desynchronized());
}

#[tokio::test]
async fn test_push_messages_reach_every_subscriber() {
    let (connection, mut pushes, mut grbl) = connected(ConnectionConfig::default()).await;
    let (_, mut second) = connection.subscribe("second", 8).unwrap();

    grbl.send("<Idle|MPos:1.000,2.000,3.000|FS:0,0|WCO:1.000,1.000,1.000>\r\n[MSG:Caution: Unlocked]\r\n")
        .await;

    for receiver in [&mut pushes, &mut second] {
        assert!(matches!(
            next_push(receiver).await,
            Some(PushMessage::StatusReport { .. })
        ));
        assert!(matches!(
            next_push(receiver).await,
            Some(PushMessage::Feedback { .. })
        ));
    }
    assert_eq!(connection.work_position(), Some(Coordinates::new(0.0, 1.0, 2.0)));
    assert_eq!(
        connection.work_coordinate_offset(),
        Some(Coordinates::new(1.0, 1.0, 1.0))
    );
    assert_eq!(connection.status().unwrap().state, MachineState::Idle);
}

#[tokio::test]
async fn test_unsolicited_response_is_discarded() {
    let (connection, mut pushes, mut grbl) = connected(ConnectionConfig::default()).await;

    grbl.send("ok\n[MSG:after]\n").await;
    assert!(matches!(
        next_push(&mut pushes).await,
        Some(PushMessage::Feedback { message, .. }) if message == "after"
    ));
    assert!(connection.is_connected());
}

#[tokio::test]
async fn test_timeout_desynchronizes_until_reset() {
    let (connection, mut pushes, mut grbl) = connected(ConnectionConfig::default()).await;

    let err = connection
        .send_command("G0X1", Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(connection.is_desynchronized());
    assert_eq!(grbl.line().await, "G0X1\n");

    let err = connection.send_command("G0X2", WAIT).await.unwrap_err();
    assert!(matches!(err, Error::Controller(ControllerError::Desynchronized)));

    // The late acknowledgment must not be taken for a new command
    grbl.send("ok\r\nGrbl 1.1h ['$' for help]\r\n").await;
    assert!(matches!(
        next_push(&mut pushes).await,
        Some(PushMessage::Welcome { .. })
    ));
    assert!(!connection.is_desynchronized());
    assert_eq!(connection.version().as_deref(), Some("1.1h"));

    let (response, _) = tokio::join!(connection.send_command("G0X3", WAIT), async {
        assert_eq!(grbl.line().await, "G0X3\n");
        grbl.send("ok\n").await;
    });
    assert!(response.unwrap().is_ok());
}

#[tokio::test]
async fn test_reset_aborts_command_in_flight() {
    let (connection, _pushes, mut grbl) = connected(ConnectionConfig::default()).await;

    let (response, _) = tokio::join!(connection.send_command("$H", WAIT), async {
        assert_eq!(grbl.line().await, "$H\n");
        grbl.send("Grbl 1.1h ['$' for help]\n").await;
    });
    assert!(matches!(
        response.unwrap_err(),
        Error::Controller(ControllerError::CommandAborted)
    ));
    assert!(!connection.is_desynchronized());
}

#[tokio::test]
async fn test_realtime_commands_bypass_the_line_protocol() {
    let (connection, _pushes, mut grbl) = connected(ConnectionConfig::default()).await;

    connection
        .send_realtime(RealTimeCommand::FeedHold)
        .await
        .unwrap();
    assert_eq!(grbl.byte().await, b'!');

    assert_eq!(connection.execute([0x18u8]).await.unwrap(), None);
    assert_eq!(grbl.byte().await, 0x18);

    let (response, _) = tokio::join!(connection.execute("~$X"), async {
        assert_eq!(grbl.byte().await, b'~');
        assert_eq!(grbl.line().await, "$X\n");
        grbl.send("ok\n").await;
    });
    assert_eq!(response.unwrap(), Some(ResponseMessage::Ok));
}

#[tokio::test]
async fn test_stream_program_with_flow_control() {
    let config = ConnectionConfig {
        rx_buffer_size: 16,
        ..ConnectionConfig::default()
    };
    let (connection, _pushes, mut grbl) = connected(config).await;

    let program: String = (1..=20).map(|i| format!("G1 X{} Y{}\n", i, i * 2)).collect();
    let (summary, received) = tokio::join!(
        connection.stream_program(program.as_bytes(), std::future::pending::<()>()),
        async {
            let mut received = Vec::new();
            for _ in 0..20 {
                received.push(grbl.line().await);
                grbl.send("ok\n").await;
            }
            received
        }
    );

    let summary = summary.unwrap();
    assert_eq!(summary.lines, 20);
    assert_eq!(received[0], "G1X1Y2\n");
    assert_eq!(received[19], "G1X20Y40\n");
    assert!(!connection.is_desynchronized());
}

#[tokio::test]
async fn test_stream_uses_reported_buffer_size() {
    let (connection, mut pushes, mut grbl) = connected(ConnectionConfig::default()).await;

    grbl.send("[OPT:V,15,10]\n").await;
    assert!(matches!(
        next_push(&mut pushes).await,
        Some(PushMessage::CompileTimeOptions { .. })
    ));

    let err = connection
        .stream_program("G1X1234567\n".as_bytes(), std::future::pending::<()>())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Gcode(GcodeError::LineTooLong { capacity: 10, .. })
    ));
    assert!(!connection.is_desynchronized());
}

#[tokio::test]
async fn test_cancelled_stream_desynchronizes() {
    let config = ConnectionConfig {
        rx_buffer_size: 16,
        ..ConnectionConfig::default()
    };
    let (connection, _pushes, _grbl) = connected(config).await;

    let err = connection
        .stream_program(
            "G1X100\nG1X200\nG1X300\n".as_bytes(),
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(connection.is_desynchronized());
}

#[tokio::test]
async fn test_eeprom_stream_sends_nothing() {
    let (connection, _pushes, mut grbl) = connected(ConnectionConfig::default()).await;

    let err = connection
        .stream_program("G0X0\nG10 L2 P1 X0\n".as_bytes(), std::future::pending::<()>())
        .await
        .unwrap_err();
    assert!(err.is_gcode_error());

    connection
        .send_realtime(RealTimeCommand::StatusReportQuery)
        .await
        .unwrap();
    assert_eq!(grbl.byte().await, b'?');
}

#[tokio::test]
async fn test_protocol_violation_closes_session() {
    let (connection, mut pushes, mut grbl) = connected(ConnectionConfig::default()).await;

    grbl.send("<Bogus|MPos:0.000,0.000,0.000>\n").await;
    assert!(next_push(&mut pushes).await.is_none());
    assert!(!connection.is_connected());

    let err = connection.send_command("$X", WAIT).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::ConnectionLost { .. })
    ));
}

#[tokio::test]
async fn test_disconnect_releases_waiting_command() {
    let (connection, mut pushes, mut grbl) = connected(ConnectionConfig::default()).await;

    let (response, _) = tokio::join!(connection.send_command("G4P10", WAIT), async {
        grbl.line().await;
        connection.disconnect().await.unwrap();
    });
    assert!(matches!(
        response.unwrap_err(),
        Error::Connection(ConnectionError::ConnectionLost { .. })
    ));
    assert!(next_push(&mut pushes).await.is_none());
    assert!(!connection.is_connected());
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let (connection, _pushes, _grbl) = connected(ConnectionConfig::default()).await;

    let (again, _device) = tokio::io::duplex(64);
    assert!(matches!(
        connection.connect_with(Box::new(again)).await.unwrap_err(),
        Error::Controller(ControllerError::AlreadyConnected)
    ));

    connection.disconnect().await.unwrap();
    let (fresh, _device) = tokio::io::duplex(64);
    assert!(connection.connect_with(Box::new(fresh)).await.is_ok());
    assert!(connection.is_connected());
}

#[tokio::test]
async fn test_status_polling() {
    let config = ConnectionConfig {
        status_poll_interval: Some(Duration::from_millis(20)),
        ..ConnectionConfig::default()
    };
    let (_connection, _pushes, mut grbl) = connected(config).await;

    assert_eq!(grbl.byte().await, b'?');
    assert_eq!(grbl.byte().await, b'?');
}
