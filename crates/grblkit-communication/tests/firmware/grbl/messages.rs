use grblkit_communication::firmware::grbl::*;

/// What Grbl prints after a reset followed by `$I`, `$G`, `$#` and `?`
const SESSION: &str = "\r
Grbl 1.1h ['$' for help]\r
[MSG:'$H'|'$X' to unlock]\r
[VER:1.1h.20190825:]\r
[OPT:VNMZL,15,128]\r
ok\r
[GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0]\r
ok\r
[G54:-100.000,-50.000,-10.000]\r
[G55:0.000,0.000,0.000]\r
[G56:0.000,0.000,0.000]\r
[G57:0.000,0.000,0.000]\r
[G58:0.000,0.000,0.000]\r
[G59:0.000,0.000,0.000]\r
[G28:0.000,0.000,0.000]\r
[G30:0.000,0.000,0.000]\r
[G92:0.000,0.000,0.000]\r
[TLO:0.000]\r
[PRB:0.000,0.000,0.000:0]\r
ok\r
<Alarm|MPos:0.000,0.000,0.000|Bf:15,128|FS:0,0|Pn:XYZ|WCO:-100.000,-50.000,-10.000>\r
error:9\r
";

fn decode_session() -> Vec<Message> {
    SESSION
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .map(|line| Message::parse(line).unwrap())
        .collect()
}

#[test]
fn test_session_transcript_decodes() {
    let messages = decode_session();
    let responses: Vec<ResponseMessage> = messages
        .iter()
        .filter_map(|m| match m {
            Message::Response(r) => Some(*r),
            Message::Push(_) => None,
        })
        .collect();
    assert_eq!(
        responses,
        vec![
            ResponseMessage::Ok,
            ResponseMessage::Ok,
            ResponseMessage::Ok,
            ResponseMessage::Error { code: 9 }
        ]
    );

    let unknown = messages
        .iter()
        .filter(|m| matches!(m, Message::Push(PushMessage::Unknown { .. })))
        .count();
    assert_eq!(unknown, 0);
}

#[test]
fn test_session_builds_controller_state() {
    let mut state = GrblControllerState::default();
    for message in decode_session() {
        if let Message::Push(push) = message {
            state.apply(&push);
        }
    }

    assert_eq!(state.version.as_deref(), Some("1.1h.20190825"));
    assert_eq!(state.compile_options.as_ref().unwrap().serial_rx_buffer_bytes, 128);
    assert_eq!(
        state.gcode_parameters.work_coordinate_system(54),
        Some(Coordinates::new(-100.0, -50.0, -10.0))
    );
    assert_eq!(state.gcode_parameters.tool_length_offset, Some(0.0));
    assert!(!state.gcode_parameters.probe.unwrap().success);

    let status = state.status.as_ref().unwrap();
    assert_eq!(status.state, MachineState::Alarm);
    assert!(status.pins.unwrap().z_limit);
    assert_eq!(status.buffer.unwrap().rx_bytes_available, 128);
    assert_eq!(state.work_position(), Some(Coordinates::new(100.0, 50.0, 10.0)));
}

#[test]
fn test_documented_error_text() {
    let response = ResponseMessage::parse("error:8").unwrap();
    assert!(response
        .error()
        .unwrap()
        .starts_with("Grbl '$' command cannot be used unless Grbl is IDLE"));
}

#[test]
fn test_idle_status_report() {
    match Message::parse("<Idle|MPos:0.000,0.000,0.000|FS:0,0>").unwrap() {
        Message::Push(PushMessage::StatusReport { report, .. }) => {
            assert_eq!(report.state, MachineState::Idle);
            assert!(report.sub_state.is_none());
            assert_eq!(report.machine_position, Some(Coordinates::new(0.0, 0.0, 0.0)));
            assert_eq!(
                report.feed_spindle,
                Some(FeedSpindle {
                    feed: 0.0,
                    spindle: 0.0
                })
            );
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_hold_and_door_substates() {
    let hold = StatusReport::parse("<Hold:1|MPos:0.000,0.000,0.000|FS:0,0>").unwrap();
    assert_eq!(hold.sub_state, Some(1));
    assert!(hold.sub_state_description().is_some());

    assert!(StatusReport::parse("<Door:3|MPos:0.000,0.000,0.000|FS:0,0>").is_ok());
    assert!(StatusReport::parse("<Door:4|MPos:0.000,0.000,0.000|FS:0,0>").is_err());
    assert!(StatusReport::parse("<Idle:1|MPos:0.000,0.000,0.000|FS:0,0>").is_err());
}

#[test]
fn test_future_status_fields_are_ignored() {
    let report = StatusReport::parse("<Idle|MPos:1.000,2.000,3.000|FS:0,0|Xyz:whatever>").unwrap();
    assert_eq!(report.machine_position, Some(Coordinates::new(1.0, 2.0, 3.0)));
}

#[test]
fn test_strict_push_parser_refuses_unknown_prefix() {
    assert!(PushMessage::parse("[XYZ:1]").is_err());
    assert!(matches!(
        Message::parse("[XYZ:1]").unwrap(),
        Message::Push(PushMessage::Unknown { .. })
    ));
}

#[test]
fn test_realtime_bytes_are_split_from_text() {
    let (commands, rest) = split_realtime(b"\x85$J=G91X1F100\x90");
    assert_eq!(
        commands,
        vec![RealTimeCommand::JogCancel, RealTimeCommand::FeedOverrideReset]
    );
    assert_eq!(rest, b"$J=G91X1F100");
    assert_eq!(
        RealTimeCommand::from_byte(b'a'),
        Err(NotRealTimeCommand(b'a'))
    );
}

#[test]
fn test_controller_state_snapshot_serializes() {
    let mut state = GrblControllerState::default();
    for message in decode_session() {
        if let Message::Push(push) = message {
            state.apply(&push);
        }
    }

    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["status"]["state"], "Alarm");
    let restored: GrblControllerState = serde_json::from_value(json).unwrap();
    assert_eq!(restored, state);
}
