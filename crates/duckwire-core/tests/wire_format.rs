//! Integration tests for the public wire-format API.
//!
//! These exercise `duckwire-core` the way the client runtime uses it:
//! commands are encoded to their exact on-wire lines, inbound frames are
//! classified, and chunking obeys the reassembly contract.

use duckwire_core::{
    chunk_count, chunk_payload, AckStatus, Command, ComboState, DeviceEvent, HidCommand, Modifier,
};

#[test]
fn test_typing_session_wire_lines() {
    // Arrange: a user arms CTRL, presses T, then types a character.
    let mut combo = ComboState::default();
    combo.arm(Modifier::Ctrl);
    let press = combo.compose_key("T");
    let ch = combo.compose_char('x');

    // Act: encode both as ack-gated commands, the way the engine sends them.
    let line1 = Command::KeyAck(press).encode();
    let line2 = Command::KeyAck(ch).encode();

    // Assert: exact wire bytes, newline-terminated.
    assert_eq!(line1, b"key_ack CTRL T\n".to_vec());
    assert_eq!(line2, b"key_ack STRING x\n".to_vec());
}

#[test]
fn test_ack_events_round_trip_the_status_token() {
    assert_eq!(
        DeviceEvent::parse("KEY_ACK:OK"),
        DeviceEvent::KeyAck(AckStatus::Ok)
    );
    match DeviceEvent::parse("KEY_ACK:BUSY") {
        DeviceEvent::KeyAck(AckStatus::Error(token)) => assert_eq!(token, "BUSY"),
        other => panic!("expected a device error, got {other:?}"),
    }
}

#[test]
fn test_file_write_stream_framing() {
    // A 300-byte file at chunk size 126 must produce exactly three chunks
    // of 126, 126, and 48 bytes, each framed as an unterminated
    // sd_stream_write command.
    let payload = vec![b'x'; 300];
    assert_eq!(chunk_count(payload.len(), 126), 3);

    let frames: Vec<Vec<u8>> = chunk_payload(&payload, 126)
        .map(|c| {
            Command::SdStreamWrite {
                chunk: c.data.to_vec(),
            }
            .encode()
        })
        .collect();

    assert_eq!(frames.len(), 3);
    let prefix = b"sd_stream_write ".len();
    assert_eq!(frames[0].len(), prefix + 126);
    assert_eq!(frames[1].len(), prefix + 126);
    assert_eq!(frames[2].len(), prefix + 48);
    for frame in &frames {
        assert!(
            !frame.ends_with(b"\n"),
            "stream chunks must not be newline-terminated"
        );
    }
}

#[test]
fn test_sd_listing_frames_classify_in_order() {
    let inbound = [
        "SD_LS:payload.ds,124",
        "SD_LS:notes.txt,88",
        "SD_END:OK",
        "connected",
    ];
    let events: Vec<DeviceEvent> = inbound.iter().map(|f| DeviceEvent::parse(f)).collect();
    assert_eq!(
        events,
        vec![
            DeviceEvent::SdList("payload.ds,124".into()),
            DeviceEvent::SdList("notes.txt,88".into()),
            DeviceEvent::SdEnd,
            DeviceEvent::Reply("connected".into()),
        ]
    );
}
