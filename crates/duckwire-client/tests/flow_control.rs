//! Flow-control integration tests: queue, ack streams, and routing
//! exercised through the public [`WireLink`] surface, no socket involved.
//!
//! The WebSocket driver feeds inbound frames to `handle_frame` and drains
//! outbound frames from a channel; these tests play both roles by hand.

use std::sync::Arc;
use std::time::Duration;

use duckwire_core::protocol::command::{Command, HidCommand};
use tokio::sync::mpsc;

use duckwire_client::domain::status::SessionConnectivity;
use duckwire_client::infrastructure::ack::AckError;
use duckwire_client::infrastructure::link::{DeviceLink, SdEvent, WireLink};

fn wire() -> (Arc<WireLink>, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let link = Arc::new(WireLink::new(tx, Arc::new(SessionConnectivity::new())));
    link.set_connected(true);
    (link, rx)
}

fn drain(link: &WireLink, rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<String> {
    let mut frames = Vec::new();
    loop {
        link.pump_tick();
        match rx.try_recv() {
            Ok(frame) => {
                frames.push(String::from_utf8(frame).unwrap());
                // Generic reply re-arms the channel for the next frame.
                link.handle_frame("ok");
            }
            Err(_) => break,
        }
    }
    frames
}

#[tokio::test]
async fn test_mixed_traffic_keeps_submission_order() {
    let (link, mut rx) = wire();

    link.send(Command::Key(HidCommand::String("one".into()))).unwrap();
    link.send(Command::Status).unwrap();
    link.send(Command::SdLs).unwrap();

    assert_eq!(
        drain(&link, &mut rx),
        vec!["key STRING one\n", "status\n", "sd_ls\n"]
    );
}

#[tokio::test]
async fn test_priority_traffic_overtakes_but_stays_fifo() {
    let (link, mut rx) = wire();

    link.send(Command::Status).unwrap();
    link.send_priority(Command::SdStop).unwrap();
    link.send_priority(Command::Stop { file: None }).unwrap();

    assert_eq!(
        drain(&link, &mut rx),
        vec!["sd_stop\n", "stop\n", "status\n"]
    );
}

#[tokio::test]
async fn test_out_of_band_events_do_not_consume_replies() {
    let (link, mut rx) = wire();
    let l = Arc::clone(&link);
    let request = tokio::spawn(async move { l.request(Command::Version).await });
    tokio::task::yield_now().await;

    link.pump_tick();
    assert_eq!(
        String::from_utf8(rx.try_recv().unwrap()).unwrap(),
        "version\n"
    );

    // Ack and SD frames arrive before the generic reply; none of them may
    // be routed to the pending request.
    link.handle_frame("KEY_ACK:OK");
    link.handle_frame("SD_LS:stray.ds,1");
    link.handle_frame("SD_END:OK");
    link.handle_frame("Version 1.2.0");

    assert_eq!(request.await.unwrap(), Ok("Version 1.2.0".into()));
}

#[tokio::test(start_paused = true)]
async fn test_ack_timeout_does_not_poison_later_waits() {
    let (link, _rx) = wire();

    // First gated send: no ack ever arrives.
    let timed_out = link
        .send_gated(
            Command::KeyAck(HidCommand::String("lost".into())),
            Duration::from_secs(10),
        )
        .await;
    assert!(matches!(timed_out, Err(AckError::Timeout { .. })));

    // Second gated send: its ack must pair with it, not the dead waiter.
    let l = Arc::clone(&link);
    let second = tokio::spawn(async move {
        l.send_gated(
            Command::KeyAck(HidCommand::String("next".into())),
            Duration::from_secs(10),
        )
        .await
    });
    tokio::task::yield_now().await;
    link.handle_frame("KEY_ACK:OK");
    assert_eq!(second.await.unwrap(), Ok(()));
}

#[tokio::test]
async fn test_key_and_sd_ack_streams_pair_independently() {
    let (link, _rx) = wire();

    let key = tokio::spawn({
        let l = Arc::clone(&link);
        async move {
            l.send_gated(
                Command::KeyAck(HidCommand::Combo(vec!["ENTER".into()])),
                Duration::from_secs(5),
            )
            .await
        }
    });
    let sd = tokio::spawn({
        let l = Arc::clone(&link);
        async move {
            l.send_chunk_gated(
                Command::SdStreamWrite {
                    chunk: b"data".to_vec(),
                },
                Duration::from_secs(5),
            )
            .await
        }
    });
    tokio::task::yield_now().await;

    // Acks arrive in the opposite order of registration across streams.
    link.handle_frame("SD_ACK:OK");
    link.handle_frame("KEY_ACK:ERROR");

    assert_eq!(key.await.unwrap(), Err(AckError::Device("ERROR".into())));
    assert_eq!(sd.await.unwrap(), Ok(()));
}

#[tokio::test]
async fn test_disconnect_fails_everything_pending() {
    let (link, mut rx) = wire();

    let gated = tokio::spawn({
        let l = Arc::clone(&link);
        async move {
            l.send_gated(
                Command::KeyAck(HidCommand::String("x".into())),
                Duration::from_secs(5),
            )
            .await
        }
    });
    let request = tokio::spawn({
        let l = Arc::clone(&link);
        async move { l.request(Command::Status).await }
    });
    tokio::task::yield_now().await;

    link.set_connected(false);

    assert_eq!(gated.await.unwrap(), Err(AckError::Cancelled));
    assert!(request.await.unwrap().is_err());

    // Nothing queued survives the reset.
    link.pump_tick();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_sd_frames_reach_the_single_collector() {
    let (link, _rx) = wire();
    let mut events = link.take_sd_events().expect("first take succeeds");
    assert!(link.take_sd_events().is_none());

    link.handle_frame("SD_CAT:STRING hello");
    link.handle_frame("SD_END:OK");

    assert_eq!(
        events.try_recv().unwrap(),
        SdEvent::Data("STRING hello".into())
    );
    assert_eq!(events.try_recv().unwrap(), SdEvent::End);
}
