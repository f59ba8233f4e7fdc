//! Engine scenarios against an in-memory link

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::sync::broadcast::error::RecvError;
use visca::{
    Action, Address, Client, Config, ConnectionState, Error, EventReceiver, Inquiry, InquiryValue,
    MemoryLink, PanTiltDirection, PowerState, Speeds, StatusEvent,
};

const CAM: Address = Address::DEFAULT;
const POWER_INQUIRY: [u8; 5] = [0x81, 0x09, 0x04, 0x00, 0xFF];
const PAN_RIGHT_10: [u8; 9] = [0x81, 0x01, 0x06, 0x01, 0x0A, 0x0A, 0x02, 0x03, 0xFF];

fn pan_right() -> Action {
    Action::PanTilt {
        direction: PanTiltDirection::Right,
        pan_speed: 10,
        tilt_speed: 10,
    }
}

/// Camera that answers power inquiries and nothing else
fn probe_only(link: &MemoryLink) {
    link.set_responder(|data| {
        if data == POWER_INQUIRY {
            vec![0x90, 0x50, 0x02, 0xFF]
        } else {
            Vec::new()
        }
    });
}

fn start(link: &MemoryLink, config: Config) -> Client {
    Client::with_transport(Box::new(link.transport()), config).unwrap()
}

async fn connected(client: &Client) {
    let mut rx = client.watch_connection();
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();
}

/// Wait until the engine gives up on the link
async fn link_dropped(events: &mut EventReceiver) {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match events.recv().await {
                Ok(StatusEvent::ConnectionChanged {
                    current: ConnectionState::ReconnectWait,
                    ..
                }) => return,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("link stayed up");
}

/// Let the engine run a few poll ticks
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn test_pan_right_ack_completion() {
    let link = MemoryLink::new();
    probe_only(&link);
    let client = start(&link, Config::new("memory"));
    connected(&client).await;
    link.take_written();

    let handle = client.issue(CAM, pan_right()).await.unwrap();
    settle().await;
    assert_eq!(link.take_written(), vec![PAN_RIGHT_10.to_vec()]);

    link.push_inbound(&[0x90, 0x41, 0xFF]);
    link.push_inbound(&[0x90, 0x51, 0xFF]);
    handle.wait().await.unwrap();

    client.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancel_frees_socket_for_queued_command() {
    let link = MemoryLink::new();
    probe_only(&link);
    let client = start(&link, Config::new("memory"));
    connected(&client).await;
    link.take_written();

    let first = client.issue(CAM, Action::Home).await.unwrap();
    settle().await;
    link.push_inbound(&[0x90, 0x41, 0xFF]);
    settle().await;
    let _second = client.issue(CAM, Action::Reset).await.unwrap();
    settle().await;
    link.push_inbound(&[0x90, 0x42, 0xFF]);
    settle().await;

    let third = client.issue(CAM, Action::Power(PowerState::On)).await.unwrap();
    settle().await;
    assert_eq!(link.take_written().len(), 2);

    client.cancel(first.id()).await.unwrap();
    settle().await;
    assert!(matches!(first.wait().await, Err(Error::Canceled)));
    assert_eq!(
        link.take_written(),
        vec![vec![0x81, 0x21, 0xFF], vec![0x81, 0x01, 0x04, 0x00, 0x02, 0xFF]]
    );

    link.push_inbound(&[0x90, 0x61, 0x04, 0xFF, 0x90, 0x41, 0xFF, 0x90, 0x51, 0xFF]);
    third.wait().await.unwrap();
    assert_eq!(
        client.camera_state(CAM).unwrap().power.confirmed,
        Some(PowerState::On)
    );
}

#[tokio::test(start_paused = true)]
async fn test_write_failures_trigger_reconnect() {
    let link = MemoryLink::new();
    probe_only(&link);
    let client = start(&link, Config::new("memory"));
    connected(&client).await;
    let mut events = client.subscribe();

    link.set_fail_writes(true);
    let handle = client.issue(CAM, pan_right()).await.unwrap();
    assert!(matches!(handle.wait().await, Err(Error::IoFailure(_))));

    let mut transitions = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Ok(event) = events.recv().await {
            if let StatusEvent::ConnectionChanged { previous, current } = event {
                transitions.push((previous, current));
                if current == ConnectionState::Connecting {
                    break;
                }
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(
        transitions,
        vec![
            (ConnectionState::Connected, ConnectionState::ReconnectWait),
            (ConnectionState::ReconnectWait, ConnectionState::Connecting),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_once_link_recovers() {
    let link = MemoryLink::new();
    probe_only(&link);
    let client = start(&link, Config::new("memory"));
    connected(&client).await;

    link.hang_up();
    let mut rx = client.watch_connection();
    rx.wait_for(|s| *s == ConnectionState::ReconnectWait).await.unwrap();

    connected(&client).await;
    assert_eq!(link.open_count(), 2);
}

#[derive(Default)]
struct SimCamera {
    busy: [bool; 2],
    overruns: usize,
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_issuers_never_exceed_two_sockets() {
    let link = MemoryLink::new();
    let sim = Arc::new(Mutex::new(SimCamera::default()));

    let cam = sim.clone();
    link.set_responder(move |data| match data {
        [0x81, 0x09, 0x04, 0x00, 0xFF] => vec![0x90, 0x50, 0x02, 0xFF],
        [0x81, 0x01, ..] => {
            let mut cam = cam.lock();
            match cam.busy.iter().position(|b| !b) {
                Some(i) => {
                    cam.busy[i] = true;
                    vec![0x90, 0x41 + i as u8, 0xFF]
                }
                None => {
                    cam.overruns += 1;
                    vec![0x90, 0x60, 0x03, 0xFF]
                }
            }
        }
        _ => Vec::new(),
    });

    let completer = tokio::spawn({
        let link = link.clone();
        let sim = sim.clone();
        async move {
            loop {
                tokio::time::sleep(Duration::from_millis(30)).await;
                let done = {
                    let mut cam = sim.lock();
                    let socket = cam.busy.iter().position(|b| *b);
                    if let Some(i) = socket {
                        cam.busy[i] = false;
                    }
                    socket
                };
                if let Some(i) = done {
                    link.push_inbound(&[0x90, 0x51 + i as u8, 0xFF]);
                }
            }
        }
    });

    let client = start(&link, Config::new("memory").with_queue_depth(16));
    connected(&client).await;

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.execute(CAM, Action::Home).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    completer.abort();
    assert_eq!(sim.lock().overruns, 0);
}

#[tokio::test(start_paused = true)]
async fn test_query_updates_state() {
    let link = MemoryLink::new();
    link.set_responder(|data| match data {
        [0x81, 0x09, 0x04, 0x00, 0xFF] => vec![0x90, 0x50, 0x03, 0xFF],
        [0x81, 0x09, 0x04, 0x47, 0xFF] => vec![0x90, 0x50, 0x00, 0x04, 0x00, 0x00, 0xFF],
        _ => Vec::new(),
    });
    let client = start(&link, Config::new("memory"));
    connected(&client).await;

    let value = client.query(CAM, Inquiry::ZoomPosition).await.unwrap();
    assert_eq!(value, InquiryValue::ZoomPosition(0x0400));
    assert_eq!(client.camera_state(CAM).unwrap().zoom_position, Some(0x0400));
    assert_eq!(client.camera_state(CAM).unwrap().connection, ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_power() {
    let link = MemoryLink::new();
    link.set_responder(|data| match data {
        [0x81, 0x09, 0x04, 0x00, 0xFF] => vec![0x90, 0x50, 0x02, 0xFF],
        [0x81, 0x01, 0x04, 0x00, 0x03, 0xFF] => vec![0x90, 0x41, 0xFF, 0x90, 0x51, 0xFF],
        _ => Vec::new(),
    });
    let client = start(&link, Config::new("memory"));
    connected(&client).await;

    let camera = client.camera(CAM);
    assert_eq!(camera.toggle_power().await.unwrap(), PowerState::Off);
    assert_eq!(camera.state().unwrap().power.confirmed, Some(PowerState::Off));
}

#[tokio::test(start_paused = true)]
async fn test_disconnected_policy() {
    let link = MemoryLink::new();
    probe_only(&link);
    let client = start(&link, Config::new("memory").with_auto_connect(false));

    let right = client.issue(CAM, pan_right()).await.unwrap();
    assert!(matches!(right.wait().await, Err(Error::NotConnected)));
    assert!(matches!(
        client.query(CAM, Inquiry::Power).await,
        Err(Error::NotConnected)
    ));

    // One-shots wait for the link
    let power = client.issue(CAM, Action::Power(PowerState::On)).await.unwrap();
    client.connect().await.unwrap();
    settle().await;
    assert_eq!(
        link.take_written(),
        vec![POWER_INQUIRY.to_vec(), vec![0x81, 0x01, 0x04, 0x00, 0x02, 0xFF]]
    );
    link.push_inbound(&[0x90, 0x41, 0xFF, 0x90, 0x51, 0xFF]);
    power.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unsolicited_frames_are_published() {
    let link = MemoryLink::new();
    probe_only(&link);
    let client = start(&link, Config::new("memory"));
    connected(&client).await;
    let mut events = client.subscribe();

    link.push_inbound(&[0x90, 0x38, 0xFF]);
    let frame = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if let Ok(StatusEvent::Unsolicited(frame)) = events.recv().await {
                return frame;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(frame.to_bytes().as_ref(), &[0x90, 0x38, 0xFF]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_fails_outstanding() {
    let link = MemoryLink::new();
    probe_only(&link);
    let client = start(&link, Config::new("memory"));
    connected(&client).await;

    let handle = client.issue(CAM, Action::Home).await.unwrap();
    settle().await;
    client.shutdown().await.unwrap();

    assert!(matches!(handle.wait().await, Err(Error::Shutdown)));
    assert!(matches!(client.issue(CAM, Action::Home).await, Err(Error::Shutdown)));
    assert!(!link.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_parameter_errors_are_immediate() {
    let link = MemoryLink::new();
    let client = start(&link, Config::new("memory").with_auto_connect(false));

    let err = client
        .issue(
            CAM,
            Action::PanTilt {
                direction: PanTiltDirection::Left,
                pan_speed: 25,
                tilt_speed: 1,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Core(visca_core::Error::InvalidParameter { .. })));
    assert!(client.issue(Address::BROADCAST, Action::Home).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_silent_camera_fails_heartbeat() {
    let link = MemoryLink::new();
    probe_only(&link);
    let client = start(&link, Config::new("memory"));
    connected(&client).await;
    let mut events = client.subscribe();

    link.clear_responder();
    let silent_since = tokio::time::Instant::now();
    link_dropped(&mut events).await;

    // One heartbeat interval, then every retry of the power inquiry
    assert!(silent_since.elapsed() >= Duration::from_secs(6));
    assert!(silent_since.elapsed() < Duration::from_secs(8));
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_heartbeat_reply_keeps_heartbeat_running() {
    let link = MemoryLink::new();
    // 04: the camera reports an internal power fault
    link.set_responder(|data| {
        if data == POWER_INQUIRY {
            vec![0x90, 0x50, 0x04, 0xFF]
        } else {
            Vec::new()
        }
    });
    let client = start(&link, Config::new("memory"));
    connected(&client).await;
    let mut events = client.subscribe();

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(client.connection_state(), ConnectionState::Connected);

    link.clear_responder();
    link_dropped(&mut events).await;
}

#[tokio::test(start_paused = true)]
async fn test_cleared_heartbeat_keeps_heartbeat_running() {
    let link = MemoryLink::new();
    let mut answered = false;
    link.set_responder(move |data| {
        if data == POWER_INQUIRY && !answered {
            answered = true;
            vec![0x90, 0x50, 0x02, 0xFF]
        } else {
            Vec::new()
        }
    });
    let client = start(&link, Config::new("memory"));
    connected(&client).await;
    let mut events = client.subscribe();

    // The first heartbeat is on the wire, unanswered
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert!(link.written().ends_with(&[POWER_INQUIRY.to_vec()]));
    client.clear_interface(CAM).await.unwrap();

    link_dropped(&mut events).await;
}

#[tokio::test(start_paused = true)]
async fn test_link_drop_fails_each_sent_command_once() {
    let link = MemoryLink::new();
    probe_only(&link);
    let client = start(&link, Config::new("memory"));
    connected(&client).await;
    link.take_written();

    let home = client.issue(CAM, Action::Home).await.unwrap();
    settle().await;
    link.push_inbound(&[0x90, 0x41, 0xFF]);
    settle().await;
    let reset = client.issue(CAM, Action::Reset).await.unwrap();
    settle().await;
    link.push_inbound(&[0x90, 0x42, 0xFF]);
    settle().await;

    // Both sockets busy: these two wait in the queue
    let power = client.issue(CAM, Action::Power(PowerState::On)).await.unwrap();
    let pan = client.issue(CAM, pan_right()).await.unwrap();
    settle().await;
    assert_eq!(link.take_written().len(), 2);

    link.hang_up();
    assert!(matches!(home.wait().await, Err(Error::IoFailure(_))));
    assert!(matches!(reset.wait().await, Err(Error::IoFailure(_))));
    assert!(matches!(pan.wait().await, Err(Error::NotConnected)));

    // The one-shot survives the drop and goes out on the new link
    connected(&client).await;
    settle().await;
    assert!(link
        .written()
        .contains(&vec![0x81, 0x01, 0x04, 0x00, 0x02, 0xFF]));
    link.push_inbound(&[0x90, 0x41, 0xFF, 0x90, 0x51, 0xFF]);
    power.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_requests_served_during_connect_attempt() {
    let link = MemoryLink::new();
    let client = start(&link, Config::new("memory").with_auto_connect(false));

    let mut rx = client.watch_connection();
    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    rx.wait_for(|s| *s == ConnectionState::Connecting).await.unwrap();

    let started = tokio::time::Instant::now();
    let speeds = Speeds {
        pan: 12,
        ..Speeds::default()
    };
    client.set_speeds(CAM, speeds).await.unwrap();
    assert_eq!(client.camera_state(CAM).unwrap().speeds, speeds);
    assert!(matches!(
        client.query(CAM, Inquiry::Power).await,
        Err(Error::NotConnected)
    ));
    assert_eq!(client.connection_state(), ConnectionState::Connecting);

    client.shutdown().await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(matches!(connecting.await.unwrap(), Err(Error::NotConnected)));
    assert!(!link.is_open());
}
