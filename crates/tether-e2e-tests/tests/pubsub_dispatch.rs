//! End-to-end publish/subscribe dispatch through the channel seam.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tether_mqtt::{Channel, FnHandler, MockChannel, QoS, Subscription};

const TIMEOUT: Duration = Duration::from_secs(5);

fn recording_subscription(
    filter: &str,
    sink: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
) -> Subscription {
    Subscription::new(
        filter,
        QoS::AtLeastOnce,
        Arc::new(FnHandler::new(move |topic: &str, payload: &[u8]| {
            sink.lock().unwrap().push((topic.into(), payload.to_vec()));
            Ok(())
        })),
    )
}

#[tokio::test]
async fn e2e_publish_reaches_only_the_matching_handler() {
    let channel = MockChannel::new();
    let first: Arc<Mutex<Vec<(String, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
    let second: Arc<Mutex<Vec<(String, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));

    channel
        .subscribe(
            vec![
                recording_subscription("devices/t1/status", first.clone()),
                recording_subscription("devices/t1/config", second.clone()),
            ],
            TIMEOUT,
        )
        .await
        .unwrap();

    channel
        .publish("devices/t1/status", false, QoS::AtLeastOnce, b"online", TIMEOUT)
        .await
        .unwrap();
    channel.deliver("devices/t1/status", b"online").await;

    let received = first.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, "devices/t1/status");
    assert_eq!(received[0].1, b"online");
    assert!(second.lock().unwrap().is_empty());
}

#[tokio::test]
async fn e2e_handler_error_does_not_block_other_handlers() {
    let channel = MockChannel::new();
    let sink: Arc<Mutex<Vec<(String, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));

    channel
        .subscribe(
            vec![
                Subscription::new(
                    "devices/+/status",
                    QoS::AtLeastOnce,
                    Arc::new(FnHandler::new(|_: &str, _: &[u8]| {
                        anyhow::bail!("handler exploded")
                    })),
                ),
                recording_subscription("devices/t1/#", sink.clone()),
            ],
            TIMEOUT,
        )
        .await
        .unwrap();

    let invoked = channel.deliver("devices/t1/status", b"payload").await;

    assert_eq!(invoked, 2);
    assert_eq!(sink.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn e2e_unsubscribed_topic_reaches_nobody() {
    let channel = MockChannel::new();
    let sink: Arc<Mutex<Vec<(String, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));

    channel
        .subscribe(
            vec![recording_subscription("devices/t1/status", sink.clone())],
            TIMEOUT,
        )
        .await
        .unwrap();
    channel
        .unsubscribe(&["devices/t1/status".to_string()], TIMEOUT)
        .await
        .unwrap();

    assert_eq!(channel.deliver("devices/t1/status", b"gone").await, 0);
    assert!(sink.lock().unwrap().is_empty());
}
