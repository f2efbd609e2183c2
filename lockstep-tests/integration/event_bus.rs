//! Event bus ordering under concurrent publishers.

use std::sync::Arc;
use std::time::Duration;

use lockstep_core::events::{EventType, SimulationEvent};
use parking_lot::Mutex;

use crate::common::{observed_bus, wait_for};

const PUBLISHERS: usize = 4;
const EVENTS_PER_PUBLISHER: usize = 50;

/// Many concurrent publishers, each with a monotonically tagged payload; the
/// delivery order observed by a listener must match the global enqueue order
/// captured by a synchronized harness.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delivery_matches_global_enqueue_order() {
    let (bus, listener) = observed_bus();

    // The harness mutex serializes publishes, so pushing to the reference
    // log inside the critical section records the exact enqueue order.
    let publish_lock = Arc::new(Mutex::new(()));
    let reference: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));

    let mut publishers = Vec::new();
    for publisher in 0..PUBLISHERS {
        let bus = Arc::clone(&bus);
        let publish_lock = Arc::clone(&publish_lock);
        let reference = Arc::clone(&reference);
        publishers.push(tokio::spawn(async move {
            let actor = format!("publisher-{publisher}");
            for seq in 0..EVENTS_PER_PUBLISHER {
                {
                    let _serialized = publish_lock.lock();
                    bus.publish(SimulationEvent::new(
                        actor.clone(),
                        EventType::Execution,
                        None,
                        format!("seq {seq}"),
                    ));
                    reference.lock().push((actor.clone(), format!("seq {seq}")));
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for publisher in publishers {
        publisher.await.unwrap();
    }

    let expected = PUBLISHERS * EVENTS_PER_PUBLISHER;
    wait_for(
        || listener.len() == expected,
        Duration::from_secs(5),
        "all events to be delivered",
    )
    .await;

    let delivered: Vec<(String, String)> = listener
        .events()
        .iter()
        .map(|event| (event.actor_id.clone(), event.message.clone()))
        .collect();
    assert_eq!(delivered, *reference.lock());

    // History reflects the same delivery order.
    let history: Vec<(String, String)> = bus
        .history()
        .iter()
        .map(|event| (event.actor_id.clone(), event.message.clone()))
        .collect();
    assert_eq!(history, delivered);

    bus.shutdown().await;
}

/// Each publisher's events arrive as a monotonic subsequence even without the
/// harness mutex.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_publisher_order_is_preserved() {
    let (bus, listener) = observed_bus();

    let mut publishers = Vec::new();
    for publisher in 0..PUBLISHERS {
        let bus = Arc::clone(&bus);
        publishers.push(tokio::spawn(async move {
            let actor = format!("publisher-{publisher}");
            for seq in 0..EVENTS_PER_PUBLISHER {
                bus.publish(SimulationEvent::new(
                    actor.clone(),
                    EventType::Execution,
                    None,
                    format!("{seq}"),
                ));
                if seq % 8 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for publisher in publishers {
        publisher.await.unwrap();
    }

    let expected = PUBLISHERS * EVENTS_PER_PUBLISHER;
    wait_for(
        || listener.len() == expected,
        Duration::from_secs(5),
        "all events to be delivered",
    )
    .await;

    for publisher in 0..PUBLISHERS {
        let actor = format!("publisher-{publisher}");
        let sequence: Vec<usize> = listener
            .events()
            .iter()
            .filter(|event| event.actor_id == actor)
            .map(|event| event.message.parse().unwrap())
            .collect();
        let expected: Vec<usize> = (0..EVENTS_PER_PUBLISHER).collect();
        assert_eq!(sequence, expected, "publisher {publisher} order broken");
    }

    bus.shutdown().await;
}
