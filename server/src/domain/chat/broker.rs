//! Broker Fabric (BF) — refcounted per-talk fan-out on top of `TopicService`'s
//! broadcast topics.
//!
//! `TopicService::broadcast_topic` itself does not track how many callers care
//! about a given name; this module adds the refcounted AddTrack/RemoveTrack
//! layer the spec requires: a subscription routine is spawned only on a 0→1
//! transition and torn down only on 1→0.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::data::topics::{TopicError, TopicService};

use super::envelope::BrokerEnvelope;

fn exchange_name(talk_id: &str) -> String {
    format!("talk:{talk_id}")
}

struct TrackedTalk {
    refcount: usize,
    handle: JoinHandle<()>,
    /// Distinguishes this entry from whatever may replace it at the same key later,
    /// so a subscriber that fails late doesn't tear down a newer entry (§4.2).
    generation: u64,
}

/// A broker event delivered to the Router, tagged with which talk it came from.
pub struct BrokerEvent {
    pub envelope: BrokerEnvelope,
}

/// Broker Fabric
pub struct BrokerFabric {
    topics: Arc<TopicService>,
    tracked: Arc<std::sync::Mutex<HashMap<String, TrackedTalk>>>,
    events_tx: mpsc::Sender<BrokerEvent>,
    next_generation: AtomicU64,
}

impl BrokerFabric {
    pub fn new(topics: Arc<TopicService>, events_tx: mpsc::Sender<BrokerEvent>) -> Self {
        Self {
            topics,
            tracked: Arc::new(std::sync::Mutex::new(HashMap::new())),
            events_tx,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Increment the tracked-talk refcount. Spawns a subscription routine on 0→1.
    pub fn add_track(&self, talk_id: &str) {
        let mut tracked = self.tracked.lock().unwrap();
        if let Some(entry) = tracked.get_mut(talk_id) {
            entry.refcount += 1;
            return;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let handle = self.spawn_subscriber(talk_id.to_string(), generation);
        tracked.insert(talk_id.to_string(), TrackedTalk { refcount: 1, handle, generation });
    }

    /// Decrement the tracked-talk refcount. Cancels the subscription on 1→0.
    pub fn remove_track(&self, talk_id: &str) {
        let mut tracked = self.tracked.lock().unwrap();
        let Some(entry) = tracked.get_mut(talk_id) else {
            return;
        };
        entry.refcount = entry.refcount.saturating_sub(1);
        if entry.refcount == 0 {
            let entry = tracked.remove(talk_id).unwrap();
            entry.handle.abort();
        }
    }

    fn spawn_subscriber(&self, talk_id: String, generation: u64) -> JoinHandle<()> {
        let topics = Arc::clone(&self.topics);
        let events_tx = self.events_tx.clone();
        let tracked = Arc::clone(&self.tracked);
        tokio::spawn(async move {
            let topic = topics.broadcast_topic::<BrokerEnvelope>(&exchange_name(&talk_id));
            let mut subscriber = match topic.subscribe().await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(%talk_id, error = %e, "broker subscription failed to start, self-removing from tracked table");
                    let mut tracked = tracked.lock().unwrap();
                    if tracked.get(&talk_id).is_some_and(|t| t.generation == generation) {
                        tracked.remove(&talk_id);
                    }
                    return;
                }
            };
            loop {
                match subscriber.recv().await {
                    Ok(envelope) => {
                        if events_tx.send(BrokerEvent { envelope }).await.is_err() {
                            break;
                        }
                    }
                    Err(TopicError::ChannelClosed) => break,
                    Err(e) => {
                        tracing::warn!(%talk_id, error = %e, "broker subscription error");
                    }
                }
            }
        })
    }

    /// Publish an envelope to its talk's exchange. Failures are logged only (§4.2).
    pub async fn publish(&self, envelope: BrokerEnvelope) {
        let topic = self
            .topics
            .broadcast_topic::<BrokerEnvelope>(&exchange_name(&envelope.talk_id));
        if let Err(e) = topic.publish(&envelope).await {
            tracing::warn!(talk_id = %envelope.talk_id, error = %e, "broker publish failed");
        }
    }

    /// Current refcount for a talk, for tests and diagnostics.
    pub fn refcount(&self, talk_id: &str) -> usize {
        self.tracked
            .lock()
            .unwrap()
            .get(talk_id)
            .map(|t| t.refcount)
            .unwrap_or(0)
    }

    /// Aborts every still-tracked subscription routine (graceful shutdown, §5).
    pub fn shutdown(&self) {
        let tracked = std::mem::take(&mut *self.tracked.lock().unwrap());
        for (talk_id, entry) in tracked {
            tracing::debug!(%talk_id, "aborting broker subscription on shutdown");
            entry.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chat::envelope::BrokerVariant;

    fn make_fabric() -> (BrokerFabric, mpsc::Receiver<BrokerEvent>) {
        let (tx, rx) = mpsc::channel(100);
        let topics = Arc::new(TopicService::new());
        (BrokerFabric::new(topics, tx), rx)
    }

    #[tokio::test]
    async fn test_refcount_lifecycle() {
        let (fabric, _rx) = make_fabric();
        assert_eq!(fabric.refcount("t1"), 0);
        fabric.add_track("t1");
        assert_eq!(fabric.refcount("t1"), 1);
        fabric.add_track("t1");
        assert_eq!(fabric.refcount("t1"), 2);
        fabric.remove_track("t1");
        assert_eq!(fabric.refcount("t1"), 1);
        fabric.remove_track("t1");
        assert_eq!(fabric.refcount("t1"), 0);
    }

    #[tokio::test]
    async fn test_publish_reaches_tracked_subscriber() {
        let (fabric, mut rx) = make_fabric();
        fabric.add_track("t1");
        // give the subscriber task a moment to subscribe
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        fabric
            .publish(BrokerEnvelope {
                talk_id: "t1".to_string(),
                variant: BrokerVariant::TalkClose,
            })
            .await;

        let event = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.envelope.talk_id, "t1");
        assert!(matches!(event.envelope.variant, BrokerVariant::TalkClose));
    }
}
