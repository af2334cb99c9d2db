// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent event channels.
//!
//! A `ChannelRegistry` owns one broadcast topic per agent id, created
//! lazily on first publish or subscribe and swept once it has had zero
//! subscribers for longer than the idle TTL. The registry is an explicit
//! dependency handed to the orchestrator at construction — there is no
//! global channel state.
//!
//! Delivery guarantee: **at-most-once** per event. The broadcast ring
//! never duplicates an event, so consumers never deduplicate. A
//! subscriber that falls behind its bounded buffer loses the oldest
//! events and observes a single [`StreamItem::Lagged`] marker with the
//! count of dropped events; the publisher is never blocked or slowed by
//! slow or disconnected subscribers.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use sw_core::{AgentId, RunEvent};
use tokio::sync::broadcast::{self, error::RecvError};

/// One item delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// The next event, in publish order
    Event(RunEvent),
    /// The subscriber fell behind and this many events were dropped
    Lagged(u64),
}

/// Ordered event stream for one subscriber.
///
/// Dropping the stream unsubscribes without affecting other observers or
/// the run itself.
pub struct EventStream {
    rx: broadcast::Receiver<RunEvent>,
}

impl EventStream {
    /// Next item, or `None` once the topic is gone (agent deleted).
    pub async fn next(&mut self) -> Option<StreamItem> {
        match self.rx.recv().await {
            Ok(event) => Some(StreamItem::Event(event)),
            Err(RecvError::Lagged(n)) => Some(StreamItem::Lagged(n)),
            Err(RecvError::Closed) => None,
        }
    }

    /// Explicit form of dropping the stream.
    pub fn unsubscribe(self) {}
}

struct Topic {
    tx: broadcast::Sender<RunEvent>,
    /// Set while the topic has zero subscribers; basis for idle sweeping
    idle_since: Option<Instant>,
}

/// Registry of per-agent event topics.
pub struct ChannelRegistry {
    capacity: usize,
    idle_ttl: Duration,
    topics: Mutex<HashMap<AgentId, Topic>>,
}

impl ChannelRegistry {
    /// `capacity` bounds the per-subscriber buffer (drop-oldest beyond
    /// it); `idle_ttl` bounds how long a subscriber-less topic survives.
    pub fn new(capacity: usize, idle_ttl: Duration) -> Self {
        Self {
            capacity,
            idle_ttl,
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Fan an event out to all current subscribers of the agent's topic.
    pub fn publish(&self, agent_id: &AgentId, event: RunEvent, now: Instant) {
        let mut topics = self.topics.lock();
        let capacity = self.capacity;
        let topic = topics
            .entry(agent_id.clone())
            .or_insert_with(|| Topic { tx: broadcast::channel(capacity).0, idle_since: Some(now) });
        if topic.tx.receiver_count() > 0 {
            topic.idle_since = None;
        }
        tracing::trace!(agent_id = %agent_id, "{}", event.log_summary());
        // Send fails only with zero subscribers; events are ephemeral
        let _ = topic.tx.send(event);
        Self::sweep_locked(&mut topics, self.idle_ttl, now);
    }

    /// Register a new subscriber on the agent's topic.
    ///
    /// The returned stream yields exactly the events published after this
    /// call. Callers wanting a consistent snapshot+stream pair must invoke
    /// this while holding the same lock that serializes publishes.
    pub fn subscribe(&self, agent_id: &AgentId, now: Instant) -> EventStream {
        let mut topics = self.topics.lock();
        let capacity = self.capacity;
        let topic = topics
            .entry(agent_id.clone())
            .or_insert_with(|| Topic { tx: broadcast::channel(capacity).0, idle_since: None });
        topic.idle_since = None;
        let rx = topic.tx.subscribe();
        Self::sweep_locked(&mut topics, self.idle_ttl, now);
        EventStream { rx }
    }

    /// Drop the agent's topic outright, closing all its streams.
    pub fn remove(&self, agent_id: &AgentId) {
        self.topics.lock().remove(agent_id);
    }

    /// Sweep topics that have had zero subscribers past the idle TTL.
    ///
    /// Also runs opportunistically on every publish/subscribe; call this
    /// from a periodic task when traffic alone is not enough.
    pub fn sweep(&self, now: Instant) {
        let mut topics = self.topics.lock();
        Self::sweep_locked(&mut topics, self.idle_ttl, now);
    }

    /// Number of live topics.
    pub fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }

    fn sweep_locked(topics: &mut HashMap<AgentId, Topic>, idle_ttl: Duration, now: Instant) {
        topics.retain(|agent_id, topic| {
            if topic.tx.receiver_count() > 0 {
                topic.idle_since = None;
                return true;
            }
            match topic.idle_since {
                Some(since) if now.duration_since(since) >= idle_ttl => {
                    tracing::debug!(agent_id = %agent_id, "sweeping idle event topic");
                    false
                }
                Some(_) => true,
                None => {
                    topic.idle_since = Some(now);
                    true
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
