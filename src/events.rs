use std::sync::mpsc::{channel, Receiver, Sender};

use serde_json::{json, Value};

/// A message published on a named channel.
///
/// Channels: `log` (structured lifecycle records), per-worker channels named
/// after the worker (lease revocations), and the tracked-job channels `put`,
/// `popped`, `completed`, `failed`, `stalled`, `canceled`, `track`,
/// `untrack` (bare jid payloads).
#[derive(Debug, Clone)]
pub struct Event {
    pub channel: String,
    pub payload: Value,
}

/// Fan-out publisher. Delivery is best-effort: a subscriber that went away
/// is pruned on the next publish and nobody else notices.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<Event>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<Event> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, channel: &str, payload: Value) {
        self.subscribers.retain(|tx| {
            tx.send(Event {
                channel: channel.to_string(),
                payload: payload.clone(),
            })
            .is_ok()
        });
    }

    /// Publish a structured record on the `log` channel.
    pub fn log(&mut self, payload: Value) {
        self.publish("log", payload);
    }

    /// Publish a bare jid on one of the tracked-job channels.
    pub fn notify(&mut self, channel: &str, jid: &str) {
        self.publish(channel, json!(jid));
    }
}
