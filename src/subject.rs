// Copyright (C) 2024, Tony Rippy
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! The publish side of the pipeline. `Subject` is the seam a scrape engine
//! publishes `Event`s through; `BroadcastSubject` is the default
//! implementation, backed by a `tokio::sync::broadcast` channel so any
//! number of subscribers can attach without the publisher blocking on a
//! slow one.

use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::events::Event;

/// A handle a subscriber reads events from. Dropping it unsubscribes.
pub struct Subscription(broadcast::Receiver<Event>);

impl Subscription {
    /// Wait for the next published event. Returns `None` once the
    /// publishing side has been dropped and the channel is drained.
    ///
    /// If this subscriber fell behind and the channel's buffer wrapped, the
    /// oldest unread events are skipped rather than returned out of order;
    /// this surfaces to the caller as simply the next event still buffered.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.0.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Something a scrape engine can publish normalized events to.
pub trait Subject: Send + Sync {
    fn publish(&self, event: Event);
    fn subscribe(&self) -> Subscription;
    /// Release the subject. Every current and future subscriber observes
    /// the channel as closed; further `publish` calls are silently
    /// dropped. Idempotent.
    fn close(&self);
}

/// Default `Subject`: a broadcast channel with a fixed replay buffer.
/// Publishing never blocks; subscribers that don't keep up lose their
/// oldest buffered events rather than stalling the scrape loop.
///
/// The sender lives behind a `Mutex<Option<_>>` rather than bare so that
/// `close()` can drop it: dropping every `Sender` clone is what causes
/// outstanding and future `Receiver`s to observe `RecvError::Closed`.
pub struct BroadcastSubject {
    buffer: usize,
    sender: Mutex<Option<broadcast::Sender<Event>>>,
}

impl BroadcastSubject {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        BroadcastSubject {
            buffer,
            sender: Mutex::new(Some(sender)),
        }
    }
}

impl Subject for BroadcastSubject {
    fn publish(&self, event: Event) {
        // No receivers is a normal, non-error state (nothing subscribed
        // yet); the send result is only interesting to report back to a
        // caller that cares how many were delivered, which none here do.
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            let _ = sender.send(event);
        }
    }

    fn subscribe(&self) -> Subscription {
        match self.sender.lock().unwrap().as_ref() {
            Some(sender) => Subscription(sender.subscribe()),
            // Subscribing after close: hand back a receiver on a
            // throwaway, already-closed channel rather than panicking.
            None => {
                let (_throwaway, rx) = broadcast::channel(self.buffer.max(1));
                Subscription(rx)
            }
        }
    }

    fn close(&self) {
        self.sender.lock().unwrap().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MetricMetadata;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;

    fn sample_event(value: f64) -> Event {
        let mut payload = HashMap::new();
        payload.insert("metricValue".to_string(), value.to_string());
        Event {
            provider_name: "http://x".to_string(),
            timestamp: DateTime::<Utc>::from_timestamp_millis(1).unwrap(),
            metadata: MetricMetadata::Metric { name: "g".to_string(), value },
            payload,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let subject = BroadcastSubject::new(16);
        let mut sub = subject.subscribe();
        subject.publish(sample_event(1.0));
        subject.publish(sample_event(2.0));
        assert_eq!(sub.recv().await, Some(sample_event(1.0)));
        assert_eq!(sub.recv().await, Some(sample_event(2.0)));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let subject = BroadcastSubject::new(4);
        subject.publish(sample_event(1.0));
    }

    #[tokio::test]
    async fn recv_returns_none_after_publisher_dropped() {
        let subject = BroadcastSubject::new(4);
        let mut sub = subject.subscribe();
        drop(subject);
        assert_eq!(sub.recv().await, None);
    }
}
