//! Notification plumbing: topic patterns, subscriptions and an in-process
//! hub that fans published references out to matching subscribers.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use bulletin_common::{FeedError, FeedResult};

/// Per-subscriber buffer. A full buffer drops the event with a warning.
const SUBSCRIPTION_BUFFER: usize = 256;

/// An event delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// A document is available at `reference`.
    Message {
        received_at: DateTime<Utc>,
        topic: String,
        reference: String,
    },
    /// Non-fatal transport trouble; the subscription stays open.
    Error { message: String },
}

/// AMQP-style topic pattern: `*` matches exactly one dot-separated word,
/// `#` matches zero or more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    words: Vec<String>,
}

impl TopicPattern {
    pub fn matches(&self, topic: &str) -> bool {
        let topic: Vec<&str> = topic.split('.').collect();
        let pattern: Vec<&str> = self.words.iter().map(String::as_str).collect();
        match_words(&pattern, &topic)
    }
}

fn match_words(pattern: &[&str], topic: &[&str]) -> bool {
    match pattern.split_first() {
        None => topic.is_empty(),
        Some((&"#", rest)) => (0..=topic.len()).any(|skip| match_words(rest, &topic[skip..])),
        Some((&word, rest)) => match topic.split_first() {
            Some((&head, tail)) => (word == "*" || word == head) && match_words(rest, tail),
            None => false,
        },
    }
}

impl FromStr for TopicPattern {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words: Vec<String> = s.trim().split('.').map(str::to_string).collect();
        if words.iter().any(String::is_empty) {
            return Err(FeedError::Configuration(format!(
                "invalid topic pattern '{}'",
                s
            )));
        }
        Ok(Self { words })
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.words.join("."))
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    pattern: TopicPattern,
    rx: mpsc::Receiver<NotificationEvent>,
}

impl Subscription {
    pub fn new(pattern: TopicPattern, rx: mpsc::Receiver<NotificationEvent>) -> Self {
        Self { pattern, rx }
    }

    pub fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    /// Next event, or `None` once the client has gone away.
    pub async fn recv(&mut self) -> Option<NotificationEvent> {
        self.rx.recv().await
    }
}

/// Source of notification subscriptions.
///
/// Reconnection and backoff belong to the implementation; transport trouble
/// surfaces as [`NotificationEvent::Error`].
#[async_trait]
pub trait NotificationClient: Send + Sync {
    async fn subscribe(&self, pattern: &str) -> FeedResult<Subscription>;
}

struct Subscriber {
    pattern: TopicPattern,
    tx: mpsc::Sender<NotificationEvent>,
}

/// In-process topic exchange.
#[derive(Default)]
pub struct NotificationHub {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a reference to every subscriber whose pattern matches `topic`.
    ///
    /// Returns the number of subscribers that accepted the event.
    pub async fn publish(&self, topic: &str, reference: &str, received_at: DateTime<Utc>) -> usize {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|s| !s.tx.is_closed());

        let mut delivered = 0;
        for subscriber in subscribers.iter().filter(|s| s.pattern.matches(topic)) {
            let event = NotificationEvent::Message {
                received_at,
                topic: topic.to_string(),
                reference: reference.to_string(),
            };
            match subscriber.tx.try_send(event) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    topic = %topic,
                    pattern = %subscriber.pattern,
                    error = %e,
                    "Dropping notification"
                ),
            }
        }

        debug!(topic = %topic, reference = %reference, delivered, "Published notification");
        delivered
    }

    /// Tell every subscriber about a transport problem.
    pub async fn publish_error(&self, message: &str) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|s| !s.tx.is_closed());
        for subscriber in subscribers.iter() {
            let _ = subscriber.tx.try_send(NotificationEvent::Error {
                message: message.to_string(),
            });
        }
    }

    /// Live subscriptions.
    pub async fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }
}

#[async_trait]
impl NotificationClient for NotificationHub {
    async fn subscribe(&self, pattern: &str) -> FeedResult<Subscription> {
        let pattern: TopicPattern = pattern.parse()?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        self.subscribers.lock().await.push(Subscriber {
            pattern: pattern.clone(),
            tx,
        });
        debug!(pattern = %pattern, "Subscribed");

        Ok(Subscription::new(pattern, rx))
    }
}
