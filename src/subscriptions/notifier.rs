//! Delivery of "new document" events to push subscribers.

use crate::error::{MediatorError, Result};
use crate::types::{Subscription, SubscriptionId, Timestamp};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Delivers one new-document event to one subscriber.
///
/// A single attempt; retry policy, if any, belongs to the implementation.
pub trait Notifier: Send + Sync {
    fn notify(&self, subscription: &Subscription, document_id: &str) -> Result<()>;
}

/// A delivered new-document event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNotification {
    pub subscription_id: SubscriptionId,
    pub url: String,
    pub document_id: String,
    pub timestamp: Timestamp,
}

impl DocumentNotification {
    pub fn new(subscription: &Subscription, document_id: &str) -> Self {
        Self {
            subscription_id: subscription.id.clone(),
            url: subscription.url.clone(),
            document_id: document_id.to_string(),
            timestamp: Timestamp::now(),
        }
    }
}

// --- HTTP ---

/// Configuration for the HTTP notifier.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpNotifierConfig {
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for HttpNotifierConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            user_agent: "xds-mediator/0.1".to_string(),
        }
    }
}

/// Posts a WS-Notification `Notify` envelope to the subscription URL.
///
/// Redirects are not followed. Any non-2xx status is a failed delivery.
pub struct HttpNotifier {
    client: Client,
}

impl HttpNotifier {
    pub fn new(config: &HttpNotifierConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .map_err(|e| MediatorError::Notification {
                url: String::new(),
                reason: format!("http client build failed: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl Notifier for HttpNotifier {
    fn notify(&self, subscription: &Subscription, document_id: &str) -> Result<()> {
        let failure = |reason: String| MediatorError::Notification {
            url: subscription.url.clone(),
            reason,
        };

        let response = self
            .client
            .post(&subscription.url)
            .header(CONTENT_TYPE, "application/soap+xml; charset=UTF-8")
            .body(notify_envelope(subscription, document_id))
            .send()
            .map_err(|e| failure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failure(format!("subscriber responded {status}")));
        }

        debug!(url = %subscription.url, document_id, "Notified subscriber");
        Ok(())
    }
}

/// WS-Notification `Notify` body announcing `document_id`.
pub fn notify_envelope(subscription: &Subscription, document_id: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope""#,
            r#" xmlns:a="http://www.w3.org/2005/08/addressing""#,
            r#" xmlns:wsnt="http://docs.oasis-open.org/wsn/b-2">"#,
            r#"<s:Header>"#,
            r#"<a:Action>http://docs.oasis-open.org/wsn/bw-2/NotificationConsumer/Notify</a:Action>"#,
            r#"<a:To>{url}</a:To>"#,
            r#"</s:Header>"#,
            r#"<s:Body><wsnt:Notify><wsnt:NotificationMessage>"#,
            r#"<wsnt:SubscriptionReference><a:Address>{id}</a:Address></wsnt:SubscriptionReference>"#,
            r#"<wsnt:Topic Dialect="http://docs.oasis-open.org/wsn/t-1/TopicExpression/Simple">ihe:FullDocumentEntry</wsnt:Topic>"#,
            r#"<wsnt:Message><DocumentId>{doc}</DocumentId></wsnt:Message>"#,
            r#"</wsnt:NotificationMessage></wsnt:Notify></s:Body>"#,
            r#"</s:Envelope>"#
        ),
        url = xml_escape(&subscription.url),
        id = xml_escape(subscription.id.as_str()),
        doc = xml_escape(document_id),
    )
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// --- In-process ---

/// Delivers notifications over a bounded in-process channel.
///
/// A full buffer or a dropped receiver is a failed delivery.
pub struct ChannelNotifier {
    sender: Sender<DocumentNotification>,
}

impl ChannelNotifier {
    pub fn new(buffer_size: usize) -> (Self, NotificationHandle) {
        let (sender, receiver) = bounded(buffer_size);
        (Self { sender }, NotificationHandle { receiver })
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, subscription: &Subscription, document_id: &str) -> Result<()> {
        let event = DocumentNotification::new(subscription, document_id);
        self.sender.try_send(event).map_err(|e| {
            let reason = match e {
                TrySendError::Full(_) => "notification buffer full",
                TrySendError::Disconnected(_) => "notification receiver dropped",
            };
            MediatorError::Notification {
                url: subscription.url.clone(),
                reason: reason.to_string(),
            }
        })
    }
}

/// Receiving side of a [`ChannelNotifier`].
pub struct NotificationHandle {
    pub receiver: Receiver<DocumentNotification>,
}

impl NotificationHandle {
    /// Receive the next notification (blocking).
    pub fn recv(&self) -> std::result::Result<DocumentNotification, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a notification (non-blocking).
    pub fn try_recv(
        &self,
    ) -> std::result::Result<DocumentNotification, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<DocumentNotification, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything currently buffered.
    pub fn drain(&self) -> Vec<DocumentNotification> {
        self.receiver.try_iter().collect()
    }
}
