//! Outbound text channel and inbound media download.

pub mod twilio;

use async_trait::async_trait;

pub use twilio::{MediaFetcher, TwilioMessenger};

/// The only thing the pipeline needs from the messaging channel. Delivery
/// failures stay inside the implementation.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, to: &str, text: &str);
}

/// Used when no Twilio credentials are configured.
#[derive(Debug, Default, Clone)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send(&self, to: &str, text: &str) {
        tracing::info!(%to, chars = text.len(), "outbound message (not sent)\n{text}");
    }
}
