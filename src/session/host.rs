use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::segmentation::BotReply;

/// File handed to the host alongside a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub base64: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricKind {
    /// Billed through the platform's own speech credentials
    Inbuilt,
    /// Billed to credentials supplied in the STT/TTS body
    ThirdParty,
}

/// Usage record for speech services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionMetric {
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub metric_name: String,
    pub transactions: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Receiver of everything a session produces for the test host
pub trait Host: Send + Sync {
    fn enqueue_bot_turn(&self, reply: BotReply);
    fn emit_attachment(&self, attachment: Attachment);
    fn emit_consumption_metric(&self, metric: ConsumptionMetric);
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    BotReply(BotReply),
    Attachment(Attachment),
    Metric(ConsumptionMetric),
}

/// Host that forwards every event onto a channel
#[derive(Debug, Clone)]
pub struct ChannelHost {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl ChannelHost {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: HostEvent) {
        if self.tx.send(event).is_err() {
            warn!("Host receiver dropped, event discarded");
        }
    }
}

impl Host for ChannelHost {
    fn enqueue_bot_turn(&self, reply: BotReply) {
        self.forward(HostEvent::BotReply(reply));
    }

    fn emit_attachment(&self, attachment: Attachment) {
        self.forward(HostEvent::Attachment(attachment));
    }

    fn emit_consumption_metric(&self, metric: ConsumptionMetric) {
        self.forward(HostEvent::Metric(metric));
    }
}
