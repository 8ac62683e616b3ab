use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::blocks::MessageTemplate;

/// Outbound chat message addressed to a channel, threaded when `thread_ts` is set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub channel_id: String,
    pub thread_ts: Option<String>,
    pub message: MessageTemplate,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplyError {
    #[error("reply transport failure: {0}")]
    Transport(String),
    #[error("reply rejected by chat platform: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn post(&self, reply: &Reply) -> Result<(), ReplyError>;
}

#[async_trait]
impl<T> ReplySink for Arc<T>
where
    T: ReplySink + ?Sized,
{
    async fn post(&self, reply: &Reply) -> Result<(), ReplyError> {
        (**self).post(reply).await
    }
}

/// Keeps every posted reply in memory. Channels listed in `reject_channels`
/// fail with [`ReplyError::Rejected`].
#[cfg(any(test, feature = "testing"))]
#[derive(Default)]
pub struct RecordingReplySink {
    replies: tokio::sync::Mutex<Vec<Reply>>,
    reject_channels: Vec<String>,
}

#[cfg(any(test, feature = "testing"))]
impl RecordingReplySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(channels: &[&str]) -> Self {
        Self {
            reject_channels: channels.iter().map(|channel| (*channel).to_owned()).collect(),
            ..Self::default()
        }
    }

    pub async fn replies(&self) -> Vec<Reply> {
        self.replies.lock().await.clone()
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl ReplySink for RecordingReplySink {
    async fn post(&self, reply: &Reply) -> Result<(), ReplyError> {
        if self.reject_channels.contains(&reply.channel_id) {
            return Err(ReplyError::Rejected("channel_not_found".to_owned()));
        }
        self.replies.lock().await.push(reply.clone());
        Ok(())
    }
}
