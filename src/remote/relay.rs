//! # Relay Module / 转发模块
//!
//! Outbound half of a remote-driven run: queues every output line and delivers
//! it to the coordinator with `PUT /message`, strictly in order.
//!
//! 远程驱动运行的出站部分：将每一行输出排队，并按顺序通过 `PUT /message` 发送给协调器。

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::error::Error;
use crate::core::models::OutputMessage;
use crate::core::output::Lifecycle;
use crate::remote::protocol::{PageContext, RelayedMessage};

/// Upper bound on how long teardown waits for queued messages.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Where relayed messages go and which session they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTarget {
    pub host: String,
    pub port: u16,
    pub id: String,
}

impl RelayTarget {
    pub fn message_url(&self) -> String {
        format!("http://{}:{}/message", self.host, self.port)
    }
}

impl From<&PageContext> for RelayTarget {
    fn from(context: &PageContext) -> Self {
        Self {
            host: context.host.clone(),
            port: context.port,
            id: context.id.clone(),
        }
    }
}

/// Background sender owned by a run's `OutputAggregator`.
pub struct RelayClient {
    id: String,
    tx: mpsc::UnboundedSender<RelayedMessage>,
    task: JoinHandle<()>,
}

impl RelayClient {
    /// Spawns the delivery task. Must be called inside a tokio runtime.
    pub fn start(target: RelayTarget) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<RelayedMessage>();
        let url = target.message_url();
        let task = tokio::spawn(async move {
            let client = reqwest::Client::new();
            while let Some(message) = rx.recv().await {
                let sent = client
                    .put(&url)
                    .json(&message)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status());
                if let Err(e) = sent {
                    let error = Error::RelaySendFailed { url: url.clone() };
                    tracing::warn!("{error}: {e}");
                }
            }
        });
        Self {
            id: target.id,
            tx,
            task,
        }
    }

    pub fn send(&self, message: &OutputMessage, marker: Option<&Lifecycle>) {
        let _ = self
            .tx
            .send(RelayedMessage::from_output(&self.id, message, marker));
    }

    /// Closes the queue and waits until everything queued has been attempted.
    pub async fn flush(self) {
        let RelayClient { tx, mut task, .. } = self;
        drop(tx);
        if tokio::time::timeout(FLUSH_TIMEOUT, &mut task).await.is_err() {
            tracing::warn!("Relay queue not drained after {FLUSH_TIMEOUT:?}, dropping the rest");
            task.abort();
        }
    }
}
