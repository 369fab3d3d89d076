//! Background DHT announcement of freshly added content

use crate::node::LocalNode;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

/// Upper bound on a single announcement
pub const PROVIDE_TIMEOUT: Duration = Duration::from_secs(300);

/// Handle to a detached announcement.
///
/// Outcomes are only logged; dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct ProvideTask {
    cid: String,
    handle: JoinHandle<()>,
}

impl ProvideTask {
    /// Announce `cid` in the background, giving up after `limit`
    pub fn spawn(node: Arc<dyn LocalNode>, cid: impl Into<String>, limit: Duration) -> Self {
        let cid = cid.into();
        let span = tracing::info_span!("provide", cid = %cid);
        let task_cid = cid.clone();

        let handle = tokio::spawn(
            async move {
                match tokio::time::timeout(limit, node.provide(&task_cid)).await {
                    Ok(Ok(())) => info!("Announced to DHT"),
                    Ok(Err(e)) => warn!(error = %e, "DHT announcement failed"),
                    Err(_) => warn!(timeout_secs = limit.as_secs(), "DHT announcement timed out"),
                }
            }
            .instrument(span),
        );

        Self { cid, handle }
    }

    pub fn cid(&self) -> &str {
        &self.cid
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the announcement if it is still running
    pub fn abort(&self) {
        self.handle.abort();
    }
}
