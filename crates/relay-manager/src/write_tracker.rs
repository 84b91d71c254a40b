//! Reverse tool-call handler that records the paths an ACP worker writes
//! to, feeding the aggregator's write-conflict detection.

use async_trait::async_trait;
use relay_transport_acp::ToolHandler;
use serde_json::Value;

use crate::transport::WritePaths;

/// Handles `fs/write_text_file` calls: records the path, acknowledges
/// the write without actually touching the filesystem.
///
/// The manager is an orchestration layer, not a filesystem proxy: the
/// provider process already has its own filesystem access, so there is
/// nothing for this handler to do beyond bookkeeping and returning
/// success.
pub struct WriteTracker {
    paths: WritePaths,
}

impl WriteTracker {
    #[must_use]
    pub fn new(paths: WritePaths) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl ToolHandler for WriteTracker {
    async fn handle(&self, _method: &str, params: Option<Value>) -> Result<Value, String> {
        if let Some(path) = params.as_ref().and_then(|p| p.get("path")).and_then(Value::as_str) {
            self.paths
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(path.to_string());
        }
        Ok(serde_json::json!({ "success": true }))
    }
}
