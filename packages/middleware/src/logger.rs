//! Action logging through `tracing`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use storetree_core::{Action, Middleware, Next, Result, StoreRef, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Include the action arguments in the log event.
    pub include_payload: bool,
}

/// Logs every action reaching the root, and how it ended.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    config: LoggerConfig,
}

impl Logger {
    pub fn new(config: LoggerConfig) -> Self {
        Self { config }
    }
}

impl Middleware for Logger {
    fn handle(&self, root: &StoreRef, action: Action, next: Next<'_>) -> Result<Option<Value>> {
        let label = action.label().to_string();
        if self.config.include_payload {
            info!(root = %root, %label, mode = ?action.mode(), args = ?action.args(), "action");
        } else {
            info!(root = %root, %label, mode = ?action.mode(), "action");
        }

        let result = next.run(action);
        match &result {
            Ok(Some(_)) => debug!(%label, "action done"),
            Ok(None) => info!(%label, "action aborted by middleware"),
            Err(e) => warn!(%label, error = %e, "action failed"),
        }
        result
    }
}
