//! Bundled root middleware for store trees.
//!
//! - [`DevTools`]: action history with replay and time travel
//! - [`Protector`]: forbids scheduling while a synchronous action runs
//! - [`Logger`]: logs every action through `tracing`
//!
//! Middleware runs in the order it is added to the root's
//! [`StoreBuilder`](storetree_core::StoreBuilder).

mod devtools;
mod error;
mod logger;
mod protector;

pub use devtools::{ActionRecord, DevTools, DevToolsConfig};
pub use error::{MiddlewareError, Result};
pub use logger::{Logger, LoggerConfig};
pub use protector::Protector;
