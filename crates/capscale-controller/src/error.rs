//! Controller error types.

use std::time::Duration;

use capscale_core::RemoteError;
use thiserror::Error;

/// Why a capacity update did not go through.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("describe capacity failed: {0}")]
    Describe(RemoteError),

    #[error("update capacity failed: {0}")]
    Update(RemoteError),

    #[error("{call} timed out after {}ms", .after.as_millis())]
    Timeout { call: &'static str, after: Duration },
}
