//! Errors raised by the tool layer itself.
//!
//! Worker and storage failures arrive as `offcache_core::Error` and convert
//! directly; these cover parameter decoding and output encoding.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Tool parameters that decode but make no sense (e.g. empty URL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    #[error("ENCODE_FAILED: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let code = match &err {
            ToolError::InvalidInput(_) => -32602,
            ToolError::Encode(_) => -32603,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
