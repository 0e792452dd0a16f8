//! Uniform command-surface envelopes. Every command answers with
//! `{success, data | error}`; the error body carries a kind from the closed
//! taxonomy so callers can decide between report and retry.

use crate::error::{EngineError, ErrorKind, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(err: &EngineError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                kind: err.kind(),
                message: err.message().to_string(),
            }),
        }
    }

    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::fail(&err),
        }
    }
}

/// Pagination bounds for the list queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub const MAX_LIMIT: u32 = 100;

    pub fn normalize(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_shape() {
        let env = Envelope::ok(42);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn error_envelope_carries_taxonomy_kind() {
        let env: Envelope<()> = Envelope::fail(&EngineError::conflict("round is full"));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "CONFLICT");
        assert_eq!(json["error"]["message"], "round is full");
    }

    #[test]
    fn page_normalization_clamps() {
        let page = Page { page: 0, limit: 5000 }.normalize();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, Page::MAX_LIMIT);
    }
}
