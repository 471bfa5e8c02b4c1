//! Uniform result object for UI feedback
//!
//! Engine operations return `SyncResult<T>`. UIs that want the flat
//! `{ success, data?, error? }` shape convert with `OpResult::from`.

use serde::Serialize;

use crate::error::SyncResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> OpResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

impl<T> From<SyncResult<T>> for OpResult<T> {
    fn from(result: SyncResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }
}
