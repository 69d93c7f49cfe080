//! Opaque pagination cursor.
//!
//! Encodes the sort column and direction the page was produced under,
//! the last row's sort-key value, and its primary key as a tie-break,
//! so pages stay stable under concurrent warehouse refreshes and
//! non-unique sort columns. A token minted under one ordering cannot
//! resume a query ordered differently. The token is base64 over a JSON
//! body; callers must treat it as opaque.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use super::{ScalarValue, SortDirection};
use crate::error::{Result, ServerError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    /// Sort column the token was minted under.
    pub column: String,
    pub direction: SortDirection,
    /// Sort-column value of the last row of the previous page. `None`
    /// marks a boundary inside the NULL-valued tail of the ordering.
    pub sort_value: Option<ScalarValue>,
    /// Primary key of that row.
    pub key: String,
}

impl Cursor {
    pub fn encode(&self) -> String {
        // Serialization of these types cannot fail.
        let body = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(body)
    }

    /// Decode a caller-supplied token. Any malformed token is a
    /// validation error on the `cursor` argument, never a crash.
    pub fn decode(token: &str) -> Result<Self> {
        let invalid = || ServerError::Validation {
            field: "cursor".to_string(),
            message: "malformed continuation token".to_string(),
        };
        let body = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
        serde_json::from_slice(&body).map_err(|_| invalid())
    }
}
