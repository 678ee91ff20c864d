// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{ClientError, ErrorKind, WsmanResponse};

/// Result of one call in the shape handed to the web layer:
/// `{"success": <payload>}` or `{"error": <kind>, "detail": <message>}`.
///
/// The payload is the decoded body, or the raw body text when it is not XML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    Success { success: Value },
    Error { error: ErrorKind, detail: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

impl From<Result<WsmanResponse, ClientError>> for Outcome {
    fn from(result: Result<WsmanResponse, ClientError>) -> Self {
        match result {
            Ok(response) => {
                let success = match response.decode() {
                    Ok(tree) => tree,
                    Err(err) => {
                        debug!(error = %err, "body is not xml, passing it through");
                        Value::String(response.body)
                    }
                };
                Outcome::Success { success }
            }
            Err(err) => Outcome::Error {
                error: err.kind(),
                detail: err.to_string(),
            },
        }
    }
}
