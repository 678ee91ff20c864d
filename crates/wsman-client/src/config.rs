// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use serde::{Deserialize, Serialize};
use wsman_core::BodyFraming;
use wsman_transport::SessionConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(flatten)]
    pub session: SessionConfig,
    /// Request body framing; `content-length` unless set.
    pub framing: BodyFraming,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn reads_flat_json() {
        let cfg: ClientConfig =
            serde_json::from_str(r#"{"framing":"chunked","idle_timeout_ms":2500}"#).unwrap();
        assert_eq!(cfg.framing, BodyFraming::Chunked);
        assert_eq!(cfg.session.idle_timeout, Duration::from_millis(2500));
        assert_eq!(cfg.session.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn empty_object_is_default() {
        let cfg: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.framing, BodyFraming::ContentLength);
    }
}
