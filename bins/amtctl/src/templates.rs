// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::path::PathBuf;

use wsman_client::{BodyBuilder, BuildError};
use wsman_core::{ApiCall, WsmanMethod};

const EXTRA_PLACEHOLDER: &str = "{{extra}}";
const HOST_PLACEHOLDER: &str = "{{host}}";

/// Reads envelopes from `<dir>/<Class>_<Method>.xml`.
///
/// `{{extra}}` is replaced with the call's extra input (the enumeration
/// context for `Pull`) and `{{host}}` with the device authority.
#[derive(Debug)]
pub struct TemplateDir {
    dir: PathBuf,
    host: String,
}

impl TemplateDir {
    pub fn new(dir: impl Into<PathBuf>, host: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            host: host.into(),
        }
    }

    fn path_for(&self, call: &ApiCall, method: WsmanMethod) -> PathBuf {
        self.dir.join(format!("{}_{}.xml", call, method))
    }
}

impl BodyBuilder for TemplateDir {
    fn build_body(
        &self,
        call: &ApiCall,
        method: WsmanMethod,
        extra: Option<&str>,
    ) -> Result<String, BuildError> {
        let path = self.path_for(call, method);
        let template = std::fs::read_to_string(&path)
            .map_err(|e| BuildError::new(format!("{}: {}", path.display(), e)))?;
        if template.contains(EXTRA_PLACEHOLDER) && extra.is_none() {
            return Err(BuildError::new(format!(
                "{} expects extra input",
                path.display()
            )));
        }
        Ok(template
            .replace(HOST_PLACEHOLDER, &self.host)
            .replace(EXTRA_PLACEHOLDER, extra.unwrap_or("")))
    }
}
