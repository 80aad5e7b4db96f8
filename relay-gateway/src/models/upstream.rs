//! Upstream target model - where the relay sends chat traffic and how it
//! presents credentials there.

use serde::{Deserialize, Serialize};

use crate::utils::bearer_token;

/// How the caller's `Authorization` header is mapped onto upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Forward only a well-formed `Bearer <value>` header.
    Passthrough,
    /// Never forward a credential.
    Strip,
    /// Always send the target's configured header value.
    Custom,
    /// Unset or unrecognised: forward the caller's header verbatim.
    #[default]
    #[serde(other)]
    Forward,
}

/// Named upstream chat service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamTarget {
    pub id: String,
    pub base_url: String,
    pub enabled: bool,
    #[serde(default)]
    pub auth_mode: AuthMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_auth_header: Option<String>,
}

impl UpstreamTarget {
    pub fn new(id: String, base_url: &str, auth_mode: AuthMode) -> Self {
        Self {
            id,
            base_url: normalize_base_url(base_url),
            enabled: true,
            auth_mode,
            custom_auth_header: None,
        }
    }

    /// Absolute URL for `path` (which starts with `/`) on this target.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Value to send as `Authorization` upstream, if any.
    pub fn outbound_authorization(&self, caller: Option<&str>) -> Option<String> {
        match self.auth_mode {
            AuthMode::Passthrough => caller
                .filter(|h| bearer_token(h).is_some())
                .map(str::to_string),
            AuthMode::Strip => None,
            AuthMode::Custom => self
                .custom_auth_header
                .as_deref()
                .filter(|h| !h.is_empty())
                .map(str::to_string),
            AuthMode::Forward => caller.filter(|h| !h.is_empty()).map(str::to_string),
        }
    }

    /// Apply an admin patch in place.
    pub fn apply(&mut self, patch: UpstreamPatch) {
        if let Some(base_url) = patch.base_url {
            self.base_url = normalize_base_url(&base_url);
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(auth_mode) = patch.auth_mode {
            self.auth_mode = auth_mode;
        }
        if let Some(header) = patch.custom_auth_header {
            self.custom_auth_header = Some(header);
        }
    }
}

/// Partial update for an upstream target.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamPatch {
    pub base_url: Option<String>,
    pub enabled: Option<bool>,
    pub auth_mode: Option<AuthMode>,
    pub custom_auth_header: Option<String>,
}

pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}
