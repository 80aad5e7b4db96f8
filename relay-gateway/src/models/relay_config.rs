//! Global relay configuration and its typed patch.

use serde::{Deserialize, Serialize};

/// Settings read on every relay call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    pub default_upstream: String,
    pub require_auth: bool,
    pub allowed_models: Vec<String>,
}

impl RelayConfig {
    pub fn is_model_allowed(&self, model: &str) -> bool {
        self.allowed_models.iter().any(|m| m == model)
    }

    /// Model used when the caller names none.
    pub fn fallback_model(&self) -> Option<&str> {
        self.allowed_models.first().map(String::as_str)
    }

    /// Apply a patch. Blank upstream names and empty model lists are ignored.
    pub fn apply(&mut self, patch: RelayConfigPatch) {
        if let Some(upstream) = patch.default_upstream {
            if !upstream.trim().is_empty() {
                self.default_upstream = upstream;
            }
        }
        if let Some(require_auth) = patch.require_auth {
            self.require_auth = require_auth;
        }
        if let Some(models) = patch.allowed_models {
            if !models.is_empty() {
                self.allowed_models = models;
            }
        }
    }
}

/// The fields an administrator may change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfigPatch {
    pub default_upstream: Option<String>,
    pub require_auth: Option<bool>,
    pub allowed_models: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RelayConfig {
        RelayConfig {
            default_upstream: "default".into(),
            require_auth: false,
            allowed_models: vec!["gpt-4.1".into(), "gpt-4o".into()],
        }
    }

    #[test]
    fn fallback_is_first_allowed_model() {
        assert_eq!(config().fallback_model(), Some("gpt-4.1"));
    }

    #[test]
    fn patch_ignores_blank_and_empty_values() {
        let mut c = config();
        c.apply(RelayConfigPatch {
            default_upstream: Some(String::new()),
            require_auth: Some(true),
            allowed_models: Some(vec![]),
        });
        assert_eq!(c.default_upstream, "default");
        assert!(c.require_auth);
        assert_eq!(c.allowed_models.len(), 2);
    }

    #[test]
    fn patch_replaces_model_list() {
        let mut c = config();
        let patch: RelayConfigPatch =
            serde_json::from_str(r#"{"allowedModels":["claude"],"defaultUpstream":"b"}"#).unwrap();
        c.apply(patch);
        assert!(c.is_model_allowed("claude"));
        assert!(!c.is_model_allowed("gpt-4.1"));
        assert_eq!(c.default_upstream, "b");
    }
}
