//! Admin endpoints of the mod server
//!
//! All requests carry the configured secret as a `secret` query parameter.

use crate::server::ServerClient;
use crate::{Error, Result};
use serde::Deserialize;

/// What the server allows this client to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatus {
    #[serde(default, alias = "IsEnabled")]
    pub is_enabled: bool,
    #[serde(default, alias = "AllowPrivilegedAction")]
    pub allow_privileged_action: bool,
}

impl AdminStatus {
    /// Parse either the JSON object form or the legacy `true`/`false` body.
    ///
    /// A legacy `true` grants both admin access and privileged actions.
    pub fn parse(body: &str) -> Option<Self> {
        if let Ok(status) = serde_json::from_str::<AdminStatus>(body) {
            return Some(status);
        }
        parse_bool_text(body).map(|enabled| AdminStatus {
            is_enabled: enabled,
            allow_privileged_action: enabled,
        })
    }
}

/// `true` / `false` in any case, optionally quoted.
pub fn parse_bool_text(body: &str) -> Option<bool> {
    let text = body.trim().trim_matches('"').trim();
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

pub struct AdminClient<'a> {
    client: &'a ServerClient,
    secret: String,
}

impl<'a> AdminClient<'a> {
    pub fn new(client: &'a ServerClient, secret: impl Into<String>) -> Self {
        Self {
            client,
            secret: secret.into(),
        }
    }

    fn url(&self, segments: &[&str]) -> String {
        format!(
            "{}?secret={}",
            self.client.endpoint(segments),
            urlencoding::encode(&self.secret)
        )
    }

    /// Check the secret; any failure means "not an admin".
    pub fn validate(&self) -> AdminStatus {
        if self.secret.is_empty() {
            return AdminStatus::default();
        }

        let body = match self.client.get_text(&self.url(&["admin", "validate"])) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Admin validation failed: {}", e);
                return AdminStatus::default();
            }
        };

        AdminStatus::parse(&body).unwrap_or_else(|| {
            tracing::warn!("Admin validation returned an unrecognized body");
            AdminStatus::default()
        })
    }

    /// Whether the server-side `resource` is running.
    pub fn is_running(&self, resource: &str) -> Result<bool> {
        self.privileged(resource, "running")
    }

    /// Ask the server to close `resource`; returns whether it did.
    pub fn close(&self, resource: &str) -> Result<bool> {
        self.privileged(resource, "close")
    }

    fn privileged(&self, resource: &str, action: &str) -> Result<bool> {
        let body = self.client.get_text(&self.url(&["admin", resource, action]))?;
        parse_bool_text(&body).ok_or_else(|| {
            Error::Other(format!(
                "Unexpected answer to {} {}: '{}'",
                resource,
                action,
                body.trim()
            ))
        })
    }
}
