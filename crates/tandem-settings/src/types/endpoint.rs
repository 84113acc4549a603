//! Client-side endpoint settings.

use serde::{Deserialize, Serialize};

/// Seed values for an endpoint builder.
///
/// Every field is optional. Unset fields fall through to the builder's own
/// resolution (connection context, dispatch table default path).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointSettings {
    /// Full URL. Wins over every other field when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// `ws` or `wss`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Host name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Request path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}
