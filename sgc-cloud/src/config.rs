//! HTTP gateway configuration.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Base URL of the SGC backend (e.g., "https://api.example.com").
    pub api_base_url: String,

    /// Whole-request timeout (seconds). The only per-call timeout.
    pub request_timeout_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}
