//! HTTP implementation of the sync engine's remote gateway.
//!
//! Posts queued items to `POST {api_base_url}/api/vendedor/sync/{tipo}` with
//! bearer auth and an `Idempotency-Key` header, and classifies failures for
//! the orchestrator's retry policy.

pub mod config;
pub mod error;
pub mod http_gateway;

pub use config::CloudConfig;
pub use error::{CloudError, CloudResult};
pub use http_gateway::HttpGateway;
