//! service-core: Shared infrastructure for the facturacion workspace.
pub mod config;
pub mod error;
pub mod observability;
pub mod utils;

pub use async_trait;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use validator;
