//! gatehouse-core: shared infrastructure for the gatehouse engine.
pub mod error;
pub mod observability;
pub mod retry;

pub use error::{StoreError, Transient};
pub use retry::{RetryConfig, with_retries};

pub use tracing;
