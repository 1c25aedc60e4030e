//! HTTP client for the vault query and object APIs.
//!
//! One [`VaultClient`] per remote system (CTMS or CDMS), bound to a session
//! token for the lifetime of a run.  Pagination follows the continuation
//! URL returned by the previous page; an `INVALID_SESSION_ID` signal aborts
//! immediately and is never retried.

pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod session;

pub use client::{QueryResponse, VaultClient};
pub use config::{ConfigError, VaultConfig};
pub use error::{VaultError, VaultResult};
pub use retry::RetryPolicy;
pub use session::SessionStore;
