//! # Gerritkit
//!
//! Blocking Gerrit REST client and the [`GerritRemote`] adapter that lets the
//! [`declarative`] engine reconcile accounts, groups and projects on a real
//! server.
//!
//! ## Example
//!
//! ```ignore
//! use gerritkit::{ClientConfig, Credentials, GerritRemote};
//!
//! let config = ClientConfig::new("https://review.example.com")
//!     .credentials(Credentials::new("admin", "secret"));
//! let remote = GerritRemote::new(&config)?;
//! ```
//!
//! Reads are retried with exponential backoff on transient failures;
//! writes are sent once.

pub mod client;
pub mod error;
pub mod remote;
pub mod retry;
pub mod types;

pub use client::Client;
pub use error::{Error, Result};
pub use remote::GerritRemote;
pub use retry::{LogCallback, RetryCallback, with_retry};
pub use types::{ClientConfig, Credentials, RetryConfig};
