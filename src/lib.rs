//! # mcm-rest - client for the McM document service
//!
//! A blocking Rust client for the McM REST API. It exposes a small, uniform
//! vocabulary (get, search, put, update, approve, clone, delete) over the
//! service's collections, which are addressed only by name: `requests`,
//! `campaigns`, `chained_requests`, `flows` and so on.
//!
//! ## Features
//!
//! - Three authentication transports selected once at construction:
//!   - SSO session cookie read from a Netscape cookie jar, created on demand
//!     by `cern-get-sso-cookie`
//!   - X.509 proxy (`X509_USER_PROXY`) as client certificate and key
//!   - anonymous plain HTTP
//! - Development, integration and production hosts
//! - Payloads are plain `serde_json::Value`s; any `Serialize` type can be sent
//! - Undecodable responses are logged with `tracing` and reported as "no result"
//!
//! ## Basic Usage
//!
//! ```no_run
//! use mcm_rest::{AuthMode, Config, Environment, McmClient, Page};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new(Environment::Production, AuthMode::Cookie);
//!     let mcm = McmClient::with_config(config)?;
//!
//!     // One object by prepid
//!     if let Some(request) = mcm.get("requests", Some("HIG-Run3Summer22-00001"))? {
//!         println!("status: {}", request["status"]);
//!     }
//!
//!     // First page of a search
//!     let campaigns = mcm.search("campaigns", "prepid=Run3*", Page::Index(0))?;
//!     println!("{:?}", campaigns);
//!     Ok(())
//! }
//! ```
//!
//! ## Writing
//!
//! ```no_run
//! use mcm_rest::{json, McmClient};
//!
//! let mcm = McmClient::new()?;
//! if let Some(mut request) = mcm.get("requests", Some("HIG-Run3Summer22-00001"))? {
//!     request["priority"] = json!(110000);
//!     let reply = mcm.update("requests", &request)?;
//!     println!("{:?}", reply);
//! }
//! # Ok::<(), mcm_rest::McmError>(())
//! ```

pub mod client;
pub mod cookie;
pub mod error;
pub mod response;
pub mod rest;
pub mod transport;

// Re-export main types for convenience
pub use client::{AuthMode, Config, Environment};
pub use error::{McmError, Result};
pub use rest::{McmClient, Page};
pub use transport::{
    connect, AnonymousTransport, CertificateTransport, CookieTransport, Transport, Verb,
};

// Re-export serde_json for convenience
pub use serde_json::json;
