//! Capabilities and long-running services of the gateway.
//!
//! - [`Publisher`] receives accepted batches.
//! - [`SearchProxy`] answers proxied searches.
//! - [`HttpServer`] hosts the endpoints.

mod publish;
mod search;
mod server;

pub use self::publish::*;
pub use self::search::*;
pub use self::server::*;
