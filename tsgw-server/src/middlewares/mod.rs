//! Middlewares for the HTTP server.
//!
//! All middlewares are plain async functions registered through [`axum::middleware::from_fn`].
//! See [`make_app`](crate::services::make_app) for the order in which they wrap the routes.

mod auth;
mod context;
mod handle_panic;
mod stats;
mod trace;

pub use self::auth::*;
pub use self::context::*;
pub use self::handle_panic::*;
pub use self::stats::*;
pub use self::trace::*;
