//! Request extractors shared by the endpoints and middlewares.

mod api_key;
mod caller;
mod content_type;

pub use self::api_key::*;
pub use self::caller::*;
pub use self::content_type::*;
