//! Site-credential registry and the cookie sessions built from it.

pub mod registry;
pub mod session;

pub use registry::SiteRegistry;
pub use session::{SiteSession, retry_policy};
