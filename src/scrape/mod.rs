//! Page scraping helpers shared by the plugins.
//!
//! - `extract.rs`: fallback chains (css selector, regex, substring)
//! - `text.rs`: tag stripping and whitespace/entity normalisation

pub mod extract;
pub mod text;

pub use extract::{Extracted, Strategy, extract, extract_all, extract_value};
