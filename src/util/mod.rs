//! Utility functions shared by the converter.
//!
//! - **URL validation**: checks configured feed URLs before any fetch
//! - **Text sanitation**: keeps carried-over text writable as XML 1.0

mod text;
mod url_validator;

pub use text::strip_invalid_xml_chars;
pub use url_validator::{validate_url, UrlValidationError};
