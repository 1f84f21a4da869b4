//! Quality assurance for machine-translated visual novel scripts.
//!
//! Script pairs are decoded, their dialogue extracted and matched line by line,
//! and every pair is checked for common machine-translation defects.

pub mod config;
pub mod error;
pub mod model;
pub mod parsers;
pub mod protocol;
pub mod services;
pub mod text;
