//! Utility modules shared by the analysis:
//! - Error types and diagnostics
//! - Source location tracking

pub mod errors;
pub mod location;

// Re-exports
pub use errors::*;
pub use location::Span;
