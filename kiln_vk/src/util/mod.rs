//! Utility functions commonly used
pub mod align;
pub mod format;

pub use align::align;
