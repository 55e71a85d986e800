//! Utility types and functions

pub mod clock;
pub mod logger;
