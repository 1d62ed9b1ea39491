//! Weekly progress report formatting.

pub mod generator;

pub use generator::*;
