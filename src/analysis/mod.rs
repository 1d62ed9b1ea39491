//! Analysis modules.
//!
//! Hour aggregation, weekly history tracking, team rollup and status
//! classification. Everything here is pure apart from the weekly history
//! update, which mutates the projects it is given.

pub mod aggregator;
pub mod history;
pub mod status;

pub use aggregator::*;
pub use history::*;
pub use status::*;
