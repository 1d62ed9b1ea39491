//! Scheduled batch jobs.
//!
//! Each job works on the loaded [`Store`](crate::store::Store) and leaves
//! saving to the caller.

pub mod import;
pub mod tokens;
pub mod trials;
pub mod weekly;

pub use import::{import_actual_hours, ImportStats};
pub use tokens::refresh_provider_tokens;
pub use trials::expire_trials;
pub use weekly::send_weekly_progress_reports;
