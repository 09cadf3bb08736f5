//! Shared helpers: time, retries and label files.

pub mod clock;
pub mod date;
pub mod labels;
pub mod retry;
