//! Earth Engine REST API: imagery catalog queries and export jobs.

mod client;
pub mod expression;

pub use client::EarthEngineClient;
