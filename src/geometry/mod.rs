//! Query regions and the persisted area selection.

mod region;
mod selection;

pub use region::{Bounds, Region};
pub use selection::{SelectionFile, StoredCenter, StoredSelection};
