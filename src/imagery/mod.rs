//! Cloud-filtered composite imagery for a region.
//!
//! The catalog itself is remote; this module only describes what is asked of
//! it ([`ImageryCatalog`]) and resolves a region and time window into a
//! median composite restricted to named bands ([`ImageResolver`]).

use crate::error::{Error, Result};
use crate::geometry::Region;
use crate::utils::date::TimeWindow;
use tracing::{debug, info};

/// Opaque reference to a server-side computed image or collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHandle(serde_json::Value);

impl ImageHandle {
    /// Wrap a serialized server-side expression.
    pub const fn new(expression: serde_json::Value) -> Self {
        Self(expression)
    }

    /// Serialized expression.
    pub const fn expression(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Filtered image collection and the number of images in it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSet {
    /// Reference to the filtered collection.
    pub handle: ImageHandle,
    /// Number of matching images.
    pub len: usize,
}

impl ImageSet {
    /// Whether no image matched.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Catalog filter for one resolution.
#[derive(Debug, Clone, Copy)]
pub struct CatalogQuery<'a> {
    /// Collection identifier.
    pub collection: &'a str,
    /// Acquisition date range.
    pub window: TimeWindow,
    /// Area the images must intersect.
    pub region: &'a Region,
    /// Images must have cloud cover strictly below this percentage.
    pub cloud_max: f64,
}

/// Remote imagery catalog capability.
#[allow(async_fn_in_trait)]
pub trait ImageryCatalog {
    /// Find images matching `query`.
    async fn query(&self, query: &CatalogQuery<'_>) -> Result<ImageSet>;

    /// Per-pixel median of a collection.
    fn median(&self, set: &ImageSet) -> Result<ImageHandle>;

    /// Keep only `bands`, in the given order.
    fn select_bands(&self, image: &ImageHandle, bands: &[String]) -> Result<ImageHandle>;
}

/// Median composite ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeImage {
    /// Server-side image reference.
    pub handle: ImageHandle,
    /// Band names in channel order.
    pub bands: Vec<String>,
    /// Number of source images in the composite.
    pub source_count: usize,
}

/// Resolves regions into band-selected median composites.
#[derive(Debug)]
pub struct ImageResolver<'a, C> {
    catalog: &'a C,
    collection: String,
    bands: Vec<String>,
}

impl<'a, C: ImageryCatalog> ImageResolver<'a, C> {
    /// Resolver over `collection`, keeping `bands` in order.
    pub fn new(catalog: &'a C, collection: impl Into<String>, bands: Vec<String>) -> Self {
        Self {
            catalog,
            collection: collection.into(),
            bands,
        }
    }

    /// Median composite of images intersecting `region` within `window`
    /// whose cloud cover is below `cloud_threshold` percent.
    pub async fn resolve(
        &self,
        region: &Region,
        window: TimeWindow,
        cloud_threshold: f64,
    ) -> Result<CompositeImage> {
        let query = CatalogQuery {
            collection: &self.collection,
            window,
            region,
            cloud_max: cloud_threshold,
        };

        let set = self.catalog.query(&query).await?;
        debug!(
            collection = %self.collection,
            matches = set.len,
            "Catalog query finished"
        );

        if set.is_empty() {
            return Err(Error::NoImagery {
                start: window.start,
                end: window.end,
                cloud_threshold,
            });
        }

        let median = self.catalog.median(&set)?;
        let handle = self.catalog.select_bands(&median, &self.bands)?;

        info!(
            "Composite of {} image(s) from {window}, bands {}",
            set.len,
            self.bands.join(", ")
        );

        Ok(CompositeImage {
            handle,
            bands: self.bands.clone(),
            source_count: set.len,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::cell::RefCell;

    /// Catalog holding images as (date, cloud %) pairs.
    struct FakeCatalog {
        images: Vec<(NaiveDate, f64)>,
        selected: RefCell<Vec<String>>,
    }

    impl FakeCatalog {
        fn new(images: Vec<(NaiveDate, f64)>) -> Self {
            Self {
                images,
                selected: RefCell::new(Vec::new()),
            }
        }
    }

    impl ImageryCatalog for FakeCatalog {
        async fn query(&self, query: &CatalogQuery<'_>) -> Result<ImageSet> {
            let len = self
                .images
                .iter()
                .filter(|(date, cloud)| {
                    *date >= query.window.start
                        && *date <= query.window.end
                        && *cloud < query.cloud_max
                })
                .count();
            Ok(ImageSet {
                handle: ImageHandle::new(json!({"collection": query.collection})),
                len,
            })
        }

        fn median(&self, set: &ImageSet) -> Result<ImageHandle> {
            Ok(ImageHandle::new(json!({"median": set.handle.expression()})))
        }

        fn select_bands(&self, image: &ImageHandle, bands: &[String]) -> Result<ImageHandle> {
            self.selected.replace(bands.to_vec());
            Ok(ImageHandle::new(
                json!({"select": image.expression(), "bands": bands}),
            ))
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn region() -> Region {
        Region::new(-14.235, -51.9253, 500.0, 1000.0).unwrap()
    }

    fn bands() -> Vec<String> {
        vec!["B4".to_string(), "B3".to_string(), "B2".to_string()]
    }

    #[tokio::test]
    async fn test_resolves_when_all_images_below_threshold() {
        let catalog = FakeCatalog::new(vec![(date(5), 10.0), (date(10), 25.0), (date(20), 38.0)]);
        let resolver = ImageResolver::new(&catalog, "COPERNICUS/S2_HARMONIZED", bands());
        let window = TimeWindow::around(date(15), 30);

        let composite = resolver.resolve(&region(), window, 40.0).await.unwrap();

        assert_eq!(composite.source_count, 3);
        assert_eq!(composite.bands, bands());
        assert_eq!(*catalog.selected.borrow(), bands());
    }

    #[tokio::test]
    async fn test_threshold_is_exclusive() {
        let catalog = FakeCatalog::new(vec![(date(5), 40.0), (date(10), 55.0)]);
        let resolver = ImageResolver::new(&catalog, "COPERNICUS/S2_HARMONIZED", bands());
        let window = TimeWindow::around(date(15), 30);

        let err = resolver.resolve(&region(), window, 40.0).await.unwrap_err();

        assert!(matches!(err, Error::NoImagery { .. }));
        assert!(catalog.selected.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_images_outside_window_are_ignored() {
        let catalog = FakeCatalog::new(vec![(date(1), 5.0)]);
        let resolver = ImageResolver::new(&catalog, "COPERNICUS/S2_HARMONIZED", bands());
        let window = TimeWindow {
            start: date(10),
            end: date(20),
        };

        let err = resolver.resolve(&region(), window, 40.0).await.unwrap_err();
        assert!(err.to_string().contains("2024-06-10 to 2024-06-20"));
    }
}
