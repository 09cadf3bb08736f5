//! Earth Engine expression graphs.
//!
//! Server-side images are described as a tree of function invocations that
//! the REST API evaluates lazily. Only the handful of functions the pipeline
//! needs are exposed here.

use crate::constants::imagery::CLOUD_PROPERTY;
use crate::geometry::{Bounds, Region};
use crate::utils::date::TimeWindow;
use serde_json::{Map, Value, json};

/// A node in an expression graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr(Value);

impl Expr {
    /// Literal value.
    pub fn constant(value: impl Into<Value>) -> Self {
        Self(json!({ "constantValue": value.into() }))
    }

    /// Call `function` with named arguments.
    pub fn call<'a>(function: &str, arguments: impl IntoIterator<Item = (&'a str, Self)>) -> Self {
        let arguments: Map<String, Value> = arguments
            .into_iter()
            .map(|(name, arg)| (name.to_string(), arg.0))
            .collect();

        Self(json!({
            "functionInvocationValue": {
                "functionName": function,
                "arguments": arguments,
            }
        }))
    }

    /// Wrap an already serialized node.
    pub const fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Serialized node.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Complete expression with this node as its result.
    pub fn into_graph(self) -> Value {
        json!({
            "result": "0",
            "values": { "0": self.0 },
        })
    }
}

/// Image collection by identifier.
pub fn load_collection(id: &str) -> Expr {
    Expr::call("ImageCollection.load", [("id", Expr::constant(id))])
}

fn date(day: chrono::NaiveDate) -> Expr {
    Expr::call("Date", [("value", Expr::constant(day.to_string()))])
}

fn filter(collection: Expr, condition: Expr) -> Expr {
    Expr::call(
        "Collection.filter",
        [("collection", collection), ("filter", condition)],
    )
}

/// Circle around the region center.
pub fn region_geometry(region: &Region) -> Expr {
    let point = Expr::call(
        "GeometryConstructors.Point",
        [(
            "coordinates",
            Expr::constant(json!([region.longitude, region.latitude])),
        )],
    );
    Expr::call(
        "Geometry.buffer",
        [
            ("geometry", point),
            ("distance", Expr::constant(region.radius_m)),
        ],
    )
}

/// Planar rectangle covering `bounds`.
pub fn rectangle(bounds: Bounds) -> Expr {
    Expr::call(
        "GeometryConstructors.Rectangle",
        [
            ("coordinates", Expr::constant(json!(bounds.to_array()))),
            ("geodesic", Expr::constant(false)),
        ],
    )
}

/// Collection filtered by date, region and cloud cover.
pub fn filtered_collection(
    collection_id: &str,
    window: TimeWindow,
    region: &Region,
    cloud_max: f64,
) -> Expr {
    let by_date = Expr::call(
        "Filter.dateRangeContains",
        [
            (
                "leftValue",
                Expr::call(
                    "DateRange",
                    [("start", date(window.start)), ("end", date(window.end))],
                ),
            ),
            ("rightField", Expr::constant("system:time_start")),
        ],
    );
    let by_region = Expr::call(
        "Filter.intersects",
        [
            ("leftField", Expr::constant(".all")),
            ("rightValue", region_geometry(region)),
        ],
    );
    let by_cloud = Expr::call(
        "Filter.lessThan",
        [
            ("leftField", Expr::constant(CLOUD_PROPERTY)),
            ("rightValue", Expr::constant(cloud_max)),
        ],
    );

    let collection = load_collection(collection_id);
    filter(filter(filter(collection, by_date), by_region), by_cloud)
}

/// Number of elements in a collection.
pub fn size(collection: Expr) -> Expr {
    Expr::call("Collection.size", [("collection", collection)])
}

/// Per-pixel median of a collection.
pub fn median(collection: Expr) -> Expr {
    Expr::call("reduce.median", [("collection", collection)])
}

/// Bands selected by name, in order.
pub fn select_bands(image: Expr, bands: &[String]) -> Expr {
    Expr::call(
        "Image.select",
        [
            ("input", image),
            ("bandSelectors", Expr::constant(json!(bands))),
        ],
    )
}

/// Image clipped to `bounds` and resampled to `scale_m`.
pub fn clip_to_bounds(image: Expr, bounds: Bounds, scale_m: f64) -> Expr {
    Expr::call(
        "Image.clipToBoundsAndScale",
        [
            ("input", image),
            ("geometry", rectangle(bounds)),
            ("scale", Expr::constant(scale_m)),
        ],
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_constant_node() {
        assert_eq!(
            Expr::constant(40.0).into_value(),
            json!({"constantValue": 40.0})
        );
    }

    #[test]
    fn test_graph_wraps_result_node() {
        let graph = load_collection("COPERNICUS/S2_HARMONIZED").into_graph();
        assert_eq!(graph["result"], "0");
        let node = &graph["values"]["0"]["functionInvocationValue"];
        assert_eq!(node["functionName"], "ImageCollection.load");
        assert_eq!(
            node["arguments"]["id"]["constantValue"],
            "COPERNICUS/S2_HARMONIZED"
        );
    }

    #[test]
    fn test_filtered_collection_applies_cloud_filter_last() {
        let region = Region::new(-14.235, -51.9253, 500.0, 1000.0).unwrap();
        let window = TimeWindow {
            start: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        };

        let expr = filtered_collection("COPERNICUS/S2_HARMONIZED", window, &region, 40.0)
            .into_value();
        let outer = &expr["functionInvocationValue"];
        assert_eq!(outer["functionName"], "Collection.filter");

        let condition = &outer["arguments"]["filter"]["functionInvocationValue"];
        assert_eq!(condition["functionName"], "Filter.lessThan");
        assert_eq!(
            condition["arguments"]["leftField"]["constantValue"],
            "CLOUDY_PIXEL_PERCENTAGE"
        );
        assert_eq!(condition["arguments"]["rightValue"]["constantValue"], 40.0);

        let text = expr.to_string();
        assert!(text.contains("\"2024-05-01\""));
        assert!(text.contains("Filter.intersects"));
    }

    #[test]
    fn test_band_selection_keeps_order() {
        let bands = vec!["B4".to_string(), "B3".to_string(), "B2".to_string()];
        let expr = select_bands(Expr::constant("img"), &bands).into_value();
        assert_eq!(
            expr["functionInvocationValue"]["arguments"]["bandSelectors"]["constantValue"],
            json!(["B4", "B3", "B2"])
        );
    }

    #[test]
    fn test_point_uses_lon_lat_order() {
        let region = Region::new(10.0, 20.0, 100.0, 1000.0).unwrap();
        let expr = region_geometry(&region).into_value();
        let point = &expr["functionInvocationValue"]["arguments"]["geometry"];
        assert_eq!(
            point["functionInvocationValue"]["arguments"]["coordinates"]["constantValue"],
            json!([20.0, 10.0])
        );
    }
}
