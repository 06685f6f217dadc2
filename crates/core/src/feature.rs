//! Internal feature representation.
//!
//! Features hold projected geometry in normalized [0,1] tile space. Every
//! point carries a simplification weight (its squared deviation from the
//! enclosing segment, precomputed by [`crate::simplify`]) so that tile
//! building can filter points per zoom without re-running simplification.
//!
//! The tiling core never mutates a feature after construction; it only
//! partitions arrays of them. Features are therefore shared between a tile's
//! retained source and its in-progress children via `Arc`.

use std::sync::Arc;

use serde::Serialize;

/// Feature properties, carried through clipping and into output tiles.
pub type Tags = serde_json::Map<String, serde_json::Value>;

/// A projected point with a simplification weight.
///
/// `w` is 0 for points that never deviate from their enclosing segment,
/// 1 for ring/line endpoints, and the maximum squared segment distance
/// otherwise. Tile building retains a point when `w` exceeds the squared
/// tolerance for the tile's zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VtPoint {
    pub x: f64,
    pub y: f64,
    pub w: f64,
}

impl VtPoint {
    pub fn new(x: f64, y: f64, w: f64) -> Self {
        Self { x, y, w }
    }
}

/// A polyline or polygon ring.
///
/// `size` is the total length (lines) or absolute area (rings) in projected
/// units; `start`/`end` are distances along the original line, updated when
/// clipping slices it (used for line metrics).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VtLine {
    pub points: Vec<VtPoint>,
    pub size: f64,
    pub start: f64,
    pub end: f64,
}

impl VtLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty slice that inherits the metrics of the line it was cut from.
    pub fn slice_of(line: &VtLine) -> Self {
        Self {
            points: Vec::new(),
            size: line.size,
            start: line.start,
            end: line.end,
        }
    }
}

/// Geometry storage. The `FeatureKind` on the owning feature disambiguates
/// single vs multi variants sharing a representation.
#[derive(Debug, Clone, PartialEq)]
pub enum VtGeometry {
    /// Point and MultiPoint.
    Points(Vec<VtPoint>),
    /// LineString (exactly one line), MultiLineString, and Polygon rings
    /// (outer ring first).
    Lines(Vec<VtLine>),
    /// MultiPolygon: one ring list per polygon.
    Polygons(Vec<Vec<VtLine>>),
}

/// GeoJSON-level geometry kind of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

/// A feature identifier: either taken from the input, promoted from a
/// property, or generated from the feature's index.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureId {
    String(String),
    Number(serde_json::Number),
}

impl From<u64> for FeatureId {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl From<&geojson::feature::Id> for FeatureId {
    fn from(id: &geojson::feature::Id) -> Self {
        match id {
            geojson::feature::Id::String(s) => Self::String(s.clone()),
            geojson::feature::Id::Number(n) => Self::Number(n.clone()),
        }
    }
}

impl FeatureId {
    /// Promote a property value to an id. Only scalar JSON values qualify.
    pub fn from_property(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            serde_json::Value::Number(n) => Some(Self::Number(n.clone())),
            _ => None,
        }
    }
}

/// A preprocessed feature in normalized tile space.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<FeatureId>,
    pub kind: FeatureKind,
    pub geometry: VtGeometry,
    pub tags: Option<Arc<Tags>>,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Build a feature and compute its bounding box.
///
/// For polygons only the outer ring contributes to the box, since it
/// contains all inner rings.
pub fn create_feature(
    id: Option<FeatureId>,
    kind: FeatureKind,
    geometry: VtGeometry,
    tags: Option<Arc<Tags>>,
) -> Feature {
    let mut feature = Feature {
        id,
        kind,
        geometry,
        tags,
        min_x: f64::INFINITY,
        min_y: f64::INFINITY,
        max_x: f64::NEG_INFINITY,
        max_y: f64::NEG_INFINITY,
    };
    calc_bbox(&mut feature);
    feature
}

fn calc_bbox(feature: &mut Feature) {
    let (mut min_x, mut min_y) = (feature.min_x, feature.min_y);
    let (mut max_x, mut max_y) = (feature.max_x, feature.max_y);

    let mut extend = |points: &[VtPoint]| {
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
    };

    match (&feature.kind, &feature.geometry) {
        (_, VtGeometry::Points(points)) => extend(points),
        (FeatureKind::Polygon, VtGeometry::Lines(rings)) => {
            if let Some(outer) = rings.first() {
                extend(&outer.points);
            }
        }
        (_, VtGeometry::Lines(lines)) => {
            for line in lines {
                extend(&line.points);
            }
        }
        (_, VtGeometry::Polygons(polygons)) => {
            for polygon in polygons {
                if let Some(outer) = polygon.first() {
                    extend(&outer.points);
                }
            }
        }
    }

    feature.min_x = min_x;
    feature.min_y = min_y;
    feature.max_x = max_x;
    feature.max_y = max_y;
}
