//! Tile records, coordinate packing, and tile building.
//!
//! A [`Tile`] is what the cache stores for one visited (z, x, y): the
//! tolerance-filtered feature subset, its stats, and the subdivision
//! lifecycle state. Building a tile never fails; empty feature sets produce
//! empty tiles.

use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::feature::{Feature, FeatureId, FeatureKind, Tags, VtGeometry, VtLine};
use crate::Options;

/// Tile coordinates: zoom, column, row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Packed cache key. Injective for z in [0, 24] and x, y in [0, 2^z).
    pub fn id(&self) -> u64 {
        tile_id(self.z, self.x, self.y)
    }

    /// Whether this coordinate lies on the ancestor path of `other`
    /// (or is `other` itself).
    pub fn is_ancestor_of(&self, other: &TileCoord) -> bool {
        if self.z > other.z {
            return false;
        }
        let shift = other.z - self.z;
        self.x == other.x >> shift && self.y == other.y >> shift
    }
}

/// Pack (z, x, y) into the cache key `((2^z * y + x) * 32) + z`.
pub fn tile_id(z: u8, x: u32, y: u32) -> u64 {
    (((1u64 << z) * y as u64 + x as u64) * 32) + z as u64
}

/// Subdivision lifecycle of a cached tile.
///
/// A leaf still owns the pre-clip feature array that produced it, so
/// drill-down can resume subdivision from here. Once children have been
/// produced the source is dropped and drill-down cannot recompute past this
/// tile; the missing source is the signal, not an optimization.
#[derive(Debug, Clone)]
pub enum TileState {
    Leaf { source: Vec<Arc<Feature>> },
    Subdivided,
}

impl TileState {
    /// The retained pre-clip features, if this tile is still a leaf.
    pub fn source(&self) -> Option<&[Arc<Feature>]> {
        match self {
            Self::Leaf { source } => Some(source),
            Self::Subdivided => None,
        }
    }
}

/// Output feature kind, numbered the way vector tiles expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFeatureKind {
    Point = 1,
    Line = 2,
    Polygon = 3,
}

impl Serialize for TileFeatureKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Geometry retained in a built tile, still in normalized coordinates.
///
/// Ring nesting is flattened: a multipolygon's rings appear as one sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum TileGeometry {
    Points(Vec<[f64; 2]>),
    Rings(Vec<Vec<[f64; 2]>>),
}

/// A feature retained in a built tile.
#[derive(Debug, Clone)]
pub struct TileFeature {
    pub id: Option<FeatureId>,
    pub kind: TileFeatureKind,
    pub geometry: TileGeometry,
    pub tags: Option<Arc<Tags>>,
}

/// A cached tile.
#[derive(Debug, Clone)]
pub struct Tile {
    pub z: u8,
    pub x: u32,
    pub y: u32,
    pub features: Vec<TileFeature>,
    /// Input feature count, before any filtering.
    pub num_features: usize,
    /// Points offered to this tile across all input features.
    pub num_points: usize,
    /// Points retained after tolerance filtering.
    pub num_simplified: usize,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub state: TileState,
}

/// Build a tile from a feature subset.
///
/// At `max_zoom` the tolerance drops to zero so full detail survives;
/// elsewhere points are kept when their simplification weight exceeds the
/// squared per-zoom tolerance, and whole lines/rings are skipped when their
/// length/area falls under it.
pub fn create_tile(features: &[Arc<Feature>], z: u8, x: u32, y: u32, options: &Options) -> Tile {
    let tolerance = if z == options.max_zoom {
        0.0
    } else {
        options.tolerance / ((1u32 << z) as f64 * options.extent as f64)
    };

    let mut tile = Tile {
        z,
        x,
        y,
        features: Vec::new(),
        num_features: features.len(),
        num_points: 0,
        num_simplified: 0,
        min_x: 2.0,
        min_y: 1.0,
        max_x: -1.0,
        max_y: 0.0,
        state: TileState::Subdivided,
    };

    for feature in features {
        add_feature(&mut tile, feature, tolerance, options);
    }

    tile
}

fn add_feature(tile: &mut Tile, feature: &Feature, tolerance: f64, options: &Options) {
    tile.min_x = tile.min_x.min(feature.min_x);
    tile.min_y = tile.min_y.min(feature.min_y);
    tile.max_x = tile.max_x.max(feature.max_x);
    tile.max_y = tile.max_y.max(feature.max_y);

    let geometry = match (&feature.kind, &feature.geometry) {
        (_, VtGeometry::Points(points)) => {
            let mut kept = Vec::with_capacity(points.len());
            for p in points {
                kept.push([p.x, p.y]);
                tile.num_points += 1;
                tile.num_simplified += 1;
            }
            if kept.is_empty() {
                return;
            }
            TileGeometry::Points(kept)
        }
        (kind, VtGeometry::Lines(lines)) => {
            let is_polygon = *kind == FeatureKind::Polygon;
            let mut rings = Vec::new();
            for (i, line) in lines.iter().enumerate() {
                add_line(&mut rings, line, tile, tolerance, is_polygon, i == 0);
            }
            if rings.is_empty() {
                return;
            }
            TileGeometry::Rings(rings)
        }
        (_, VtGeometry::Polygons(polygons)) => {
            let mut rings = Vec::new();
            for polygon in polygons {
                for (i, ring) in polygon.iter().enumerate() {
                    add_line(&mut rings, ring, tile, tolerance, true, i == 0);
                }
            }
            if rings.is_empty() {
                return;
            }
            TileGeometry::Rings(rings)
        }
    };

    let kind = match feature.kind {
        FeatureKind::Polygon | FeatureKind::MultiPolygon => TileFeatureKind::Polygon,
        FeatureKind::LineString | FeatureKind::MultiLineString => TileFeatureKind::Line,
        FeatureKind::Point | FeatureKind::MultiPoint => TileFeatureKind::Point,
    };

    let tags = if feature.kind == FeatureKind::LineString && options.line_metrics {
        // expose how much of the original line this slice covers
        line_metrics_tags(feature)
    } else {
        feature.tags.clone()
    };

    tile.features.push(TileFeature {
        id: feature.id.clone(),
        kind,
        geometry,
        tags,
    });
}

fn line_metrics_tags(feature: &Feature) -> Option<Arc<Tags>> {
    let VtGeometry::Lines(lines) = &feature.geometry else {
        return feature.tags.clone();
    };
    let line = lines.first()?;

    let mut tags = feature.tags.as_deref().cloned().unwrap_or_default();
    if line.size > 0.0 {
        tags.insert(
            "mapbox_clip_start".to_string(),
            serde_json::json!(line.start / line.size),
        );
        tags.insert(
            "mapbox_clip_end".to_string(),
            serde_json::json!(line.end / line.size),
        );
    }
    Some(Arc::new(tags))
}

fn add_line(
    result: &mut Vec<Vec<[f64; 2]>>,
    line: &VtLine,
    tile: &mut Tile,
    tolerance: f64,
    is_polygon: bool,
    is_outer: bool,
) {
    let sq_tolerance = tolerance * tolerance;

    // drop whole lines/rings too small to matter at this zoom
    let size_floor = if is_polygon { sq_tolerance } else { tolerance };
    if tolerance > 0.0 && line.size < size_floor {
        tile.num_points += line.points.len();
        return;
    }

    let mut ring = Vec::new();
    for p in &line.points {
        if tolerance == 0.0 || p.w > sq_tolerance {
            tile.num_simplified += 1;
            ring.push([p.x, p.y]);
        }
        tile.num_points += 1;
    }

    if is_polygon {
        rewind(&mut ring, is_outer);
    }

    result.push(ring);
}

/// Enforce ring winding: outer rings clockwise, holes counter-clockwise
/// (in a y-down coordinate system).
fn rewind(ring: &mut [[f64; 2]], clockwise: bool) {
    let mut area = 0.0;
    let len = ring.len();
    if len < 2 {
        return;
    }
    let mut j = len - 1;
    for i in 0..len {
        area += (ring[i][0] - ring[j][0]) * (ring[i][1] + ring[j][1]);
        j = i;
    }
    if (area > 0.0) == clockwise {
        ring.reverse();
    }
}
