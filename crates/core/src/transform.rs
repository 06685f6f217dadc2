//! Coordinate transformation.
//!
//! Converts a cached tile's normalized [0,1] world coordinates into integer
//! extent-space coordinates relative to the tile's own origin. Runs at read
//! time and produces a fresh output value; cached tiles keep their normalized
//! coordinates so drill-down and re-reads stay exact.

use serde::Serialize;
use std::sync::Arc;

use crate::feature::{FeatureId, Tags};
use crate::tile::{Tile, TileFeatureKind, TileGeometry};

/// Geometry scaled to tile-local integer coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TransformedGeometry {
    Points(Vec<[i32; 2]>),
    Rings(Vec<Vec<[i32; 2]>>),
}

/// A feature of a transformed tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformedFeature {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<FeatureId>,
    #[serde(rename = "type")]
    pub kind: TileFeatureKind,
    pub geometry: TransformedGeometry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Arc<Tags>>,
}

/// An externally-scaled tile, ready to hand out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedTile {
    pub z: u8,
    pub x: u32,
    pub y: u32,
    pub features: Vec<TransformedFeature>,
    pub num_features: usize,
    pub num_points: usize,
    pub num_simplified: usize,
}

/// Scale a cached tile to extent space.
pub fn transform_tile(tile: &Tile, extent: u32) -> TransformedTile {
    let z2 = (1u32 << tile.z) as f64;
    let tx = tile.x as f64;
    let ty = tile.y as f64;

    let features = tile
        .features
        .iter()
        .map(|feature| {
            let geometry = match &feature.geometry {
                TileGeometry::Points(points) => TransformedGeometry::Points(
                    points.iter().map(|p| transform_point(p, extent, z2, tx, ty)).collect(),
                ),
                TileGeometry::Rings(rings) => TransformedGeometry::Rings(
                    rings
                        .iter()
                        .map(|ring| {
                            ring.iter().map(|p| transform_point(p, extent, z2, tx, ty)).collect()
                        })
                        .collect(),
                ),
            };
            TransformedFeature {
                id: feature.id.clone(),
                kind: feature.kind,
                geometry,
                tags: feature.tags.clone(),
            }
        })
        .collect();

    TransformedTile {
        z: tile.z,
        x: tile.x,
        y: tile.y,
        features,
        num_features: tile.num_features,
        num_points: tile.num_points,
        num_simplified: tile.num_simplified,
    }
}

#[inline]
fn transform_point(p: &[f64; 2], extent: u32, z2: f64, tx: f64, ty: f64) -> [i32; 2] {
    [
        (extent as f64 * (p[0] * z2 - tx)).round() as i32,
        (extent as f64 * (p[1] * z2 - ty)).round() as i32,
    ]
}
