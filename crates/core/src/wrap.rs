//! Date line processing.
//!
//! Geometry crossing the ±180° meridian is duplicated into shifted world
//! copies so tiles on either side of the seam render the full feature. The
//! world spans [0,1] after projection; a copy clipped from beyond either edge
//! is shifted by a whole world width and merged around the center copy.

use std::sync::Arc;

use crate::clip::{clip, Axis};
use crate::feature::{create_feature, Feature, VtGeometry, VtLine, VtPoint};
use crate::Options;

/// Wrap features across the date line.
///
/// Returns the input unchanged when nothing extends past either world edge.
pub fn wrap(features: Vec<Arc<Feature>>, options: &Options) -> Vec<Arc<Feature>> {
    let buffer = options.buffer as f64 / options.extent as f64;

    let left = clip(
        &features,
        1.0,
        -1.0 - buffer,
        buffer,
        Axis::X,
        -1.0,
        2.0,
        options,
    );
    let right = clip(
        &features,
        1.0,
        1.0 - buffer,
        2.0 + buffer,
        Axis::X,
        -1.0,
        2.0,
        options,
    );

    if left.is_none() && right.is_none() {
        return features;
    }

    let center = clip(&features, 1.0, -buffer, 1.0 + buffer, Axis::X, -1.0, 2.0, options)
        .unwrap_or_default();

    let mut merged = Vec::new();
    if let Some(left) = left {
        merged.extend(shift_features(&left, 1.0));
    }
    merged.extend(center);
    if let Some(right) = right {
        merged.extend(shift_features(&right, -1.0));
    }

    merged
}

/// Copy features with every x coordinate shifted by a world width.
fn shift_features(features: &[Arc<Feature>], offset: f64) -> Vec<Arc<Feature>> {
    features
        .iter()
        .map(|feature| {
            let geometry = match &feature.geometry {
                VtGeometry::Points(points) => VtGeometry::Points(
                    points
                        .iter()
                        .map(|p| VtPoint::new(p.x + offset, p.y, p.w))
                        .collect(),
                ),
                VtGeometry::Lines(lines) => {
                    VtGeometry::Lines(lines.iter().map(|l| shift_line(l, offset)).collect())
                }
                VtGeometry::Polygons(polygons) => VtGeometry::Polygons(
                    polygons
                        .iter()
                        .map(|rings| rings.iter().map(|r| shift_line(r, offset)).collect())
                        .collect(),
                ),
            };
            Arc::new(create_feature(
                feature.id.clone(),
                feature.kind,
                geometry,
                feature.tags.clone(),
            ))
        })
        .collect()
}

fn shift_line(line: &VtLine, offset: f64) -> VtLine {
    VtLine {
        points: line.points.iter().map(|p| VtPoint::new(p.x + offset, p.y, p.w)).collect(),
        size: line.size,
        start: line.start,
        end: line.end,
    }
}
