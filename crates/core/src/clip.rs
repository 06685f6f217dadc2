//! Stripe clipping.
//!
//! Partitions a feature set to a half-open interval along one axis,
//! independent of the other axis. Tile subdivision calls this twice per axis
//! with ranges that overlap by the buffer fraction, so a feature segment near
//! a shared edge legitimately lands in both children ("tile bleed") and
//! adjacent tiles render without seams. The overlap is intentional and never
//! deduplicated.
//!
//! Features and the whole set are trivially accepted or rejected by bounding
//! box before any segment work happens; trivially accepted features are
//! shared, not copied.

use std::sync::Arc;

use crate::feature::{create_feature, Feature, FeatureKind, VtGeometry, VtLine, VtPoint};
use crate::Options;

/// Clipping axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    #[inline]
    fn get(self, p: &VtPoint) -> f64 {
        match self {
            Axis::X => p.x,
            Axis::Y => p.y,
        }
    }
}

/// Clip `features` to the `[k1, k2]` stripe along `axis`.
///
/// `k1`/`k2` are given in tile units and divided by `scale` (2^z) to reach
/// the normalized space features live in. `min_all`/`max_all` are the bounds
/// of the whole set along `axis`, used for the set-level trivial accept and
/// reject. Returns `None` when nothing survives.
pub fn clip(
    features: &[Arc<Feature>],
    scale: f64,
    k1: f64,
    k2: f64,
    axis: Axis,
    min_all: f64,
    max_all: f64,
    options: &Options,
) -> Option<Vec<Arc<Feature>>> {
    let k1 = k1 / scale;
    let k2 = k2 / scale;

    if min_all >= k1 && max_all < k2 {
        return Some(features.to_vec()); // trivial accept
    } else if max_all < k1 || min_all >= k2 {
        return None; // trivial reject
    }

    let mut clipped = Vec::new();

    for feature in features {
        let (min, max) = match axis {
            Axis::X => (feature.min_x, feature.max_x),
            Axis::Y => (feature.min_y, feature.max_y),
        };

        if min >= k1 && max < k2 {
            clipped.push(Arc::clone(feature)); // trivial accept
            continue;
        } else if max < k1 || min >= k2 {
            continue; // trivial reject
        }

        clip_feature(&mut clipped, feature, k1, k2, axis, options);
    }

    if clipped.is_empty() {
        None
    } else {
        Some(clipped)
    }
}

fn clip_feature(
    out: &mut Vec<Arc<Feature>>,
    feature: &Feature,
    k1: f64,
    k2: f64,
    axis: Axis,
    options: &Options,
) {
    let mut kind = feature.kind;

    let geometry = match (&feature.kind, &feature.geometry) {
        (_, VtGeometry::Points(points)) => {
            let kept = clip_points(points, k1, k2, axis);
            if kept.is_empty() {
                return;
            }
            kind = if kept.len() == 1 {
                FeatureKind::Point
            } else {
                FeatureKind::MultiPoint
            };
            VtGeometry::Points(kept)
        }
        (FeatureKind::LineString, VtGeometry::Lines(lines)) => {
            let mut slices = Vec::new();
            if let Some(line) = lines.first() {
                clip_line(line, &mut slices, k1, k2, axis, false, options.line_metrics);
            }
            if slices.is_empty() {
                return;
            }
            if options.line_metrics {
                // one feature per slice so start/end spans stay per-line
                for slice in slices {
                    out.push(Arc::new(create_feature(
                        feature.id.clone(),
                        FeatureKind::LineString,
                        VtGeometry::Lines(vec![slice]),
                        feature.tags.clone(),
                    )));
                }
                return;
            }
            kind = if slices.len() == 1 {
                FeatureKind::LineString
            } else {
                FeatureKind::MultiLineString
            };
            VtGeometry::Lines(slices)
        }
        (FeatureKind::MultiLineString, VtGeometry::Lines(lines)) => {
            let mut slices = Vec::new();
            for line in lines {
                clip_line(line, &mut slices, k1, k2, axis, false, false);
            }
            if slices.is_empty() {
                return;
            }
            kind = if slices.len() == 1 {
                FeatureKind::LineString
            } else {
                FeatureKind::MultiLineString
            };
            VtGeometry::Lines(slices)
        }
        (FeatureKind::Polygon, VtGeometry::Lines(rings)) => {
            let mut kept = Vec::new();
            for ring in rings {
                clip_line(ring, &mut kept, k1, k2, axis, true, false);
            }
            if kept.is_empty() {
                return;
            }
            VtGeometry::Lines(kept)
        }
        (_, VtGeometry::Polygons(polygons)) => {
            let mut kept = Vec::new();
            for rings in polygons {
                let mut new_rings = Vec::new();
                for ring in rings {
                    clip_line(ring, &mut new_rings, k1, k2, axis, true, false);
                }
                if !new_rings.is_empty() {
                    kept.push(new_rings);
                }
            }
            if kept.is_empty() {
                return;
            }
            VtGeometry::Polygons(kept)
        }
        // kind/geometry pairings are fixed at construction
        _ => return,
    };

    out.push(Arc::new(create_feature(
        feature.id.clone(),
        kind,
        geometry,
        feature.tags.clone(),
    )));
}

fn clip_points(points: &[VtPoint], k1: f64, k2: f64, axis: Axis) -> Vec<VtPoint> {
    points
        .iter()
        .filter(|p| {
            let a = axis.get(p);
            a >= k1 && a <= k2
        })
        .copied()
        .collect()
}

fn clip_line(
    line: &VtLine,
    out: &mut Vec<VtLine>,
    k1: f64,
    k2: f64,
    axis: Axis,
    is_polygon: bool,
    track_metrics: bool,
) {
    let points = &line.points;
    let mut slice = VtLine::slice_of(line);
    let mut len = line.start;
    let mut seg_len = 0.0;
    let mut t = 0.0;

    for i in 0..points.len().saturating_sub(1) {
        let ap = points[i];
        let bp = points[i + 1];
        let a = axis.get(&ap);
        let b = axis.get(&bp);
        let mut exited = false;

        if track_metrics {
            seg_len = ((ap.x - bp.x).powi(2) + (ap.y - bp.y).powi(2)).sqrt();
        }

        if a < k1 {
            // ---|-->  | (segment enters the stripe from below k1)
            if b > k1 {
                t = intersect(&mut slice, ap, bp, k1, axis);
                if track_metrics {
                    slice.start = len + seg_len * t;
                }
            }
        } else if a > k2 {
            // |  <--|--- (segment enters the stripe from above k2)
            if b < k2 {
                t = intersect(&mut slice, ap, bp, k2, axis);
                if track_metrics {
                    slice.start = len + seg_len * t;
                }
            }
        } else {
            add_point(&mut slice, ap);
        }
        if b < k1 && a >= k1 {
            // <--|---  | (segment exits the stripe below k1)
            t = intersect(&mut slice, ap, bp, k1, axis);
            exited = true;
        }
        if b > k2 && a <= k2 {
            // |  ---|--> (segment exits the stripe above k2)
            t = intersect(&mut slice, ap, bp, k2, axis);
            exited = true;
        }

        if !is_polygon && exited {
            if track_metrics {
                slice.end = len + seg_len * t;
            }
            out.push(std::mem::replace(&mut slice, VtLine::slice_of(line)));
        }

        if track_metrics {
            len += seg_len;
        }
    }

    // last point
    if let Some(&last) = points.last() {
        let a = axis.get(&last);
        if a >= k1 && a <= k2 {
            add_point(&mut slice, last);
        }
    }

    // close the ring if its endpoints diverged after clipping
    if is_polygon && slice.points.len() >= 2 {
        let first = slice.points[0];
        let last = slice.points[slice.points.len() - 1];
        if last.x != first.x || last.y != first.y {
            add_point(&mut slice, first);
        }
    }

    if !slice.points.is_empty() {
        out.push(slice);
    }
}

fn add_point(slice: &mut VtLine, p: VtPoint) {
    slice.points.push(p);
}

/// Add the intersection of segment `a..b` with the stripe boundary `clip_at`
/// to the slice and return the interpolation parameter.
fn intersect(slice: &mut VtLine, a: VtPoint, b: VtPoint, clip_at: f64, axis: Axis) -> f64 {
    match axis {
        Axis::X => {
            let t = (clip_at - a.x) / (b.x - a.x);
            add_point(slice, VtPoint::new(clip_at, a.y + (b.y - a.y) * t, 1.0));
            t
        }
        Axis::Y => {
            let t = (clip_at - a.y) / (b.y - a.y);
            add_point(slice, VtPoint::new(a.x + (b.x - a.x) * t, clip_at, 1.0));
            t
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{FeatureId, Tags, VtGeometry};

    fn point_feature(x: f64, y: f64) -> Arc<Feature> {
        Arc::new(create_feature(
            None,
            FeatureKind::Point,
            VtGeometry::Points(vec![VtPoint::new(x, y, 0.0)]),
            None,
        ))
    }

    fn line_feature(points: &[(f64, f64)]) -> Arc<Feature> {
        let mut line = VtLine::new();
        line.points = points.iter().map(|&(x, y)| VtPoint::new(x, y, 0.0)).collect();
        line.size = 1.0;
        line.end = 1.0;
        Arc::new(create_feature(
            None,
            FeatureKind::LineString,
            VtGeometry::Lines(vec![line]),
            None,
        ))
    }

    fn ring_feature(points: &[(f64, f64)]) -> Arc<Feature> {
        let mut ring = VtLine::new();
        ring.points = points.iter().map(|&(x, y)| VtPoint::new(x, y, 0.0)).collect();
        Arc::new(create_feature(
            None,
            FeatureKind::Polygon,
            VtGeometry::Lines(vec![ring]),
            None,
        ))
    }

    #[test]
    fn test_trivial_accept_shares_features() {
        let features = vec![point_feature(0.5, 0.5)];
        let options = Options::default();
        let result = clip(&features, 1.0, 0.0, 1.0, Axis::X, 0.4, 0.6, &options)
            .expect("set inside stripe");
        assert!(Arc::ptr_eq(&features[0], &result[0]));
    }

    #[test]
    fn test_trivial_reject_returns_none() {
        let features = vec![point_feature(0.9, 0.5)];
        let options = Options::default();
        assert!(clip(&features, 1.0, 0.0, 0.5, Axis::X, 0.85, 0.95, &options).is_none());
    }

    #[test]
    fn test_points_partitioned_by_axis() {
        let features = vec![point_feature(0.2, 0.5), point_feature(0.8, 0.5)];
        let options = Options::default();
        let left = clip(&features, 1.0, 0.0, 0.5, Axis::X, 0.2, 0.8, &options)
            .expect("left point survives");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].min_x, 0.2);
    }

    #[test]
    fn test_line_crossing_gets_intersection_point() {
        let features = vec![line_feature(&[(0.2, 0.5), (0.8, 0.5)])];
        let options = Options::default();
        let left = clip(&features, 1.0, 0.0, 0.5, Axis::X, 0.2, 0.8, &options)
            .expect("crossing line survives");
        match &left[0].geometry {
            VtGeometry::Lines(lines) => {
                let last = lines[0].points.last().unwrap();
                assert_eq!(last.x, 0.5);
                assert_eq!(last.y, 0.5);
                assert_eq!(last.w, 1.0);
            }
            other => panic!("expected lines, got {other:?}"),
        }
    }

    #[test]
    fn test_line_split_into_multiple_slices() {
        // enters and leaves the stripe twice
        let features = vec![line_feature(&[
            (0.1, 0.1),
            (0.4, 0.1),
            (0.6, 0.1),
            (0.4, 0.2),
            (0.1, 0.2),
        ])];
        let options = Options::default();
        let clipped = clip(&features, 1.0, 0.0, 0.5, Axis::X, 0.1, 0.6, &options)
            .expect("slices survive");
        assert_eq!(clipped[0].kind, FeatureKind::MultiLineString);
        match &clipped[0].geometry {
            VtGeometry::Lines(lines) => assert_eq!(lines.len(), 2),
            other => panic!("expected lines, got {other:?}"),
        }
    }

    #[test]
    fn test_clipped_ring_is_closed() {
        let features = vec![ring_feature(&[
            (0.2, 0.2),
            (0.8, 0.2),
            (0.8, 0.8),
            (0.2, 0.8),
            (0.2, 0.2),
        ])];
        let options = Options::default();
        let clipped = clip(&features, 1.0, 0.0, 0.5, Axis::X, 0.2, 0.8, &options)
            .expect("half the square survives");
        match &clipped[0].geometry {
            VtGeometry::Lines(rings) => {
                let points = &rings[0].points;
                let first = points.first().unwrap();
                let last = points.last().unwrap();
                assert_eq!((first.x, first.y), (last.x, last.y));
            }
            other => panic!("expected rings, got {other:?}"),
        }
    }

    #[test]
    fn test_buffered_stripes_overlap() {
        // a point sitting on the midline must survive both overlapping
        // stripes, the way tile subdivision calls the clipper
        let features = vec![point_feature(0.5, 0.5)];
        let options = Options::default();
        let k1 = 0.5 * options.buffer as f64 / options.extent as f64;
        let left = clip(&features, 1.0, -k1, 0.5 + k1, Axis::X, 0.5, 0.5, &options);
        let right = clip(&features, 1.0, 0.5 - k1, 1.0 + k1, Axis::X, 0.5, 0.5, &options);
        assert!(left.is_some());
        assert!(right.is_some());
    }

    #[test]
    fn test_metadata_survives_clipping() {
        let mut tags = Tags::new();
        tags.insert("name".to_string(), serde_json::json!("road"));
        let mut line = VtLine::new();
        line.points = vec![VtPoint::new(0.2, 0.5, 0.0), VtPoint::new(0.8, 0.5, 0.0)];
        let feature = Arc::new(create_feature(
            Some(FeatureId::String("f1".to_string())),
            FeatureKind::LineString,
            VtGeometry::Lines(vec![line]),
            Some(Arc::new(tags)),
        ));
        let options = Options::default();
        let clipped = clip(&[feature], 1.0, 0.0, 0.5, Axis::X, 0.2, 0.8, &options)
            .expect("line survives");
        assert_eq!(clipped[0].id, Some(FeatureId::String("f1".to_string())));
        assert!(clipped[0].tags.is_some());
    }
}
