//! GeoJSON conversion and preprocessing.
//!
//! Turns parsed GeoJSON (via the `geojson` crate's types) into the internal
//! [`Feature`](crate::feature::Feature) representation: coordinates are
//! projected into normalized [0,1] Web Mercator space and every line/ring
//! point gets a simplification weight so later tile building can filter by
//! tolerance without revisiting the geometry.

use std::f64::consts::PI;
use std::sync::Arc;

use geojson::{GeoJson, Value};

use crate::feature::{create_feature, Feature, FeatureId, FeatureKind, Tags, VtGeometry, VtLine, VtPoint};
use crate::simplify::simplify;
use crate::Options;

/// Convert a GeoJSON document into preprocessed features.
///
/// Accepts a feature collection, a single feature, or a bare geometry.
/// Features without geometry are skipped. Ids are resolved in this order:
/// a promoted property (`promote_id`), a generated collection index
/// (`generate_id`), or the feature's own id.
pub fn convert(data: &GeoJson, options: &Options) -> Vec<Arc<Feature>> {
    let mut features = Vec::new();

    match data {
        GeoJson::FeatureCollection(collection) => {
            for (i, feature) in collection.features.iter().enumerate() {
                convert_feature(&mut features, feature, options, Some(i as u64));
            }
        }
        GeoJson::Feature(feature) => {
            convert_feature(&mut features, feature, options, None);
        }
        GeoJson::Geometry(geometry) => {
            let synthetic = geojson::Feature {
                bbox: None,
                geometry: Some(geometry.clone()),
                id: None,
                properties: None,
                foreign_members: None,
            };
            convert_feature(&mut features, &synthetic, options, None);
        }
    }

    features
}

fn convert_feature(
    out: &mut Vec<Arc<Feature>>,
    feature: &geojson::Feature,
    options: &Options,
    index: Option<u64>,
) {
    let Some(geometry) = &feature.geometry else {
        return;
    };

    let id = resolve_id(feature, options, index);
    let tags = feature.properties.clone().map(Arc::new);
    let scale = (1u32 << options.max_zoom) as f64 * options.extent as f64;
    let tolerance = (options.tolerance / scale).powi(2);

    convert_geometry(out, &geometry.value, id, tags, tolerance, options);
}

fn resolve_id(
    feature: &geojson::Feature,
    options: &Options,
    index: Option<u64>,
) -> Option<FeatureId> {
    if let Some(key) = &options.promote_id {
        return feature
            .properties
            .as_ref()
            .and_then(|props| props.get(key))
            .and_then(FeatureId::from_property);
    }
    if options.generate_id {
        return Some(FeatureId::from(index.unwrap_or(0)));
    }
    feature.id.as_ref().map(FeatureId::from)
}

fn convert_geometry(
    out: &mut Vec<Arc<Feature>>,
    value: &Value,
    id: Option<FeatureId>,
    tags: Option<Arc<Tags>>,
    tolerance: f64,
    options: &Options,
) {
    match value {
        Value::Point(position) => {
            let geometry = VtGeometry::Points(vec![project_point(position)]);
            out.push(Arc::new(create_feature(id, FeatureKind::Point, geometry, tags)));
        }
        Value::MultiPoint(positions) => {
            let points = positions.iter().map(|p| project_point(p)).collect();
            out.push(Arc::new(create_feature(
                id,
                FeatureKind::MultiPoint,
                VtGeometry::Points(points),
                tags,
            )));
        }
        Value::LineString(positions) => {
            let line = convert_line(positions, tolerance, false);
            out.push(Arc::new(create_feature(
                id,
                FeatureKind::LineString,
                VtGeometry::Lines(vec![line]),
                tags,
            )));
        }
        Value::MultiLineString(lines) => {
            if options.line_metrics {
                // explode into individual linestrings so per-line start/end
                // spans stay meaningful
                for positions in lines {
                    let line = convert_line(positions, tolerance, false);
                    out.push(Arc::new(create_feature(
                        id.clone(),
                        FeatureKind::LineString,
                        VtGeometry::Lines(vec![line]),
                        tags.clone(),
                    )));
                }
            } else {
                let converted = lines.iter().map(|l| convert_line(l, tolerance, false)).collect();
                out.push(Arc::new(create_feature(
                    id,
                    FeatureKind::MultiLineString,
                    VtGeometry::Lines(converted),
                    tags,
                )));
            }
        }
        Value::Polygon(rings) => {
            let converted = rings.iter().map(|r| convert_line(r, tolerance, true)).collect();
            out.push(Arc::new(create_feature(
                id,
                FeatureKind::Polygon,
                VtGeometry::Lines(converted),
                tags,
            )));
        }
        Value::MultiPolygon(polygons) => {
            let converted = polygons
                .iter()
                .map(|rings| rings.iter().map(|r| convert_line(r, tolerance, true)).collect())
                .collect();
            out.push(Arc::new(create_feature(
                id,
                FeatureKind::MultiPolygon,
                VtGeometry::Polygons(converted),
                tags,
            )));
        }
        Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                convert_geometry(out, &geometry.value, id.clone(), tags.clone(), tolerance, options);
            }
        }
    }
}

fn project_point(position: &[f64]) -> VtPoint {
    VtPoint::new(project_x(position[0]), project_y(position[1]), 0.0)
}

fn convert_line(positions: &[Vec<f64>], tolerance: f64, is_polygon: bool) -> VtLine {
    let mut line = VtLine::new();
    let mut size = 0.0;
    let mut x0 = 0.0;
    let mut y0 = 0.0;

    for (j, position) in positions.iter().enumerate() {
        let x = project_x(position[0]);
        let y = project_y(position[1]);

        line.points.push(VtPoint::new(x, y, 0.0));

        if j > 0 {
            if is_polygon {
                size += (x0 * y - x * y0) / 2.0; // area
            } else {
                size += ((x - x0).powi(2) + (y - y0).powi(2)).sqrt(); // length
            }
        }
        x0 = x;
        y0 = y;
    }

    if !line.points.is_empty() {
        let last = line.points.len() - 1;
        line.points[0].w = 1.0;
        if last > 1 {
            simplify(&mut line.points, 0, last, tolerance);
        }
        line.points[last].w = 1.0;
    }

    line.size = size.abs();
    line.start = 0.0;
    line.end = line.size;
    line
}

fn project_x(x: f64) -> f64 {
    x / 360.0 + 0.5
}

fn project_y(y: f64) -> f64 {
    let sin = (y * PI / 180.0).sin();
    let y2 = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    y2.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn geojson(value: serde_json::Value) -> GeoJson {
        GeoJson::from_json_value(value).expect("valid geojson")
    }

    #[test]
    fn test_projection_center() {
        assert_eq!(project_x(0.0), 0.5);
        assert!((project_y(0.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_projection_clamps_poles() {
        assert_eq!(project_y(90.0), 0.0);
        assert_eq!(project_y(-90.0), 1.0);
    }

    #[test]
    fn test_convert_point_feature() {
        let data = geojson(json!({
            "type": "Feature",
            "id": 42,
            "geometry": {"type": "Point", "coordinates": [0.0, 0.0]},
            "properties": {"name": "origin"}
        }));
        let features = convert(&data, &Options::default());

        assert_eq!(features.len(), 1);
        let f = &features[0];
        assert_eq!(f.kind, FeatureKind::Point);
        assert_eq!(f.id, Some(FeatureId::from(42u64)));
        match &f.geometry {
            VtGeometry::Points(points) => {
                assert!((points[0].x - 0.5).abs() < 1e-12);
                assert!((points[0].y - 0.5).abs() < 1e-12);
            }
            other => panic!("expected points, got {other:?}"),
        }
    }

    #[test]
    fn test_line_endpoints_always_weighted() {
        let data = geojson(json!({
            "type": "Feature",
            "geometry": {
                "type": "LineString",
                "coordinates": [[0.0, 0.0], [10.0, 0.0], [20.0, 0.0]]
            },
            "properties": null
        }));
        let features = convert(&data, &Options::default());
        match &features[0].geometry {
            VtGeometry::Lines(lines) => {
                let points = &lines[0].points;
                assert_eq!(points.first().map(|p| p.w), Some(1.0));
                assert_eq!(points.last().map(|p| p.w), Some(1.0));
            }
            other => panic!("expected lines, got {other:?}"),
        }
    }

    #[test]
    fn test_promote_id_wins_over_feature_id() {
        let data = geojson(json!({
            "type": "Feature",
            "id": 1,
            "geometry": {"type": "Point", "coordinates": [0.0, 0.0]},
            "properties": {"code": "ch"}
        }));
        let options = Options {
            promote_id: Some("code".to_string()),
            ..Options::default()
        };
        let features = convert(&data, &options);
        assert_eq!(features[0].id, Some(FeatureId::String("ch".to_string())));
    }

    #[test]
    fn test_generate_id_uses_collection_index() {
        let data = geojson(json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}, "properties": null},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1.0, 1.0]}, "properties": null}
            ]
        }));
        let options = Options {
            generate_id: true,
            ..Options::default()
        };
        let features = convert(&data, &options);
        assert_eq!(features[0].id, Some(FeatureId::from(0u64)));
        assert_eq!(features[1].id, Some(FeatureId::from(1u64)));
    }

    #[test]
    fn test_line_metrics_explodes_multilinestring() {
        let data = geojson(json!({
            "type": "Feature",
            "geometry": {
                "type": "MultiLineString",
                "coordinates": [
                    [[0.0, 0.0], [10.0, 0.0]],
                    [[0.0, 10.0], [10.0, 10.0]]
                ]
            },
            "properties": null
        }));
        let options = Options {
            line_metrics: true,
            ..Options::default()
        };
        let features = convert(&data, &options);
        assert_eq!(features.len(), 2);
        assert!(features.iter().all(|f| f.kind == FeatureKind::LineString));
    }

    #[test]
    fn test_feature_without_geometry_is_skipped() {
        let collection = geojson::FeatureCollection {
            bbox: None,
            features: vec![geojson::Feature {
                bbox: None,
                geometry: None,
                id: None,
                properties: None,
                foreign_members: None,
            }],
            foreign_members: None,
        };
        let features = convert(&GeoJson::FeatureCollection(collection), &Options::default());
        assert!(features.is_empty());
    }

    #[test]
    fn test_polygon_ring_size_is_area() {
        // unit-ish square, 10 degrees on a side near the equator
        let data = geojson(json!({
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]]]
            },
            "properties": null
        }));
        let features = convert(&data, &Options::default());
        match &features[0].geometry {
            VtGeometry::Lines(rings) => assert!(rings[0].size > 0.0),
            other => panic!("expected rings, got {other:?}"),
        }
    }
}
