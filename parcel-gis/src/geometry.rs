//! Conversion between KML coordinate text and GeoJSON geometry
//!
//! Parse direction: `lon,lat[,alt]` tuples separated by whitespace become a
//! Point, LineString or single-ring Polygon. A ring is a Polygon only when it
//! has at least three points and is closed (first == last).
//!
//! Render direction: a GeoJSON value (possibly wrapped in a Feature or
//! FeatureCollection) becomes one `lon,lat,0` coordinate string plus the
//! KML element to put it in. Anything that cannot be rendered yields `None`
//! so callers simply leave the placemark out.

use geojson::{GeoJson, Geometry, Value};
use thiserror::Error;

use crate::kml::GeometryKind;

/// Coordinate parsing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("No valid coordinates found")]
    EmptyGeometry,
}

/// Coordinate string ready for a KML geometry element
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedGeometry {
    pub kind: GeometryKind,
    /// Space-joined `lon,lat,0` tuples
    pub coordinates: String,
}

/// Parse KML coordinate text into a GeoJSON geometry
///
/// Altitude is discarded; tuples whose longitude or latitude do not parse
/// as finite numbers are dropped.
pub fn parse_coordinates(text: &str) -> Result<Geometry, GeometryError> {
    let points: Vec<Vec<f64>> = text
        .split_whitespace()
        .filter_map(parse_tuple)
        .collect();

    let value = match points.len() {
        0 => return Err(GeometryError::EmptyGeometry),
        1 => Value::Point(points.into_iter().next().unwrap_or_default()),
        n if n >= 3 && points.first() == points.last() => Value::Polygon(vec![points]),
        _ => Value::LineString(points),
    };

    Ok(Geometry::new(value))
}

fn parse_tuple(tuple: &str) -> Option<Vec<f64>> {
    let mut parts = tuple.split(',');
    let lon = parts.next()?.trim().parse::<f64>().ok()?;
    let lat = parts.next()?.trim().parse::<f64>().ok()?;
    (lon.is_finite() && lat.is_finite()).then(|| vec![lon, lat])
}

/// Render a stored GeoJSON value as KML coordinates
pub fn render_geojson(geojson: &GeoJson) -> Option<RenderedGeometry> {
    match geojson {
        GeoJson::Geometry(geometry) => render_geometry(geometry),
        GeoJson::Feature(feature) => feature.geometry.as_ref().and_then(render_geometry),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .first()
            .and_then(|feature| feature.geometry.as_ref())
            .and_then(render_geometry),
    }
}

/// Render a bare geometry as KML coordinates
pub fn render_geometry(geometry: &Geometry) -> Option<RenderedGeometry> {
    match &geometry.value {
        Value::Polygon(rings) => rings
            .first()
            .and_then(|ring| render_positions(ring, GeometryKind::Polygon)),
        Value::MultiPolygon(polygons) => polygons
            .first()
            .and_then(|rings| rings.first())
            .and_then(|ring| render_positions(ring, GeometryKind::Polygon)),
        Value::LineString(line) => render_positions(line, GeometryKind::LineString),
        Value::Point(position) => {
            render_positions(std::slice::from_ref(position), GeometryKind::Point)
        }
        Value::GeometryCollection(geometries) => geometries.first().and_then(render_geometry),
        _ => None,
    }
}

fn render_positions(positions: &[Vec<f64>], kind: GeometryKind) -> Option<RenderedGeometry> {
    let tuples: Vec<String> = positions
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| format!("{},{},0", p[0], p[1]))
        .collect();

    if tuples.is_empty() {
        return None;
    }

    Some(RenderedGeometry {
        kind,
        coordinates: tuples.join(" "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::{Feature, FeatureCollection};

    const EPSILON: f64 = 1e-9;

    fn positions(geometry: &Geometry) -> Vec<Vec<f64>> {
        match &geometry.value {
            Value::Polygon(rings) => rings[0].clone(),
            Value::LineString(line) => line.clone(),
            Value::Point(p) => vec![p.clone()],
            other => panic!("unexpected geometry {:?}", other),
        }
    }

    #[test]
    fn test_closed_ring_is_polygon() {
        let geometry = parse_coordinates("10,20,0 11,21,0 10,20,0").unwrap();

        assert_eq!(
            geometry.value,
            Value::Polygon(vec![vec![vec![10.0, 20.0], vec![11.0, 21.0], vec![10.0, 20.0]]])
        );
    }

    #[test]
    fn test_open_ring_is_linestring() {
        let geometry = parse_coordinates("10,20 11,21 12,22").unwrap();

        assert!(matches!(geometry.value, Value::LineString(ref l) if l.len() == 3));
    }

    #[test]
    fn test_two_identical_points_stay_linestring() {
        let geometry = parse_coordinates("1,1 1,1").unwrap();

        assert!(matches!(geometry.value, Value::LineString(_)));
    }

    #[test]
    fn test_single_point() {
        let geometry = parse_coordinates("  -47.9,-15.8,1100  ").unwrap();

        assert_eq!(geometry.value, Value::Point(vec![-47.9, -15.8]));
    }

    #[test]
    fn test_malformed_tuples_dropped() {
        let geometry = parse_coordinates("1,1 abc 2,x 3 4,4,0").unwrap();

        assert_eq!(geometry.value, Value::LineString(vec![vec![1.0, 1.0], vec![4.0, 4.0]]));
    }

    #[test]
    fn test_no_valid_points_is_empty_geometry() {
        assert_eq!(parse_coordinates(""), Err(GeometryError::EmptyGeometry));
        assert_eq!(parse_coordinates("a,b c,d"), Err(GeometryError::EmptyGeometry));
        assert_eq!(parse_coordinates("NaN,1 inf,2"), Err(GeometryError::EmptyGeometry));
    }

    #[test]
    fn test_closed_ring_round_trip() {
        let original = "-47.91,-15.78,0 -47.90,-15.78,0 -47.90,-15.77,0 -47.91,-15.78,0";
        let parsed = parse_coordinates(original).unwrap();

        let rendered = render_geometry(&parsed).unwrap();
        assert_eq!(rendered.kind, GeometryKind::Polygon);

        let reparsed = parse_coordinates(&rendered.coordinates).unwrap();
        assert!(matches!(reparsed.value, Value::Polygon(_)));

        let before = positions(&parsed);
        let after = positions(&reparsed);
        assert_eq!(before.len(), 4);
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a[0] - b[0]).abs() < EPSILON && (a[1] - b[1]).abs() < EPSILON);
        }
    }

    #[test]
    fn test_open_line_round_trip_never_polygon() {
        let parsed = parse_coordinates("0,0 5,5").unwrap();
        let rendered = render_geometry(&parsed).unwrap();

        assert_eq!(rendered.kind, GeometryKind::LineString);
        assert_eq!(rendered.coordinates, "0,0,0 5,5,0");
        assert!(matches!(
            parse_coordinates(&rendered.coordinates).unwrap().value,
            Value::LineString(_)
        ));
    }

    #[test]
    fn test_render_multipolygon_uses_first_outer_ring() {
        let geometry = Geometry::new(Value::MultiPolygon(vec![
            vec![
                vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![1.0, 1.0], vec![0.0, 0.0]],
                vec![vec![0.2, 0.2], vec![0.3, 0.2], vec![0.3, 0.3], vec![0.2, 0.2]],
            ],
            vec![vec![vec![5.0, 5.0], vec![6.0, 5.0], vec![6.0, 6.0], vec![5.0, 5.0]]],
        ]));

        let rendered = render_geometry(&geometry).unwrap();

        assert_eq!(rendered.coordinates, "0,0,0 1,0,0 1,1,0 0,0,0");
    }

    #[test]
    fn test_render_unwraps_feature_and_collection() {
        let point = Geometry::new(Value::Point(vec![1.5, 2.5]));
        let feature = Feature {
            geometry: Some(point),
            ..Feature::default()
        };
        let collection = FeatureCollection {
            bbox: None,
            features: vec![feature.clone()],
            foreign_members: None,
        };

        let from_feature = render_geojson(&GeoJson::Feature(feature)).unwrap();
        let from_collection = render_geojson(&GeoJson::FeatureCollection(collection)).unwrap();

        assert_eq!(from_feature.kind, GeometryKind::Point);
        assert_eq!(from_feature.coordinates, "1.5,2.5,0");
        assert_eq!(from_feature, from_collection);
    }

    #[test]
    fn test_render_unsupported_or_empty_is_none() {
        let multi_point = Geometry::new(Value::MultiPoint(vec![vec![1.0, 1.0]]));
        let empty_polygon = Geometry::new(Value::Polygon(vec![]));
        let null_feature = GeoJson::Feature(Feature::default());

        assert!(render_geometry(&multi_point).is_none());
        assert!(render_geometry(&empty_polygon).is_none());
        assert!(render_geojson(&null_feature).is_none());
    }
}
