use anyhow::{Context, Result, anyhow};
use geo::{BoundingRect, Coord, Point, Rect};
use geojson::{Feature, Geometry, Value};
use rayon::prelude::*;
use serde::Serialize;

use crate::properties::PropertyAliases;

/// Earth radius used by the radius filter, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Bounding box of Brazil, used when a rendered layer has no bounds of its own.
pub fn brazil_bounds() -> Rect<f64> {
    Rect::new(
        Coord { x: -73.98283055299, y: -33.7683777809 },
        Coord { x: -28.84765906699, y: 5.2842873834 },
    )
}

/// Keep municipalities whose approximate centroid lies within `radius_km`
/// of `center` (x = longitude, y = latitude).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RadiusFilter {
    pub center: Point<f64>,
    pub radius_km: f64,
}

impl RadiusFilter {
    pub fn new(lat: f64, lng: f64, radius_km: f64) -> Self {
        Self {
            center: Point::new(lng, lat),
            radius_km,
        }
    }

    /// Whether the feature's centroid falls inside the circle. Features
    /// without polygonal geometry never match.
    pub fn contains(&self, feature: &Feature) -> bool {
        feature
            .geometry
            .as_ref()
            .and_then(approximate_centroid)
            .is_some_and(|centroid| haversine_km(self.center, centroid) <= self.radius_km)
    }
}

/// Great-circle distance in kilometers between two lng/lat points.
pub fn haversine_km(a: Point<f64>, b: Point<f64>) -> f64 {
    let d_lat = (b.y() - a.y()).to_radians();
    let d_lng = (b.x() - a.x()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.y().to_radians().cos() * b.y().to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Vertex mean of the first ring: the outer ring of a Polygon, or the outer
/// ring of the first member of a MultiPolygon. Holes and further members are
/// ignored and the mean is not area-weighted.
pub fn approximate_centroid(geometry: &Geometry) -> Option<Point<f64>> {
    let ring = match &geometry.value {
        Value::Polygon(rings) => rings.first()?,
        Value::MultiPolygon(polygons) => polygons.first()?.first()?,
        _ => return None,
    };

    let coords: Vec<Coord<f64>> = ring
        .iter()
        .filter(|position| position.len() >= 2)
        .map(|position| Coord { x: position[0], y: position[1] })
        .collect();
    if coords.is_empty() {
        return None;
    }

    let n = coords.len() as f64;
    let sum = coords.iter().fold(Coord { x: 0.0, y: 0.0 }, |acc, c| acc + *c);
    Some(Point::new(sum.x / n, sum.y / n))
}

/// Keep features whose state property equals `state_code` exactly.
/// `None` passes every feature through.
pub fn filter_by_state<'a>(
    features: &'a [Feature],
    state_code: Option<&str>,
    aliases: &PropertyAliases,
) -> Vec<&'a Feature> {
    let Some(state_code) = state_code else {
        return features.iter().collect();
    };

    features
        .par_iter()
        .filter(|feature| aliases.state(feature).as_deref() == Some(state_code))
        .collect()
}

/// Keep features whose approximate centroid is within the filter's radius.
pub fn filter_by_radius<'a>(features: &'a [Feature], filter: &RadiusFilter) -> Vec<&'a Feature> {
    features
        .par_iter()
        .filter(|feature| filter.contains(feature))
        .collect()
}

/// Union of the bounding boxes of all features with convertible geometry.
pub fn layer_bounds(features: &[&Feature]) -> Option<Rect<f64>> {
    features
        .iter()
        .filter_map(|feature| feature.geometry.as_ref())
        .filter_map(|geometry| geo::Geometry::<f64>::try_from(geometry.value.clone()).ok())
        .filter_map(|geometry| geometry.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )
        })
}

/// Parse a `lat,lng` pair as typed on the command line.
pub fn parse_lat_lng(text: &str) -> Result<(f64, f64)> {
    let (lat, lng) = text
        .split_once(',')
        .ok_or_else(|| anyhow!("expected LAT,LNG but got {:?}", text))?;
    let lat: f64 = lat.trim().parse().with_context(|| format!("invalid latitude {:?}", lat))?;
    let lng: f64 = lng.trim().parse().with_context(|| format!("invalid longitude {:?}", lng))?;
    Ok((lat, lng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Distance, Haversine};
    use serde_json::json;

    /// Axis-aligned square ring around (lng, lat), closed.
    fn square(lng: f64, lat: f64, half: f64) -> Vec<Vec<f64>> {
        vec![
            vec![lng - half, lat - half],
            vec![lng + half, lat - half],
            vec![lng + half, lat + half],
            vec![lng - half, lat + half],
            vec![lng - half, lat - half],
        ]
    }

    fn feature(value: Option<Value>, uf: &str) -> Feature {
        Feature {
            bbox: None,
            geometry: value.map(Geometry::new),
            id: None,
            properties: json!({ "UF": uf }).as_object().cloned(),
            foreign_members: None,
        }
    }

    #[test]
    fn distance_to_self_is_zero() {
        let p = Point::new(-46.6333, -23.5505);
        assert_eq!(haversine_km(p, p), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let sao_paulo = Point::new(-46.6333, -23.5505);
        let rio = Point::new(-43.1729, -22.9068);
        assert_eq!(haversine_km(sao_paulo, rio), haversine_km(rio, sao_paulo));

        // ~360 km, within a hair of geo's mean-radius haversine.
        let d = haversine_km(sao_paulo, rio);
        assert!((d - 360.0).abs() < 10.0, "got {}", d);
        let reference_km = Haversine::distance(sao_paulo, rio) / 1000.0;
        assert!((d - reference_km).abs() < 0.01);
    }

    #[test]
    fn centroid_of_polygon_uses_outer_ring_vertices() {
        // The closing vertex is counted like any other.
        let ring = vec![vec![0.0, 0.0], vec![4.0, 0.0], vec![4.0, 4.0], vec![0.0, 0.0]];
        let hole = square(100.0, 100.0, 1.0);
        let geometry = Geometry::new(Value::Polygon(vec![ring, hole]));

        let c = approximate_centroid(&geometry).unwrap();
        assert_eq!(c, Point::new(2.0, 1.0));
    }

    #[test]
    fn centroid_of_multipolygon_uses_first_member() {
        let geometry = Geometry::new(Value::MultiPolygon(vec![
            vec![square(-50.0, -10.0, 0.5)],
            vec![square(10.0, 10.0, 0.5)],
        ]));
        let c = approximate_centroid(&geometry).unwrap();
        assert!((c.x() - -50.0).abs() < 0.2);
        assert!((c.y() - -10.0).abs() < 0.2);
    }

    #[test]
    fn centroid_requires_polygonal_geometry() {
        assert!(approximate_centroid(&Geometry::new(Value::Point(vec![1.0, 2.0]))).is_none());
        assert!(approximate_centroid(&Geometry::new(Value::Polygon(vec![]))).is_none());
        assert!(approximate_centroid(&Geometry::new(Value::Polygon(vec![vec![]]))).is_none());
    }

    #[test]
    fn state_filter_none_is_identity() {
        let features = vec![
            feature(Some(Value::Polygon(vec![square(0.0, 0.0, 1.0)])), "SP"),
            feature(None, "RJ"),
        ];
        let kept = filter_by_state(&features, None, &PropertyAliases::default());
        assert_eq!(kept.len(), features.len());
        assert!(kept.iter().zip(&features).all(|(a, b)| std::ptr::eq(*a, b)));
    }

    #[test]
    fn state_filter_is_exact_and_case_sensitive() {
        let features = vec![
            feature(None, "SP"),
            feature(None, "sp"),
            feature(None, "RJ"),
            feature(None, "SP"),
        ];
        let kept = filter_by_state(&features, Some("SP"), &PropertyAliases::default());
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn radius_filter_keeps_nearby_and_drops_unsupported() {
        let features = vec![
            feature(Some(Value::Polygon(vec![square(-46.63, -23.55, 0.05)])), "SP"),
            feature(Some(Value::Polygon(vec![square(-43.17, -22.90, 0.05)])), "RJ"),
            feature(Some(Value::Point(vec![-46.63, -23.55])), "SP"),
            feature(None, "SP"),
        ];
        let filter = RadiusFilter::new(-23.5505, -46.6333, 50.0);
        let kept = filter_by_radius(&features, &filter);
        assert_eq!(kept.len(), 1);
        assert!(std::ptr::eq(kept[0], &features[0]));

        let wide = RadiusFilter::new(-23.5505, -46.6333, 500.0);
        assert_eq!(filter_by_radius(&features, &wide).len(), 2);
    }

    #[test]
    fn zero_radius_keeps_only_exact_centroids() {
        let features = vec![
            feature(Some(Value::Polygon(vec![vec![vec![1.0, 1.0], vec![3.0, 3.0]]])), "XX"),
            feature(Some(Value::Polygon(vec![square(5.0, 5.0, 1.0)])), "XX"),
        ];
        let kept = filter_by_radius(&features, &RadiusFilter::new(2.0, 2.0, 0.0));
        assert_eq!(kept.len(), 1);
        assert!(std::ptr::eq(kept[0], &features[0]));
    }

    #[test]
    fn bounds_span_all_features() {
        let features = vec![
            feature(Some(Value::Polygon(vec![square(-50.0, -10.0, 1.0)])), "MT"),
            feature(Some(Value::Polygon(vec![square(-40.0, -20.0, 1.0)])), "MG"),
            feature(None, "XX"),
        ];
        let refs: Vec<&Feature> = features.iter().collect();
        let bounds = layer_bounds(&refs).unwrap();
        assert_eq!(bounds.min(), Coord { x: -51.0, y: -21.0 });
        assert_eq!(bounds.max(), Coord { x: -39.0, y: -9.0 });

        assert!(layer_bounds(&[]).is_none());
    }

    #[test]
    fn parse_lat_lng_pairs() {
        assert_eq!(parse_lat_lng("-23.55, -46.63").unwrap(), (-23.55, -46.63));
        assert!(parse_lat_lng("-23.55").is_err());
        assert!(parse_lat_lng("a,b").is_err());
    }
}
