//! # Spatial utilities useful for routing

use geo::{Coord, Distance, Haversine, Point, Rect, coord};

const METERS_PER_DEGREE_LAT: f64 = 111_132.954;

/// Returns a bounding box centered upon `center` containing a circle with
/// radius `radius_m` meters.
///
/// Uses the flat-earth approximation, which is plenty for the small search
/// boxes snapping works with.
pub fn bbox_around(center: Coord<f64>, radius_m: f64) -> Rect<f64> {
    let dlat = radius_m / METERS_PER_DEGREE_LAT;
    let dlon = radius_m / (METERS_PER_DEGREE_LAT * center.y.to_radians().cos().max(0.01));

    Rect::new(
        coord! { x: center.x - dlon, y: center.y - dlat },
        coord! { x: center.x + dlon, y: center.y + dlat },
    )
}

/// The length of a polyline in meters, summed segment by segment.
pub fn polyline_length_m(points: &[Coord<f64>]) -> f64 {
    points
        .windows(2)
        .map(|pair| Haversine.distance(Point::from(pair[0]), Point::from(pair[1])))
        .sum()
}

/// Fast distance approximation.
///
/// This is intended for cases when you need a _fast_ estimate over _short_
/// distances (up to a few kilometers), such as comparing snap candidates
/// against each other and against a distance threshold.
///
/// # Limitations
///
/// * Accuracy decreases at polar latitudes.
/// * Does NOT account for the antimeridian.
/// * Expected range of overestimation is less than 1m for short distances
///   (up to a few kilometers), but will get worse over larger distances,
///   and closer to the poles.
pub struct DistanceApproximator {
    center: Coord<f64>,
    meters_per_lon_degree: f64,
    meters_per_lat_degree: f64,
}

impl DistanceApproximator {
    /// Create a new approximator centered on the given point.
    #[inline]
    pub fn new(center: Coord<f64>) -> Self {
        let lon_scale = center.y.to_radians().cos();
        Self {
            center,
            meters_per_lon_degree: lon_scale * METERS_PER_DEGREE_LAT,
            meters_per_lat_degree: METERS_PER_DEGREE_LAT,
        }
    }

    /// Returns the offset of `other` from the center in meters, as an
    /// `(east, north)` pair on the local tangent plane.
    #[inline]
    pub fn delta_meters(&self, other: Coord<f64>) -> (f64, f64) {
        (
            (other.x - self.center.x) * self.meters_per_lon_degree,
            (other.y - self.center.y) * self.meters_per_lat_degree,
        )
    }

    /// Returns an approximation of the **squared** distance in meters to the
    /// given point.
    ///
    /// Compare against `max_distance * max_distance` to avoid `sqrt` in your
    /// code. The returned distance will always be _larger_ than the actual
    /// distance.
    #[inline]
    pub fn distance_squared(&self, other: Coord<f64>) -> f64 {
        let (dx, dy) = self.delta_meters(other);
        dx * dx + dy * dy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_polyline_length() {
        // 0.002 degrees along the equator is about 222.4m on the mean
        // earth radius the haversine distance runs on.
        let points = [
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 0.001, y: 0.0 },
            coord! { x: 0.002, y: 0.0 },
        ];
        let length = polyline_length_m(&points);
        assert!((length - 222.39).abs() < 0.1, "length was {length}");
    }

    #[test]
    fn test_bbox_contains_radius() {
        let center = coord! { x: 11.3, y: 47.2 };
        let rect = bbox_around(center, 100.0);
        let approximator = DistanceApproximator::new(center);

        // All four corners are at least the radius away.
        for corner in [
            rect.min(),
            rect.max(),
            coord! { x: rect.min().x, y: rect.max().y },
            coord! { x: rect.max().x, y: rect.min().y },
        ] {
            assert!(approximator.distance_squared(corner) >= 100.0 * 100.0);
        }
    }

    proptest! {
        #[test]
        fn haversine_oracle(lat in -80.0f64..80.0, lon in -179.0f64..179.0,
            dlat in -0.01f64..0.01, dlon in -0.01f64..0.01) {
            // Coordinates fairly close together; snapping works at this scale.
            let a = coord! { x: lon, y: lat };
            let b = coord! { x: lon + dlon, y: lat + dlat };
            let approximator = DistanceApproximator::new(a);

            let approximate = approximator.distance_squared(b).sqrt();
            let haversine_dist = Haversine.distance(a.into(), b.into());

            // Within 1% of the haversine distance over snapping-scale
            // separations, even at high latitudes.
            let delta = (approximate - haversine_dist).abs();
            prop_assert!(
                delta <= haversine_dist * 0.01 + 1e-6,
                "expected {approximate} within 1% of {haversine_dist}"
            );
        }
    }
}
