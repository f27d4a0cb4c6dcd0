//! # Snapping
//!
//! Projects the center of a search box onto the closest acceptable edge,
//! yielding a [`SnapPoint`]: the edge's canonical id plus a 16-bit offset
//! along it (0 at the edge's first vertex, `u16::MAX` at its second).
//!
//! Candidates are gathered by walking every edge with at least one vertex
//! inside the box, comparing squared planar distances against the box
//! center. Within an edge, both the shape's vertices and the orthogonal
//! projections onto its segments compete; a vertex candidate wins over a
//! projection only when it is strictly closer.

use mosaic_graph::spatial::DistanceApproximator;
use mosaic_graph::{EdgeEnumerator, EdgeId, RoutingNetwork};
use geo::{Coord, Distance, Haversine, Point, Rect};
use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Distances at or below this are treated as an exact hit: the search
/// stops looking at further edges.
pub const EXACT_TOLERANCE_M: f64 = 1.0;

/// A point on an edge: the edge's canonical id plus a 16-bit offset along
/// it (`0` at the edge's first vertex, `u16::MAX` at its second).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct SnapPoint {
    pub edge_id: EdgeId,
    pub offset: u16,
}

impl SnapPoint {
    #[inline]
    pub const fn new(edge_id: EdgeId, offset: u16) -> Self {
        Self { edge_id, offset }
    }

    /// The fractional position along the edge, in `[0, 1]`.
    #[inline]
    pub fn offset_factor(self) -> f64 {
        f64::from(self.offset) / f64::from(u16::MAX)
    }
}

/// An edge-acceptance predicate, consulted at most once per edge with the
/// enumerator positioned on it.
pub type Acceptable<'a> = &'a dyn Fn(&EdgeEnumerator<'_>) -> bool;

/// The best candidate found on a single edge.
struct EdgeCandidate {
    distance_sq: f64,
    offset_m: f64,
    length_m: f64,
    is_vertex: bool,
}

/// Scans one edge's geometry (traversal-oriented, endpoints included) for
/// the closest point to the approximator's center within `max_sq`.
fn best_on_edge(
    approximator: &DistanceApproximator,
    points: &[Coord<f64>],
    max_sq: f64,
) -> Option<EdgeCandidate> {
    let mut best: Option<EdgeCandidate> = None;
    let mut cumulative_m = 0.0;

    for i in 0..points.len() {
        if i > 0 {
            let segment_m =
                Haversine.distance(Point::from(points[i - 1]), Point::from(points[i]));

            // Orthogonal projection of the center onto this segment, in
            // local planar meters. The foot only counts when it falls
            // strictly inside the segment; the endpoints are handled as
            // vertex candidates.
            let (ax, ay) = approximator.delta_meters(points[i - 1]);
            let (bx, by) = approximator.delta_meters(points[i]);
            let (dx, dy) = (bx - ax, by - ay);
            let length_sq = dx * dx + dy * dy;
            if length_sq > 0.0 {
                let t = -(ax * dx + ay * dy) / length_sq;
                if t > 0.0 && t < 1.0 {
                    let (fx, fy) = (ax + t * dx, ay + t * dy);
                    let distance_sq = fx * fx + fy * fy;
                    let improves = distance_sq <= max_sq
                        && best.as_ref().is_none_or(|b| {
                            distance_sq < b.distance_sq
                                || (distance_sq == b.distance_sq && b.is_vertex)
                        });
                    if improves {
                        best = Some(EdgeCandidate {
                            distance_sq,
                            offset_m: cumulative_m + t * segment_m,
                            length_m: 0.0,
                            is_vertex: false,
                        });
                    }
                }
            }
            cumulative_m += segment_m;
        }

        let distance_sq = approximator.distance_squared(points[i]);
        if distance_sq <= max_sq
            && best.as_ref().is_none_or(|b| distance_sq < b.distance_sq)
        {
            best = Some(EdgeCandidate {
                distance_sq,
                offset_m: cumulative_m,
                length_m: 0.0,
                is_vertex: true,
            });
        }
    }

    best.map(|mut candidate| {
        candidate.length_m = cumulative_m;
        candidate
    })
}

/// Converts a candidate's position into the 16-bit offset convention.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_offset(candidate: &EdgeCandidate) -> u16 {
    if candidate.length_m <= 0.0 {
        return 0;
    }
    let raw = (candidate.offset_m / candidate.length_m * f64::from(u16::MAX)).floor();
    raw.clamp(0.0, f64::from(u16::MAX)) as u16
}

/// Finds the acceptable edge closest to the center of `rect`, within
/// `max_distance_m` meters.
///
/// Offsets are converted to the edge's canonical direction: when the edge
/// was walked against it (e.g. through a mirror record), the stored offset
/// is `u16::MAX - offset`.
pub fn snap_in_box(
    network: &RoutingNetwork,
    rect: &Rect<f64>,
    acceptable: Option<Acceptable<'_>>,
    max_distance_m: f64,
) -> Option<SnapPoint> {
    let approximator = DistanceApproximator::new(rect.center());
    let max_sq = max_distance_m * max_distance_m;
    let exact_sq = EXACT_TOLERANCE_M * EXACT_TOLERANCE_M;

    let mut visited: HashSet<EdgeId> = HashSet::new();
    let mut best: Option<(f64, SnapPoint)> = None;

    let mut enumerator = network.edge_enumerator();
    for (vertex, _) in network.search_vertices_in_box(rect) {
        if !enumerator.move_to(vertex) {
            continue;
        }
        while enumerator.move_next() {
            let edge = enumerator.edge_id();
            if edge.is_empty() || !visited.insert(edge) {
                continue;
            }
            let Some(points) = enumerator.shape() else {
                continue;
            };
            let Some(candidate) = best_on_edge(&approximator, &points, max_sq) else {
                continue;
            };
            if best
                .as_ref()
                .is_some_and(|(distance_sq, _)| candidate.distance_sq >= *distance_sq)
            {
                continue;
            }
            if let Some(accept) = acceptable
                && !accept(&enumerator)
            {
                continue;
            }

            let offset = to_offset(&candidate);
            let offset = if enumerator.forward() {
                offset
            } else {
                u16::MAX - offset
            };
            best = Some((candidate.distance_sq, SnapPoint::new(edge, offset)));

            if candidate.distance_sq <= exact_sq {
                return best.map(|(_, snap)| snap);
            }
        }
    }

    best.map(|(_, snap)| snap)
}

/// Like [`snap_in_box`], but yields the best candidate of *every*
/// acceptable edge in range (one snap per edge) instead of only the
/// overall winner.
///
/// With `projections_only`, edges whose best candidate is a shape vertex
/// rather than a projected foot are filtered out.
pub fn snap_all_in_box(
    network: &RoutingNetwork,
    rect: &Rect<f64>,
    acceptable: Option<Acceptable<'_>>,
    max_distance_m: f64,
    projections_only: bool,
) -> Vec<SnapPoint> {
    let approximator = DistanceApproximator::new(rect.center());
    let max_sq = max_distance_m * max_distance_m;

    let mut visited: HashSet<EdgeId> = HashSet::new();
    let mut snaps = Vec::new();

    let mut enumerator = network.edge_enumerator();
    for (vertex, _) in network.search_vertices_in_box(rect) {
        if !enumerator.move_to(vertex) {
            continue;
        }
        while enumerator.move_next() {
            let edge = enumerator.edge_id();
            if edge.is_empty() || !visited.insert(edge) {
                continue;
            }
            let Some(points) = enumerator.shape() else {
                continue;
            };
            let Some(candidate) = best_on_edge(&approximator, &points, max_sq) else {
                continue;
            };
            if projections_only && candidate.is_vertex {
                continue;
            }
            if let Some(accept) = acceptable
                && !accept(&enumerator)
            {
                continue;
            }

            let offset = to_offset(&candidate);
            let offset = if enumerator.forward() {
                offset
            } else {
                u16::MAX - offset
            };
            snaps.push(SnapPoint::new(edge, offset));
        }
    }

    snaps
}
