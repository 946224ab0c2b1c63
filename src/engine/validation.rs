// Structural and Delaunay checks for a triangle index buffer.
//
// A valid probe mesh has: index count divisible by 3, all indices in range,
// strictly CCW triangles, every point referenced, and every edge shared by
// at most two triangles in opposite directions. It is Delaunay when no
// shared edge has the opposite vertex of one triangle strictly inside the
// circumcircle of the other.

use std::collections::HashMap;
use glam::{DVec2, Vec2};
use log::warn;
use super::delaunay::circumcircle;

/// Relative slack for the circumcircle test so cocircular quads pass.
const CIRCLE_TOLERANCE: f64 = 1e-9;

/// Canonical key for an undirected edge: always (min, max).
fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Directed occurrences of one undirected edge.
#[derive(Default)]
struct EdgeUse {
    /// (triangle, index of the vertex opposite the edge, edge runs min->max)
    uses: Vec<(usize, u32, bool)>,
}

/// Internal edge whose flip would improve the triangulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalEdge {
    pub edge: (u32, u32),
    /// The vertex that lies inside the neighbouring circumcircle.
    pub opposite: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangulationReport {
    pub triangle_count: usize,
    /// Index count was not a multiple of 3.
    pub ragged_indices: bool,
    pub out_of_range_indices: usize,
    /// Triangles with zero or negative signed area.
    pub non_ccw_triangles: usize,
    pub unreferenced_points: usize,
    pub boundary_edges: usize,
    pub internal_edges: usize,
    /// Edges used more than twice, or twice in the same direction.
    pub non_manifold_edges: usize,
    pub illegal_edges: Vec<IllegalEdge>,
}

impl TriangulationReport {
    pub fn build(points: &[Vec2], indices: &[u32]) -> Self {
        let mut report = TriangulationReport {
            ragged_indices: indices.len() % 3 != 0,
            ..Default::default()
        };

        let mut referenced = vec![false; points.len()];
        let mut edges: HashMap<(u32, u32), EdgeUse> = HashMap::new();
        let mut circles = Vec::new();

        for (ti, tri) in indices.chunks_exact(3).enumerate() {
            report.triangle_count += 1;
            if tri.iter().any(|&i| i as usize >= points.len()) {
                report.out_of_range_indices += 1;
                circles.push(None);
                continue;
            }
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| points[i as usize].as_dvec2());
            if (b - a).perp_dot(c - a) <= 0.0 {
                report.non_ccw_triangles += 1;
            }
            circles.push(circumcircle(a, b, c));

            for k in 0..3 {
                referenced[tri[k] as usize] = true;
                let (from, to) = (tri[k], tri[(k + 1) % 3]);
                edges
                    .entry(edge_key(from, to))
                    .or_default()
                    .uses
                    .push((ti, tri[(k + 2) % 3], from < to));
            }
        }

        report.unreferenced_points = referenced.iter().filter(|r| !**r).count();

        let point = |i: u32| -> DVec2 { points[i as usize].as_dvec2() };
        for (&key, edge) in &edges {
            match edge.uses.as_slice() {
                [_] => report.boundary_edges += 1,
                [(t0, o0, d0), (t1, o1, d1)] if d0 != d1 => {
                    report.internal_edges += 1;
                    let inside = |t: usize, o: u32| {
                        circles[t].is_some_and(|(center, r2): (DVec2, f64)| {
                            center.distance_squared(point(o)) < r2 * (1.0 - CIRCLE_TOLERANCE)
                        })
                    };
                    if inside(*t0, *o1) {
                        report.illegal_edges.push(IllegalEdge { edge: key, opposite: *o1 });
                    } else if inside(*t1, *o0) {
                        report.illegal_edges.push(IllegalEdge { edge: key, opposite: *o0 });
                    }
                }
                _ => report.non_manifold_edges += 1,
            }
        }
        report.illegal_edges.sort_by_key(|e| e.edge);
        report
    }

    /// Structurally sound: consistent winding, manifold, covers every point.
    pub fn is_valid(&self) -> bool {
        !self.ragged_indices
            && self.out_of_range_indices == 0
            && self.non_ccw_triangles == 0
            && self.unreferenced_points == 0
            && self.non_manifold_edges == 0
    }

    pub fn is_delaunay(&self) -> bool {
        self.is_valid() && self.illegal_edges.is_empty()
    }

    /// Log every illegal edge at warn level. Returns how many were logged.
    pub fn log_illegal_edges(&self) -> usize {
        for e in &self.illegal_edges {
            warn!(
                "Edge {}-{} is not locally Delaunay (vertex {} inside circumcircle)",
                e.edge.0, e.edge.1, e.opposite
            );
        }
        self.illegal_edges.len()
    }
}
