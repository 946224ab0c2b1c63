// Incremental 2D Delaunay triangulation of probe ground positions.
//
// Points are inserted in order. Points 0, 1, 2 seed a single CCW triangle.
// Each later point either splits the triangle containing it into three,
// splits the edge it lies on (and the triangle across it) in two, or is
// fanned onto the boundary edges of the mesh that face it from outside.
// New edges are then legalized by edge flips against the
// empty-circumcircle property.
//
// Triangles live in an arena and refer to each other by index. Edge i of a
// triangle runs v[i] -> v[i+1]; adj[i] is the triangle across that edge.
//
// Legalization is a worklist of (triangle, edge slot) pairs. Each slot
// carries the index of the last insertion that tested it, so no edge is
// tested twice while one point is being inserted.
//
// "On a line" is decided relative to the edge length (LINE_EPS), so grid
// layouts with collinear rows split edges instead of building slivers.

use glam::{DVec2, Vec2};
use log::debug;
use super::error::GeometryError;

const NONE: usize = usize::MAX;

/// Distance from an edge's line, in edge lengths, below which a point
/// counts as on the line.
const LINE_EPS: f64 = 1e-6;

// ============================================================================
// GEOMETRY HELPERS
// ============================================================================

/// Circumcircle of a triangle as (center, radius²).
/// Returns `None` for collinear or coincident vertices.
pub(crate) fn circumcircle(v0: DVec2, v1: DVec2, v2: DVec2) -> Option<(DVec2, f64)> {
    let a = v0 - v2;
    let b = v1 - v2;
    let w = a.perp_dot(b);
    let scale = a.length_squared().max(b.length_squared());
    if w.abs() <= scale * 1e-12 {
        return None;
    }
    // center = v2 + ((|a|² b - |b|² a) rotated -90°) / (2w)
    let u = b * a.length_squared() - a * b.length_squared();
    let center = v2 + DVec2::new(u.y, -u.x) * (0.5 / w);
    Some((center, center.distance_squared(v2)))
}

/// Outward normal (unnormalized) of the directed edge a -> b of a CCW triangle.
#[inline]
fn outward_normal(a: DVec2, b: DVec2) -> DVec2 {
    let d = b - a;
    DVec2::new(d.y, -d.x)
}

/// Signed distance of `p` from the line a -> b in units of |b - a|;
/// positive on the outer side of a CCW triangle's edge.
fn edge_side(p: DVec2, a: DVec2, b: DVec2) -> f64 {
    let n = outward_normal(a, b);
    (p - a).dot(n) / n.length_squared()
}

/// Twice the signed area of (a, b, c).
#[inline]
fn orient(a: DVec2, b: DVec2, c: DVec2) -> f64 {
    (b - a).perp_dot(c - a)
}

/// Squared distance from `p` to the closed segment a-b.
fn segment_distance_sq(p: DVec2, a: DVec2, b: DVec2) -> f64 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq == 0.0 {
        return p.distance_squared(a);
    }
    let s = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance_squared(a + ab * s)
}

// ============================================================================
// ARENA
// ============================================================================

#[derive(Debug, Clone)]
struct Triangle {
    v: [usize; 3],
    adj: [usize; 3],
    /// Last insertion that tested each edge slot.
    stamp: [usize; 3],
    /// Cached circumcircle; `None` for a degenerate triangle.
    circle: Option<(DVec2, f64)>,
}

impl Triangle {
    /// Degenerate triangles have no circle and never trigger a flip.
    fn in_circle(&self, p: DVec2) -> bool {
        self.circle
            .is_some_and(|(center, radius_sq)| center.distance_squared(p) < radius_sq)
    }
}

/// Where an inserted point falls relative to one triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Inside,
    OnEdge(usize),
    OnVertex(usize),
    Outside,
}

#[inline]
fn next(i: usize) -> usize {
    (i + 1) % 3
}

#[inline]
fn prev(i: usize) -> usize {
    (i + 2) % 3
}

/// Result of a triangulation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Triangulation {
    /// Flat CCW index triples, in triangle creation order.
    pub indices: Vec<u32>,
    /// Number of edge flips performed during legalization.
    pub flips: usize,
}

impl Triangulation {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }
}

struct Triangulator {
    points: Vec<DVec2>,
    tris: Vec<Triangle>,
    flips: usize,
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Triangulate `points` incrementally in the given order.
///
/// Fails with [`GeometryError::InsufficientPoints`] for fewer than 3 points,
/// [`GeometryError::DegenerateSeed`] when points 0, 1, 2 are collinear, and
/// [`GeometryError::DuplicatePoint`] / [`GeometryError::NoCandidateTriangle`]
/// when a later point cannot be placed.
pub fn triangulate(points: &[Vec2]) -> Result<Triangulation, GeometryError> {
    if points.len() < 3 {
        return Err(GeometryError::InsufficientPoints(points.len()));
    }

    let mut tri = Triangulator {
        points: points.iter().map(|p| p.as_dvec2()).collect(),
        tris: Vec::with_capacity(2 * points.len()),
        flips: 0,
    };
    tri.seed()?;
    for index in 3..points.len() {
        tri.insert(index)?;
    }

    debug!(
        "Triangulated {} points into {} triangles ({} flips)",
        points.len(),
        tri.tris.len(),
        tri.flips
    );

    Ok(Triangulation {
        indices: tri
            .tris
            .iter()
            .flat_map(|t| t.v.map(|i| i as u32))
            .collect(),
        flips: tri.flips,
    })
}

// ============================================================================
// INSERTION
// ============================================================================

impl Triangulator {
    fn push(&mut self, v: [usize; 3]) -> usize {
        let circle = circumcircle(self.points[v[0]], self.points[v[1]], self.points[v[2]]);
        self.tris.push(Triangle { v, adj: [NONE; 3], stamp: [NONE; 3], circle });
        self.tris.len() - 1
    }

    /// Give triangle `t` new vertices, dropping its links.
    fn reset(&mut self, t: usize, v: [usize; 3]) {
        let circle = circumcircle(self.points[v[0]], self.points[v[1]], self.points[v[2]]);
        self.tris[t] = Triangle { v, adj: [NONE; 3], stamp: [NONE; 3], circle };
    }

    fn refresh_circle(&mut self, t: usize) {
        let [a, b, c] = self.tris[t].v;
        self.tris[t].circle = circumcircle(self.points[a], self.points[b], self.points[c]);
    }

    fn seed(&mut self) -> Result<(), GeometryError> {
        let [p0, p1, p2] = [self.points[0], self.points[1], self.points[2]];
        let cross = (p2 - p1).perp_dot(p0 - p1);
        if cross == 0.0 {
            return Err(GeometryError::DegenerateSeed);
        }
        let v = if cross > 0.0 { [0, 1, 2] } else { [0, 2, 1] };
        self.push(v);
        Ok(())
    }

    /// Slot of `n` whose edge is the reverse of edge `slot` of `t`.
    fn matching_slot(&self, t: usize, slot: usize, n: usize) -> Result<usize, GeometryError> {
        let a = self.tris[t].v[slot];
        let b = self.tris[t].v[next(slot)];
        let nv = self.tris[n].v;
        (0..3)
            .find(|&j| nv[j] == b && nv[next(j)] == a)
            .ok_or(GeometryError::BrokenAdjacency { triangle: t, neighbour: n })
    }

    /// Make `n` the neighbour across edge `slot` of `t`, and `t` the
    /// neighbour across the matching edge of `n`.
    fn link(&mut self, t: usize, slot: usize, n: usize) -> Result<(), GeometryError> {
        self.tris[t].adj[slot] = n;
        if n != NONE {
            let j = self.matching_slot(t, slot, n)?;
            self.tris[n].adj[j] = t;
        }
        Ok(())
    }

    fn side(&self, t: usize, slot: usize, p: DVec2) -> f64 {
        let v = self.tris[t].v;
        edge_side(p, self.points[v[slot]], self.points[v[next(slot)]])
    }

    /// Boundary edge `slot` of `t` with `p` strictly on its outer side.
    fn faces(&self, t: usize, slot: usize, p: DVec2) -> bool {
        self.tris[t].adj[slot] == NONE && self.side(t, slot, p) > LINE_EPS
    }

    fn locate(&self, t: usize, p: DVec2) -> Location {
        let sides = [0, 1, 2].map(|i| self.side(t, i, p));
        if sides.iter().any(|&s| s > LINE_EPS) {
            return Location::Outside;
        }
        let on_line = |i: usize| sides[i].abs() <= LINE_EPS;
        let v = self.tris[t].v;
        match (on_line(0), on_line(1), on_line(2)) {
            (false, false, false) => Location::Inside,
            (true, false, false) => Location::OnEdge(0),
            (false, true, false) => Location::OnEdge(1),
            (false, false, true) => Location::OnEdge(2),
            // two edges meet at the shared vertex
            (true, true, _) => Location::OnVertex(v[1]),
            (false, true, true) => Location::OnVertex(v[2]),
            (true, false, true) => Location::OnVertex(v[0]),
        }
    }

    fn insert(&mut self, index: usize) -> Result<(), GeometryError> {
        let p = self.points[index];

        let mut nearest: Option<(usize, usize, f64)> = None;
        for t in 0..self.tris.len() {
            match self.locate(t, p) {
                Location::Inside => return self.split(t, index),
                Location::OnEdge(slot) => return self.split_edge(t, slot, index),
                Location::OnVertex(of) => return Err(GeometryError::DuplicatePoint { index, of }),
                Location::Outside => {}
            }
            for slot in 0..3 {
                if !self.faces(t, slot, p) {
                    continue;
                }
                let a = self.points[self.tris[t].v[slot]];
                let b = self.points[self.tris[t].v[next(slot)]];
                let d = segment_distance_sq(p, a, b);
                if nearest.is_none_or(|(_, _, best)| d < best) {
                    nearest = Some((t, slot, d));
                }
            }
        }

        match nearest {
            Some((t, slot, _)) => self.attach(t, slot, index),
            None => Err(GeometryError::NoCandidateTriangle(index)),
        }
    }

    /// Replace triangle t = (a, b, c) by (a, b, P), (b, c, P), (c, a, P).
    fn split(&mut self, t: usize, index: usize) -> Result<(), GeometryError> {
        let [a, b, c] = self.tris[t].v;
        let [_, across_bc, across_ca] = self.tris[t].adj;

        let t0 = self.push([b, c, index]);
        let t1 = self.push([c, a, index]);
        self.tris[t].v = [a, b, index];
        self.refresh_circle(t);

        self.link(t0, 0, across_bc)?;
        self.link(t1, 0, across_ca)?;
        self.link(t, 1, t0)?;
        self.link(t, 2, t1)?;
        self.link(t0, 1, t1)?;

        self.legalize(vec![(t1, 0), (t0, 0), (t, 0)], index)
    }

    /// P lies on edge a -> b (slot `slot`) of t = (a, b, c): replace t by
    /// (a, P, c), (P, b, c), and the neighbour (b, a, q) across the edge, if
    /// any, by (b, P, q), (P, a, q).
    fn split_edge(&mut self, t: usize, slot: usize, index: usize) -> Result<(), GeometryError> {
        let tv = self.tris[t].v;
        let ta = self.tris[t].adj;
        let (a, b, c) = (tv[slot], tv[next(slot)], tv[prev(slot)]);
        let (across_bc, across_ca) = (ta[next(slot)], ta[prev(slot)]);

        let n = ta[slot];
        let neighbour = if n == NONE {
            None
        } else {
            let j = self.matching_slot(t, slot, n)?;
            let (nv, na) = (self.tris[n].v, self.tris[n].adj);
            Some((nv[prev(j)], na[next(j)], na[prev(j)]))
        };

        self.reset(t, [a, index, c]);
        let t0 = self.push([index, b, c]);
        self.link(t, 1, t0)?;
        self.link(t, 2, across_ca)?;
        self.link(t0, 1, across_bc)?;
        let mut work = vec![(t0, 1), (t, 2)];

        if let Some((q, across_aq, across_qb)) = neighbour {
            self.reset(n, [b, index, q]);
            let n0 = self.push([index, a, q]);
            self.link(n, 1, n0)?;
            self.link(n, 2, across_qb)?;
            self.link(n0, 1, across_aq)?;
            self.link(t, 0, n0)?;
            self.link(t0, 0, n)?;
            work.extend([(n0, 1), (n, 2)]);
        }

        self.legalize(work, index)
    }

    /// First boundary edge facing `p` that ends at `vertex` (or starts at
    /// it, when `ending` is false).
    fn boundary_edge_at(&self, vertex: usize, ending: bool, p: DVec2) -> Option<(usize, usize)> {
        (0..self.tris.len()).find_map(|u| {
            (0..3).find_map(|s| {
                let v = self.tris[u].v;
                let at = if ending { v[next(s)] } else { v[s] };
                (at == vertex && self.faces(u, s, p)).then_some((u, s))
            })
        })
    }

    /// Fan an outside point onto boundary edge `slot` of `t`, then keep
    /// fanning along the boundary in both directions while the next edge
    /// still faces P.
    fn attach(&mut self, t: usize, slot: usize, index: usize) -> Result<(), GeometryError> {
        let p = self.points[index];
        let start = self.tris[t].v[slot];
        let end = self.tris[t].v[next(slot)];

        let n0 = self.fan(t, slot, index)?;
        let mut work = vec![(n0, 0)];

        // backwards: edges x -> start; fan (start, x, P) shares start-P
        let (mut first, mut vertex) = (n0, start);
        while let Some((u, s)) = self.boundary_edge_at(vertex, true, p) {
            let x = self.tris[u].v[s];
            let n = self.fan(u, s, index)?;
            self.link(first, 1, n)?;
            work.push((n, 0));
            (first, vertex) = (n, x);
        }

        // forwards: edges end -> y; fan (y, end, P) shares end-P
        let (mut last, mut vertex) = (n0, end);
        while let Some((u, s)) = self.boundary_edge_at(vertex, false, p) {
            let y = self.tris[u].v[next(s)];
            let n = self.fan(u, s, index)?;
            self.link(last, 2, n)?;
            work.push((n, 0));
            (last, vertex) = (n, y);
        }

        self.legalize(work, index)
    }

    /// New triangle (end, start, P) on boundary edge `slot` of `t`.
    fn fan(&mut self, t: usize, slot: usize, index: usize) -> Result<usize, GeometryError> {
        let start = self.tris[t].v[slot];
        let end = self.tris[t].v[next(slot)];
        let n = self.push([end, start, index]);
        self.link(n, 0, t)?;
        Ok(n)
    }

    // ========================================================================
    // LEGALIZATION
    // ========================================================================

    /// Process the edge worklist for insertion `generation`.
    /// Entries are popped from the back.
    fn legalize(
        &mut self,
        mut work: Vec<(usize, usize)>,
        generation: usize,
    ) -> Result<(), GeometryError> {
        while let Some((t, i)) = work.pop() {
            if self.tris[t].stamp[i] == generation {
                continue;
            }
            self.tris[t].stamp[i] = generation;

            let n = self.tris[t].adj[i];
            if n == NONE {
                continue;
            }
            let j = self.matching_slot(t, i, n)?;
            self.tris[n].stamp[j] = generation;

            let q = self.tris[n].v[prev(j)];
            if !self.tris[t].in_circle(self.points[q]) {
                continue;
            }

            // Quad around the shared diagonal, CCW: q0 q1 (t's far side),
            // q2 (t's apex), q3 (n's apex).
            let tv = self.tris[t].v;
            let ta = self.tris[t].adj;
            let na = self.tris[n].adj;
            let (i1, i2) = (next(i), prev(i));
            let (j1, j2) = (next(j), prev(j));
            let quad = [tv[i1], tv[i2], tv[i], q];

            // only flip a strictly convex quad
            let [q0, q1, q2, q3] = quad.map(|k| self.points[k]);
            if orient(q3, q1, q2) <= 0.0 || orient(q1, q3, q0) <= 0.0 {
                continue;
            }
            let around = [ta[i1], ta[i2], na[j1], na[j2]];

            let mut nv = [0; 3];
            nv[j] = quad[1];
            nv[j1] = quad[3];
            nv[j2] = quad[0];
            self.tris[n].v = nv;
            let mut new_tv = [0; 3];
            new_tv[i] = quad[3];
            new_tv[i1] = quad[1];
            new_tv[i2] = quad[2];
            self.tris[t].v = new_tv;
            self.refresh_circle(t);
            self.refresh_circle(n);

            self.link(t, i1, around[1])?;
            self.link(t, i2, around[2])?;
            self.link(n, j1, around[3])?;
            self.link(n, j2, around[0])?;
            self.flips += 1;

            work.extend([(n, j2), (n, j1), (t, i2), (t, i1)]);
        }
        Ok(())
    }
}
