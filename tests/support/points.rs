#![allow(dead_code)]

use glam::{DVec2, Vec2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Seed triangle enclosing every point from [`random_interior_points`].
pub const SEED_TRIANGLE: [Vec2; 3] = [
    Vec2::new(-100.0, -100.0),
    Vec2::new(100.0, -100.0),
    Vec2::new(0.0, 120.0),
];

/// `n` points: the seed triangle followed by `n - 3` random points strictly
/// inside it, so every insertion after the seed is a split.
pub fn random_interior_points(n: usize, seed: u64) -> Vec<Vec2> {
    let mut rng = StdRng::seed_from_u64(seed);
    let [a, b, c] = SEED_TRIANGLE;
    let mut points = SEED_TRIANGLE.to_vec();
    while points.len() < n {
        let (mut u, mut v): (f32, f32) = (rng.gen_range(0.02..0.98), rng.gen_range(0.02..0.98));
        if u + v > 0.98 {
            u = 1.0 - u;
            v = 1.0 - v;
        }
        if u + v > 0.98 || u < 0.02 || v < 0.02 {
            continue;
        }
        points.push(a + (b - a) * u + (c - a) * v);
    }
    points
}

/// Random probe heights on top of ground points, as (x, y, z).
pub fn lift(points: &[Vec2], seed: u64) -> Vec<glam::Vec3> {
    let mut rng = StdRng::seed_from_u64(seed);
    points
        .iter()
        .map(|p| glam::Vec3::new(p.x, rng.gen_range(0.5..2.0), p.y))
        .collect()
}

/// `n`×`n` lattice with the given spacing. Three corners come first so
/// they seed the mesh; the rest follow row by row.
pub fn grid_points(n: usize, spacing: f32) -> Vec<Vec2> {
    let far = (n - 1) as f32 * spacing;
    let mut points = vec![Vec2::ZERO, Vec2::new(far, 0.0), Vec2::new(0.0, far)];
    for y in 0..n {
        for x in 0..n {
            let p = Vec2::new(x as f32 * spacing, y as f32 * spacing);
            if !points.contains(&p) {
                points.push(p);
            }
        }
    }
    points
}

/// Distinct points in the square [-50, 50]², inserted in random order
/// after three fixed corners. With `snap`, points land on a 5-unit lattice
/// so many of them share rows, columns and hull edges.
pub fn random_square_points(n: usize, seed: u64, snap: bool) -> Vec<Vec2> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = vec![Vec2::new(-50.0, -50.0), Vec2::new(50.0, -50.0), Vec2::new(-50.0, 50.0)];
    for _ in 0..n {
        let mut p = Vec2::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0));
        if snap {
            p = (p / 5.0).round() * 5.0;
        }
        if !points.contains(&p) {
            points.push(p);
        }
    }
    points[3..].shuffle(&mut rng);
    points
}

/// Area of the convex hull of `points` (monotone chain).
pub fn convex_hull_area(points: &[Vec2]) -> f64 {
    let mut sorted: Vec<DVec2> = points.iter().map(|p| p.as_dvec2()).collect();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    sorted.dedup();

    let cross = |o: DVec2, a: DVec2, b: DVec2| (a - o).perp_dot(b - o);
    let mut hull: Vec<DVec2> = Vec::new();
    for pass in [sorted.clone(), sorted.iter().rev().copied().collect()] {
        let base = hull.len();
        for p in pass {
            while hull.len() >= base + 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
                hull.pop();
            }
            hull.push(p);
        }
        hull.pop();
    }
    let area: f64 = (0..hull.len()).map(|i| hull[i].perp_dot(hull[(i + 1) % hull.len()])).sum();
    0.5 * area
}
