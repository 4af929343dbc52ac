//! Ear-clipping triangulation of planar-ish polygons.

use lumen_math::{Vec2, Vec3};

const EPSILON: f32 = 1e-10;

/// Triangulates one polygon given the positions of its vertices in order.
///
/// Emits triangles as triples of positions into `polygon` and keeps the
/// polygon's winding. Returns `false` if the ear search gave up before the
/// polygon was exhausted; the triangles emitted so far are kept.
pub fn triangulate(polygon: &[Vec3], out: &mut Vec<[usize; 3]>) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    if n == 3 {
        out.push([0, 1, 2]);
        return true;
    }

    let points = project(polygon);
    let area = signed_area(&points);
    let flipped = area < 0.0;

    // Work on a counter-clockwise index ring
    let mut ring: Vec<usize> = if flipped {
        (0..n).rev().collect()
    } else {
        (0..n).collect()
    };

    let mut nv = n;
    let mut budget = 2 * nv;
    let mut v = nv - 1;
    while nv > 2 {
        if budget == 0 {
            return false;
        }
        budget -= 1;

        let u = if v >= nv { 0 } else { v };
        v = if u + 1 >= nv { 0 } else { u + 1 };
        let w = if v + 1 >= nv { 0 } else { v + 1 };

        if is_ear(&points, &ring, u, v, w) {
            let (a, b, c) = (ring[u], ring[v], ring[w]);
            out.push(if flipped { [a, c, b] } else { [a, b, c] });
            ring.remove(v);
            nv -= 1;
            budget = 2 * nv;
        }
    }
    true
}

/// Drops the axis along which the polygon has the least projected area.
fn project(polygon: &[Vec3]) -> Vec<Vec2> {
    let areas = [
        signed_area_by(polygon, |p| Vec2::new(p.y, p.z)),
        signed_area_by(polygon, |p| Vec2::new(p.z, p.x)),
        signed_area_by(polygon, |p| Vec2::new(p.x, p.y)),
    ];
    let axis = if areas[0].abs() >= areas[1].abs() && areas[0].abs() >= areas[2].abs() {
        0
    } else if areas[1].abs() >= areas[2].abs() {
        1
    } else {
        2
    };
    polygon
        .iter()
        .map(|p| match axis {
            0 => Vec2::new(p.y, p.z),
            1 => Vec2::new(p.z, p.x),
            _ => Vec2::new(p.x, p.y),
        })
        .collect()
}

fn signed_area_by(polygon: &[Vec3], f: impl Fn(&Vec3) -> Vec2) -> f32 {
    let points: Vec<Vec2> = polygon.iter().map(f).collect();
    signed_area(&points)
}

fn signed_area(points: &[Vec2]) -> f32 {
    let n = points.len();
    let twice: f32 = (0..n)
        .map(|i| {
            let p = points[(i + n - 1) % n];
            let q = points[i];
            p.x * q.y - q.x * p.y
        })
        .sum();
    twice * 0.5
}

fn is_ear(points: &[Vec2], ring: &[usize], u: usize, v: usize, w: usize) -> bool {
    let a = points[ring[u]];
    let b = points[ring[v]];
    let c = points[ring[w]];

    // Reflex or degenerate corner
    if EPSILON > (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x) {
        return false;
    }

    !ring
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != u && i != v && i != w)
        .any(|(_, &p)| inside_triangle(a, b, c, points[p]))
}

fn inside_triangle(a: Vec2, b: Vec2, c: Vec2, p: Vec2) -> bool {
    let cross = |o: Vec2, d: Vec2, q: Vec2| (d - o).perp_dot(q - o);
    cross(a, b, p) >= 0.0 && cross(b, c, p) >= 0.0 && cross(c, a, p) >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_area(polygon: &[Vec3], tris: &[[usize; 3]]) -> f32 {
        tris.iter()
            .map(|t| {
                let (a, b, c) = (polygon[t[0]], polygon[t[1]], polygon[t[2]]);
                0.5 * (b - a).cross(c - a).length()
            })
            .sum()
    }

    fn normal_of(polygon: &[Vec3], t: &[usize; 3]) -> Vec3 {
        let (a, b, c) = (polygon[t[0]], polygon[t[1]], polygon[t[2]]);
        (b - a).cross(c - a)
    }

    #[test]
    fn test_unit_square() {
        let square = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let mut tris = Vec::new();
        assert!(triangulate(&square, &mut tris));
        assert_eq!(tris.len(), 2);
        assert!((total_area(&square, &tris) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l_shaped_hexagon() {
        let l = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(1.0, 2.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
        ];
        let mut tris = Vec::new();
        assert!(triangulate(&l, &mut tris));
        assert_eq!(tris.len(), 4);
        // Summed areas equal the polygon area only if nothing overlaps
        assert!((total_area(&l, &tris) - 3.0).abs() < 1e-5);
        for t in &tris {
            assert!(normal_of(&l, t).z > 0.0);
        }
    }

    #[test]
    fn test_clockwise_polygon_keeps_winding() {
        // Clockwise once projected onto the zx plane
        let quad = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        let expected = (quad[1] - quad[0]).cross(quad[2] - quad[0]).normalize();
        let mut tris = Vec::new();
        assert!(triangulate(&quad, &mut tris));
        assert_eq!(tris.len(), 2);
        for t in &tris {
            assert!(normal_of(&quad, t).normalize().dot(expected) > 0.99);
        }
    }

    #[test]
    fn test_collinear_polygon_gives_up() {
        let line = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 0.0),
        ];
        let mut tris = Vec::new();
        assert!(!triangulate(&line, &mut tris));
        assert!(tris.is_empty());
    }
}
