use crate::data::mesh::planar_area;
use crate::errors::{Error, Result};

const EPSILON: f64 = 1e-12;

fn distinct_count(ring: &[[f64; 2]]) -> usize {
    let mut seen: Vec<[f64; 2]> = Vec::with_capacity(ring.len());
    for point in ring {
        if !seen.contains(point) {
            seen.push(*point);
        }
    }
    seen.len()
}

fn is_convex(ring: &[[f64; 2]]) -> bool {
    let count = ring.len();
    let mut sign = 0.0;
    for i in 0..count {
        let [ax, ay] = ring[i];
        let [bx, by] = ring[(i + 1) % count];
        let [cx, cy] = ring[(i + 2) % count];
        let cross = (bx - ax) * (cy - by) - (by - ay) * (cx - bx);
        if cross.abs() < EPSILON {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// Fills a simple ring. Triangles and convex quads stay a single face, anything
/// else is ear clipped. All faces wind counter-clockwise (facing up).
pub fn fill_ring(ring: &[[f64; 2]]) -> Result<Vec<Vec<u32>>> {
    if distinct_count(ring) < 3 {
        return Err(Error::geometry(format!("fill needs 3 distinct points, got {}", distinct_count(ring))));
    }
    let area = planar_area(ring);
    if area.abs() < EPSILON {
        return Err(Error::geometry("fill of a zero area polygon"));
    }

    if ring.len() == 3 || (ring.len() == 4 && is_convex(ring)) {
        let mut face: Vec<u32> = (0..ring.len() as u32).collect();
        if area < 0.0 {
            face.reverse();
        }
        return Ok(vec![face]);
    }

    let coords: Vec<f64> = ring.iter().flat_map(|[x, y]| [*x, *y]).collect();
    let indices = earcutr::earcut(&coords, &[], 2)
        .map_err(|err| Error::geometry(format!("triangulation failed: {:?}", err)))?;
    if indices.is_empty() {
        return Err(Error::geometry("triangulation produced no faces"));
    }

    Ok(indices.chunks(3)
        .map(|tri| {
            let corners = [ring[tri[0]], ring[tri[1]], ring[tri[2]]];
            let face = vec![tri[0] as u32, tri[1] as u32, tri[2] as u32];
            if planar_area(&corners) < 0.0 {
                face.into_iter().rev().collect()
            } else {
                face
            }
        })
        .collect())
}
