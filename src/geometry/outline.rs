use glam::DVec3;

use crate::data::mesh::{Footprint, MeshBuffer};
use crate::data::osm::{Node, Way};
use crate::errors::{Error, Result};

use super::{SynthesisMode, Synthesizer};

/// Normalized boundary of a way: winding fixed, per vertex normals resolved,
/// coordinates relative to the centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct Outline {
    pub closed: bool,
    /// Centroid of the member nodes, the geometry's local origin.
    pub origin: DVec3,
    pub points: Vec<DVec3>,
    pub local: Vec<DVec3>,
    pub normals: Vec<DVec3>,
    pub edges: Vec<[usize; 2]>,
    /// Node table index for every point.
    pub nodes: Vec<usize>,
}

/// Signed shoelace test on the ground plane. Degenerate rings are not clockwise.
pub fn is_clockwise(points: &[DVec3]) -> bool {
    let count = points.len();
    let mut sum = 0.0;
    for i in 0..count {
        let a = points[i];
        let b = points[(i + 1) % count];
        sum += a.x * b.y - b.x * a.y;
    }
    sum < 0.0
}

impl Outline {
    /// Builds the outline of `way`, reversing its node order in place when a
    /// closed ring winds clockwise.
    pub fn build(way: &mut Way, nodes: &[Node]) -> Result<Outline> {
        let raw: Vec<[f64; 3]> = way.nodes.iter().map(|idx| nodes[*idx].co).collect();
        let closed = raw.len() > 1 && raw.first() == raw.last();
        let ring_len = if closed { raw.len() - 1 } else { raw.len() };

        let ring: Vec<DVec3> = raw[..ring_len].iter().map(|co| DVec3::from_array(*co)).collect();
        if closed && is_clockwise(&ring) {
            way.nodes.reverse();
        }

        let points: Vec<DVec3> = way.nodes[..ring_len].iter()
            .map(|idx| DVec3::from_array(nodes[*idx].co))
            .collect();
        Outline::from_ring(points, way.nodes[..ring_len].to_vec(), closed)
    }

    /// Outline from raw coordinates, a repeated first point closes the ring.
    /// Node indices are the point positions.
    pub fn from_points(raw: &[[f64; 3]]) -> Result<Outline> {
        let closed = raw.len() > 1 && raw.first() == raw.last();
        let ring_len = if closed { raw.len() - 1 } else { raw.len() };
        let mut points: Vec<DVec3> = raw[..ring_len].iter().map(|co| DVec3::from_array(*co)).collect();
        let mut nodes: Vec<usize> = (0..ring_len).collect();
        if closed && is_clockwise(&points) {
            points.reverse();
            nodes.reverse();
        }
        Outline::from_ring(points, nodes, closed)
    }

    fn from_ring(points: Vec<DVec3>, nodes: Vec<usize>, closed: bool) -> Result<Outline> {
        let count = points.len();
        if count < 2 {
            return Err(Error::geometry(format!("outline needs 2 points, got {}", count)));
        }

        let origin = points.iter().copied().sum::<DVec3>() / count as f64;
        let local = points.iter().map(|point| *point - origin).collect();

        let normals = (0..count)
            .map(|i| {
                let prev = if i > 0 {
                    points[i - 1]
                } else if closed {
                    points[count - 1]
                } else {
                    points[i]
                };
                let next = if i + 1 < count {
                    points[i + 1]
                } else if closed {
                    points[0]
                } else {
                    points[i]
                };
                let direction = prev - next;
                DVec3::new(direction.x, direction.y, 0.0).normalize_or_zero().cross(DVec3::Z)
            })
            .collect();

        let edge_count = if closed { count } else { count - 1 };
        let edges = (0..edge_count).map(|i| [i, (i + 1) % count]).collect();

        Ok(Outline {
            closed,
            origin,
            points,
            local,
            normals,
            edges,
            nodes,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Local ring on the ground plane.
    pub fn ring_2d(&self) -> Vec<[f64; 2]> {
        self.local.iter().map(|point| [point.x, point.y]).collect()
    }

    /// Whether point `i` ends an open path.
    pub fn is_endpoint(&self, i: usize) -> bool {
        !self.closed && (i == 0 || i + 1 == self.len())
    }

    /// Unit direction of travel at point `i`, on the ground plane.
    pub fn tangent(&self, i: usize) -> DVec3 {
        self.normals[i].cross(DVec3::Z)
    }
}

/// Edge-only mesh of the outline itself.
pub struct OutlineSynthesizer;

impl Synthesizer for OutlineSynthesizer {
    type Params = ();

    fn synthesize(&self, outline: &Outline, _params: &(), mode: SynthesisMode, mesh: &mut MeshBuffer) -> Result<Footprint> {
        let positions: Vec<[f64; 3]> = outline.local.iter().map(|point| point.to_array()).collect();
        match mode {
            SynthesisMode::Build => {
                mesh.vertices = positions;
                mesh.faces.clear();
                mesh.uvs.clear();
                mesh.edges = outline.edges.iter().map(|[a, b]| [*a as u32, *b as u32]).collect();
            },
            SynthesisMode::Refresh => mesh.refresh_vertices(&positions)?,
        }
        Ok(Footprint::from_mesh(mesh, outline.origin, |_| true))
    }
}
