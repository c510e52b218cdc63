use glam::DVec3;

use crate::errors::{Error, Result};

pub const FACADE_MATERIAL: u8 = 0;
pub const ROOF_MATERIAL: u8 = 1;

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone, PartialEq)]
pub struct Face {
    pub vertices: Vec<u32>,
    /// Material slot index on the host object.
    pub material: u8,
}

impl Face {
    pub fn new(vertices: Vec<u32>, material: u8) -> Self {
        Face { vertices, material }
    }
}

/// Host agnostic mesh. Positions are relative to the geometry's local origin,
/// `uvs` holds one coordinate per face corner in face order.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone, PartialEq)]
pub struct MeshBuffer {
    pub vertices: Vec<[f64; 3]>,
    pub edges: Vec<[u32; 2]>,
    pub faces: Vec<Face>,
    pub uvs: Vec<[f64; 2]>,
}

impl MeshBuffer {
    pub fn vertex(&self, idx: u32) -> DVec3 {
        DVec3::from_array(self.vertices[idx as usize])
    }

    pub fn corner_count(&self) -> usize {
        self.faces.iter().map(|face| face.vertices.len()).sum()
    }

    /// Unique face boundary edges in order of first appearance.
    pub fn derive_edges(&mut self) {
        let mut edges: Vec<[u32; 2]> = Vec::new();
        for face in &self.faces {
            let count = face.vertices.len();
            for i in 0..count {
                let a = face.vertices[i];
                let b = face.vertices[(i + 1) % count];
                let key = [a.min(b), a.max(b)];
                if !edges.contains(&key) {
                    edges.push(key);
                }
            }
        }
        self.edges = edges;
    }

    /// Surface area of a face in 3D (Newell's method, valid for planar polygons).
    pub fn face_area(&self, face: &Face) -> f64 {
        let count = face.vertices.len();
        let mut normal = DVec3::ZERO;
        for i in 0..count {
            let a = self.vertex(face.vertices[i]);
            let b = self.vertex(face.vertices[(i + 1) % count]);
            normal += a.cross(b);
        }
        normal.length() / 2.0
    }

    /// Overwrites vertex positions of an already built mesh. Topology is left alone.
    pub fn refresh_vertices(&mut self, positions: &[[f64; 3]]) -> Result<()> {
        if positions.len() != self.vertices.len() {
            return Err(Error::geometry(format!(
                "refresh expected {} vertices, got {}",
                self.vertices.len(),
                positions.len(),
            )));
        }
        self.vertices.copy_from_slice(positions);
        Ok(())
    }

    /// Appends `other` with its vertices shifted by `offset`.
    pub fn append_translated(&mut self, other: &MeshBuffer, offset: DVec3) {
        let base = self.vertices.len() as u32;
        self.vertices.extend(
            other.vertices.iter().map(|v| (DVec3::from_array(*v) + offset).to_array())
        );
        self.edges.extend(other.edges.iter().map(|[a, b]| [a + base, b + base]));
        self.faces.extend(other.faces.iter().map(|face| Face {
            vertices: face.vertices.iter().map(|v| v + base).collect(),
            material: face.material,
        }));
        self.uvs.extend_from_slice(&other.uvs);
    }

    pub fn bounds(&self) -> Option<(DVec3, DVec3)> {
        let first = DVec3::from_array(*self.vertices.first()?);
        Some(self.vertices.iter().fold((first, first), |(min, max), v| {
            let v = DVec3::from_array(*v);
            (min.min(v), max.max(v))
        }))
    }
}

/// Horizontal shape of a synthesized geometry in world coordinates.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone, PartialEq)]
pub struct Footprint {
    pub min: [f64; 2],
    pub max: [f64; 2],
    pub polygons: Vec<Vec<[f64; 2]>>,
    /// Sum of the planar areas of `polygons`.
    pub area: f64,
}

impl Footprint {
    /// Projects the faces selected by `include` onto the ground plane. Meshes
    /// without faces fall back to the bounding box of all vertices.
    pub fn from_mesh(mesh: &MeshBuffer, origin: DVec3, include: impl Fn(&Face) -> bool) -> Self {
        let polygons: Vec<Vec<[f64; 2]>> = mesh.faces.iter()
            .filter(|face| include(face))
            .map(|face| {
                face.vertices.iter()
                    .map(|idx| {
                        let world = mesh.vertex(*idx) + origin;
                        [world.x, world.y]
                    })
                    .collect()
            })
            .collect();

        let area = polygons.iter().map(|polygon| planar_area(polygon).abs()).sum();

        let points: Vec<[f64; 2]> = if polygons.is_empty() {
            mesh.vertices.iter().map(|v| [v[0] + origin.x, v[1] + origin.y]).collect()
        } else {
            polygons.iter().flatten().copied().collect()
        };

        let mut min = [f64::INFINITY; 2];
        let mut max = [f64::NEG_INFINITY; 2];
        for point in &points {
            for axis in 0..2 {
                min[axis] = min[axis].min(point[axis]);
                max[axis] = max[axis].max(point[axis]);
            }
        }
        if points.is_empty() {
            min = [0.0; 2];
            max = [0.0; 2];
        }

        Footprint { min, max, polygons, area }
    }

    pub fn bounds_overlap(&self, other: &Footprint) -> bool {
        self.min[0] < other.max[0]
            && self.max[0] > other.min[0]
            && self.min[1] < other.max[1]
            && self.max[1] > other.min[1]
    }

    pub fn contains_point(&self, point: [f64; 2]) -> bool {
        self.polygons.iter().any(|polygon| point_in_polygon(point, polygon))
    }

    pub fn points(&self) -> impl Iterator<Item = &[f64; 2]> {
        self.polygons.iter().flatten()
    }
}

/// Signed shoelace area, positive for counter-clockwise polygons.
pub fn planar_area(polygon: &[[f64; 2]]) -> f64 {
    let count = polygon.len();
    let mut sum = 0.0;
    for i in 0..count {
        let [x1, y1] = polygon[i];
        let [x2, y2] = polygon[(i + 1) % count];
        sum += x1 * y2 - x2 * y1;
    }
    sum / 2.0
}

/// Even-odd ray casting test.
pub fn point_in_polygon(point: [f64; 2], polygon: &[[f64; 2]]) -> bool {
    let [px, py] = point;
    let count = polygon.len();
    let mut inside = false;
    let mut j = count.wrapping_sub(1);
    for i in 0..count {
        let [xi, yi] = polygon[i];
        let [xj, yj] = polygon[j];
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn unit_quad() -> MeshBuffer {
        let mut mesh = MeshBuffer {
            vertices: vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [2.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            faces: vec![Face::new(vec![0, 1, 2, 3], 0)],
            ..Default::default()
        };
        mesh.derive_edges();
        mesh
    }

    #[test]
    fn edges_are_unique() {
        let mut mesh = unit_quad();
        mesh.faces.push(Face::new(vec![0, 2, 3], 0));
        mesh.derive_edges();
        assert_eq!(mesh.edges, vec![[0, 1], [1, 2], [2, 3], [0, 3], [0, 2]]);
    }

    #[test]
    fn footprint_is_in_world_space() {
        let mesh = unit_quad();
        let footprint = Footprint::from_mesh(&mesh, DVec3::new(10.0, 20.0, 5.0), |_| true);
        assert_eq!(footprint.min, [10.0, 20.0]);
        assert_eq!(footprint.max, [12.0, 21.0]);
        assert_relative_eq!(footprint.area, 2.0);
        assert!(footprint.contains_point([11.0, 20.5]));
        assert!(!footprint.contains_point([13.0, 20.5]));
    }

    #[test]
    fn face_area_handles_vertical_faces() {
        let mesh = MeshBuffer {
            vertices: vec![[0.0, 0.0, 0.0], [3.0, 0.0, 0.0], [3.0, 0.0, 2.0], [0.0, 0.0, 2.0]],
            faces: vec![Face::new(vec![0, 1, 2, 3], 0)],
            ..Default::default()
        };
        assert_relative_eq!(mesh.face_area(&mesh.faces[0]), 6.0);
    }

    #[test]
    fn refresh_rejects_other_topologies() {
        let mut mesh = unit_quad();
        assert!(mesh.refresh_vertices(&[[0.0; 3]; 3]).is_err());
        mesh.refresh_vertices(&[[1.0; 3]; 4]).unwrap();
        assert_eq!(mesh.vertices[2], [1.0; 3]);
        assert_eq!(mesh.faces.len(), 1);
    }

    #[test]
    fn shoelace_sign_follows_winding() {
        let ccw = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        assert_relative_eq!(planar_area(&ccw), 1.0);
        let cw: Vec<[f64; 2]> = ccw.iter().rev().copied().collect();
        assert_relative_eq!(planar_area(&cw), -1.0);
    }
}
