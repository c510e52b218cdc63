//! Tiles a repeatable module along an outline.

use glam::{DQuat, DVec3};
use log::{debug, warn};

use crate::data::mesh::{Face, MeshBuffer, FACADE_MATERIAL};
use crate::data::scene::ArrayInstance;
use crate::errors::{Error, Result};
use crate::geometry::outline::Outline;
use crate::host::CsgKernel;

const EPSILON: f64 = 1e-9;
/// Extra size of the trim volume beyond the module so it cuts cleanly.
const TRIM_MARGIN: f64 = 0.01;

/// Axis aligned box between `min` and `max`, faces pointing outward.
pub fn cuboid(min: DVec3, max: DVec3) -> MeshBuffer {
    let vertices = vec![
        [min.x, min.y, min.z],
        [max.x, min.y, min.z],
        [max.x, max.y, min.z],
        [min.x, max.y, min.z],
        [min.x, min.y, max.z],
        [max.x, min.y, max.z],
        [max.x, max.y, max.z],
        [min.x, max.y, max.z],
    ];
    let faces: Vec<Face> = [
        [0, 3, 2, 1],
        [4, 5, 6, 7],
        [0, 1, 5, 4],
        [1, 2, 6, 5],
        [2, 3, 7, 6],
        [3, 0, 4, 7],
    ]
    .iter()
    .map(|quad| Face::new(quad.to_vec(), FACADE_MATERIAL))
    .collect();
    let uvs = faces.iter()
        .flat_map(|_| [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])
        .collect();

    let mut mesh = MeshBuffer {
        vertices,
        faces,
        uvs,
        ..Default::default()
    };
    mesh.derive_edges();
    mesh
}

/// Module box of `[length, width, height]`, starting at the origin and tiling
/// along +X, centred on Y.
pub fn box_module(size: [f64; 3]) -> MeshBuffer {
    let [length, width, height] = size;
    cuboid(DVec3::new(0.0, -width / 2.0, 0.0), DVec3::new(length, width / 2.0, height))
}

/// `count` copies of `module`, `spacing` apart along +X.
pub fn repeat_linear(module: &MeshBuffer, count: u32, spacing: f64) -> MeshBuffer {
    let mut mesh = MeshBuffer::default();
    for i in 0..count {
        mesh.append_translated(module, DVec3::X * spacing * i as f64);
    }
    mesh
}

/// Instance mesh rotated by its heading and moved to its location.
pub fn place(instance: &ArrayInstance) -> MeshBuffer {
    let rotation = DQuat::from_rotation_z(instance.heading);
    let location = DVec3::from_array(instance.location);
    let mut mesh = instance.mesh.clone();
    for vertex in mesh.vertices.iter_mut() {
        *vertex = (rotation * DVec3::from_array(*vertex) + location).to_array();
    }
    mesh
}

pub struct LinearArrayGenerator<'a> {
    kernel: &'a dyn CsgKernel,
    module: MeshBuffer,
    tile_length: f64,
    bounds: (DVec3, DVec3),
}

impl<'a> LinearArrayGenerator<'a> {
    /// The tile length is the module's extent along X.
    pub fn new(kernel: &'a dyn CsgKernel, module: MeshBuffer) -> Result<Self> {
        let bounds = module.bounds()
            .ok_or_else(|| Error::geometry("array module has no vertices"))?;
        let tile_length = bounds.1.x - bounds.0.x;
        if tile_length < EPSILON {
            return Err(Error::geometry("array module has no extent along X"));
        }
        Ok(LinearArrayGenerator {
            kernel,
            module,
            tile_length,
            bounds,
        })
    }

    pub fn tile_length(&self) -> f64 {
        self.tile_length
    }

    /// One instance per distinct outline point, in the outline's local frame.
    pub fn generate(&self, outline: &Outline) -> Vec<ArrayInstance> {
        let mut points: Vec<DVec3> = Vec::with_capacity(outline.len());
        for point in &outline.local {
            if points.last().map_or(true, |last| last.distance(*point) > EPSILON) {
                points.push(*point);
            }
        }
        if outline.closed && points.len() > 1 && points[0].distance(points[points.len() - 1]) <= EPSILON {
            points.pop();
        }

        let count = points.len();
        (0..count)
            .map(|i| {
                let next = if i + 1 < count {
                    Some(points[i + 1])
                } else if outline.closed && count > 1 {
                    Some(points[0])
                } else {
                    None
                };
                match next {
                    Some(next) => self.segment(i, points[i], next),
                    None => ArrayInstance {
                        location: points[i].to_array(),
                        heading: 0.0,
                        count: 1,
                        spacing: self.tile_length,
                        mesh: self.module.clone(),
                    },
                }
            })
            .collect()
    }

    fn segment(&self, index: usize, from: DVec3, to: DVec3) -> ArrayInstance {
        let direction = to - from;
        let distance = direction.truncate().length();
        let heading = direction.y.atan2(direction.x);

        let mut instance = ArrayInstance {
            location: from.to_array(),
            heading,
            count: 1,
            spacing: self.tile_length,
            mesh: self.module.clone(),
        };
        if distance <= self.tile_length + EPSILON {
            return instance;
        }

        let count = (distance / self.tile_length - EPSILON).ceil() as u32;
        let repeated = repeat_linear(&self.module, count, self.tile_length);
        instance.count = count;

        let overshoot = count as f64 * self.tile_length - distance;
        if overshoot <= EPSILON {
            instance.mesh = repeated;
            return instance;
        }

        let (min, max) = self.bounds;
        let trim = cuboid(
            DVec3::new(min.x + distance, min.y - TRIM_MARGIN, min.z - TRIM_MARGIN),
            DVec3::new(
                min.x + count as f64 * self.tile_length + TRIM_MARGIN,
                max.y + TRIM_MARGIN,
                max.z + TRIM_MARGIN,
            ),
        );
        instance.mesh = match self.kernel.boolean_difference(&repeated, &trim) {
            Ok(trimmed) => {
                debug!(segment = index, tiles = count; "Trimmed array overshoot");
                trimmed
            },
            Err(err) => {
                warn!(segment = index, tiles = count; "Trim failed, keeping untrimmed tiles: {}", err);
                repeated
            },
        };
        instance
    }
}
