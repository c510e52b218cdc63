//! Mesh synthesis from way outlines.

pub mod area;
pub mod barrier;
pub mod building;
pub mod outline;
pub mod tessellate;
pub mod trafficway;

use crate::data::mesh::{Face, Footprint, MeshBuffer};
use crate::errors::Result;

use self::outline::Outline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisMode {
    /// Allocate fresh topology.
    Build,
    /// Overwrite positions and UVs of a mesh built earlier from the same entity.
    Refresh,
}

pub trait Synthesizer {
    type Params;

    fn synthesize(
        &self,
        outline: &Outline,
        params: &Self::Params,
        mode: SynthesisMode,
        mesh: &mut MeshBuffer,
    ) -> Result<Footprint>;
}

/// Writes positions into `mesh`. Topology is only generated in build mode.
fn write_positions(
    mode: SynthesisMode,
    mesh: &mut MeshBuffer,
    positions: Vec<[f64; 3]>,
    topology: impl FnOnce() -> Result<Vec<Face>>,
) -> Result<()> {
    match mode {
        SynthesisMode::Build => {
            let faces = topology()?;
            mesh.vertices = positions;
            mesh.faces = faces;
            mesh.derive_edges();
        },
        SynthesisMode::Refresh => mesh.refresh_vertices(&positions)?,
    }
    Ok(())
}

/// Planar UV projection of every corner of the faces selected by `include`.
fn planar_uvs(mesh: &MeshBuffer, scale: f64, uvs: &mut Vec<[f64; 2]>, include: impl Fn(&Face) -> bool) {
    for face in mesh.faces.iter().filter(|face| include(face)) {
        for idx in &face.vertices {
            let [x, y, _] = mesh.vertices[*idx as usize];
            uvs.push([x * scale, y * scale]);
        }
    }
}
