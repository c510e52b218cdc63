//! Narrow interfaces to the host application. The core never talks to a scene
//! graph directly.

use std::io::Write;

use crate::data::mesh::MeshBuffer;
use crate::errors::{Error, Result};
use crate::presets::Preset;

/// Receives finished geometry.
pub trait SceneHost {
    type Handle;

    fn create_object(&mut self, name: &str, mesh: &MeshBuffer, location: [f64; 3]) -> Result<Self::Handle>;
}

/// Looks up presets bound to a tag, highest priority first.
pub trait PresetResolver {
    fn resolve_preset(&self, tag_name: &str, tag_value: &str) -> Vec<(&Preset, u32)>;
}

/// Observability only, generation cannot be cancelled through it.
pub trait ProgressReporter {
    fn report_progress(&mut self, percent: f64, label: &str);
}

/// Constructive solid geometry provided by an external kernel.
pub trait CsgKernel {
    fn boolean_difference(&self, mesh: &MeshBuffer, subtrahend: &MeshBuffer) -> Result<MeshBuffer>;
}

/// Kernel for hosts without boolean support. Every call fails, so array
/// generation keeps its untrimmed repetition.
pub struct NoCsg;

impl CsgKernel for NoCsg {
    fn boolean_difference(&self, _mesh: &MeshBuffer, _subtrahend: &MeshBuffer) -> Result<MeshBuffer> {
        Err(Error::geometry("no CSG kernel available"))
    }
}

/// Writes every object as a named Wavefront OBJ group.
pub struct ObjSceneHost<W: Write> {
    writer: W,
    vertex_base: usize,
    uv_base: usize,
    objects: usize,
}

impl<W: Write> ObjSceneHost<W> {
    pub fn new(writer: W) -> Self {
        ObjSceneHost {
            writer,
            vertex_base: 1,
            uv_base: 1,
            objects: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> SceneHost for ObjSceneHost<W> {
    type Handle = usize;

    fn create_object(&mut self, name: &str, mesh: &MeshBuffer, location: [f64; 3]) -> Result<usize> {
        let name: String = name.chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect();
        writeln!(self.writer, "o {}", name)?;
        for [x, y, z] in &mesh.vertices {
            writeln!(self.writer, "v {} {} {}", x + location[0], y + location[1], z + location[2])?;
        }
        let textured = mesh.uvs.len() == mesh.corner_count();
        if textured {
            for [u, v] in &mesh.uvs {
                writeln!(self.writer, "vt {} {}", u, v)?;
            }
        }

        let mut corner = 0;
        for face in &mesh.faces {
            write!(self.writer, "f")?;
            for idx in &face.vertices {
                if textured {
                    write!(self.writer, " {}/{}", *idx as usize + self.vertex_base, corner + self.uv_base)?;
                } else {
                    write!(self.writer, " {}", *idx as usize + self.vertex_base)?;
                }
                corner += 1;
            }
            writeln!(self.writer)?;
        }
        if mesh.faces.is_empty() {
            for [a, b] in &mesh.edges {
                writeln!(self.writer, "l {} {}", *a as usize + self.vertex_base, *b as usize + self.vertex_base)?;
            }
        }

        self.vertex_base += mesh.vertices.len();
        if textured {
            self.uv_base += mesh.uvs.len();
        }
        let handle = self.objects;
        self.objects += 1;
        Ok(handle)
    }
}
