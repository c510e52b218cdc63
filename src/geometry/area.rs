use crate::config::GenerationSettings;
use crate::data::mesh::{Face, Footprint, MeshBuffer, ROOF_MATERIAL};
use crate::errors::{Error, Result};
use crate::presets::Preset;
use crate::rules::Rule;

use super::outline::Outline;
use super::tessellate::fill_ring;
use super::{planar_uvs, write_positions, SynthesisMode, Synthesizer};

#[derive(Debug, Clone, PartialEq)]
pub struct AreaParams {
    pub texture_scale: f64,
}

impl AreaParams {
    pub fn resolve(rule: &Rule, preset: &Preset, settings: &GenerationSettings) -> Self {
        AreaParams {
            texture_scale: rule.setting_f64("texture_scale")
                .or(preset.texture_scale)
                .unwrap_or(settings.area_texture_scale),
        }
    }
}

/// Flat filled polygon at ground level.
pub struct AreaSynthesizer;

impl Synthesizer for AreaSynthesizer {
    type Params = AreaParams;

    fn synthesize(&self, outline: &Outline, params: &AreaParams, mode: SynthesisMode, mesh: &mut MeshBuffer) -> Result<Footprint> {
        if !outline.closed {
            return Err(Error::geometry("area outline is not closed"));
        }
        let positions = outline.local.iter().map(|point| point.to_array()).collect();
        write_positions(mode, mesh, positions, || {
            Ok(fill_ring(&outline.ring_2d())?
                .into_iter()
                .map(|face| Face::new(face, ROOF_MATERIAL))
                .collect())
        })?;

        let mut uvs = Vec::with_capacity(mesh.corner_count());
        planar_uvs(mesh, params.texture_scale, &mut uvs, |_| true);
        mesh.uvs = uvs;

        Ok(Footprint::from_mesh(mesh, outline.origin, |_| true))
    }
}
