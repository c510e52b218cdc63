use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::config::GenerationSettings;
use crate::data::mesh::{Face, Footprint, MeshBuffer, FACADE_MATERIAL, ROOF_MATERIAL};
use crate::data::osm::Tags;
use crate::errors::{Error, Result};
use crate::presets::Preset;
use crate::rules::Rule;

use super::outline::Outline;
use super::tessellate::fill_ring;
use super::{planar_uvs, write_positions, SynthesisMode, Synthesizer};

const UNIT_SCALES: [(&str, f64); 5] = [("", 1.0), ("m", 1.0), ("ft", 0.305), ("'", 0.305), ("feet", 0.305)];

static LENGTH: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^\s*([-+]?\d+(?:\.\d+)?)\s*([a-zA-Z']*)\s*$"));

/// Parses a length tag such as `9`, `9m`, `9 m` or `30 ft` into metres.
pub fn parse_meters(value: &str) -> Result<f64> {
    let re = LENGTH.as_ref().map_err(Clone::clone)?;
    let caps = re.captures(value)
        .ok_or_else(|| Error::parse(format!("not a length: {:?}", value)))?;
    let size: f64 = caps[1].parse()?;
    let unit = caps[2].to_lowercase();
    UNIT_SCALES.iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, scale)| size * scale)
        .ok_or_else(|| Error::parse(format!("unknown unit {:?}", unit)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildingParams {
    pub height: f64,
    pub levels: f64,
    pub level_height: f64,
    /// Number of levels one facade texture repeat covers.
    pub texture_levels: u32,
    pub roof_texture_scale: f64,
}

impl BuildingParams {
    /// Height from the `height` tag, else levels from `building:levels`, the
    /// rule, the preset or the global default, times the level height.
    pub fn resolve(tags: &Tags, rule: &Rule, preset: &Preset, settings: &GenerationSettings) -> Self {
        let level_height = rule.setting_f64("level_height")
            .or(preset.level_height)
            .unwrap_or(settings.building_level_height);
        let texture_levels = preset.texture_levels.unwrap_or(settings.texture_levels).max(1);
        let roof_texture_scale = preset.texture_scale.unwrap_or(settings.roof_texture_scale);

        let explicit_height = tags.get("height").and_then(|value| match parse_meters(value) {
            Ok(height) if height > 0.0 => Some(height),
            _ => {
                debug!(value = value.as_str(); "Ignoring unusable height tag");
                None
            },
        });

        let (height, levels) = match explicit_height {
            Some(height) => (height, height / level_height),
            None => {
                let levels = tags.get("building:levels")
                    .and_then(|value| value.trim().parse::<f64>().ok())
                    .filter(|levels| *levels > 0.0)
                    .or_else(|| rule.setting_f64("levels"))
                    .or(preset.default_levels)
                    .unwrap_or(settings.building_default_levels);
                (levels * level_height, levels)
            },
        };

        BuildingParams {
            height,
            levels,
            level_height,
            texture_levels,
            roof_texture_scale,
        }
    }
}

/// Vertical prism with a flat roof cap.
pub struct BuildingSynthesizer;

impl Synthesizer for BuildingSynthesizer {
    type Params = BuildingParams;

    fn synthesize(&self, outline: &Outline, params: &BuildingParams, mode: SynthesisMode, mesh: &mut MeshBuffer) -> Result<Footprint> {
        if !outline.closed {
            return Err(Error::geometry("building outline is not closed"));
        }
        let count = outline.len();
        if count < 3 {
            return Err(Error::geometry(format!("building needs 3 corners, got {}", count)));
        }

        // Base ring first, the top ring follows at +height.
        let mut positions: Vec<[f64; 3]> = outline.local.iter().map(|p| p.to_array()).collect();
        positions.extend(outline.local.iter().map(|p| [p.x, p.y, p.z + params.height]));

        write_positions(mode, mesh, positions, || {
            let n = count as u32;
            let mut faces: Vec<Face> = (0..n)
                .map(|i| {
                    let j = (i + 1) % n;
                    Face::new(vec![i, j, j + n, i + n], FACADE_MATERIAL)
                })
                .collect();
            for roof in fill_ring(&outline.ring_2d())? {
                faces.push(Face::new(roof.iter().map(|idx| idx + n).collect(), ROOF_MATERIAL));
            }
            Ok(faces)
        })?;

        mesh.uvs.clear();
        let texture_height = params.levels / params.texture_levels as f64;
        let level_span = params.level_height * params.texture_levels as f64;
        let mut u = 0.0;
        for face in mesh.faces.iter().filter(|face| face.material == FACADE_MATERIAL) {
            let a = mesh.vertex(face.vertices[0]);
            let b = mesh.vertex(face.vertices[1]);
            let face_width = (b - a).truncate().length();
            let width = face_width / level_span;
            mesh.uvs.extend_from_slice(&[
                [u, 0.0],
                [u + width, 0.0],
                [u + width, texture_height],
                [u, texture_height],
            ]);
            u += width;
        }
        let mut roof_uvs = Vec::new();
        planar_uvs(mesh, params.roof_texture_scale, &mut roof_uvs, |face| face.material == ROOF_MATERIAL);
        mesh.uvs.extend(roof_uvs);

        Ok(Footprint::from_mesh(mesh, outline.origin, |face| face.material == ROOF_MATERIAL))
    }
}
