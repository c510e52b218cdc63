use std::collections::HashMap;

use glam::DVec3;

use crate::config::GenerationSettings;
use crate::data::mesh::{Face, Footprint, MeshBuffer, FACADE_MATERIAL};
use crate::data::osm::Tags;
use crate::errors::{Error, Result};
use crate::presets::{Preset, TrafficClass};
use crate::rules::Rule;

use super::outline::Outline;
use super::{write_positions, SynthesisMode, Synthesizer};

const MIN_SEGMENT: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct RibbonParams {
    pub width: f64,
    pub lanes: u32,
    /// Lanes covered by one texture repeat across the ribbon.
    pub texture_lanes: u32,
}

impl RibbonParams {
    /// Fixed preset width wins, cycleways and railways fall back to their
    /// class width, everything else is lanes x lane width.
    pub fn resolve_trafficway(tags: &Tags, rule: &Rule, preset: &Preset, settings: &GenerationSettings) -> Self {
        let lanes = tags.get("lanes")
            .and_then(|value| value.trim().parse::<u32>().ok())
            .or_else(|| rule.setting("lanes").and_then(|value| value.trim().parse().ok()))
            .or(preset.lanes)
            .unwrap_or(settings.default_lanes)
            .max(1);
        let texture_lanes = preset.texture_lanes.unwrap_or(settings.texture_lanes).max(1);
        let lane_width = rule.setting_f64("lane_width")
            .or(preset.lane_width)
            .unwrap_or(settings.lane_width);

        let width = rule.setting_f64("width")
            .or(preset.width)
            .unwrap_or(match preset.traffic_class {
                TrafficClass::Cycleway => settings.cycleway_width,
                TrafficClass::Railway => settings.railway_width,
                TrafficClass::Barrier => settings.barrier_width,
                TrafficClass::Road => lanes as f64 * lane_width,
            });

        RibbonParams { width, lanes, texture_lanes }
    }

    pub fn resolve_barrier(rule: &Rule, preset: &Preset, settings: &GenerationSettings) -> Self {
        RibbonParams {
            width: rule.setting_f64("width").or(preset.width).unwrap_or(settings.barrier_width),
            lanes: 1,
            texture_lanes: 1,
        }
    }
}

/// Per vertex offset direction and ribbon width.
#[derive(Debug, Clone, PartialEq)]
pub struct RibbonProfile {
    pub normals: Vec<DVec3>,
    pub widths: Vec<f64>,
}

impl RibbonProfile {
    pub fn uniform(outline: &Outline, width: f64) -> Self {
        RibbonProfile {
            normals: outline.normals.clone(),
            widths: vec![width; outline.len()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct JunctionMember {
    way: usize,
    normal: DVec3,
    width: f64,
    endpoint: bool,
}

/// Trafficway vertices grouped by the node they sit on.
#[derive(Debug, Default)]
pub struct JunctionIndex {
    by_node: HashMap<usize, Vec<JunctionMember>>,
}

impl JunctionIndex {
    pub fn insert_way(&mut self, way: usize, outline: &Outline, width: f64) {
        for (i, node) in outline.nodes.iter().enumerate() {
            self.by_node.entry(*node).or_default().push(JunctionMember {
                way,
                normal: outline.normals[i],
                width,
                endpoint: outline.is_endpoint(i),
            });
        }
    }

    /// Blends the outline's normals and widths with the trafficways it meets.
    pub fn profile(&self, way: usize, outline: &Outline, width: f64, max_angle: f64) -> RibbonProfile {
        let mut profile = RibbonProfile::uniform(outline, width);
        let min_cos = max_angle.to_radians().cos();

        for (i, node) in outline.nodes.iter().enumerate() {
            let Some(members) = self.by_node.get(node) else {
                continue;
            };
            let own = outline.normals[i];
            let connected: Vec<(DVec3, &JunctionMember)> = members.iter()
                .filter(|member| member.way != way)
                .map(|member| {
                    let normal = if member.normal.dot(own) < 0.0 { -member.normal } else { member.normal };
                    (normal, member)
                })
                .filter(|(normal, _)| normal.dot(own) >= min_cos)
                .collect();
            if connected.is_empty() {
                continue;
            }

            let sum = connected.iter().fold(own, |acc, (normal, _)| acc + *normal);
            profile.normals[i] = sum.normalize_or(own);

            if outline.is_endpoint(i) {
                let widest = connected.iter().map(|(_, member)| member.width).fold(width, f64::max);
                profile.widths[i] = widest;
            } else if connected.iter().all(|(_, member)| !member.endpoint) {
                let thinnest = connected.iter().map(|(_, member)| member.width).fold(width, f64::min);
                profile.widths[i] = thinnest;
            }
        }
        profile
    }
}

/// Offsets both sides of the path by half the profile width and joins them
/// with quads. Left vertex of point `i` is `2i`, right is `2i + 1`.
pub(super) fn ribbon(
    outline: &Outline,
    profile: &RibbonProfile,
    params: &RibbonParams,
    mode: SynthesisMode,
    mesh: &mut MeshBuffer,
) -> Result<Footprint> {
    let count = outline.len();
    if profile.normals.len() != count || profile.widths.len() != count {
        return Err(Error::geometry("ribbon profile does not match the outline"));
    }
    let segments: Vec<[usize; 2]> = outline.edges.clone();
    let mut lengths = Vec::with_capacity(segments.len());
    for [a, b] in &segments {
        let length = (outline.local[*b] - outline.local[*a]).truncate().length();
        if length < MIN_SEGMENT {
            return Err(Error::geometry(format!("zero length segment at point {}", a)));
        }
        lengths.push(length);
    }

    let mut positions = Vec::with_capacity(count * 2);
    for i in 0..count {
        let half = profile.normals[i] * profile.widths[i] / 2.0;
        positions.push((outline.local[i] + half).to_array());
        positions.push((outline.local[i] - half).to_array());
    }

    write_positions(mode, mesh, positions, || {
        Ok(segments.iter()
            .map(|[a, b]| {
                let (a, b) = (*a as u32, *b as u32);
                Face::new(vec![2 * a, 2 * a + 1, 2 * b + 1, 2 * b], FACADE_MATERIAL)
            })
            .collect())
    })?;

    mesh.uvs.clear();
    let lane_width = params.width / params.lanes.max(1) as f64;
    let texture_width = params.lanes as f64 / params.texture_lanes.max(1) as f64;
    let mut u = 0.0;
    for length in lengths {
        let next = u + length / lane_width;
        mesh.uvs.extend_from_slice(&[
            [u, texture_width],
            [u, 0.0],
            [next, 0.0],
            [next, texture_width],
        ]);
        u = next;
    }

    Ok(Footprint::from_mesh(mesh, outline.origin, |_| true))
}

pub struct TrafficwayParams {
    pub ribbon: RibbonParams,
    pub profile: RibbonProfile,
}

pub struct TrafficwaySynthesizer;

impl Synthesizer for TrafficwaySynthesizer {
    type Params = TrafficwayParams;

    fn synthesize(&self, outline: &Outline, params: &TrafficwayParams, mode: SynthesisMode, mesh: &mut MeshBuffer) -> Result<Footprint> {
        ribbon(outline, &params.profile, &params.ribbon, mode, mesh)
    }
}
