use crate::data::mesh::{Footprint, MeshBuffer};
use crate::errors::Result;

use super::outline::Outline;
use super::trafficway::{ribbon, RibbonParams, RibbonProfile};
use super::{SynthesisMode, Synthesizer};

/// Thin constant width ribbon along fences, walls and hedges. Barriers are
/// not blended at junctions.
pub struct BarrierSynthesizer;

impl Synthesizer for BarrierSynthesizer {
    type Params = RibbonParams;

    fn synthesize(&self, outline: &Outline, params: &RibbonParams, mode: SynthesisMode, mesh: &mut MeshBuffer) -> Result<Footprint> {
        ribbon(outline, &RibbonProfile::uniform(outline, params.width), params, mode, mesh)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::config::GenerationSettings;
    use crate::data::scene::GeometryKind;
    use crate::presets::Preset;
    use crate::rules::Rule;

    #[test]
    fn fence_ribbon() {
        let outline = Outline::from_points(&[[0.0, 0.0, 0.0], [4.0, 0.0, 0.0], [4.0, 3.0, 0.0]]).unwrap();
        let params = RibbonParams::resolve_barrier(
            &Rule::default(),
            &Preset::new("barrier", GeometryKind::Barrier),
            &GenerationSettings::default(),
        );
        assert_relative_eq!(params.width, 0.2);

        let mut mesh = MeshBuffer::default();
        let footprint = BarrierSynthesizer.synthesize(&outline, &params, SynthesisMode::Build, &mut mesh).unwrap();
        assert_eq!(mesh.vertices.len(), 6);
        assert_eq!(mesh.faces.len(), 2);
        // Single lane, a repeat every 0.2 m along the fence.
        assert_relative_eq!(mesh.uvs[2][0], 20.0);
        assert_relative_eq!(mesh.uvs[0][1], 1.0);
        assert!(footprint.area > 1.1 && footprint.area < 1.4);
    }

    #[test]
    fn rule_width_overrides_preset() {
        let mut rule = Rule::default();
        rule.settings.insert("width".into(), "0.5".into());
        let mut preset = Preset::new("wall", GeometryKind::Barrier);
        preset.width = Some(0.3);
        let params = RibbonParams::resolve_barrier(&rule, &preset, &GenerationSettings::default());
        assert_relative_eq!(params.width, 0.5);
    }
}
