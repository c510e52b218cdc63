//! The generation pass: classification, outlines, synthesis, markers and
//! layering over a parsed map.

use std::collections::HashMap;

use glam::DVec3;
use log::{debug, info, warn};

use crate::array::{box_module, place, LinearArrayGenerator};
use crate::config::GenerationSettings;
use crate::data::mesh::{Footprint, MeshBuffer};
use crate::data::osm::{display_name, level, Tags, Way};
use crate::data::scene::{ArrayInstance, Diagnostic, Geometry, GeometryKind, Marker, Scene};
use crate::data::MapData;
use crate::errors::{Error, Result};
use crate::geometry::area::{AreaParams, AreaSynthesizer};
use crate::geometry::barrier::BarrierSynthesizer;
use crate::geometry::building::{BuildingParams, BuildingSynthesizer};
use crate::geometry::outline::{Outline, OutlineSynthesizer};
use crate::geometry::trafficway::{JunctionIndex, RibbonParams, TrafficwayParams, TrafficwaySynthesizer};
use crate::geometry::{SynthesisMode, Synthesizer};
use crate::host::{CsgKernel, PresetResolver, ProgressReporter, SceneHost};
use crate::presets::{Preset, PresetIndex};
use crate::rules::{Rule, RuleMatch, RuleSet};
use crate::sorter::SpatialSorter;

/// Shared state between the per-way synthesis steps.
pub struct GenerationPass {
    outlines: Vec<Option<Outline>>,
    junctions: JunctionIndex,
    scene: Scene,
}

impl GenerationPass {
    pub fn way_count(&self) -> usize {
        self.outlines.len()
    }
}

pub struct Generator<'a> {
    rules: &'a RuleSet,
    presets: &'a PresetIndex,
    settings: &'a GenerationSettings,
    kernel: &'a dyn CsgKernel,
}

impl<'a> Generator<'a> {
    pub fn new(
        rules: &'a RuleSet,
        presets: &'a PresetIndex,
        settings: &'a GenerationSettings,
        kernel: &'a dyn CsgKernel,
    ) -> Self {
        Generator { rules, presets, settings, kernel }
    }

    /// Runs the whole pass, reporting progress once per way.
    pub fn generate(&self, map: &mut MapData, progress: &mut dyn ProgressReporter) -> Scene {
        let mut pass = self.prepare(map);
        let total = pass.way_count();
        for way in 0..total {
            self.synthesize_way(map, &mut pass, way);
            progress.report_progress(100.0 * (way + 1) as f64 / total as f64, "Generating ways");
        }
        self.finish(map, pass)
    }

    /// Classifies every entity, builds outlines and the junction index.
    pub fn prepare(&self, map: &mut MapData) -> GenerationPass {
        for name in self.rules.unknown_presets(self.presets) {
            warn!(preset = name; "Rule selector names an unknown preset, skipping it");
        }
        self.classify(map);

        let mut diagnostics = Vec::new();
        let outlines = self.build_outlines(map, &mut diagnostics);
        let junctions = self.junction_index(map, &outlines);

        GenerationPass {
            outlines,
            junctions,
            scene: Scene {
                diagnostics,
                ..Default::default()
            },
        }
    }

    fn classify(&self, map: &mut MapData) {
        let mut underground = 0;
        for node in map.nodes.iter_mut() {
            node.matches = if level(&node.tags) < 0 {
                underground += 1;
                Vec::new()
            } else {
                self.rules.classify(&node.tags, self.presets)
            };
        }
        for way in map.ways.iter_mut() {
            way.matches = if level(&way.tags) < 0 {
                underground += 1;
                Vec::new()
            } else {
                self.rules.classify(&way.tags, self.presets)
            };
        }
        let matched_ways = map.ways.iter().filter(|way| !way.matches.is_empty()).count();
        info!(matched_ways = matched_ways, underground = underground; "Classified entities");
    }

    fn build_outlines(&self, map: &mut MapData, diagnostics: &mut Vec<Diagnostic>) -> Vec<Option<Outline>> {
        let MapData { ways, nodes, .. } = map;
        ways.iter_mut()
            .map(|way| {
                if way.matches.is_empty() {
                    return None;
                }
                match Outline::build(way, nodes) {
                    Ok(outline) => Some(outline),
                    Err(err) => {
                        report(diagnostics, way.id, err);
                        None
                    },
                }
            })
            .collect()
    }

    fn junction_index(&self, map: &MapData, outlines: &[Option<Outline>]) -> JunctionIndex {
        let mut junctions = JunctionIndex::default();
        for (idx, way) in map.ways.iter().enumerate() {
            let Some(outline) = &outlines[idx] else {
                continue;
            };
            let trafficway = way.matches.iter()
                .filter_map(|matched| self.resolve(matched))
                .find(|(_, _, kind)| *kind == GeometryKind::Trafficway);
            if let Some((rule, preset, _)) = trafficway {
                let width = RibbonParams::resolve_trafficway(&way.tags, rule, preset, self.settings).width;
                junctions.insert_way(idx, outline, width);
            }
        }
        junctions
    }

    fn resolve(&self, matched: &RuleMatch) -> Option<(&'a Rule, &'a Preset, GeometryKind)> {
        let rule = self.rules.rules().get(matched.rule)?;
        let preset = self.presets.get(&matched.preset)?;
        Some((rule, preset, rule.kind().unwrap_or(preset.kind)))
    }

    /// Synthesizes one geometry per match of way `idx`. Failures skip the
    /// match and leave a diagnostic.
    pub fn synthesize_way(&self, map: &MapData, pass: &mut GenerationPass, idx: usize) {
        let Some(outline) = &pass.outlines[idx] else {
            return;
        };
        let way = &map.ways[idx];

        for matched in &way.matches {
            let Some((rule, preset, kind)) = self.resolve(matched) else {
                continue;
            };
            if kind == GeometryKind::Object {
                debug!(way_id = way.id; "Object presets only apply to nodes");
                continue;
            }

            let mut mesh = MeshBuffer::default();
            let built = self.synthesize(
                way, idx, outline, rule, preset, kind, &pass.junctions, SynthesisMode::Build, &mut mesh,
            );
            let lanes = match kind {
                GeometryKind::Trafficway => {
                    Some(RibbonParams::resolve_trafficway(&way.tags, rule, preset, self.settings).lanes)
                },
                _ => None,
            };
            let (material, roof_material) = self.resolve_material(&way.tags, kind, lanes, preset);
            match built {
                Ok((footprint, instances)) => pass.scene.geometries.push(Geometry {
                    name: display_name(&way.tags, kind.name(), way.id),
                    kind,
                    way: idx,
                    way_id: way.id,
                    rule: matched.rule,
                    preset: preset.id.clone(),
                    material,
                    roof_material,
                    origin: outline.origin.to_array(),
                    mesh,
                    footprint,
                    offset: 0.0,
                    sorted: false,
                    instances,
                }),
                Err(err) => report(&mut pass.scene.diagnostics, way.id, err),
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn synthesize(
        &self,
        way: &Way,
        idx: usize,
        outline: &Outline,
        rule: &Rule,
        preset: &Preset,
        kind: GeometryKind,
        junctions: &JunctionIndex,
        mode: SynthesisMode,
        mesh: &mut MeshBuffer,
    ) -> Result<(Footprint, Vec<ArrayInstance>)> {
        let footprint = match kind {
            GeometryKind::Outline => OutlineSynthesizer.synthesize(outline, &(), mode, mesh)?,
            GeometryKind::Building => {
                let params = BuildingParams::resolve(&way.tags, rule, preset, self.settings);
                BuildingSynthesizer.synthesize(outline, &params, mode, mesh)?
            },
            GeometryKind::Trafficway => {
                let ribbon = RibbonParams::resolve_trafficway(&way.tags, rule, preset, self.settings);
                let profile = junctions.profile(idx, outline, ribbon.width, self.settings.junction_angle);
                TrafficwaySynthesizer.synthesize(outline, &TrafficwayParams { ribbon, profile }, mode, mesh)?
            },
            GeometryKind::Area => {
                let params = AreaParams::resolve(rule, preset, self.settings);
                AreaSynthesizer.synthesize(outline, &params, mode, mesh)?
            },
            GeometryKind::Barrier => {
                let params = RibbonParams::resolve_barrier(rule, preset, self.settings);
                BarrierSynthesizer.synthesize(outline, &params, mode, mesh)?
            },
            GeometryKind::Array => return self.tile(outline, preset, mode, mesh),
            GeometryKind::Object => return Err(Error::geometry("object presets only apply to nodes")),
        };
        Ok((footprint, Vec::new()))
    }

    fn tile(
        &self,
        outline: &Outline,
        preset: &Preset,
        mode: SynthesisMode,
        mesh: &mut MeshBuffer,
    ) -> Result<(Footprint, Vec<ArrayInstance>)> {
        let size = preset.dimensions
            .unwrap_or([self.settings.module_length, self.settings.barrier_width, 1.0]);
        let generator = LinearArrayGenerator::new(self.kernel, box_module(size))?;
        let instances = generator.generate(outline);

        let mut merged = MeshBuffer::default();
        for instance in &instances {
            merged.append_translated(&place(instance), DVec3::ZERO);
        }
        match mode {
            SynthesisMode::Build => *mesh = merged,
            SynthesisMode::Refresh => {
                mesh.refresh_vertices(&merged.vertices)?;
                mesh.uvs = merged.uvs;
            },
        }
        Ok((Footprint::from_mesh(mesh, outline.origin, |_| true), instances))
    }

    /// Materials for slot 0 and the building roof slot, picked from the
    /// presets bound to the entity's tags. Tags are visited in name order and
    /// a candidate needs a priority at least as high as the last one taken.
    /// Trafficways keep a candidate whose lane count matches `lanes`.
    fn resolve_material(
        &self,
        tags: &Tags,
        kind: GeometryKind,
        lanes: Option<u32>,
        fallback: &Preset,
    ) -> (Option<String>, Option<String>) {
        let mut names: Vec<&String> = tags.keys().collect();
        names.sort();

        let mut priority = 0;
        let mut main: Option<&Preset> = None;
        let mut roof: Option<&Preset> = None;
        for name in names {
            for (preset, tag_priority) in self.presets.resolve_preset(name, &tags[name]) {
                if preset.kind != kind || preset.material.is_none() || tag_priority < priority {
                    continue;
                }
                match kind {
                    GeometryKind::Building if preset.building_part.is_roof() => roof = Some(preset),
                    GeometryKind::Trafficway => {
                        if main.map_or(true, |current| current.lanes != lanes) {
                            main = Some(preset);
                        }
                    },
                    _ => main = Some(preset),
                }
                priority = tag_priority;
            }
        }

        let material = match main {
            Some(preset) => preset.material.clone(),
            None => {
                debug!(preset = fallback.id.as_str(); "No tag bound material, using the preset's own");
                fallback.material.clone()
            },
        };
        let roof_material = match kind {
            GeometryKind::Building => roof.and_then(|preset| preset.material.clone()),
            _ => None,
        };
        (material, roof_material)
    }

    /// Places node markers, links geometries back to their ways and sorts the
    /// layers.
    pub fn finish(&self, map: &mut MapData, pass: GenerationPass) -> Scene {
        let GenerationPass { outlines, scene: mut scene, .. } = pass;

        for way in map.ways.iter_mut() {
            way.geometries.clear();
        }
        for (idx, geometry) in scene.geometries.iter().enumerate() {
            map.ways[geometry.way].geometries.push(idx);
        }

        scene.markers = self.markers(map, &outlines, &scene);
        SpatialSorter::new(self.presets, self.settings).sort(&mut scene.geometries);

        info!(
            geometries = scene.geometries.len(),
            markers = scene.markers.len(),
            skipped = scene.diagnostics.len();
            "Generation finished"
        );
        scene
    }

    fn markers(&self, map: &MapData, outlines: &[Option<Outline>], scene: &Scene) -> Vec<Marker> {
        let mut markers = Vec::new();
        for (idx, node) in map.nodes.iter().enumerate() {
            for matched in &node.matches {
                let Some((_, preset, kind)) = self.resolve(matched) else {
                    continue;
                };
                if kind != GeometryKind::Object {
                    continue;
                }
                let mut marker = Marker {
                    name: display_name(&node.tags, kind.name(), node.id),
                    node: idx,
                    node_id: node.id,
                    preset: preset.id.clone(),
                    location: node.co,
                    heading: 0.0,
                };
                self.align_marker(&mut marker, map, outlines, scene);
                markers.push(marker);
            }
        }
        markers
    }

    /// Turns a marker standing on a trafficway along the way and moves it to
    /// the kerb.
    fn align_marker(&self, marker: &mut Marker, map: &MapData, outlines: &[Option<Outline>], scene: &Scene) {
        for way_idx in &map.nodes[marker.node].ways {
            let way = &map.ways[*way_idx];
            let Some(outline) = &outlines[*way_idx] else {
                continue;
            };
            let trafficway = way.geometries.iter()
                .map(|geometry| &scene.geometries[*geometry])
                .find(|geometry| geometry.kind == GeometryKind::Trafficway);
            let Some(geometry) = trafficway else {
                continue;
            };
            let Some(position) = outline.nodes.iter().position(|node| *node == marker.node) else {
                continue;
            };
            let (Some(rule), Some(preset)) = (self.rules.rules().get(geometry.rule), self.presets.get(&geometry.preset)) else {
                continue;
            };

            let width = RibbonParams::resolve_trafficway(&way.tags, rule, preset, self.settings).width;
            let tangent = outline.tangent(position);
            let normal = outline.normals[position];
            let side = if self.settings.right_hand_traffic { -normal } else { normal };

            marker.heading = tangent.y.atan2(tangent.x);
            marker.location = (DVec3::from_array(marker.location) + side * width / 2.0).to_array();
            return;
        }
    }

    /// Recomputes positions and UVs of every geometry in place. Topology is
    /// kept, so hosts holding the meshes can update them without rebuilding.
    pub fn refresh(&self, map: &mut MapData, scene: &mut Scene) {
        let mut diagnostics = Vec::new();
        let outlines = self.build_outlines(map, &mut diagnostics);
        let junctions = self.junction_index(map, &outlines);

        for geometry in scene.geometries.iter_mut() {
            let way = &map.ways[geometry.way];
            let Some(outline) = &outlines[geometry.way] else {
                continue;
            };
            let (Some(rule), Some(preset)) = (self.rules.rules().get(geometry.rule), self.presets.get(&geometry.preset)) else {
                report(&mut diagnostics, way.id, Error::cache("geometry refers to an unknown rule or preset"));
                continue;
            };
            let refreshed = self.synthesize(
                way, geometry.way, outline, rule, preset, geometry.kind, &junctions, SynthesisMode::Refresh, &mut geometry.mesh,
            );
            match refreshed {
                Ok((footprint, instances)) => {
                    geometry.origin = outline.origin.to_array();
                    geometry.footprint = footprint;
                    geometry.instances = instances;
                },
                Err(err) => report(&mut diagnostics, way.id, err),
            }
        }
        scene.diagnostics.extend(diagnostics);
    }
}

fn report(diagnostics: &mut Vec<Diagnostic>, entity_id: i64, err: Error) {
    warn!(entity_id = entity_id, err = err.message.as_str(); "Skipping entity");
    diagnostics.push(Diagnostic {
        entity_id,
        kind: err.kind,
        message: err.message,
    });
}

/// Hands every geometry and marker to the host. Markers are single points.
pub fn emit<H: SceneHost>(scene: &Scene, host: &mut H) -> Result<Vec<H::Handle>> {
    let mut handles = Vec::with_capacity(scene.geometries.len() + scene.markers.len());
    for geometry in &scene.geometries {
        handles.push(host.create_object(&geometry.name, &geometry.mesh, geometry.location())?);
    }
    let point = MeshBuffer {
        vertices: vec![[0.0; 3]],
        ..Default::default()
    };
    for marker in &scene.markers {
        handles.push(host.create_object(&marker.name, &point, marker.location)?);
    }
    Ok(handles)
}

/// Number of geometries per kind, for logging.
pub fn kind_counts(scene: &Scene) -> HashMap<&'static str, usize> {
    let mut counts = HashMap::new();
    for geometry in &scene.geometries {
        *counts.entry(geometry.kind.name()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::data::mesh::ROOF_MATERIAL;
    use crate::data::osm::Node;
    use crate::data::Bounds;
    use crate::errors::ErrorKind;
    use crate::geo::Projector;
    use crate::host::NoCsg;
    use crate::rules::DEFAULT_RULES;

    const BOUNDS: Bounds = Bounds { min_lat: 0.0, min_lon: 0.0, max_lat: 0.001, max_lon: 0.001 };

    #[derive(Default)]
    struct Recorder {
        calls: Vec<f64>,
    }

    impl ProgressReporter for Recorder {
        fn report_progress(&mut self, percent: f64, _label: &str) {
            self.calls.push(percent);
        }
    }

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    /// Nodes given as (lat, lon, tags), ways as (node positions, tags).
    fn map(nodes: &[(f64, f64, Tags)], ways: &[(Vec<usize>, Tags)]) -> MapData {
        let projector = Projector::from_bounds(&BOUNDS, true, 1.0);
        let mut map = MapData {
            bounds: BOUNDS,
            ..Default::default()
        };
        for (idx, (lat, lon, node_tags)) in nodes.iter().enumerate() {
            map.nodes.push(Node {
                id: idx as i64 + 1,
                lat: *lat,
                lon: *lon,
                co: projector.project(*lat, *lon, 0.0),
                tags: node_tags.clone(),
                ..Default::default()
            });
            map.node_index.insert(idx as i64 + 1, idx);
        }
        for (idx, (way_nodes, way_tags)) in ways.iter().enumerate() {
            map.ways.push(Way {
                id: 100 + idx as i64,
                nodes: way_nodes.clone(),
                tags: way_tags.clone(),
                ..Default::default()
            });
        }
        map.link_ways();
        map
    }

    fn square(tags: Tags) -> MapData {
        map(
            &[
                (0.0002, 0.0002, Tags::new()),
                (0.0002, 0.0008, Tags::new()),
                (0.0008, 0.0008, Tags::new()),
                (0.0008, 0.0002, Tags::new()),
            ],
            &[(vec![0, 1, 2, 3, 0], tags)],
        )
    }

    fn run(map: &mut MapData) -> Scene {
        let rules = RuleSet::parse(DEFAULT_RULES).unwrap();
        let presets = PresetIndex::builtin();
        let settings = GenerationSettings::default();
        let generator = Generator::new(&rules, &presets, &settings, &NoCsg);
        generator.generate(map, &mut Recorder::default())
    }

    #[test]
    fn nine_metre_building() {
        let building_tags = tags(&[("building", "yes"), ("height", "9m")]);
        let mut map = square(building_tags.clone());
        let scene = run(&mut map);

        assert_eq!(scene.geometries.len(), 1);
        assert!(scene.diagnostics.is_empty());
        let building = &scene.geometries[0];
        assert_eq!(building.kind, GeometryKind::Building);
        assert_eq!(building.name, "building_100");
        assert_eq!(building.material.as_deref(), Some("building"));
        assert_eq!(map.ways[0].geometries, vec![0]);

        let rules = RuleSet::parse(DEFAULT_RULES).unwrap();
        let params = BuildingParams::resolve(
            &building_tags,
            rules.rule(0),
            &Preset::new("building", GeometryKind::Building),
            &GenerationSettings::default(),
        );
        assert_relative_eq!(params.levels, 3.0);

        let mesh = &building.mesh;
        assert_eq!(mesh.vertices.len(), 8);
        let (min, max) = mesh.bounds().unwrap();
        assert_relative_eq!(max.z - min.z, 9.0);

        let roof_area: f64 = mesh.faces.iter()
            .filter(|face| face.material == ROOF_MATERIAL)
            .map(|face| mesh.face_area(face))
            .sum();
        assert!(roof_area > 0.0);
        assert_relative_eq!(roof_area, building.footprint.area, max_relative = 1e-9);
        assert_relative_eq!(building.offset, 0.0);
    }

    const MATERIALS: &str = r#"[
        {"id": "building", "kind": "building", "material": "building", "tags": [{"name": "building"}]},
        {"id": "brick", "kind": "building", "material": "brick",
         "tags": [{"name": "building", "value": "house", "priority": 1}]},
        {"id": "tiles", "kind": "building", "material": "red_tiles", "building_part": "sloped_roof",
         "tags": [{"name": "roof:shape", "value": "gabled", "priority": 1}]},
        {"id": "gravel", "kind": "building", "material": "gravel", "building_part": "flat_roof",
         "tags": [{"name": "roof:shape", "value": "flat", "priority": 1}]},
        {"id": "road", "kind": "trafficway", "material": "road", "tags": [{"name": "highway"}]},
        {"id": "asphalt_2", "kind": "trafficway", "material": "asphalt_2", "lanes": 2,
         "tags": [{"name": "surface", "value": "asphalt", "priority": 1}]},
        {"id": "asphalt_4", "kind": "trafficway", "material": "asphalt_4", "lanes": 4,
         "tags": [{"name": "surface", "value": "asphalt", "priority": 1}]},
        {"id": "asphalt_6", "kind": "trafficway", "material": "asphalt_6", "lanes": 6,
         "tags": [{"name": "surface", "value": "asphalt", "priority": 1}]}
    ]"#;

    #[test]
    fn buildings_get_separate_facade_and_roof_materials() {
        let rules = RuleSet::parse(DEFAULT_RULES).unwrap();
        let presets = PresetIndex::from_json(MATERIALS).unwrap();
        let settings = GenerationSettings::default();
        let generator = Generator::new(&rules, &presets, &settings, &NoCsg);
        let fallback = presets.get("building").unwrap();

        let house = tags(&[("building", "house"), ("roof:shape", "gabled")]);
        let (facade, roof) = generator.resolve_material(&house, GeometryKind::Building, None, fallback);
        assert_eq!(facade.as_deref(), Some("brick"));
        assert_eq!(roof.as_deref(), Some("red_tiles"));

        let shed = tags(&[("building", "shed"), ("roof:shape", "flat")]);
        let (facade, roof) = generator.resolve_material(&shed, GeometryKind::Building, None, fallback);
        assert_eq!(facade.as_deref(), Some("building"));
        assert_eq!(roof.as_deref(), Some("gravel"));

        let (_, roof) = generator.resolve_material(&tags(&[("building", "yes")]), GeometryKind::Building, None, fallback);
        assert_eq!(roof, None);

        let mut map = square(house);
        let scene = generator.generate(&mut map, &mut Recorder::default());
        assert_eq!(scene.geometries[0].material.as_deref(), Some("brick"));
        assert_eq!(scene.geometries[0].roof_material.as_deref(), Some("red_tiles"));
    }

    #[test]
    fn road_materials_prefer_matching_lanes() {
        let rules = RuleSet::parse(DEFAULT_RULES).unwrap();
        let presets = PresetIndex::from_json(MATERIALS).unwrap();
        let settings = GenerationSettings::default();
        let generator = Generator::new(&rules, &presets, &settings, &NoCsg);
        let fallback = presets.get("road").unwrap();
        let road = tags(&[("highway", "primary"), ("surface", "asphalt")]);

        let pick = |lanes| generator.resolve_material(&road, GeometryKind::Trafficway, Some(lanes), fallback).0;
        assert_eq!(pick(2).as_deref(), Some("asphalt_2"));
        assert_eq!(pick(4).as_deref(), Some("asphalt_4"));
        // No match: the last candidate wins.
        assert_eq!(pick(3).as_deref(), Some("asphalt_6"));

        let (material, roof) = generator.resolve_material(
            &tags(&[("highway", "primary")]), GeometryKind::Trafficway, Some(2), fallback,
        );
        assert_eq!(material.as_deref(), Some("road"));
        assert_eq!(roof, None);
    }

    #[test]
    fn progress_is_reported_per_way() {
        let mut map = square(tags(&[("building", "yes")]));
        let rules = RuleSet::parse(DEFAULT_RULES).unwrap();
        let presets = PresetIndex::builtin();
        let settings = GenerationSettings::default();
        let mut recorder = Recorder::default();
        Generator::new(&rules, &presets, &settings, &NoCsg).generate(&mut map, &mut recorder);
        assert_eq!(recorder.calls, vec![100.0]);
    }

    #[test]
    fn underground_ways_are_skipped() {
        let mut map = square(tags(&[("building", "yes"), ("level", "-1")]));
        let scene = run(&mut map);
        assert!(scene.geometries.is_empty());
        assert!(map.ways[0].matches.is_empty());
    }

    #[test]
    fn failing_entities_leave_a_diagnostic() {
        let mut map = map(
            &[(0.0002, 0.0002, Tags::new()), (0.0002, 0.0008, Tags::new())],
            &[(vec![0, 1, 0], tags(&[("building", "yes")])), (vec![0, 1], tags(&[("highway", "path")]))],
        );
        let scene = run(&mut map);
        assert_eq!(scene.count_kind(GeometryKind::Trafficway), 1);
        assert_eq!(scene.count_kind(GeometryKind::Building), 0);
        assert_eq!(scene.diagnostics.len(), 1);
        assert_eq!(scene.diagnostics[0].entity_id, 100);
        assert_eq!(scene.diagnostics[0].kind, ErrorKind::Geometry);
    }

    #[test]
    fn roads_sit_above_parks_and_markers_move_to_the_kerb() {
        let mut map = map(
            &[
                (0.0001, 0.0001, Tags::new()),
                (0.0001, 0.0009, Tags::new()),
                (0.0009, 0.0009, Tags::new()),
                (0.0009, 0.0001, Tags::new()),
                (0.0005, 0.0003, Tags::new()),
                (0.0005, 0.0005, tags(&[("amenity", "bench"), ("name", "Bench")])),
                (0.0005, 0.0007, Tags::new()),
            ],
            &[
                (vec![0, 1, 2, 3, 0], tags(&[("leisure", "park")])),
                (vec![4, 5, 6], tags(&[("highway", "footway")])),
            ],
        );
        let scene = run(&mut map);

        let park = &scene.geometries[0];
        let road = &scene.geometries[1];
        assert_eq!(park.kind, GeometryKind::Area);
        assert_eq!(road.kind, GeometryKind::Trafficway);
        assert_relative_eq!(park.offset, 0.0);
        assert_relative_eq!(road.offset, 0.001);

        assert_eq!(scene.markers.len(), 1);
        let bench = &scene.markers[0];
        assert_eq!(bench.name, "Bench");
        assert_eq!(bench.preset, "object");
        assert_relative_eq!(bench.heading, 0.0, epsilon = 1e-9);
        let node = map.nodes[5].co;
        assert_relative_eq!(bench.location[0], node[0], epsilon = 1e-9);
        assert_relative_eq!(bench.location[1], node[1] - 1.5, epsilon = 1e-9);
    }

    #[test]
    fn refresh_keeps_topology() {
        let mut map = square(tags(&[("building", "yes"), ("building:levels", "2")]));
        let rules = RuleSet::parse(DEFAULT_RULES).unwrap();
        let presets = PresetIndex::builtin();
        let settings = GenerationSettings::default();
        let generator = Generator::new(&rules, &presets, &settings, &NoCsg);
        let mut scene = generator.generate(&mut map, &mut Recorder::default());
        let faces = scene.geometries[0].mesh.faces.clone();

        map.ways[0].tags.insert("building:levels".into(), "4".into());
        generator.refresh(&mut map, &mut scene);

        let mesh = &scene.geometries[0].mesh;
        assert_eq!(mesh.faces, faces);
        let (min, max) = mesh.bounds().unwrap();
        assert_relative_eq!(max.z - min.z, 12.0);
        assert!(scene.diagnostics.is_empty());
    }

    #[test]
    fn emits_geometries_then_markers() {
        let mut map = square(tags(&[("building", "yes")]));
        map.nodes[0].tags = tags(&[("shop", "bakery")]);
        let scene = run(&mut map);
        let mut host = crate::host::ObjSceneHost::new(Vec::new());
        let handles = emit(&scene, &mut host).unwrap();
        assert_eq!(handles, vec![0, 1]);
        let text = String::from_utf8(host.into_inner()).unwrap();
        assert!(text.contains("o building_100\n"));
        assert!(text.contains("o object_1\n"));
        assert_eq!(kind_counts(&scene).get("building"), Some(&1));
    }
}
