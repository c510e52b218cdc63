//! Preset catalogue. Presets are supplied by the host and referenced by id;
//! the index is built once and only read afterwards.

use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};

use crate::data::scene::GeometryKind;
use crate::errors::{Error, Result};
use crate::host::PresetResolver;

/// Vertical stacking class of ribbon geometry. Higher ranks are lifted above lower ones.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrafficClass {
    #[default]
    Road,
    Cycleway,
    Railway,
    Barrier,
}

impl TrafficClass {
    pub fn rank(&self) -> u32 {
        match self {
            TrafficClass::Road => 0,
            TrafficClass::Cycleway => 1,
            TrafficClass::Railway => 2,
            TrafficClass::Barrier => 3,
        }
    }
}

/// Which material slot of a building a preset textures.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildingPart {
    #[default]
    Facade,
    FlatRoof,
    SlopedRoof,
}

impl BuildingPart {
    pub fn is_roof(&self) -> bool {
        matches!(self, BuildingPart::FlatRoof | BuildingPart::SlopedRoof)
    }
}

/// Binds a preset to a tag. An empty value matches any value of the tag.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PresetTag {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub priority: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Preset {
    pub id: String,
    pub kind: GeometryKind,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub tags: Vec<PresetTag>,
    #[serde(default)]
    pub traffic_class: TrafficClass,

    // building
    #[serde(default)]
    pub building_part: BuildingPart,
    pub level_height: Option<f64>,
    pub default_levels: Option<f64>,
    pub texture_levels: Option<u32>,

    // trafficway / barrier
    pub lane_width: Option<f64>,
    pub lanes: Option<u32>,
    pub texture_lanes: Option<u32>,
    /// Fixed ribbon width, overrides lanes x lane width.
    pub width: Option<f64>,

    // area / roof
    pub texture_scale: Option<f64>,

    /// Module size for arrays, X is the tiling axis.
    pub dimensions: Option<[f64; 3]>,
}

impl Preset {
    pub fn new(id: &str, kind: GeometryKind) -> Self {
        Preset {
            id: id.to_string(),
            kind,
            material: Some(id.to_string()),
            tags: Vec::new(),
            traffic_class: TrafficClass::default(),
            building_part: BuildingPart::default(),
            level_height: None,
            default_levels: None,
            texture_levels: None,
            lane_width: None,
            lanes: None,
            texture_lanes: None,
            width: None,
            texture_scale: None,
            dimensions: None,
        }
    }

    fn with_class(mut self, traffic_class: TrafficClass) -> Self {
        self.traffic_class = traffic_class;
        self
    }

    fn with_tag(mut self, name: &str, value: &str) -> Self {
        self.tags.push(PresetTag {
            name: name.to_string(),
            value: value.to_string(),
            priority: 0,
        });
        self
    }
}

fn tag_key(name: &str, value: &str) -> String {
    format!("{}={}", name, value)
}

#[derive(Debug, Clone, Default)]
pub struct PresetIndex {
    presets: Vec<Preset>,
    by_id: HashMap<String, usize>,
    /// "name=value" -> (preset, priority), highest priority first.
    by_tag: HashMap<String, Vec<(usize, u32)>>,
}

impl PresetIndex {
    pub fn new(presets: Vec<Preset>) -> Result<Self> {
        let mut by_id = HashMap::new();
        let mut by_tag: HashMap<String, Vec<(usize, u32)>> = HashMap::new();

        for (idx, preset) in presets.iter().enumerate() {
            if by_id.insert(preset.id.clone(), idx).is_some() {
                return Err(Error::parse(format!("duplicate preset id {:?}", preset.id)));
            }
            for tag in &preset.tags {
                by_tag.entry(tag_key(&tag.name, &tag.value))
                    .or_default()
                    .push((idx, tag.priority));
            }
        }
        for entries in by_tag.values_mut() {
            // Stable, so equal priorities keep declaration order.
            entries.sort_by(|a, b| b.1.cmp(&a.1));
        }

        Ok(PresetIndex { presets, by_id, by_tag })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let presets: Vec<Preset> = serde_json::from_str(text)?;
        PresetIndex::new(presets)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let presets: Vec<Preset> = serde_json::from_reader(BufReader::new(file))?;
        PresetIndex::new(presets)
    }

    /// Catalogue matching the built-in rules. Dimensions are left open so the
    /// generation settings supply them.
    pub fn builtin() -> Self {
        let presets = vec![
            Preset::new("building", GeometryKind::Building).with_tag("building", ""),
            Preset::new("road", GeometryKind::Trafficway).with_tag("highway", ""),
            Preset::new("cycleway", GeometryKind::Trafficway)
                .with_class(TrafficClass::Cycleway)
                .with_tag("cycleway", "track"),
            Preset::new("railway", GeometryKind::Trafficway)
                .with_class(TrafficClass::Railway)
                .with_tag("railway", ""),
            Preset::new("area", GeometryKind::Area)
                .with_tag("area", "")
                .with_tag("natural", "")
                .with_tag("landuse", "")
                .with_tag("leisure", ""),
            Preset::new("barrier", GeometryKind::Barrier)
                .with_class(TrafficClass::Barrier)
                .with_tag("barrier", ""),
            Preset::new("object", GeometryKind::Object),
        ];
        PresetIndex::new(presets).unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<&Preset> {
        self.by_id.get(id).map(|idx| &self.presets[*idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }
}

impl PresetResolver for PresetIndex {
    fn resolve_preset(&self, tag_name: &str, tag_value: &str) -> Vec<(&Preset, u32)> {
        let entries = self.by_tag.get(&tag_key(tag_name, tag_value))
            .or_else(|| self.by_tag.get(&tag_key(tag_name, "")));
        match entries {
            Some(entries) => entries.iter()
                .map(|(idx, priority)| (&self.presets[*idx], *priority))
                .collect(),
            None => Vec::new(),
        }
    }
}
