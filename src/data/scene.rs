use serde::{Deserialize, Serialize};

use super::mesh::{Footprint, MeshBuffer};
use super::osm::OsmId;
use crate::errors::ErrorKind;

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Outline,
    Building,
    Trafficway,
    Area,
    Barrier,
    Array,
    /// Point instance placed on a node, see `Marker`.
    Object,
}

impl GeometryKind {
    pub fn name(&self) -> &'static str {
        match self {
            GeometryKind::Outline => "outline",
            GeometryKind::Building => "building",
            GeometryKind::Trafficway => "trafficway",
            GeometryKind::Area => "area",
            GeometryKind::Barrier => "barrier",
            GeometryKind::Array => "array",
            GeometryKind::Object => "object",
        }
    }

    pub fn from_name(name: &str) -> Option<GeometryKind> {
        match name.trim() {
            "outline" => Some(GeometryKind::Outline),
            "building" => Some(GeometryKind::Building),
            "trafficway" | "road" => Some(GeometryKind::Trafficway),
            "area" => Some(GeometryKind::Area),
            "barrier" => Some(GeometryKind::Barrier),
            "array" => Some(GeometryKind::Array),
            "object" => Some(GeometryKind::Object),
            _ => None,
        }
    }
}

/// One placed copy of a tiled module. `count` copies are spaced `spacing`
/// apart along the instance's local X axis.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq)]
pub struct ArrayInstance {
    pub location: [f64; 3],
    /// Rotation about the up axis, radians.
    pub heading: f64,
    pub count: u32,
    pub spacing: f64,
    /// Module mesh after repetition and trimming, in instance space.
    pub mesh: MeshBuffer,
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone)]
pub struct Geometry {
    pub name: String,
    pub kind: GeometryKind,
    /// Back reference into `MapData::ways`.
    pub way: usize,
    pub way_id: OsmId,
    /// Index of the matched rule in the rule set.
    pub rule: usize,
    pub preset: String,
    /// Material of slot 0, the facade for buildings.
    pub material: Option<String>,
    /// Material of slot 1, only buildings have a roof slot.
    pub roof_material: Option<String>,
    /// Local origin: centroid of the way's nodes.
    pub origin: [f64; 3],
    pub mesh: MeshBuffer,
    pub footprint: Footprint,
    /// Vertical offset assigned by the spatial sorter.
    pub offset: f64,
    pub sorted: bool,
    pub instances: Vec<ArrayInstance>,
}

impl Geometry {
    pub fn location(&self) -> [f64; 3] {
        [self.origin[0], self.origin[1], self.origin[2] + self.offset]
    }
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq)]
pub struct Marker {
    pub name: String,
    pub node: usize,
    pub node_id: OsmId,
    pub preset: String,
    pub location: [f64; 3],
    pub heading: f64,
}

/// Reason an entity was left out of the scene.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub entity_id: OsmId,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone)]
pub struct Scene {
    pub geometries: Vec<Geometry>,
    pub markers: Vec<Marker>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Scene {
    pub fn count_kind(&self, kind: GeometryKind) -> usize {
        self.geometries.iter().filter(|geometry| geometry.kind == kind).count()
    }
}
