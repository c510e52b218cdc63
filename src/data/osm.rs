use std::collections::HashMap;

use crate::rules::RuleMatch;

pub type OsmId = i64;

/// Tag name -> value. A later `<tag>` with the same name overwrites the earlier one.
pub type Tags = HashMap<String, String>;

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone)]
pub struct Node {
    pub id: OsmId,
    pub lat: f64,
    pub lon: f64,
    pub ele: f64,
    /// Projected planar coordinate, filled in once the bounds are known.
    pub co: [f64; 3],
    pub tags: Tags,
    /// Indices into `MapData::ways` of the ways referencing this node.
    pub ways: Vec<usize>,
    pub matches: Vec<RuleMatch>,
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone)]
pub struct Way {
    pub id: OsmId,
    /// Indices into `MapData::nodes`.
    pub nodes: Vec<usize>,
    pub tags: Tags,
    pub matches: Vec<RuleMatch>,
    /// Indices into `Scene::geometries`.
    pub geometries: Vec<usize>,
}

/// Value of the `level` tag. Unparsable levels count as underground, like
/// negative ones.
pub fn level(tags: &Tags) -> i32 {
    match tags.get("level") {
        Some(value) => value.trim().parse().unwrap_or(-1),
        None => 0,
    }
}

pub fn display_name(tags: &Tags, kind: &str, id: OsmId) -> String {
    match tags.get("name") {
        Some(name) => name.clone(),
        None => format!("{}_{}", kind, id),
    }
}
