use std::collections::HashMap;

use self::osm::{Node, OsmId, Way};

pub mod mesh;
pub mod osm;
pub mod scene;

/// Geographic extent declared by the `<bounds>` element of the .osm file.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

/// Map data as defined in the .osm file. Relations are discarded, nodes and ways
/// are kept in two index addressed tables.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone)]
pub struct MapData {
    pub version: String,
    pub generator: String,
    pub bounds: Bounds,
    /// Projected size of `bounds` on the ground plane.
    pub dimensions: [f64; 2],
    pub nodes: Vec<Node>,
    pub ways: Vec<Way>,
    pub node_index: HashMap<OsmId, usize>,
}

impl MapData {
    pub fn node_by_id(&self, id: OsmId) -> Option<&Node> {
        self.node_index.get(&id).map(|idx| &self.nodes[*idx])
    }

    /// Projected coordinates of the way's nodes in way order.
    pub fn way_points(&self, way: &Way) -> Vec<[f64; 3]> {
        way.nodes.iter().map(|idx| self.nodes[*idx].co).collect()
    }

    /// A way is closed iff its first and last coordinates are equal on all axes.
    pub fn is_closed(&self, way: &Way) -> bool {
        match (way.nodes.first(), way.nodes.last()) {
            (Some(first), Some(last)) if way.nodes.len() > 1 => {
                self.nodes[*first].co == self.nodes[*last].co
            },
            _ => false,
        }
    }

    /// Rebuilds the node -> way membership lists from the way table.
    pub fn link_ways(&mut self) {
        for node in self.nodes.iter_mut() {
            node.ways.clear();
        }
        for (way_idx, way) in self.ways.iter().enumerate() {
            for node_idx in &way.nodes {
                let members = &mut self.nodes[*node_idx].ways;
                if !members.contains(&way_idx) {
                    members.push(way_idx);
                }
            }
        }
    }
}
