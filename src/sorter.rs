//! Vertical layering of flat geometry so overlapping surfaces do not z-fight.

use log::debug;

use crate::config::GenerationSettings;
use crate::data::mesh::Footprint;
use crate::data::scene::{Geometry, GeometryKind};
use crate::presets::{PresetIndex, TrafficClass};

/// Bounding boxes overlap and a corner of one footprint lies inside a face of
/// the other.
pub fn collides(a: &Footprint, b: &Footprint) -> bool {
    a.bounds_overlap(b)
        && (a.points().any(|point| b.contains_point(*point))
            || b.points().any(|point| a.contains_point(*point)))
}

pub struct SpatialSorter<'a> {
    presets: &'a PresetIndex,
    base_offset: f64,
    step: f64,
}

impl<'a> SpatialSorter<'a> {
    pub fn new(presets: &'a PresetIndex, settings: &GenerationSettings) -> Self {
        SpatialSorter {
            presets,
            base_offset: settings.base_offset,
            step: settings.offset_step,
        }
    }

    fn traffic_class(&self, geometry: &Geometry) -> TrafficClass {
        if geometry.kind == GeometryKind::Barrier {
            return TrafficClass::Barrier;
        }
        self.presets.get(&geometry.preset)
            .map(|preset| preset.traffic_class)
            .unwrap_or_default()
    }

    /// Assigns offsets to every geometry not sorted yet. Offsets already
    /// assigned are never touched, so sorting twice is a no-op.
    pub fn sort(&self, geometries: &mut [Geometry]) {
        let areas: Vec<usize> = (0..geometries.len())
            .filter(|idx| geometries[*idx].kind == GeometryKind::Area)
            .collect();

        let mut area_groups = 0;
        for &idx in &areas {
            if geometries[idx].sorted {
                continue;
            }
            let mut group: Vec<usize> = areas.iter()
                .copied()
                .filter(|other| *other == idx || collides(&geometries[idx].footprint, &geometries[*other].footprint))
                .collect();
            // Stable: equal areas keep parse order.
            group.sort_by(|a, b| geometries[*b].footprint.area.total_cmp(&geometries[*a].footprint.area));

            for (rank, member) in group.into_iter().enumerate() {
                if geometries[member].sorted {
                    continue;
                }
                // Chained overlaps: stay above every sorted area this one touches.
                let offset = areas.iter()
                    .filter(|other| **other != member && geometries[**other].sorted)
                    .filter(|other| collides(&geometries[member].footprint, &geometries[**other].footprint))
                    .map(|other| geometries[*other].offset + self.step)
                    .fold(self.base_offset + rank as f64 * self.step, f64::max);

                let geometry = &mut geometries[member];
                geometry.offset = offset;
                geometry.sorted = true;
            }
            area_groups += 1;
        }

        let mut ribbons = 0;
        for idx in 0..geometries.len() {
            let geometry = &geometries[idx];
            if geometry.sorted || !matches!(geometry.kind, GeometryKind::Trafficway | GeometryKind::Barrier) {
                continue;
            }
            let below = areas.iter()
                .filter(|area| collides(&geometry.footprint, &geometries[**area].footprint))
                .map(|area| geometries[*area].offset)
                .fold(self.base_offset, f64::max);
            let rank = self.traffic_class(geometry).rank();

            let geometry = &mut geometries[idx];
            geometry.offset = below + (rank + 1) as f64 * self.step;
            geometry.sorted = true;
            ribbons += 1;
        }

        debug!(area_groups = area_groups, ribbons = ribbons; "Sorted geometry layers");
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::data::mesh::MeshBuffer;
    use crate::presets::Preset;

    fn rect(min: [f64; 2], max: [f64; 2]) -> Footprint {
        let polygon = vec![min, [max[0], min[1]], max, [min[0], max[1]]];
        Footprint {
            min,
            max,
            area: (max[0] - min[0]) * (max[1] - min[1]),
            polygons: vec![polygon],
        }
    }

    fn geometry(kind: GeometryKind, preset: &str, footprint: Footprint) -> Geometry {
        Geometry {
            name: preset.to_string(),
            kind,
            way: 0,
            way_id: 0,
            rule: 0,
            preset: preset.to_string(),
            material: None,
            roof_material: None,
            origin: [0.0; 3],
            mesh: MeshBuffer::default(),
            footprint,
            offset: 0.0,
            sorted: false,
            instances: Vec::new(),
        }
    }

    fn presets() -> PresetIndex {
        let mut railway = Preset::new("railway", GeometryKind::Trafficway);
        railway.traffic_class = TrafficClass::Railway;
        PresetIndex::new(vec![
            Preset::new("road", GeometryKind::Trafficway),
            railway,
            Preset::new("park", GeometryKind::Area),
        ]).unwrap()
    }

    fn scene() -> Vec<Geometry> {
        vec![
            geometry(GeometryKind::Area, "park", rect([2.0, 2.0], [4.0, 4.0])),
            geometry(GeometryKind::Area, "park", rect([0.0, 0.0], [10.0, 10.0])),
            geometry(GeometryKind::Area, "park", rect([20.0, 0.0], [30.0, 10.0])),
            geometry(GeometryKind::Trafficway, "road", rect([3.0, 3.0], [3.5, 12.0])),
            geometry(GeometryKind::Trafficway, "railway", rect([25.0, 5.0], [25.5, 12.0])),
            geometry(GeometryKind::Trafficway, "road", rect([50.0, 0.0], [51.0, 10.0])),
            geometry(GeometryKind::Building, "house", rect([5.0, 5.0], [6.0, 6.0])),
        ]
    }

    #[test]
    fn collision_needs_a_contained_corner() {
        let a = rect([0.0, 0.0], [4.0, 4.0]);
        assert!(collides(&a, &rect([1.0, 1.0], [2.0, 2.0])));
        assert!(collides(&rect([1.0, 1.0], [2.0, 2.0]), &a));
        assert!(collides(&a, &rect([3.0, 3.0], [6.0, 6.0])));
        assert!(!collides(&a, &rect([5.0, 0.0], [6.0, 4.0])));
        // Plus shape: the boxes overlap but no corner is inside the other.
        assert!(!collides(&rect([0.0, 1.0], [4.0, 2.0]), &rect([1.0, -1.0], [2.0, 4.0])));
    }

    #[test]
    fn larger_areas_sit_lower() {
        let presets = presets();
        let sorter = SpatialSorter::new(&presets, &GenerationSettings::default());
        let mut geometries = scene();
        sorter.sort(&mut geometries);

        assert_relative_eq!(geometries[1].offset, 0.0);
        assert_relative_eq!(geometries[0].offset, 0.001);
        assert_relative_eq!(geometries[2].offset, 0.0);
        assert!(geometries[..3].iter().all(|g| g.sorted));
    }

    #[test]
    fn trafficways_rise_above_areas_by_rank() {
        let presets = presets();
        let sorter = SpatialSorter::new(&presets, &GenerationSettings::default());
        let mut geometries = scene();
        sorter.sort(&mut geometries);

        // Road over both parks: highest park offset plus one step.
        assert_relative_eq!(geometries[3].offset, 0.002);
        // Railway over a ground level park, rank 2.
        assert_relative_eq!(geometries[4].offset, 0.003);
        // Road in the open.
        assert_relative_eq!(geometries[5].offset, 0.001);
        // Buildings stand free.
        assert_relative_eq!(geometries[6].offset, 0.0);
        assert!(!geometries[6].sorted);
    }

    #[test]
    fn sorting_is_idempotent() {
        let presets = presets();
        let sorter = SpatialSorter::new(&presets, &GenerationSettings::default());
        let mut geometries = scene();
        sorter.sort(&mut geometries);
        let first: Vec<f64> = geometries.iter().map(|g| g.offset).collect();
        sorter.sort(&mut geometries);
        let second: Vec<f64> = geometries.iter().map(|g| g.offset).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn equal_areas_keep_parse_order() {
        let presets = presets();
        let sorter = SpatialSorter::new(&presets, &GenerationSettings::default());
        let mut geometries = vec![
            geometry(GeometryKind::Area, "park", rect([0.0, 0.0], [4.0, 4.0])),
            geometry(GeometryKind::Area, "park", rect([2.0, 2.0], [6.0, 6.0])),
        ];
        sorter.sort(&mut geometries);
        assert_relative_eq!(geometries[0].offset, 0.0);
        assert_relative_eq!(geometries[1].offset, 0.001);
    }

    #[test]
    fn chained_overlaps_never_share_a_height() {
        let presets = presets();
        let sorter = SpatialSorter::new(&presets, &GenerationSettings::default());
        let mut geometries = vec![
            geometry(GeometryKind::Area, "park", rect([0.0, 0.0], [10.0, 10.0])),
            geometry(GeometryKind::Area, "park", rect([8.0, 8.0], [14.0, 14.0])),
            geometry(GeometryKind::Area, "park", rect([13.0, 13.0], [16.0, 16.0])),
        ];
        assert!(collides(&geometries[1].footprint, &geometries[2].footprint));
        assert!(!collides(&geometries[0].footprint, &geometries[2].footprint));

        sorter.sort(&mut geometries);
        assert_relative_eq!(geometries[0].offset, 0.0);
        assert_relative_eq!(geometries[1].offset, 0.001);
        assert_relative_eq!(geometries[2].offset, 0.002);
    }

    #[test]
    fn barriers_rank_above_railways() {
        let presets = presets();
        let sorter = SpatialSorter::new(&presets, &GenerationSettings::default());
        let mut geometries = vec![geometry(GeometryKind::Barrier, "fence", rect([0.0, 0.0], [1.0, 0.1]))];
        sorter.sort(&mut geometries);
        assert_relative_eq!(geometries[0].offset, 0.004);
    }
}
