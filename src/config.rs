use std::{fs::File, io::BufReader, path::Path};

use serde::Deserialize;

use crate::errors::Result;

#[derive(Deserialize, Debug, Clone)]
pub struct UserConfig {
    pub data_path: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Rule source, the built-in rules are used when absent.
    pub rules_path: Option<String>,
    /// JSON preset catalogue, the built-in catalogue is used when absent.
    pub presets_path: Option<String>,
    #[serde(default)]
    pub settings: GenerationSettings,
}

fn default_output_dir() -> String {
    "output".to_string()
}

/// Scene wide defaults. Presets and rule settings override most of them.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GenerationSettings {
    /// Subtract the projected minimum corner of the bounds.
    pub use_origin: bool,
    pub unit_scale: f64,
    pub right_hand_traffic: bool,

    pub offset_step: f64,
    pub base_offset: f64,

    pub lane_width: f64,
    pub default_lanes: u32,
    pub texture_lanes: u32,
    pub cycleway_width: f64,
    pub railway_width: f64,
    pub barrier_width: f64,
    /// Connected trafficways turning more than this (degrees) are not blended.
    pub junction_angle: f64,

    pub building_level_height: f64,
    pub building_default_levels: f64,
    pub texture_levels: u32,
    pub roof_texture_scale: f64,
    pub area_texture_scale: f64,

    /// Tile length of array modules without preset dimensions.
    pub module_length: f64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        GenerationSettings {
            use_origin: true,
            unit_scale: 1.0,
            right_hand_traffic: true,
            offset_step: 0.001,
            base_offset: 0.0,
            lane_width: 3.0,
            default_lanes: 1,
            texture_lanes: 2,
            cycleway_width: 1.0,
            railway_width: 1.5,
            barrier_width: 0.2,
            junction_angle: 80.0,
            building_level_height: 3.0,
            building_default_levels: 3.0,
            texture_levels: 1,
            roof_texture_scale: 1.0,
            area_texture_scale: 1.0,
            module_length: 2.0,
        }
    }
}

pub fn load_user_config(path: &Path) -> Result<UserConfig> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_settings_use_defaults() {
        let config: UserConfig = serde_json::from_str(r#"{
            "data_path": "data/town.osm.xz",
            "settings": { "lane_width": 3.5, "right_hand_traffic": false }
        }"#).unwrap();
        assert_eq!(config.output_dir, "output");
        assert_eq!(config.rules_path, None);
        assert_eq!(config.settings.lane_width, 3.5);
        assert!(!config.settings.right_hand_traffic);
        assert_eq!(config.settings.building_level_height, 3.0);
        assert_eq!(config.settings.offset_step, 0.001);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load_user_config(Path::new("does/not/exist.json")).unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::Io);
    }
}
