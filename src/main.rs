use std::fs::{self, create_dir_all};
use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use log::info;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use osm_solids::config::{load_user_config, UserConfig};
use osm_solids::errors::Result;
use osm_solids::etl::generate_scene::GenerateSceneEtl;
use osm_solids::etl::parse_osm::ParseOsmEtl;
use osm_solids::etl::Etl;
use osm_solids::host::NoCsg;
use osm_solids::presets::PresetIndex;
use osm_solids::rules::{RuleSet, DEFAULT_RULES};

/// Turns an OpenStreetMap extract into a textured 3D scene.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON user config.
    #[arg(default_value = "config/default.json")]
    config: PathBuf,

    /// Drop cached stage outputs before running.
    #[arg(long)]
    clean: bool,

    /// Minimum level written to the JSON log on stdout.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn create_output_dir(config: &UserConfig) -> Result<PathBuf> {
    let input_fname = Path::new(&config.data_path)
        .file_name()
        .ok_or("Could not get input file name")?;
    let output_dir = Path::new(&config.output_dir).join(input_fname);
    create_dir_all(&output_dir)?;
    Ok(output_dir)
}

fn setup_logging(level: &str) {
    Builder::with_level(level)
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn load_rules(config: &UserConfig) -> Result<RuleSet> {
    match &config.rules_path {
        Some(path) => RuleSet::parse(&fs::read_to_string(path)?),
        None => RuleSet::parse(DEFAULT_RULES),
    }
}

fn load_presets(config: &UserConfig) -> Result<PresetIndex> {
    match &config.presets_path {
        Some(path) => PresetIndex::load(Path::new(path)),
        None => Ok(PresetIndex::builtin()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    let user_config = load_user_config(&args.config)?;
    let rules = load_rules(&user_config)?;
    let presets = load_presets(&user_config)?;
    info!(rules = rules.rules().len(), presets = presets.presets().len(); "Loaded rules and presets");

    let output_dir = create_output_dir(&user_config)?;
    let mut parse = ParseOsmEtl::new(&user_config);
    let mut generate = GenerateSceneEtl::new(&user_config, &rules, &presets, &NoCsg);
    if args.clean {
        parse.clean(&output_dir)?;
        generate.clean(&output_dir)?;
    }

    parse.process(&output_dir)?;
    generate.process(&output_dir)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn every_argument_is_documented() {
        Args::command().debug_assert();
        let command = Args::command();
        for arg in command.get_arguments() {
            if matches!(arg.get_id().as_str(), "help" | "version") {
                continue;
            }
            assert!(arg.get_help().is_some(), "--{} has no help text", arg.get_id());
        }
    }

    #[test]
    fn parses_clean_and_log_level() {
        let args = Args::try_parse_from(["osm_solids", "--clean", "--log-level", "debug", "town.json"]).unwrap();
        assert!(args.clean);
        assert_eq!(args.log_level, "debug");
        assert_eq!(args.config, PathBuf::from("town.json"));

        let args = Args::try_parse_from(["osm_solids"]).unwrap();
        assert!(!args.clean);
        assert_eq!(args.log_level, "info");
    }
}
