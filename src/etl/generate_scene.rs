use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;

use crate::config::UserConfig;
use crate::data::scene::Scene;
use crate::data::MapData;
use crate::errors::Result;
use crate::generator::{emit, kind_counts, Generator};
use crate::host::{CsgKernel, ObjSceneHost};
use crate::presets::PresetIndex;
use crate::rules::RuleSet;

use super::parse_osm;
use super::{read_archive, write_archive, Etl};

pub const ETL_NAME: &str = "generate_scene";
pub const SCENE_FILE_NAME: &str = "scene.rkyv";
pub const OBJ_FILE_NAME: &str = "scene.obj";

pub struct GenerateSceneEtl<'a> {
    config: &'a UserConfig,
    rules: &'a RuleSet,
    presets: &'a PresetIndex,
    kernel: &'a dyn CsgKernel,
}

impl<'a> GenerateSceneEtl<'a> {
    pub fn new(
        config: &'a UserConfig,
        rules: &'a RuleSet,
        presets: &'a PresetIndex,
        kernel: &'a dyn CsgKernel,
    ) -> Self {
        GenerateSceneEtl {
            config,
            rules,
            presets,
            kernel,
        }
    }
}

impl Etl for GenerateSceneEtl<'_> {
    type Input = MapData;
    type Output = Scene;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn output_files(&self) -> &[&str] {
        &[SCENE_FILE_NAME, OBJ_FILE_NAME]
    }

    fn extract(&mut self, dir: &Path) -> Result<Self::Input> {
        read_archive(&dir.join(parse_osm::OUTPUT_FILE_NAME))
    }

    fn transform(&mut self, mut map: Self::Input) -> Result<Self::Output> {
        let generator = Generator::new(self.rules, self.presets, &self.config.settings, self.kernel);
        let mut pass = generator.prepare(&mut map);
        for way in tqdm::tqdm(0..pass.way_count()) {
            generator.synthesize_way(&map, &mut pass, way);
        }
        let scene = generator.finish(&mut map, pass);

        let mut counts: Vec<(&str, usize)> = kind_counts(&scene).into_iter().collect();
        counts.sort();
        for (kind, count) in counts {
            info!(etl_name = ETL_NAME, kind = kind, count = count; "Generated geometry");
        }
        Ok(scene)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        write_archive(&dir.join(SCENE_FILE_NAME), &output)?;

        let mut host = ObjSceneHost::new(BufWriter::new(File::create(dir.join(OBJ_FILE_NAME))?));
        let handles = emit(&output, &mut host)?;
        host.into_inner().flush()?;
        info!(etl_name = ETL_NAME, objects = handles.len(); "Wrote scene");
        Ok(())
    }
}
