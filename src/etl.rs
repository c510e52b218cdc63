pub mod generate_scene;
pub mod parse_osm;

use std::{fs, io::Write, path::Path};
use log::{info, error};
use rkyv::{de::deserializers::SharedDeserializeMap, ser::serializers::AllocSerializer, AlignedVec};

use crate::errors::{Error, Result};


/// A cached pipeline stage. Outputs live in a shared directory, a stage is
/// skipped when all of its output files already exist.
pub trait Etl {
    type Input;
    type Output;

    fn etl_name(&self) -> &str;

    /// File names written by `load`, relative to the stage directory.
    fn output_files(&self) -> &[&str];

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        for name in self.output_files() {
            if !dir.join(name).try_exists()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        for name in self.output_files() {
            let path = dir.join(name);
            if path.try_exists()? {
                fs::remove_file(&path)?;
                info!(etl_name = self.etl_name(), file = *name; "Removed cached output");
            }
        }
        Ok(())
    }

    fn extract(&mut self, dir: &Path) -> Result<Self::Input>;
    fn transform(&mut self, input: Self::Input) -> Result<Self::Output>;
    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()>;

    fn process(&mut self, dir: &Path) -> Result<()> {
        info!(etl_name = self.etl_name(); "Starting ETL process");
        if self.is_cached(dir)? {
            info!(etl_name = self.etl_name(); "Using cached value");
        } else {
            info!(etl_name = self.etl_name(); "Extracting");
            let input = self.extract(dir);
            let input = log_failure(self.etl_name(), "Extraction", input)?;

            info!(etl_name = self.etl_name(); "Transforming");
            let output = self.transform(input);
            let output = log_failure(self.etl_name(), "Transformation", output)?;

            info!(etl_name = self.etl_name(); "Loading");
            let loaded = self.load(dir, output);
            log_failure(self.etl_name(), "Loading", loaded)?;
        }
        info!(etl_name = self.etl_name(); "Process finished");
        Ok(())
    }
}

fn log_failure<T>(etl_name: &str, step: &str, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        error!(etl_name = etl_name, step = step, err = err.message.as_str(); "ETL step failed with error");
    }
    result
}

/// Serializes `value` into an rkyv archive at `path`.
pub fn write_archive<T>(path: &Path, value: &T) -> Result<()>
where
    T: rkyv::Serialize<AllocSerializer<256>>,
{
    let bytes = rkyv::to_bytes::<_, 256>(value)
        .map_err(|err| Error::cache(format!("could not serialize {}: {:?}", path.display(), err)))?;
    let mut file = fs::File::create(path)?;
    file.write_all(&bytes)?;
    Ok(())
}

/// Reads an archive written by `write_archive`. The archive is trusted, it is
/// only ever produced by an earlier stage of this pipeline.
pub fn read_archive<T>(path: &Path) -> Result<T>
where
    T: rkyv::Archive,
    T::Archived: rkyv::Deserialize<T, SharedDeserializeMap>,
{
    let raw = fs::read(path)?;
    let mut bytes = AlignedVec::with_capacity(raw.len());
    bytes.extend_from_slice(&raw);
    unsafe { rkyv::from_bytes_unchecked::<T>(&bytes) }
        .map_err(|err| Error::cache(format!("could not deserialize {}: {:?}", path.display(), err)))
}
