pub mod array;
pub mod config;
pub mod data;
pub mod errors;
pub mod etl;
pub mod generator;
pub mod geo;
pub mod geometry;
pub mod host;
pub mod presets;
pub mod rules;
pub mod sorter;
