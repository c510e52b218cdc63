//! Geodetic projection of lat/lon/elevation onto the planar scene frame.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use glam::DVec2;

use crate::data::Bounds;
use crate::errors::{Error, Result};

pub const EQUATOR_RADIUS: f64 = 6378137.0;
pub const POLE_RADIUS: f64 = 6356752.314245;
/// Latitudes are clamped to keep away from the Mercator pole asymptote.
pub const MAX_LATITUDE: f64 = 89.5;

const INVERSE_TOLERANCE: f64 = 1e-13;
const INVERSE_MAX_ITERATIONS: usize = 32;

fn eccentricity() -> f64 {
    (1.0 - (POLE_RADIUS * POLE_RADIUS) / (EQUATOR_RADIUS * EQUATOR_RADIUS)).sqrt()
}

/// Ellipsoidal Mercator projection with an optional origin shift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projector {
    scale: f64,
    origin: DVec2,
}

impl Projector {
    pub fn new(scale: f64) -> Self {
        Projector {
            scale,
            origin: DVec2::ZERO,
        }
    }

    /// When `use_origin` is set, the projected minimum corner of `bounds` becomes (0, 0).
    pub fn from_bounds(bounds: &Bounds, use_origin: bool, scale: f64) -> Self {
        let mut projector = Projector::new(scale);
        if use_origin {
            let [x, y, _] = projector.project(bounds.min_lat, bounds.min_lon, 0.0);
            projector.origin = DVec2::new(x, y);
        }
        projector
    }

    fn radius(&self) -> f64 {
        EQUATOR_RADIUS * self.scale
    }

    pub fn project(&self, lat: f64, lon: f64, ele: f64) -> [f64; 3] {
        let e = eccentricity();
        let phi = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let e_sin = e * phi.sin();
        let x = self.radius() * lon.to_radians();
        let y = self.radius()
            * ((FRAC_PI_4 + phi / 2.0).tan() * ((1.0 - e_sin) / (1.0 + e_sin)).powf(e / 2.0)).ln();
        [x - self.origin.x, y - self.origin.y, ele]
    }

    /// Parses the textual attributes of an OSM node and projects them.
    pub fn project_str(&self, lat: &str, lon: &str, ele: Option<&str>) -> Result<[f64; 3]> {
        let parse = |name: &str, value: &str| -> Result<f64> {
            value.trim().parse::<f64>()
                .map_err(|_| Error::parse(format!("{} is not numeric: {:?}", name, value)))
        };
        let lat = parse("lat", lat)?;
        let lon = parse("lon", lon)?;
        let ele = match ele {
            Some(ele) => parse("ele", ele)?,
            None => 0.0,
        };
        Ok(self.project(lat, lon, ele))
    }

    /// Inverse of `project` on the ground plane, returns (lat, lon) in degrees.
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        let e = eccentricity();
        let x = x + self.origin.x;
        let y = y + self.origin.y;
        let lon = (x / self.radius()).to_degrees();

        let t = (-y / self.radius()).exp();
        let mut phi = FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..INVERSE_MAX_ITERATIONS {
            let e_sin = e * phi.sin();
            let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - e_sin) / (1.0 + e_sin)).powf(e / 2.0)).atan();
            let delta = (next - phi).abs();
            phi = next;
            if delta < INVERSE_TOLERANCE {
                break;
            }
        }
        (phi.to_degrees(), lon)
    }

    /// Projected extent of `bounds`.
    pub fn dimensions(&self, bounds: &Bounds) -> [f64; 2] {
        let [min_x, min_y, _] = self.project(bounds.min_lat, bounds.min_lon, 0.0);
        let [max_x, max_y, _] = self.project(bounds.max_lat, bounds.max_lon, 0.0);
        [max_x - min_x, max_y - min_y]
    }
}
