use bevy::prelude::*;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

use super::grid::NavGrid;
use crate::nav::waypoints::WaypointGraph;

pub const NAV_DATA_VERSION: u32 = 1;

/// Baked navigation data for one battlefield.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NavData {
    pub version: u32,
    pub grid: NavGrid,
    pub waypoints: Option<WaypointGraph>,
}

impl NavData {
    pub fn new(grid: NavGrid, waypoints: Option<WaypointGraph>) -> Self {
        Self { version: NAV_DATA_VERSION, grid, waypoints }
    }
}

#[derive(Debug, Error)]
pub enum NavDataError {
    #[error("navigation data i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("navigation data encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("navigation data version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },
}

/// Writes zlib-compressed bincode.
pub fn save_nav_data(path: impl AsRef<Path>, data: &NavData) -> Result<(), NavDataError> {
    let file = File::create(path.as_ref())?;
    let writer = BufWriter::new(file);
    let mut encoder = ZlibEncoder::new(writer, Compression::default());
    bincode::serialize_into(&mut encoder, data)?;
    encoder.finish()?.flush()?;
    info!("[NAVDATA] Saved {}", path.as_ref().display());
    Ok(())
}

pub fn load_nav_data(path: impl AsRef<Path>) -> Result<NavData, NavDataError> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let mut decoder = ZlibDecoder::new(reader);
    let data: NavData = bincode::deserialize_from(&mut decoder)?;
    if data.version != NAV_DATA_VERSION {
        return Err(NavDataError::Version {
            found: data.version,
            expected: NAV_DATA_VERSION,
        });
    }
    info!(
        "[NAVDATA] Loaded {} ({}x{} grid, {} waypoints)",
        path.as_ref().display(),
        data.grid.width,
        data.grid.height,
        data.waypoints.as_ref().map_or(0, |g| g.len())
    );
    Ok(data)
}
