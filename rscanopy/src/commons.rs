use std::path::{Path, PathBuf};

use crate::error::Result;

/// Extensions recognized as LiDAR point cloud tiles.
pub const POINT_CLOUD_EXTENSIONS: &[&str] = &["las", "laz"];

/// Extensions recognized as rasters when scanning merge inputs.
pub const RASTER_EXTENSIONS: &[&str] = &["tif"];

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

fn list_with_extensions(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && has_extension(&path, extensions) {
            files.push(path);
        }
    }
    // Directory order is not stable; sort so runs are deterministic
    files.sort();
    Ok(files)
}

/// Point cloud tiles in a directory, sorted by file name.
pub fn list_point_cloud_tiles(dir: &Path) -> Result<Vec<PathBuf>> {
    list_with_extensions(dir, POINT_CLOUD_EXTENSIONS)
}

/// Rasters in a directory, sorted by file name.
pub fn list_rasters(dir: &Path) -> Result<Vec<PathBuf>> {
    list_with_extensions(dir, RASTER_EXTENSIONS)
}

/// Derive an output name from a source file: the stem (final extension
/// stripped, dots before it kept) plus a suffix.
///
/// `tile.copc.laz` becomes `tile.copc<suffix>`.
fn derived_name(source: &Path, suffix: &str) -> String {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    format!("{}{}", stem, suffix)
}

pub fn dtm_name(tile: &Path) -> String {
    derived_name(tile, "_dtm.tif")
}

pub fn dsm_name(tile: &Path) -> String {
    derived_name(tile, "_dsm.tif")
}

pub fn chm_name(tile: &Path) -> String {
    derived_name(tile, "_chm.tif")
}
