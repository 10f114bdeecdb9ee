use std::path::{Path, PathBuf};

use log::info;

use crate::error::{ChmError, Result};
use crate::geo_core::GeoTransform;
use crate::raster::{geotiff, Grid, Raster};

/// Tolerance when comparing cell sizes between inputs.
const RES_EPSILON: f64 = 1e-6;

fn crs_label(raster: &Raster) -> String {
    match raster.crs() {
        Some(crs) => crs.to_string(),
        None => "untagged".to_string(),
    }
}

/// Merge rasters sharing a CRS and cell size into one raster covering the
/// union of their extents.
///
/// Where inputs overlap, the raster earliest in `rasters` supplies the cell
/// (first wins). Cells no input covers are 0.0. Inputs are assumed to sit on
/// a common cell lattice; their offsets into the output are rounded, never
/// resampled. Two untagged rasters count as sharing a CRS.
pub fn merge(rasters: &[Raster]) -> Result<Raster> {
    let first = rasters.first().ok_or(ChmError::EmptySet)?;

    let crs = first.crs();
    let (res_x, res_y) = first.resolution();

    let mut extent = first.extent();
    for raster in &rasters[1..] {
        if raster.crs() != crs {
            return Err(ChmError::CrsMismatch {
                left: crs_label(first),
                right: crs_label(raster),
            });
        }
        let (rx, ry) = raster.resolution();
        if (rx - res_x).abs() > RES_EPSILON {
            return Err(ChmError::ResolutionMismatch {
                left: res_x,
                right: rx,
            });
        }
        if (ry - res_y).abs() > RES_EPSILON {
            return Err(ChmError::ResolutionMismatch {
                left: res_y,
                right: ry,
            });
        }
        extent = extent.union(&raster.extent());
    }

    let cols = (extent.width() / res_x).round() as usize;
    let rows = (extent.height() / res_y).round() as usize;
    let mut out = Grid::filled(rows, cols, 0.0);

    // Painting the inputs back to front lets earlier ones overwrite later
    // ones, which is all "first wins" takes
    for raster in rasters.iter().rev() {
        let (origin_x, origin_y) = raster.transform().origin();
        let col0 = ((origin_x - extent.min_x) / res_x).round() as isize;
        let row0 = ((extent.max_y - origin_y) / res_y).round() as isize;
        for row in 0..raster.rows() {
            for col in 0..raster.cols() {
                let out_row = row0 + row as isize;
                let out_col = col0 + col as isize;
                if (0..rows as isize).contains(&out_row) && (0..cols as isize).contains(&out_col) {
                    out.set(
                        out_row as usize,
                        out_col as usize,
                        raster.grid().get(row, col),
                    );
                }
            }
        }
    }

    let transform = GeoTransform::new(extent.min_x, extent.max_y, res_x, -res_y);
    Ok(Raster::new(out, transform, crs))
}

/// Read a list of GeoTIFFs, merge them, write the mosaic to `output`.
pub fn merge_files(inputs: &[PathBuf], output: &Path) -> Result<PathBuf> {
    if inputs.is_empty() {
        return Err(ChmError::EmptySet);
    }

    info!("[mosaic] merging {} rasters into {:?}", inputs.len(), output);
    let mut rasters = Vec::with_capacity(inputs.len());
    for path in inputs {
        rasters.push(geotiff::read_geotiff(path)?);
    }

    let merged = merge(&rasters)?;
    geotiff::write_geotiff(output, &merged)?;
    info!(
        "[mosaic] {}x{} mosaic written to {:?}",
        merged.rows(),
        merged.cols(),
        output
    );
    Ok(output.to_path_buf())
}
