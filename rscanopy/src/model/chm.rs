use std::path::{Path, PathBuf};

use log::info;

use crate::config::NO_DATA;
use crate::error::{ChmError, Result};
use crate::model::align;
use crate::raster::{geotiff, Grid, Raster};

/// Cell-wise canopy height from an aligned DTM/DSM pair.
///
/// The height is `dsm - dtm`, then two masks send cells to zero: cells where
/// either input holds the nodata sentinel, and cells where the raw difference
/// is below `min_height`. Both masks look at the raw inputs, so their order
/// cannot matter; a difference of exactly `min_height` is kept. Negative
/// differences fall under the threshold mask.
pub fn compose(dtm: &Grid, dsm: &Grid, min_height: f32) -> Result<Grid> {
    if dtm.shape() != dsm.shape() {
        return Err(ChmError::ShapeMismatch {
            left_rows: dtm.rows(),
            left_cols: dtm.cols(),
            right_rows: dsm.rows(),
            right_cols: dsm.cols(),
        });
    }

    let data = dtm
        .data()
        .iter()
        .zip(dsm.data())
        .map(|(&ground, &surface)| {
            if ground == NO_DATA || surface == NO_DATA {
                return 0.0;
            }
            let height = surface - ground;
            if height < min_height {
                0.0
            } else {
                height
            }
        })
        .collect();

    Ok(Grid::from_data(dtm.rows(), dtm.cols(), data))
}

/// File-level compositing: read the two elevation models, equalize their
/// shapes, compose, and persist the canopy raster at `output`.
///
/// The output keeps the DTM's CRS and transform. No nodata tag is written;
/// zero is ordinary data in a canopy model.
pub fn create_chm(
    dtm_path: &Path,
    dsm_path: &Path,
    output: &Path,
    min_height: f32,
) -> Result<PathBuf> {
    info!("[chm] compositing {:?} minus {:?}", dsm_path, dtm_path);

    let dtm = geotiff::read_geotiff(dtm_path)?;
    let dsm = geotiff::read_geotiff(dsm_path)?;

    let transform = dtm.transform();
    let crs = dtm.crs();

    let (dtm_grid, dsm_grid) = align::align_pair(dtm.into_grid(), dsm.into_grid());
    let grid = compose(&dtm_grid, &dsm_grid, min_height)?;

    geotiff::write_geotiff(output, &Raster::new(grid, transform, crs))?;
    info!("[chm] canopy heights written to {:?}", output);
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MIN_CANOPY_HEIGHT_M;
    use crate::geo_core::{Crs, GeoTransform};

    #[test]
    fn test_uniform_planes() {
        let dtm = Grid::filled(4, 4, 2.0);
        let dsm = Grid::filled(4, 4, 10.0);
        let chm = compose(&dtm, &dsm, DEFAULT_MIN_CANOPY_HEIGHT_M).unwrap();
        assert!(chm.data().iter().all(|&v| v == 8.0));
    }

    #[test]
    fn test_nodata_in_the_dsm_masks_to_zero() {
        let dtm = Grid::filled(2, 3, 1.0);
        let mut dsm = Grid::filled(2, 3, 9.0);
        dsm.set(0, 1, NO_DATA);
        dsm.set(1, 2, NO_DATA);
        let chm = compose(&dtm, &dsm, DEFAULT_MIN_CANOPY_HEIGHT_M).unwrap();
        assert_eq!(chm.get(0, 1), 0.0);
        assert_eq!(chm.get(1, 2), 0.0);
        assert_eq!(chm.get(0, 0), 8.0);
    }

    #[test]
    fn test_nodata_in_the_dtm_wins_over_any_surface() {
        let mut dtm = Grid::filled(2, 2, 0.0);
        dtm.set(0, 0, NO_DATA);
        let dsm = Grid::filled(2, 2, 50.0);
        let chm = compose(&dtm, &dsm, DEFAULT_MIN_CANOPY_HEIGHT_M).unwrap();
        assert_eq!(chm.get(0, 0), 0.0);
        assert_eq!(chm.get(0, 1), 50.0);
    }

    #[test]
    fn test_low_canopy_masks_to_zero() {
        let dtm = Grid::filled(3, 3, 4.0);
        let dsm = Grid::filled(3, 3, 5.0);
        let chm = compose(&dtm, &dsm, DEFAULT_MIN_CANOPY_HEIGHT_M).unwrap();
        assert!(chm.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_threshold_boundary() {
        let dtm = Grid::filled(1, 2, 0.0);
        let mut dsm = Grid::filled(1, 2, 1.83);
        dsm.set(0, 1, 1.82);
        let chm = compose(&dtm, &dsm, DEFAULT_MIN_CANOPY_HEIGHT_M).unwrap();
        assert_eq!(chm.get(0, 0), 1.83);
        assert_eq!(chm.get(0, 1), 0.0);
    }

    #[test]
    fn test_inverted_surfaces_mask_to_zero() {
        // Surface below terrain: the negative difference falls under the
        // threshold and never reaches the output
        let dtm = Grid::filled(1, 1, 12.0);
        let dsm = Grid::filled(1, 1, 9.0);
        let chm = compose(&dtm, &dsm, DEFAULT_MIN_CANOPY_HEIGHT_M).unwrap();
        assert_eq!(chm.get(0, 0), 0.0);
    }

    #[test]
    fn test_shape_mismatch_is_an_error() {
        let dtm = Grid::filled(2, 2, 0.0);
        let dsm = Grid::filled(2, 3, 0.0);
        let err = compose(&dtm, &dsm, DEFAULT_MIN_CANOPY_HEIGHT_M).unwrap_err();
        assert!(matches!(err, ChmError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_deterministic() {
        let dtm = Grid::from_data(2, 2, vec![1.0, NO_DATA, 3.0, 4.0]);
        let dsm = Grid::from_data(2, 2, vec![9.0, 9.0, 3.5, 14.0]);
        let first = compose(&dtm, &dsm, DEFAULT_MIN_CANOPY_HEIGHT_M).unwrap();
        let second = compose(&dtm, &dsm, DEFAULT_MIN_CANOPY_HEIGHT_M).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_create_chm_preserves_the_dtm_georeferencing() {
        let dir = tempfile::tempdir().unwrap();
        let dtm_path = dir.path().join("tile_dtm.tif");
        let dsm_path = dir.path().join("tile_dsm.tif");
        let chm_path = dir.path().join("tile_chm.tif");

        let transform = GeoTransform::north_up(643200.0, 5231440.0, 1.0);
        let crs = Some(Crs::projected(32610));
        let dtm = Raster::new(Grid::filled(2, 2, 100.0), transform, crs).with_nodata(NO_DATA);
        let dsm = Raster::new(Grid::filled(2, 2, 104.0), transform, crs).with_nodata(NO_DATA);
        geotiff::write_geotiff(&dtm_path, &dtm).unwrap();
        geotiff::write_geotiff(&dsm_path, &dsm).unwrap();

        let out = create_chm(&dtm_path, &dsm_path, &chm_path, 1.83).unwrap();
        assert_eq!(out, chm_path);

        let chm = geotiff::read_geotiff(&chm_path).unwrap();
        assert!(chm.grid().data().iter().all(|&v| v == 4.0));
        assert_eq!(chm.transform(), transform);
        assert_eq!(chm.crs(), crs);
        assert_eq!(chm.nodata(), None);
    }

    #[test]
    fn test_create_chm_equalizes_shapes_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let dtm_path = dir.path().join("ragged_dtm.tif");
        let dsm_path = dir.path().join("ragged_dsm.tif");
        let chm_path = dir.path().join("ragged_chm.tif");

        let transform = GeoTransform::north_up(0.0, 2.0, 1.0);
        let dtm = Raster::new(Grid::filled(1, 1, 1.0), transform, None);
        let dsm = Raster::new(Grid::filled(2, 2, 5.0), transform, None);
        geotiff::write_geotiff(&dtm_path, &dtm).unwrap();
        geotiff::write_geotiff(&dsm_path, &dsm).unwrap();

        create_chm(&dtm_path, &dsm_path, &chm_path, 1.83).unwrap();

        // The padded DTM cells are zero, so the trailing cells carry the
        // full surface height
        let chm = geotiff::read_geotiff(&chm_path).unwrap();
        assert_eq!(chm.grid().shape(), (2, 2));
        assert_eq!(chm.grid().get(0, 0), 4.0);
        assert_eq!(chm.grid().get(0, 1), 5.0);
        assert_eq!(chm.grid().get(1, 1), 5.0);
    }
}
