use std::path::Path;

use log::info;

use crate::config::NO_DATA;
use crate::engine::{ModelKind, PointCloudEngine};
use crate::error::{ChmError, Result};
use crate::geo_core::{Crs, GeoTransform};
use crate::raster::{geotiff, Grid, Raster};

/// In-process rasterizer for LAS/LAZ tiles, no external tooling required.
///
/// Selects points by model kind (terrain keeps ground-classified returns,
/// surface keeps everything), snaps the selection's extent outward to the
/// resolution lattice and keeps the maximum elevation per cell. Cells no
/// point falls in stay at the nodata sentinel.
pub struct NativeEngine {
    resolution: f64,
    crs: Option<Crs>,
}

impl NativeEngine {
    pub fn new(resolution: f64) -> Self {
        NativeEngine {
            resolution,
            crs: None,
        }
    }

    /// Stamp outputs with a CRS. Point cloud files do not carry a usable
    /// EPSG code through the `las` reader, so it has to come from outside.
    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }
}

impl PointCloudEngine for NativeEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    fn generate(&self, source: &Path, output: &Path, kind: ModelKind) -> Result<()> {
        let mut reader = las::Reader::from_path(source).map_err(|e| ChmError::SourceUnreadable {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut points: Vec<(f64, f64, f64)> = Vec::new();
        for point in reader.points() {
            let point = point.map_err(|e| ChmError::SourceUnreadable {
                path: source.to_path_buf(),
                reason: e.to_string(),
            })?;
            let keep = match kind {
                ModelKind::Terrain => {
                    point.classification == las::point::Classification::Ground
                }
                ModelKind::Surface => true,
            };
            if keep {
                points.push((point.x, point.y, point.z));
            }
        }

        if points.is_empty() {
            return Err(ChmError::NoPoints {
                path: source.to_path_buf(),
                selection: match kind {
                    ModelKind::Terrain => "ground-classified".to_string(),
                    ModelKind::Surface => "usable".to_string(),
                },
            });
        }

        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for &(x, y, _) in &points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        // Snap the extent outward to the resolution lattice, so rasters cut
        // from the same flight line in different runs line up cell for cell
        let res = self.resolution;
        let min_x = (min_x / res).floor() * res;
        let min_y = (min_y / res).floor() * res;
        let mut max_x = (max_x / res).ceil() * res;
        let mut max_y = (max_y / res).ceil() * res;
        if max_x <= min_x {
            max_x = min_x + res;
        }
        if max_y <= min_y {
            max_y = min_y + res;
        }

        let cols = ((max_x - min_x) / res).ceil() as usize;
        let rows = ((max_y - min_y) / res).ceil() as usize;

        let mut grid = Grid::filled(rows, cols, NO_DATA);
        for &(x, y, z) in &points {
            // Points exactly on the far edges land in the last cell
            let col = (((x - min_x) / res).floor() as usize).min(cols - 1);
            let row = (((max_y - y) / res).floor() as usize).min(rows - 1);
            let current = grid.get(row, col);
            let z = z as f32;
            if current == NO_DATA || z > current {
                grid.set(row, col, z);
            }
        }

        info!(
            "[{}] gridded {} points into {}x{} cells at {} m",
            kind.label(),
            points.len(),
            rows,
            cols,
            res
        );

        let transform = GeoTransform::north_up(min_x, max_y, res);
        let raster = Raster::new(grid, transform, self.crs).with_nodata(NO_DATA);
        geotiff::write_geotiff(output, &raster)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_las(path: &Path, points: &[(f64, f64, f64, u8)]) {
        let mut builder = las::Builder::from((1, 2));
        builder.point_format = las::point::Format::new(0).unwrap();
        // Offsets keep the raw i32 coordinates in range for UTM-scale values
        builder.transforms.x.offset = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min).floor();
        builder.transforms.y.offset = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min).floor();
        builder.transforms.z.offset = points.iter().map(|p| p.2).fold(f64::INFINITY, f64::min).floor();
        let header = builder.into_header().unwrap();
        let mut writer = las::Writer::from_path(path, header).unwrap();
        for &(x, y, z, class) in points {
            let point = las::Point {
                x,
                y,
                z,
                classification: las::point::Classification::new(class).unwrap(),
                ..Default::default()
            };
            writer.write_point(point).unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn test_surface_takes_max_per_cell() {
        let dir = tempfile::tempdir().unwrap();
        let tile = dir.path().join("tile.las");
        // Two points in the same cell, one ground and one vegetation
        write_las(
            &tile,
            &[
                (0.5, 0.5, 100.0, 2),
                (0.6, 0.4, 112.0, 5),
                (1.5, 0.5, 101.0, 2),
            ],
        );

        let out = dir.path().join("dsm.tif");
        NativeEngine::new(1.0)
            .generate(&tile, &out, ModelKind::Surface)
            .unwrap();

        let raster = geotiff::read_geotiff(&out).unwrap();
        assert_eq!(raster.grid().shape(), (1, 2));
        assert_eq!(raster.grid().get(0, 0), 112.0);
        assert_eq!(raster.grid().get(0, 1), 101.0);
        assert_eq!(raster.nodata(), Some(NO_DATA));
    }

    #[test]
    fn test_terrain_keeps_only_ground_points() {
        let dir = tempfile::tempdir().unwrap();
        let tile = dir.path().join("tile.las");
        write_las(
            &tile,
            &[
                (0.5, 0.5, 100.0, 2),
                (0.6, 0.4, 112.0, 5),
                (1.5, 0.5, 101.0, 2),
            ],
        );

        let out = dir.path().join("dtm.tif");
        NativeEngine::new(1.0)
            .generate(&tile, &out, ModelKind::Terrain)
            .unwrap();

        let raster = geotiff::read_geotiff(&out).unwrap();
        assert_eq!(raster.grid().get(0, 0), 100.0);
        assert_eq!(raster.grid().get(0, 1), 101.0);
    }

    #[test]
    fn test_empty_cells_hold_the_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let tile = dir.path().join("tile.las");
        // Opposite corners of a 3x3 cell extent; the middle stays empty
        write_las(&tile, &[(0.5, 0.5, 10.0, 2), (2.5, 2.5, 11.0, 2)]);

        let out = dir.path().join("dtm.tif");
        NativeEngine::new(1.0)
            .generate(&tile, &out, ModelKind::Terrain)
            .unwrap();

        let raster = geotiff::read_geotiff(&out).unwrap();
        assert_eq!(raster.grid().shape(), (3, 3));
        assert_eq!(raster.grid().get(1, 1), NO_DATA);
        assert_eq!(raster.grid().get(2, 0), 10.0);
        assert_eq!(raster.grid().get(0, 2), 11.0);
    }

    #[test]
    fn test_extent_snaps_to_lattice() {
        let dir = tempfile::tempdir().unwrap();
        let tile = dir.path().join("tile.las");
        write_las(&tile, &[(643200.3, 5231400.7, 50.0, 2)]);

        let out = dir.path().join("dtm.tif");
        NativeEngine::new(1.0)
            .with_crs(Crs::projected(32610))
            .generate(&tile, &out, ModelKind::Terrain)
            .unwrap();

        let raster = geotiff::read_geotiff(&out).unwrap();
        let (origin_x, origin_y) = raster.transform().origin();
        assert_eq!(origin_x, 643200.0);
        assert_eq!(origin_y, 5231401.0);
        assert_eq!(raster.grid().shape(), (1, 1));
        assert_eq!(raster.crs(), Some(Crs::projected(32610)));
    }

    #[test]
    fn test_points_on_the_far_edge_clamp_into_the_last_cell() {
        let dir = tempfile::tempdir().unwrap();
        let tile = dir.path().join("tile.las");
        write_las(&tile, &[(0.5, 0.5, 5.0, 2), (2.0, 2.0, 9.0, 2)]);

        let out = dir.path().join("dtm.tif");
        NativeEngine::new(1.0)
            .generate(&tile, &out, ModelKind::Terrain)
            .unwrap();

        let raster = geotiff::read_geotiff(&out).unwrap();
        // Extent snaps to [0,2]x[0,2]; (2.0, 2.0) clamps to the NE cell
        assert_eq!(raster.grid().shape(), (2, 2));
        assert_eq!(raster.grid().get(0, 1), 9.0);
        assert_eq!(raster.grid().get(1, 0), 5.0);
    }

    #[test]
    fn test_no_ground_points_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tile = dir.path().join("veg_only.las");
        write_las(&tile, &[(0.5, 0.5, 20.0, 5), (1.5, 1.5, 21.0, 4)]);

        let out = dir.path().join("dtm.tif");
        let err = NativeEngine::new(1.0)
            .generate(&tile, &out, ModelKind::Terrain)
            .unwrap_err();
        assert!(matches!(err, ChmError::NoPoints { .. }));

        // The same tile still works as a surface model
        NativeEngine::new(1.0)
            .generate(&tile, &out, ModelKind::Surface)
            .unwrap();
    }

    #[test]
    fn test_unreadable_tile() {
        let dir = tempfile::tempdir().unwrap();
        let tile = dir.path().join("garbage.las");
        std::fs::write(&tile, b"this is not a point cloud").unwrap();

        let err = NativeEngine::new(1.0)
            .generate(&tile, &dir.path().join("out.tif"), ModelKind::Surface)
            .unwrap_err();
        assert!(matches!(err, ChmError::SourceUnreadable { .. }));
    }
}
