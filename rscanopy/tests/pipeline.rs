//! End-to-end runs over synthetic point cloud tiles: batch to per-tile
//! CHMs, then a mosaic.

use std::path::Path;

use rscanopy::batch::BatchRunner;
use rscanopy::commons;
use rscanopy::config::{PipelineConfig, NO_DATA};
use rscanopy::engine::NativeEngine;
use rscanopy::geo_core::Crs;
use rscanopy::model::mosaic;
use rscanopy::raster::geotiff;

fn write_las(path: &Path, points: &[(f64, f64, f64, u8)]) {
    let mut builder = las::Builder::from((1, 2));
    builder.point_format = las::point::Format::new(0).unwrap();
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

/// A 4x4 m tile: ground at z=100 in every cell, plus one canopy return.
fn synthetic_tile(path: &Path, x0: f64, canopy: (f64, f64, f64)) {
    let mut points = Vec::new();
    for i in 0..4 {
        for j in 0..4 {
            points.push((x0 + i as f64 + 0.5, j as f64 + 0.5, 100.0, 2));
        }
    }
    points.push((canopy.0, canopy.1, canopy.2, 5));
    write_las(path, &points);
}

#[test]
fn test_batch_then_mosaic_over_adjacent_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let tiles = dir.path().join("tiles");
    let out = dir.path().join("out");
    std::fs::create_dir(&tiles).unwrap();

    // Two tiles side by side; each has one tree, 6 m in the west tile and
    // 10 m in the east one
    synthetic_tile(&tiles.join("tile_a.las"), 0.0, (0.5, 3.5, 106.0));
    synthetic_tile(&tiles.join("tile_b.las"), 4.0, (7.5, 3.5, 110.0));

    let engine = NativeEngine::new(1.0).with_crs(Crs::projected(32610));
    let runner = BatchRunner::new(&engine, PipelineConfig::default());
    let chms = runner.run_batch(&tiles, &out).unwrap();

    assert_eq!(chms.len(), 2);
    assert_eq!(chms[0], out.join("tile_a_chm.tif"));
    assert_eq!(chms[1], out.join("tile_b_chm.tif"));

    // Intermediate elevation models are cleaned up by default
    assert!(!out.join("tile_a_dtm.tif").exists());
    assert!(!out.join("tile_a_dsm.tif").exists());
    assert!(!out.join("tile_b_dsm.tif").exists());

    let chm_a = geotiff::read_geotiff(&chms[0]).unwrap();
    assert_eq!(chm_a.grid().shape(), (4, 4));
    assert_eq!(chm_a.crs(), Some(Crs::projected(32610)));
    // The tree sits in the north-west cell; bare ground composites to zero
    assert_eq!(chm_a.grid().get(0, 0), 6.0);
    assert_eq!(chm_a.grid().get(2, 2), 0.0);

    let mosaic_path = dir.path().join("canopy.tif");
    mosaic::merge_files(&chms, &mosaic_path).unwrap();

    let merged = geotiff::read_geotiff(&mosaic_path).unwrap();
    assert_eq!(merged.grid().shape(), (4, 8));
    assert_eq!(merged.transform().origin(), (0.0, 4.0));
    assert_eq!(merged.crs(), Some(Crs::projected(32610)));
    assert_eq!(merged.grid().get(0, 0), 6.0);
    assert_eq!(merged.grid().get(0, 7), 10.0);
    // Only the two trees survive the height mask
    let canopy_cells = merged.grid().data().iter().filter(|&&v| v != 0.0).count();
    assert_eq!(canopy_cells, 2);
}

#[test]
fn test_keep_intermediate_retains_the_elevation_models() {
    let dir = tempfile::tempdir().unwrap();
    let tile = dir.path().join("tile.las");
    let out = dir.path().join("out");
    synthetic_tile(&tile, 0.0, (1.5, 1.5, 104.0));

    let config = PipelineConfig {
        keep_intermediate: true,
        ..Default::default()
    };
    let engine = NativeEngine::new(1.0);
    let runner = BatchRunner::new(&engine, config);
    runner.process_tile(&tile, &out).unwrap();

    let dtm_path = out.join("tile_dtm.tif");
    let dsm_path = out.join("tile_dsm.tif");
    assert!(dtm_path.exists());
    assert!(dsm_path.exists());

    // The retained models still carry the nodata tag
    let dtm = geotiff::read_geotiff(&dtm_path).unwrap();
    assert_eq!(dtm.nodata(), Some(NO_DATA));
    assert_eq!(dtm.grid().get(0, 0), 100.0);
    let dsm = geotiff::read_geotiff(&dsm_path).unwrap();
    assert_eq!(dsm.grid().get(2, 1), 104.0);
}

#[test]
fn test_merge_mode_over_a_directory_of_chms() {
    let dir = tempfile::tempdir().unwrap();
    let tiles = dir.path().join("tiles");
    let out = dir.path().join("out");
    std::fs::create_dir(&tiles).unwrap();

    synthetic_tile(&tiles.join("north.las"), 0.0, (0.5, 0.5, 105.0));
    synthetic_tile(&tiles.join("south.las"), 4.0, (4.5, 0.5, 103.0));

    let engine = NativeEngine::new(1.0);
    let runner = BatchRunner::new(&engine, PipelineConfig::default());
    runner.run_batch(&tiles, &out).unwrap();

    // A later merge-only pass rediscovers the CHMs from disk
    let rasters = commons::list_rasters(&out).unwrap();
    assert_eq!(rasters.len(), 2);
    assert!(rasters[0].ends_with("north_chm.tif"));
    assert!(rasters[1].ends_with("south_chm.tif"));

    let mosaic_path = dir.path().join("merged.tif");
    mosaic::merge_files(&rasters, &mosaic_path).unwrap();
    let merged = geotiff::read_geotiff(&mosaic_path).unwrap();
    assert_eq!(merged.grid().shape(), (4, 8));
    assert_eq!(merged.grid().get(3, 0), 5.0);
    assert_eq!(merged.grid().get(3, 4), 3.0);
}
