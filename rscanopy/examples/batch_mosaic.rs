use std::path::Path;

use anyhow::Result;
use rscanopy::batch::BatchRunner;
use rscanopy::config::PipelineConfig;
use rscanopy::engine::NativeEngine;
use rscanopy::geo_core::Crs;
use rscanopy::model::mosaic;
use rscanopy::raster::geotiff;

/// Example: batch processing and mosaicking
///
/// Writes three adjacent synthetic tiles, processes them to per-tile CHMs
/// in one batch, and merges the results into a single continuous raster.
fn main() -> Result<()> {
    println!("=== Example: batch CHMs and a mosaic ===\n");

    let base = Path::new("./output/batch");
    let tiles_dir = base.join("tiles");
    let chm_dir = base.join("chm");
    std::fs::create_dir_all(&tiles_dir)?;

    // Three 10x10 m tiles side by side along the x axis, each with one
    // tree of a different height
    let names = ["tile_west.las", "tile_center.las", "tile_east.las"];
    for (idx, name) in names.iter().enumerate() {
        write_tile(&tiles_dir.join(name), idx as f64 * 10.0, 4.0 + 3.0 * idx as f64)?;
    }
    println!("Three synthetic tiles written to {:?}\n", tiles_dir);

    let config = PipelineConfig::default();
    let engine = NativeEngine::new(config.resolution).with_crs(Crs::projected(2154));
    let runner = BatchRunner::new(&engine, config);

    let chms = runner.run_batch(&tiles_dir, &chm_dir)?;
    println!("\n{} per-tile CHMs written to {:?}", chms.len(), chm_dir);

    let mosaic_path = base.join("canopy_mosaic.tif");
    mosaic::merge_files(&chms, &mosaic_path)?;

    let merged = geotiff::read_geotiff(&mosaic_path)?;
    let tallest = merged.grid().data().iter().cloned().fold(f32::MIN, f32::max);
    println!("\nMosaic written to {:?}", mosaic_path);
    println!(
        "  - {}x{} cells covering all three tiles",
        merged.rows(),
        merged.cols()
    );
    println!("  - tallest canopy in the mosaic: {:.1} m", tallest);

    Ok(())
}

fn write_tile(path: &Path, x0: f64, tree_height: f64) -> Result<()> {
    let mut builder = las::Builder::from((1, 2));
    builder.point_format = las::point::Format::new(0)?;
    let mut writer = las::Writer::from_path(path, builder.into_header()?)?;

    // One ground return per cell
    for i in 0..10 {
        for j in 0..10 {
            writer.write_point(las::Point {
                x: x0 + i as f64 + 0.5,
                y: j as f64 + 0.5,
                z: 120.0,
                classification: las::point::Classification::new(2)?,
                ..Default::default()
            })?;
        }
    }

    // A single tree in the middle of the tile
    writer.write_point(las::Point {
        x: x0 + 5.5,
        y: 5.5,
        z: 120.0 + tree_height,
        classification: las::point::Classification::new(5)?,
        ..Default::default()
    })?;

    writer.close()?;
    Ok(())
}
