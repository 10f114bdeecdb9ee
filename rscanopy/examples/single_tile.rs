use std::path::Path;

use anyhow::Result;
use rscanopy::batch::BatchRunner;
use rscanopy::config::PipelineConfig;
use rscanopy::engine::NativeEngine;
use rscanopy::geo_core::Crs;
use rscanopy::raster::geotiff;

/// Example: canopy height model for a single tile
///
/// Writes a synthetic .las tile (flat ground with a small stand of trees),
/// derives its DTM and DSM with the built-in engine, and composites the CHM.
fn main() -> Result<()> {
    println!("=== Example: CHM from a single LiDAR tile ===\n");

    let output_dir = Path::new("./output");
    std::fs::create_dir_all(output_dir)?;

    let tile = output_dir.join("demo_tile.las");
    write_demo_tile(&tile)?;
    println!("Synthetic tile written to {:?}", tile);
    println!("  - 20x20 m of ground at z=50");
    println!("  - a stand of trees up to 12 m in the north-west corner\n");

    let config = PipelineConfig {
        keep_intermediate: true,
        ..Default::default()
    };
    let engine = NativeEngine::new(config.resolution).with_crs(Crs::projected(32610));
    let runner = BatchRunner::new(&engine, config);

    println!("Deriving elevation models and compositing...");
    let chm_path = runner.process_tile(&tile, output_dir)?;

    let chm = geotiff::read_geotiff(&chm_path)?;
    let tallest = chm.grid().data().iter().cloned().fold(f32::MIN, f32::max);
    let canopy_cells = chm.grid().data().iter().filter(|&&v| v > 0.0).count();

    println!("\nCHM written to {:?}", chm_path);
    println!("  - {}x{} cells at 1 m", chm.grid().rows(), chm.grid().cols());
    println!("  - tallest canopy: {:.1} m", tallest);
    println!("  - {} cells above the height threshold", canopy_cells);
    println!("  - DTM/DSM kept alongside (keep_intermediate)");

    Ok(())
}

fn write_demo_tile(path: &Path) -> Result<()> {
    let mut builder = las::Builder::from((1, 2));
    builder.point_format = las::point::Format::new(0)?;
    let mut writer = las::Writer::from_path(path, builder.into_header()?)?;

    // Ground lattice, two returns per metre
    for i in 0..40 {
        for j in 0..40 {
            writer.write_point(las::Point {
                x: i as f64 * 0.5 + 0.25,
                y: j as f64 * 0.5 + 0.25,
                z: 50.0,
                classification: las::point::Classification::new(2)?,
                ..Default::default()
            })?;
        }
    }

    // Tree canopy over the north-west corner, 8 to 12 m tall
    for i in 0..8 {
        for j in 0..8 {
            let height = 8.0 + 2.0 * ((i + j) % 3) as f64;
            writer.write_point(las::Point {
                x: i as f64 * 0.5 + 0.25,
                y: 16.0 + j as f64 * 0.5 + 0.25,
                z: 50.0 + height,
                classification: las::point::Classification::new(5)?,
                ..Default::default()
            })?;
        }
    }

    writer.close()?;
    Ok(())
}
