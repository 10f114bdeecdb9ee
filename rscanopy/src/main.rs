//! Command line driver for the canopy height pipeline.
//!
//! Usage:
//!   rscanopy single tile.laz -o out/
//!   rscanopy batch tiles/ -o out/ --mosaic canopy.tif
//!   rscanopy merge out/ canopy.tif

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use rscanopy::batch::BatchRunner;
use rscanopy::commons;
use rscanopy::config::PipelineConfig;
use rscanopy::engine::{NativeEngine, PdalEngine, PointCloudEngine};
use rscanopy::geo_core::Crs;
use rscanopy::model::mosaic;

#[derive(Parser)]
#[command(
    name = "rscanopy",
    version,
    about = "Canopy height models from airborne LiDAR tiles"
)]
struct Cli {
    /// JSON config file; the flags below override its fields
    #[arg(long, global = true, value_name = "config.json")]
    config: Option<PathBuf>,

    /// Output cell size in metres
    #[arg(long, global = true)]
    resolution: Option<f64>,

    /// Mask canopy below this height (metres)
    #[arg(long, global = true)]
    min_height: Option<f32>,

    /// EPSG code stamped on rasters built by the native engine
    #[arg(long, global = true)]
    epsg: Option<u32>,

    /// Keep the per-tile DTM/DSM files after compositing
    #[arg(long, global = true)]
    keep_intermediate: bool,

    /// Rasterize through the PDAL command line tool instead of the
    /// built-in engine
    #[arg(long, global = true)]
    pdal: bool,

    /// Custom PDAL pipeline template for the terrain model
    #[arg(long, global = true, value_name = "dtm.json", requires = "pdal")]
    dtm_pipeline: Option<PathBuf>,

    /// Custom PDAL pipeline template for the surface model
    #[arg(long, global = true, value_name = "dsm.json", requires = "pdal")]
    dsm_pipeline: Option<PathBuf>,

    /// Kill a PDAL invocation after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the CHM for one tile
    Single {
        /// Input .las/.laz tile
        tile: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Build a CHM for every tile in a directory
    Batch {
        /// Directory scanned for .las/.laz tiles
        input: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Also merge the per-tile CHMs into this mosaic
        #[arg(long, value_name = "mosaic.tif")]
        mosaic: Option<PathBuf>,
    },
    /// Merge existing CHM rasters into one mosaic
    Merge {
        /// Directory scanned for .tif rasters
        input: PathBuf,
        /// Output mosaic path
        output: PathBuf,
    },
}

fn resolve_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("failed to load config {:?}", path))?,
        None => PipelineConfig::default(),
    };
    if let Some(resolution) = cli.resolution {
        config.resolution = resolution;
    }
    if let Some(min_height) = cli.min_height {
        config.min_canopy_height = min_height;
    }
    if let Some(epsg) = cli.epsg {
        config.crs_epsg = Some(epsg);
    }
    if cli.keep_intermediate {
        config.keep_intermediate = true;
    }
    if let Some(timeout) = cli.timeout {
        config.engine_timeout_secs = timeout;
    }
    Ok(config)
}

fn build_engine(cli: &Cli, config: &PipelineConfig) -> Result<Box<dyn PointCloudEngine>> {
    if cli.pdal {
        let engine = match (&cli.dtm_pipeline, &cli.dsm_pipeline) {
            (Some(dtm), Some(dsm)) => PdalEngine::from_template_files(dtm, dsm)
                .context("failed to load pipeline templates")?,
            (None, None) => PdalEngine::new(config.resolution),
            _ => anyhow::bail!("--dtm-pipeline and --dsm-pipeline must be given together"),
        };
        Ok(Box::new(engine.with_timeout(config.engine_timeout())))
    } else {
        let mut engine = NativeEngine::new(config.resolution);
        if let Some(epsg) = config.crs_epsg {
            engine = engine.with_crs(Crs::from_epsg(epsg));
        }
        Ok(Box::new(engine))
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    match &cli.command {
        Commands::Single { tile, output } => {
            let engine = build_engine(&cli, &config)?;
            let runner = BatchRunner::new(engine.as_ref(), config.clone());
            let chm = runner
                .process_tile(tile, output)
                .with_context(|| format!("failed to process {:?}", tile))?;
            println!("CHM written to {:?}", chm);
        }
        Commands::Batch {
            input,
            output,
            mosaic,
        } => {
            let engine = build_engine(&cli, &config)?;
            let runner = BatchRunner::new(engine.as_ref(), config.clone());
            let chms = runner
                .run_batch(input, output)
                .context("batch processing failed")?;
            println!("{} CHM tiles written to {:?}", chms.len(), output);
            if let Some(mosaic_path) = mosaic {
                mosaic::merge_files(&chms, mosaic_path).context("mosaicking failed")?;
                println!("Mosaic written to {:?}", mosaic_path);
            }
        }
        Commands::Merge { input, output } => {
            let rasters =
                commons::list_rasters(input).with_context(|| format!("cannot scan {:?}", input))?;
            mosaic::merge_files(&rasters, output).context("merge failed")?;
            println!("Mosaic of {} rasters written to {:?}", rasters.len(), output);
        }
    }
    Ok(())
}
