use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use crate::commons;
use crate::config::PipelineConfig;
use crate::engine::PointCloudEngine;
use crate::error::{ChmError, Result, Stage};
use crate::model::chm;
use crate::model::elevation::ElevationModeler;

fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {percent} {msg}")
        .unwrap()
        .progress_chars("##-")
}

/// Cloneable cancellation flag checked between pipeline stages.
///
/// Hand a clone to whoever should be able to stop the batch (a ctrl-c
/// handler, another thread); a set token aborts at the next checkpoint
/// with [`ChmError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Sequential tile-after-tile driver for the whole pipeline.
///
/// A batch aborts on the first tile failure; outputs already written stay
/// on disk.
pub struct BatchRunner<'e> {
    engine: &'e dyn PointCloudEngine,
    config: PipelineConfig,
    cancel: CancelToken,
}

impl<'e> BatchRunner<'e> {
    pub fn new(engine: &'e dyn PointCloudEngine, config: PipelineConfig) -> Self {
        BatchRunner {
            engine,
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ChmError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// The per-tile stages, labelled so the batch loop can report where a
    /// tile died.
    fn tile_stages(
        &self,
        tile: &Path,
        output_dir: &Path,
    ) -> std::result::Result<PathBuf, (Stage, ChmError)> {
        self.checkpoint().map_err(|e| (Stage::ElevationModels, e))?;
        let modeler = ElevationModeler::new(self.engine, output_dir);
        let pair = modeler
            .run(tile)
            .map_err(|e| (Stage::ElevationModels, e))?;

        self.checkpoint().map_err(|e| (Stage::Compositing, e))?;
        let chm_path = output_dir.join(commons::chm_name(tile));
        chm::create_chm(&pair.dtm, &pair.dsm, &chm_path, self.config.min_canopy_height)
            .map_err(|e| (Stage::Compositing, e))?;

        if !self.config.keep_intermediate {
            std::fs::remove_file(&pair.dtm)
                .map_err(|e| (Stage::Compositing, ChmError::Io(e)))?;
            std::fs::remove_file(&pair.dsm)
                .map_err(|e| (Stage::Compositing, ChmError::Io(e)))?;
        }
        Ok(chm_path)
    }

    /// Full pipeline for one tile: elevation models, then the composited
    /// CHM. Returns the CHM path.
    pub fn process_tile(&self, tile: &Path, output_dir: &Path) -> Result<PathBuf> {
        self.tile_stages(tile, output_dir).map_err(|(_, e)| e)
    }

    /// Process every point cloud tile found in `input_dir`, in file name
    /// order. Returns the per-tile CHM paths; the first failing tile aborts
    /// the batch with its identity and progress attached.
    pub fn run_batch(&self, input_dir: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let tiles = commons::list_point_cloud_tiles(input_dir)?;
        if tiles.is_empty() {
            return Err(ChmError::EmptySet);
        }

        let total = tiles.len();
        info!("processing {} tiles from {:?}", total, input_dir);

        let progress = if total > 1 {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(progress_style());
            pb.set_message("Tiles");
            Some(pb)
        } else {
            None
        };

        let mut outputs = Vec::with_capacity(total);
        for (completed, tile) in tiles.iter().enumerate() {
            info!("tile {} of {}: {:?}", completed + 1, total, tile);
            let chm_path = self
                .tile_stages(tile, output_dir)
                .map_err(|(stage, e)| e.for_tile(tile, stage, completed, total))?;
            outputs.push(chm_path);
            if let Some(ref pb) = progress {
                pb.inc(1);
            }
        }

        if let Some(pb) = progress {
            pb.finish_with_message("All tiles processed");
        }
        Ok(outputs)
    }
}
