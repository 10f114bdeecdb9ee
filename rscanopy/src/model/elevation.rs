use std::path::{Path, PathBuf};

use log::info;

use crate::commons;
use crate::engine::{ModelKind, PointCloudEngine};
use crate::error::Result;

/// The two elevation models derived from one tile.
#[derive(Debug, Clone)]
pub struct ElevationModelPair {
    pub dtm: PathBuf,
    pub dsm: PathBuf,
    /// Directory both models were written to.
    pub directory: PathBuf,
}

/// Runs a point cloud engine twice over a tile: once for the unfiltered
/// surface (DSM), once for the ground-classified terrain (DTM).
pub struct ElevationModeler<'e> {
    engine: &'e dyn PointCloudEngine,
    output_dir: PathBuf,
}

impl<'e> ElevationModeler<'e> {
    pub fn new(engine: &'e dyn PointCloudEngine, output_dir: impl Into<PathBuf>) -> Self {
        ElevationModeler {
            engine,
            output_dir: output_dir.into(),
        }
    }

    /// Derive both models for `tile`, DSM first.
    ///
    /// Outputs land in the modeler's directory as `<stem>_dsm.tif` and
    /// `<stem>_dtm.tif`; the directory is created if needed.
    pub fn run(&self, tile: &Path) -> Result<ElevationModelPair> {
        std::fs::create_dir_all(&self.output_dir)?;

        let dsm = self.output_dir.join(commons::dsm_name(tile));
        let dtm = self.output_dir.join(commons::dtm_name(tile));

        info!(
            "[dsm] deriving surface model for {:?} with the {} engine",
            tile,
            self.engine.name()
        );
        self.engine.generate(tile, &dsm, ModelKind::Surface)?;

        info!(
            "[dtm] deriving terrain model for {:?} with the {} engine",
            tile,
            self.engine.name()
        );
        self.engine.generate(tile, &dtm, ModelKind::Terrain)?;

        Ok(ElevationModelPair {
            dtm,
            dsm,
            directory: self.output_dir.clone(),
        })
    }
}
