use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Pipeline stage labels used in progress messages and failure context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ElevationModels,
    Compositing,
    Mosaicking,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::ElevationModels => "elevation model generation",
            Stage::Compositing => "CHM compositing",
            Stage::Mosaicking => "mosaicking",
        };
        f.write_str(label)
    }
}

/// Everything that can go wrong between a point cloud tile and a mosaic.
#[derive(Error, Debug)]
pub enum ChmError {
    /// The tile cannot be opened or parsed as a point cloud.
    #[error("cannot read point cloud {path:?}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    /// A pipeline template or config file is malformed or unusable.
    #[error("pipeline configuration error: {0}")]
    PipelineConfig(String),

    /// The external engine exited nonzero.
    #[error("{engine} engine failed on {path:?}: {details}")]
    EngineFailed {
        engine: String,
        path: PathBuf,
        details: String,
    },

    /// The external engine ran past the configured time limit and was killed.
    #[error("{engine} engine exceeded {seconds} s on {path:?}")]
    EngineTimeout {
        engine: String,
        path: PathBuf,
        seconds: u64,
    },

    /// The native engine's point selection came up empty.
    #[error("no {selection} points in {path:?}")]
    NoPoints { path: PathBuf, selection: String },

    /// Compositor inputs differ in shape; they should have been aligned.
    #[error("raster shapes differ: {left_rows}x{left_cols} vs {right_rows}x{right_cols}")]
    ShapeMismatch {
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },

    /// Mosaic inputs do not share a CRS.
    #[error("rasters do not share a CRS: {left} vs {right}")]
    CrsMismatch { left: String, right: String },

    /// Mosaic inputs do not share a cell size.
    #[error("rasters do not share a resolution: {left} m vs {right} m")]
    ResolutionMismatch { left: f64, right: f64 },

    /// A merge or batch was asked to run over nothing.
    #[error("nothing to process: the input set is empty")]
    EmptySet,

    /// GeoTIFF decoding failed.
    #[error("failed to read GeoTIFF {path:?}: {source}")]
    TiffRead {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    /// GeoTIFF encoding failed.
    #[error("failed to write GeoTIFF {path:?}: {source}")]
    TiffWrite {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    /// A TIFF input is missing the georeferencing tags the pipeline needs.
    #[error("{path:?} is not a usable GeoTIFF: {reason}")]
    NotGeoTiff { path: PathBuf, reason: String },

    /// The batch was aborted through its cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// Batch context wrapper: which tile died, where, and how far we got.
    #[error("tile {tile} failed during {stage} ({completed} of {total} tiles completed): {source}")]
    TileFailed {
        tile: String,
        stage: Stage,
        completed: usize,
        total: usize,
        #[source]
        source: Box<ChmError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChmError {
    /// Wrap this error with batch context for one tile.
    ///
    /// Cancellation is not a tile failure and passes through untouched.
    pub(crate) fn for_tile(self, tile: &Path, stage: Stage, completed: usize, total: usize) -> Self {
        if matches!(self, ChmError::Cancelled) {
            return self;
        }
        let tile = tile
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| tile.display().to_string());
        ChmError::TileFailed {
            tile,
            stage,
            completed,
            total,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChmError>;
