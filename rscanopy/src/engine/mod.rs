pub mod native;
pub mod pdal;

pub use native::NativeEngine;
pub use pdal::PdalEngine;

use std::path::Path;

use crate::error::Result;

/// Which elevation surface a rasterization run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Ground-classified terrain elevation (DTM)
    Terrain,
    /// Unfiltered highest-return surface elevation (DSM)
    Surface,
}

impl ModelKind {
    /// Short label used in file names and log messages.
    pub fn label(&self) -> &'static str {
        match self {
            ModelKind::Terrain => "dtm",
            ModelKind::Surface => "dsm",
        }
    }
}

/// Rasterizes one point cloud tile into an elevation model GeoTIFF.
///
/// Implementations write a single-band raster at their configured
/// resolution, with cells no point falls in set to the nodata sentinel.
pub trait PointCloudEngine {
    /// Engine name for log and error messages.
    fn name(&self) -> &'static str;

    /// Rasterize `source` into `output` as the given model kind.
    fn generate(&self, source: &Path, output: &Path, kind: ModelKind) -> Result<()>;
}
