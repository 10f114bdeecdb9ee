pub mod geotiff;
pub mod grid;

pub use grid::{Grid, Raster};
