use crate::geo_core::{BoundingBox, Crs, GeoTransform};

/// Rectangular f32 cell matrix, row-major, row 0 at the north edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Grid {
    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        Grid {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Wrap an existing row-major buffer.
    ///
    /// Panics if the buffer length does not match the shape.
    pub fn from_data(rows: usize, cols: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), rows * cols, "grid data length mismatch");
        Grid { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col] = value;
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Grow to the given shape, appending zero rows at the bottom and zero
    /// columns at the right. The existing values keep their positions.
    pub fn pad_to(&self, rows: usize, cols: usize) -> Grid {
        debug_assert!(rows >= self.rows && cols >= self.cols);
        let mut out = Grid::filled(rows, cols, 0.0);
        for row in 0..self.rows {
            let src = &self.data[row * self.cols..(row + 1) * self.cols];
            out.data[row * cols..row * cols + self.cols].copy_from_slice(src);
        }
        out
    }
}

/// A grid with georeferencing.
///
/// CRS and transform are fixed at construction; nothing re-points a loaded
/// raster somewhere else.
#[derive(Debug, Clone)]
pub struct Raster {
    grid: Grid,
    transform: GeoTransform,
    crs: Option<Crs>,
    nodata: Option<f32>,
}

impl Raster {
    pub fn new(grid: Grid, transform: GeoTransform, crs: Option<Crs>) -> Self {
        Raster {
            grid,
            transform,
            crs,
            nodata: None,
        }
    }

    /// Advertise a nodata value; it becomes the GDAL_NODATA tag on write.
    pub fn with_nodata(mut self, nodata: f32) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn into_grid(self) -> Grid {
        self.grid
    }

    pub fn transform(&self) -> GeoTransform {
        self.transform
    }

    pub fn crs(&self) -> Option<Crs> {
        self.crs
    }

    pub fn nodata(&self) -> Option<f32> {
        self.nodata
    }

    pub fn rows(&self) -> usize {
        self.grid.rows()
    }

    pub fn cols(&self) -> usize {
        self.grid.cols()
    }

    /// Absolute cell sizes (x, y).
    pub fn resolution(&self) -> (f64, f64) {
        self.transform.resolution()
    }

    /// World-space footprint.
    pub fn extent(&self) -> BoundingBox {
        self.transform.extent(self.grid.rows(), self.grid.cols())
    }
}
