use crate::config::constants::{KM_PER_DEGREE_LAT, KM_PER_DEGREE_LON_EQUATOR};
use crate::data::poi::Coordinate;
use crate::error::{PlanError, PlanResult};

/// Placement of a north-up grid in geographic degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub ncols: usize,
    pub nrows: usize,
    pub xll: f64,
    pub yll: f64,
    pub cell_size: f64,
}

impl GeoTransform {
    /// (row, col) of the cell containing `coordinate`, row 0 being the northern edge.
    pub fn cell_of(&self, coordinate: &Coordinate) -> Option<(usize, usize)> {
        let col = ((coordinate.x - self.xll) / self.cell_size).floor();
        let row_from_south = ((coordinate.y - self.yll) / self.cell_size).floor();
        if col < 0.0 || row_from_south < 0.0 || !col.is_finite() || !row_from_south.is_finite() {
            return None;
        }
        let (col, row_from_south) = (col as usize, row_from_south as usize);
        if col >= self.ncols || row_from_south >= self.nrows {
            return None;
        }
        Some((self.nrows - 1 - row_from_south, col))
    }

    pub fn cell_center(&self, row: usize, col: usize) -> Coordinate {
        Coordinate::new(
            self.xll + (col as f64 + 0.5) * self.cell_size,
            self.yll + ((self.nrows - 1 - row) as f64 + 0.5) * self.cell_size,
        )
    }

    /// Side length of a cell in km, taken as the geometric mean of its
    /// north-south and east-west extent at the grid's central latitude.
    pub fn cell_km(&self) -> f64 {
        let center_lat = self.yll + self.nrows as f64 * self.cell_size / 2.0;
        let ns = self.cell_size * KM_PER_DEGREE_LAT;
        let ew = self.cell_size * KM_PER_DEGREE_LON_EQUATOR * center_lat.to_radians().cos();
        (ns * ew).sqrt()
    }

    pub fn len(&self) -> usize {
        self.nrows * self.ncols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dense row-major raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T> {
    pub transform: GeoTransform,
    data: Vec<T>,
}

impl<T: Copy> Raster<T> {
    pub fn filled(transform: GeoTransform, value: T) -> Self {
        Self {
            transform,
            data: vec![value; transform.len()],
        }
    }

    pub fn from_vec(transform: GeoTransform, data: Vec<T>) -> PlanResult<Self> {
        if data.len() != transform.len() {
            return Err(PlanError::Raster(format!(
                "expected {} cells for a {}x{} grid, found {}",
                transform.len(),
                transform.nrows,
                transform.ncols,
                data.len()
            )));
        }
        Ok(Self { transform, data })
    }

    pub fn same_grid<U>(&self, other: &Raster<U>) -> bool {
        self.transform == other.transform
    }

    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.transform.ncols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        let ncols = self.transform.ncols;
        self.data[row * ncols + col] = value;
    }

    pub fn at_flat(&self, index: usize) -> T {
        self.data[index]
    }

    pub fn set_flat(&mut self, index: usize, value: T) {
        self.data[index] = value;
    }

    pub fn flat_index(&self, row: usize, col: usize) -> usize {
        row * self.transform.ncols + col
    }

    pub fn row_col(&self, index: usize) -> (usize, usize) {
        (index / self.transform.ncols, index % self.transform.ncols)
    }

    pub fn values(&self) -> &[T] {
        &self.data
    }

    /// Flat indices of the up to eight neighbours of `index`, with a flag for diagonals.
    pub fn neighbours(&self, index: usize) -> impl Iterator<Item = (usize, bool)> + '_ {
        let (row, col) = self.row_col(index);
        let (nrows, ncols) = (self.transform.nrows as isize, self.transform.ncols as isize);
        const OFFSETS: [(isize, isize); 8] = [(-1, -1), (-1, 0), (-1, 1), (0, -1), (0, 1), (1, -1), (1, 0), (1, 1)];
        OFFSETS.iter().filter_map(move |(dr, dc)| {
            let r = row as isize + dr;
            let c = col as isize + dc;
            if r < 0 || c < 0 || r >= nrows || c >= ncols {
                None
            } else {
                Some(((r * ncols + c) as usize, *dr != 0 && *dc != 0))
            }
        })
    }
}
