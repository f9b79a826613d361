//! Logical-size cell grid handed to and from the pipeline.

use std::fmt;

use super::error::{Result, StreamLifeError};
use super::tile::{GridShape, PipelineState};

/// Flat row-major grid of 0/1 cells at the unpadded size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl Grid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0; width * height],
        }
    }

    pub fn with_shape(shape: GridShape) -> Self {
        Self::new(shape.width, shape.height)
    }

    /// Wrap existing cells; any non-zero byte counts as alive.
    pub fn from_cells(width: usize, height: usize, mut cells: Vec<u8>) -> Result<Self> {
        if cells.len() != width * height {
            return Err(StreamLifeError::InvalidConfig(format!(
                "{} cells do not fill a {width}x{height} grid",
                cells.len()
            )));
        }
        for cell in &mut cells {
            *cell = (*cell != 0) as u8;
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn shape(&self) -> GridShape {
        GridShape::new(self.width, self.height)
    }

    #[inline]
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Out-of-bounds reads are dead.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.cells[y * self.width + x] != 0
    }

    /// Out-of-bounds writes are ignored.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, alive: bool) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = alive as u8;
        }
    }

    pub fn population(&self) -> u64 {
        self.cells.iter().map(|&c| u64::from(c)).sum()
    }

    pub fn live_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c != 0)
            .map(move |(i, _)| (i % width, i / width))
    }

    /// Copy into a zeroed buffer of the padded size.
    pub(crate) fn write_padded(&self, state: &PipelineState, padded: &mut [u8]) {
        debug_assert_eq!(padded.len(), state.padded_width * state.padded_height);
        padded.fill(0);
        for y in 0..self.height.min(state.padded_height) {
            let row = &self.cells[y * self.width..(y + 1) * self.width];
            let n = self.width.min(state.padded_width);
            padded[y * state.padded_width..][..n].copy_from_slice(&row[..n]);
        }
    }

    /// Overwrite from a padded buffer, dropping the padding.
    pub(crate) fn read_padded(&mut self, state: &PipelineState, padded: &[u8]) {
        for y in 0..self.height.min(state.padded_height) {
            let n = self.width.min(state.padded_width);
            let src = &padded[y * state.padded_width..][..n];
            for (dst, &src) in self.cells[y * self.width..][..n].iter_mut().zip(src) {
                *dst = src & 1;
            }
        }
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.width.max(1)) {
            let line: String = row.iter().map(|&c| if c != 0 { '#' } else { '.' }).collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Grid;
    use crate::streamlife::tile::{GridShape, PipelineState, TileShape};

    #[test]
    fn set_get_and_population() {
        let mut grid = Grid::new(3, 2);
        grid.set(2, 1, true);
        grid.set(9, 9, true);
        assert!(grid.get(2, 1));
        assert!(!grid.get(9, 9));
        assert_eq!(grid.population(), 1);
        assert_eq!(grid.live_cells().collect::<Vec<_>>(), vec![(2, 1)]);
    }

    #[test]
    fn from_cells_normalizes_and_checks_length() {
        let grid = Grid::from_cells(2, 1, vec![0, 7]).unwrap();
        assert_eq!(grid.cells(), &[0, 1]);
        assert!(Grid::from_cells(2, 2, vec![0; 3]).is_err());
    }

    #[test]
    fn padded_copy_keeps_padding_dead() {
        let state = PipelineState::new(GridShape::new(3, 3), TileShape::new(2, 2));
        let mut grid = Grid::new(3, 3);
        grid.set(2, 2, true);
        let mut padded = vec![9u8; 16];
        grid.write_padded(&state, &mut padded);
        assert_eq!(padded[2 * 4 + 2], 1);
        assert_eq!(padded.iter().map(|&c| c as u32).sum::<u32>(), 1);

        let mut back = Grid::new(3, 3);
        back.read_padded(&state, &padded);
        assert_eq!(back, grid);
    }

    #[test]
    fn display_renders_rows() {
        let mut grid = Grid::new(2, 2);
        grid.set(0, 1, true);
        assert_eq!(grid.to_string(), "..\n#.\n");
    }
}
