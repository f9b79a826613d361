//! Tile and grid geometry.
//!
//! A tile is a `width x height` block of one-byte cells (0 dead, 1 alive)
//! stored row-major; its byte size is the storage page size. The padded grid
//! is tiled row-major, so tile `i` sits at tile column `i % tiles_x` and tile
//! row `i / tiles_x`. The two history regions each hold `half_rows` full-width
//! rows: the top region rows `[0, half_rows)`, the bottom region the rest.

/// Native tile edge of the streaming pipeline.
pub const TILE_WIDTH: usize = 32;
pub const TILE_HEIGHT: usize = 32;

/// Cell dimensions of one tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileShape {
    pub width: usize,
    pub height: usize,
}

impl Default for TileShape {
    fn default() -> Self {
        Self {
            width: TILE_WIDTH,
            height: TILE_HEIGHT,
        }
    }
}

impl TileShape {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Bytes in one tile, which is also the page size of tile stores.
    #[inline]
    pub const fn page_size(self) -> usize {
        self.width * self.height
    }
}

/// Logical (unpadded) grid dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridShape {
    pub width: usize,
    pub height: usize,
}

impl GridShape {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

/// Which history region a row lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Half {
    Top,
    Bottom,
}

/// Per-generation bookkeeping: padded dimensions and tile counts.
///
/// Grid dimensions that are not tile multiples are padded up rather than
/// rejected; padding cells are always dead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineState {
    pub grid: GridShape,
    pub tile: TileShape,
    pub padded_width: usize,
    pub padded_height: usize,
    pub tiles_x: usize,
    pub tiles_y: usize,
    pub num_tiles: usize,
    pub half_rows: usize,
}

#[inline]
fn pad_to(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}

impl PipelineState {
    /// Compute the padded layout. `tile` must have non-zero edges.
    pub fn new(grid: GridShape, tile: TileShape) -> Self {
        debug_assert!(tile.width > 0 && tile.height > 0);
        let padded_width = pad_to(grid.width, tile.width);
        let padded_height = pad_to(grid.height, tile.height);
        let tiles_x = padded_width / tile.width;
        let tiles_y = padded_height / tile.height;
        Self {
            grid,
            tile,
            padded_width,
            padded_height,
            tiles_x,
            tiles_y,
            num_tiles: tiles_x * tiles_y,
            half_rows: padded_height.div_ceil(2),
        }
    }

    #[inline]
    pub fn was_padded(&self) -> bool {
        self.padded_width != self.grid.width || self.padded_height != self.grid.height
    }

    /// Bytes per history region page.
    #[inline]
    pub fn history_page_size(&self) -> usize {
        self.padded_width * self.half_rows
    }

    /// Top-left cell of tile `index` in padded grid coordinates.
    #[inline]
    pub fn tile_origin(&self, index: usize) -> (usize, usize) {
        let tx = index % self.tiles_x;
        let ty = index / self.tiles_x;
        (tx * self.tile.width, ty * self.tile.height)
    }

    /// History region and local row for a padded grid row.
    #[inline]
    pub fn history_location(&self, row: usize) -> (Half, usize) {
        if row < self.half_rows {
            (Half::Top, row)
        } else {
            (Half::Bottom, row - self.half_rows)
        }
    }

    /// Whether a padded coordinate lies inside the logical grid.
    #[inline]
    pub fn in_logical_grid(&self, x: usize, y: usize) -> bool {
        x < self.grid.width && y < self.grid.height
    }
}

#[cfg(test)]
mod tests {
    use super::{GridShape, Half, PipelineState, TileShape};

    #[test]
    fn aligned_grid_is_not_padded() {
        let state = PipelineState::new(GridShape::new(64, 64), TileShape::default());
        assert!(!state.was_padded());
        assert_eq!((state.tiles_x, state.tiles_y), (2, 2));
        assert_eq!(state.num_tiles, 4);
        assert_eq!(state.half_rows, 32);
        assert_eq!(state.history_page_size(), 64 * 32);
    }

    #[test]
    fn unaligned_grid_pads_up_to_tile_multiple() {
        let state = PipelineState::new(GridShape::new(40, 33), TileShape::new(32, 32));
        assert!(state.was_padded());
        assert_eq!((state.padded_width, state.padded_height), (64, 64));
        assert_eq!(state.num_tiles, 4);
    }

    #[test]
    fn odd_padded_height_gives_the_larger_half_to_the_top() {
        let state = PipelineState::new(GridShape::new(2, 3), TileShape::new(2, 1));
        assert_eq!(state.half_rows, 2);
        assert_eq!(state.history_location(1), (Half::Top, 1));
        assert_eq!(state.history_location(2), (Half::Bottom, 0));
    }

    #[test]
    fn tile_origin_is_row_major() {
        let state = PipelineState::new(GridShape::new(6, 4), TileShape::new(2, 2));
        assert_eq!(state.tiles_x, 3);
        assert_eq!(state.tile_origin(0), (0, 0));
        assert_eq!(state.tile_origin(2), (4, 0));
        assert_eq!(state.tile_origin(4), (2, 2));
    }

    #[test]
    fn empty_grid_has_no_tiles() {
        let state = PipelineState::new(GridShape::new(0, 8), TileShape::new(4, 4));
        assert_eq!(state.num_tiles, 0);
    }
}
