//! Bank-interleaved tile storage.
//!
//! A `StorageArena` models the device memory every buffer is carved from:
//! `bank_count` banks of equal capacity, each buffer occupying the same
//! page-aligned offset range in every bank. Tile `i` of a buffer lives in
//! bank `i % bank_count` at byte `(i / bank_count) * page_size` past the
//! buffer's base.

use super::error::{Result, StreamLifeError};

/// Alignment of every buffer base, in bytes.
pub const PAGE_ALIGNMENT: usize = 32;
/// First address handed out; keeps zero free as a "never bound" value.
const STORAGE_BASE: usize = 0x1000;

/// Opaque base handle of a buffer, passed to stages as a launch argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferAddress(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BankId(pub u32);

/// Bump allocator over the interleaved banks.
pub struct StorageArena {
    bank_count: usize,
    bank_capacity: usize,
    next_offset: usize,
}

impl StorageArena {
    pub fn new(bank_count: usize, bank_capacity: usize) -> Result<Self> {
        if bank_count == 0 {
            return Err(StreamLifeError::InvalidConfig(
                "bank count must be at least 1".into(),
            ));
        }
        Ok(Self {
            bank_count,
            bank_capacity,
            next_offset: 0,
        })
    }

    #[inline]
    pub fn bank_count(&self) -> usize {
        self.bank_count
    }

    /// Bytes still free in each bank.
    #[inline]
    pub fn available(&self) -> usize {
        self.bank_capacity.saturating_sub(self.next_offset)
    }

    /// Carve a buffer of `tile_count` pages out of every bank.
    pub fn allocate(&mut self, page_size: usize, tile_count: usize) -> Result<TileStore> {
        if page_size == 0 {
            return Err(StreamLifeError::InvalidConfig(
                "page size must be non-zero".into(),
            ));
        }
        let pages_per_bank = tile_count.div_ceil(self.bank_count);
        // Empty buffers still take one aligned slot so base addresses stay unique.
        let span = pages_per_bank
            .checked_mul(page_size)
            .and_then(|bytes| bytes.checked_next_multiple_of(PAGE_ALIGNMENT))
            .ok_or(StreamLifeError::StorageExhausted {
                requested: usize::MAX,
                available: self.available(),
            })?
            .max(PAGE_ALIGNMENT);
        if span > self.available() {
            return Err(StreamLifeError::StorageExhausted {
                requested: span,
                available: self.available(),
            });
        }
        let offset = self.next_offset;
        self.next_offset += span;
        let address = u32::try_from(STORAGE_BASE + offset).map_err(|_| {
            StreamLifeError::StorageExhausted {
                requested: span,
                available: 0,
            }
        })?;

        let banks = (0..self.bank_count)
            .map(|bank| {
                let pages = if bank < tile_count {
                    (tile_count - bank).div_ceil(self.bank_count)
                } else {
                    0
                };
                vec![0u8; pages * page_size]
            })
            .collect();

        Ok(TileStore {
            address: BufferAddress(address),
            first_bank: BankId(0),
            page_size,
            tile_count,
            banks,
            writes: 0,
        })
    }
}

/// Backing storage for one logical buffer, addressed by tile index.
///
/// There is no internal locking. The pipeline hands a store to exactly one
/// stage per invocation and takes it back at completion.
#[derive(Debug)]
pub struct TileStore {
    address: BufferAddress,
    first_bank: BankId,
    page_size: usize,
    tile_count: usize,
    banks: Vec<Vec<u8>>,
    writes: u64,
}

impl TileStore {
    #[inline]
    pub fn base_address(&self) -> BufferAddress {
        self.address
    }

    #[inline]
    pub fn first_bank(&self) -> BankId {
        self.first_bank
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    #[inline]
    pub fn bank_count(&self) -> usize {
        self.banks.len()
    }

    /// Number of tile writes since allocation (fills count as one each).
    #[inline]
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// Bank and in-bank byte offset of tile `index`.
    #[inline]
    pub fn locate(&self, index: usize) -> (BankId, usize) {
        let banks = self.banks.len();
        (BankId((index % banks) as u32), (index / banks) * self.page_size)
    }

    #[inline]
    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.tile_count {
            return Err(StreamLifeError::OutOfRange {
                buffer: self.address.0,
                index,
                tile_count: self.tile_count,
            });
        }
        Ok(())
    }

    pub fn read_tile(&self, index: usize) -> Result<&[u8]> {
        self.check_index(index)?;
        let (bank, offset) = self.locate(index);
        Ok(&self.banks[bank.0 as usize][offset..offset + self.page_size])
    }

    pub fn read_tile_into(&self, index: usize, out: &mut [u8]) -> Result<()> {
        let tile = self.read_tile(index)?;
        if out.len() != tile.len() {
            return Err(StreamLifeError::PageSizeMismatch {
                expected: tile.len(),
                actual: out.len(),
            });
        }
        out.copy_from_slice(tile);
        Ok(())
    }

    pub fn write_tile(&mut self, index: usize, tile: &[u8]) -> Result<()> {
        self.check_index(index)?;
        if tile.len() != self.page_size {
            return Err(StreamLifeError::PageSizeMismatch {
                expected: self.page_size,
                actual: tile.len(),
            });
        }
        let (bank, offset) = self.locate(index);
        self.banks[bank.0 as usize][offset..offset + self.page_size].copy_from_slice(tile);
        self.writes += 1;
        Ok(())
    }

    /// Overwrite every tile with `value`.
    pub fn fill(&mut self, value: u8) {
        for bank in &mut self.banks {
            bank.fill(value);
        }
        self.writes += self.tile_count as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::{BankId, PAGE_ALIGNMENT, StorageArena};
    use crate::streamlife::args::StoreBindings;
    use crate::streamlife::error::StreamLifeError;

    #[test]
    fn tiles_round_robin_across_banks() {
        let mut arena = StorageArena::new(4, 1 << 16).unwrap();
        let store = arena.allocate(16, 10).unwrap();
        assert_eq!(store.locate(0), (BankId(0), 0));
        assert_eq!(store.locate(3), (BankId(3), 0));
        assert_eq!(store.locate(4), (BankId(0), 16));
        assert_eq!(store.locate(9), (BankId(1), 32));
    }

    #[test]
    fn write_then_read_preserves_each_index() {
        let mut arena = StorageArena::new(3, 1 << 16).unwrap();
        let mut store = arena.allocate(4, 7).unwrap();
        for i in 0..7u8 {
            store.write_tile(i as usize, &[i; 4]).unwrap();
        }
        for i in 0..7u8 {
            assert_eq!(store.read_tile(i as usize).unwrap(), &[i; 4]);
        }
        assert_eq!(store.write_count(), 7);
    }

    #[test]
    fn out_of_range_access_fails() {
        let mut arena = StorageArena::new(2, 1 << 16).unwrap();
        let mut store = arena.allocate(4, 2).unwrap();
        assert!(matches!(
            store.read_tile(2),
            Err(StreamLifeError::OutOfRange { index: 2, tile_count: 2, .. })
        ));
        assert!(matches!(
            store.write_tile(5, &[0; 4]),
            Err(StreamLifeError::OutOfRange { .. })
        ));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn wrong_payload_length_is_rejected() {
        let mut arena = StorageArena::new(1, 1 << 16).unwrap();
        let mut store = arena.allocate(8, 1).unwrap();
        assert!(matches!(
            store.write_tile(0, &[1; 7]),
            Err(StreamLifeError::PageSizeMismatch { expected: 8, actual: 7 })
        ));
    }

    #[test]
    fn buffers_get_distinct_aligned_bases() {
        let mut arena = StorageArena::new(2, 1 << 16).unwrap();
        let a = arena.allocate(5, 3).unwrap();
        let b = arena.allocate(5, 3).unwrap();
        assert_ne!(a.base_address(), b.base_address());
        assert_eq!(a.base_address().0 as usize % PAGE_ALIGNMENT, 0);
        assert_eq!(b.base_address().0 as usize % PAGE_ALIGNMENT, 0);
    }

    #[test]
    fn empty_buffer_does_not_alias_the_next_one() {
        let mut arena = StorageArena::new(2, 1 << 12).unwrap();
        let empty = arena.allocate(4, 0).unwrap();
        let real = arena.allocate(4, 2).unwrap();
        assert_eq!(empty.tile_count(), 0);
        assert_ne!(empty.base_address(), real.base_address());
        assert_eq!(real.base_address().0 as usize % PAGE_ALIGNMENT, 0);

        let real_addr = real.base_address().0;
        let bindings = StoreBindings::new(vec![empty, real]);
        assert_eq!(bindings.resolve(real_addr, 0).unwrap().tile_count(), 2);
    }

    #[test]
    fn allocation_beyond_bank_capacity_fails() {
        let mut arena = StorageArena::new(2, 64).unwrap();
        arena.allocate(32, 2).unwrap();
        assert!(matches!(
            arena.allocate(32, 4),
            Err(StreamLifeError::StorageExhausted { .. })
        ));
    }

    #[test]
    fn zero_banks_is_a_configuration_error() {
        assert!(matches!(
            StorageArena::new(0, 64),
            Err(StreamLifeError::InvalidConfig(_))
        ));
    }
}
