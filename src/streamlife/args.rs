//! Positional stage launch parameters.
//!
//! Each stage receives a flat list of `u32` scalars. Position and count are
//! part of the stage's contract, so a stage checks the count up front and
//! then reads by index.

use super::arena::{BankId, BufferAddress, TileStore};
use super::error::{Result, StreamLifeError};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeArgs(Vec<u32>);

impl RuntimeArgs {
    pub fn new(values: Vec<u32>) -> Self {
        Self(values)
    }

    pub fn get(&self, position: usize) -> Result<u32> {
        self.0
            .get(position)
            .copied()
            .ok_or(StreamLifeError::MissingArg {
                position,
                len: self.0.len(),
            })
    }

    pub fn expect_len(&self, expected: usize) -> Result<()> {
        if self.0.len() != expected {
            return Err(StreamLifeError::ArgCount {
                expected,
                actual: self.0.len(),
            });
        }
        Ok(())
    }

    /// Append a buffer's base address and starting bank.
    pub fn push_buffer(&mut self, store: &TileStore) {
        self.0.push(store.base_address().0);
        self.0.push(store.first_bank().0);
    }

    pub fn push(&mut self, value: u32) {
        self.0.push(value);
    }
}

/// Stores lent to a stage for one invocation, looked up by base address.
#[derive(Debug, Default)]
pub struct StoreBindings {
    stores: Vec<TileStore>,
}

impl StoreBindings {
    pub fn new(stores: Vec<TileStore>) -> Self {
        Self { stores }
    }

    fn position(&self, address: u32, bank: u32) -> Result<usize> {
        let pos = self
            .stores
            .iter()
            .position(|store| store.base_address() == BufferAddress(address))
            .ok_or(StreamLifeError::UnknownBuffer(address))?;
        let expected = self.stores[pos].first_bank();
        if expected != BankId(bank) {
            return Err(StreamLifeError::BankMismatch {
                buffer: address,
                expected: expected.0,
                actual: bank,
            });
        }
        Ok(pos)
    }

    pub fn resolve(&self, address: u32, bank: u32) -> Result<&TileStore> {
        let pos = self.position(address, bank)?;
        Ok(&self.stores[pos])
    }

    pub fn resolve_mut(&mut self, address: u32, bank: u32) -> Result<&mut TileStore> {
        let pos = self.position(address, bank)?;
        Ok(&mut self.stores[pos])
    }

    /// Hand the stores back to the scheduler.
    pub fn into_stores(self) -> Vec<TileStore> {
        self.stores
    }
}
