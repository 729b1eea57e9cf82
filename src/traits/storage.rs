//! Byte-addressed non-volatile storage for definitions.
//!
//! Records are fixed-length and live at fixed offsets (see
//! [`crate::codec`]), so the store needs no allocation table.

/// Non-volatile storage collaborator.
pub trait DefinitionStore {
    /// Error type for failed accesses.
    type Error: core::fmt::Debug;

    /// Fill `buf` with the bytes stored at `offset`.
    fn get(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Persist `data` at `offset`.
    fn put(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error>;
}

impl<T: DefinitionStore + ?Sized> DefinitionStore for &mut T {
    type Error = T::Error;

    fn get(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        (**self).get(offset, buf)
    }

    fn put(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error> {
        (**self).put(offset, data)
    }
}
