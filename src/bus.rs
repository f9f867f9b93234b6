//! One SPI transport shared by several chips.

use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::chip_select::{ChipSelect, Selected};
use crate::transport::SpiTransport;
use crate::Max6675Error;

/// A cloneable handle to a transport that several readers take turns on.
///
/// Only one chip-select line may be low at a time, so every transfer holds
/// the lock from before the line is asserted until after it is released.
#[derive(Debug)]
pub struct SharedBus<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for SharedBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SpiTransport> SharedBus<T> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(transport)),
        }
    }

    /// Reads `len` bytes with `cs` held low for the duration.
    pub fn transaction<C: ChipSelect + ?Sized>(
        &self,
        cs: &mut C,
        len: usize,
    ) -> Result<Vec<u8>, Max6675Error> {
        let mut transport = self.inner.lock().map_err(|_| Max6675Error::BusPoisoned)?;
        trace!(cs = cs.id(), len, "bus transaction");
        // Dropped before `transport`, so the line is high before the bus is free.
        let _selected = Selected::new(cs);
        transport.read(len)
    }
}
