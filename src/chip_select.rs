//! Chip-select lines toggled by hand when several chips share one bus.

use rppal::gpio::{Gpio, OutputPin};
use tracing::trace;

use crate::Max6675Error;

/// An active-low chip-select line.
pub trait ChipSelect {
    /// The identifier the line was configured with (GPIO number).
    fn id(&self) -> u8;

    /// Drives the line low, addressing the chip.
    fn select(&mut self);

    /// Drives the line high, releasing the chip.
    fn deselect(&mut self);
}

impl<C: ChipSelect + ?Sized> ChipSelect for Box<C> {
    fn id(&self) -> u8 {
        (**self).id()
    }

    fn select(&mut self) {
        (**self).select()
    }

    fn deselect(&mut self) {
        (**self).deselect()
    }
}

/// A chip select on a GPIO output pin (BCM numbering).
///
/// The pin starts high and is driven high again when dropped, before rppal
/// returns it to the mode it had when it was claimed.
pub struct GpioChipSelect {
    pin: OutputPin,
    id: u8,
}

impl GpioChipSelect {
    pub fn new(gpio: &Gpio, pin: u8) -> Result<Self, Max6675Error> {
        let pin_out = gpio.get(pin)?.into_output_high();
        Ok(Self { pin: pin_out, id: pin })
    }
}

impl ChipSelect for GpioChipSelect {
    fn id(&self) -> u8 {
        self.id
    }

    fn select(&mut self) {
        trace!(cs = self.id, "select");
        self.pin.set_low();
    }

    fn deselect(&mut self) {
        trace!(cs = self.id, "deselect");
        self.pin.set_high();
    }
}

impl Drop for GpioChipSelect {
    fn drop(&mut self) {
        trace!(cs = self.id, "release");
        self.pin.set_high();
    }
}

/// Holds a chip select low for as long as it lives.
///
/// The line goes back high on every exit path, errors and panics included,
/// so one failing chip can't keep the bus claimed.
pub struct Selected<'a, C: ChipSelect + ?Sized> {
    cs: &'a mut C,
}

impl<'a, C: ChipSelect + ?Sized> Selected<'a, C> {
    pub fn new(cs: &'a mut C) -> Self {
        cs.select();
        Self { cs }
    }
}

impl<C: ChipSelect + ?Sized> Drop for Selected<'_, C> {
    fn drop(&mut self) {
        self.cs.deselect();
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::ChipSelect;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Bookkeeping shared by every mock line on one bus.
    #[derive(Debug, Default)]
    pub struct Lines {
        pub active: Vec<u8>,
        pub max_active: usize,
        pub events: Vec<(u8, bool)>,
    }

    #[derive(Debug, Clone)]
    pub struct MockChipSelect {
        pub id: u8,
        pub lines: Rc<RefCell<Lines>>,
    }

    impl MockChipSelect {
        pub fn new(id: u8, lines: &Rc<RefCell<Lines>>) -> Self {
            Self {
                id,
                lines: lines.clone(),
            }
        }
    }

    impl ChipSelect for MockChipSelect {
        fn id(&self) -> u8 {
            self.id
        }

        fn select(&mut self) {
            let mut lines = self.lines.borrow_mut();
            lines.active.push(self.id);
            lines.max_active = lines.max_active.max(lines.active.len());
            lines.events.push((self.id, true));
        }

        fn deselect(&mut self) {
            let mut lines = self.lines.borrow_mut();
            lines.active.retain(|id| *id != self.id);
            lines.events.push((self.id, false));
        }
    }
}
