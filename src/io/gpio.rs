//! GPIO driver interface
//!
//! The core never touches pins directly; everything goes through this
//! trait. Inputs are pulled up: a HIGH reading means the contact is OPEN,
//! LOW means CLOSED. This inversion is a fixed property of the wiring
//! model, not configurable per zone.
//!
//! `MemoryGpio` is the in-tree backend used by tests and simulation runs;
//! a hardware backend plugs in behind the same trait.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Electrical direction of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    /// Input with internal pull-up (idle reads HIGH)
    Input,
    /// Output, driven LOW on configuration
    Output,
}

/// Narrow pin access interface injected into the registry and poll loop
pub trait GpioDriver: Send + Sync {
    /// Configure the electrical direction of a pin. Inputs are pulled up;
    /// outputs start driven LOW.
    fn set_direction(&self, pin: u8, direction: PinDirection) -> anyhow::Result<()>;

    /// Read the current level of a pin (true = HIGH)
    fn read(&self, pin: u8) -> anyhow::Result<bool>;

    /// Drive an output pin (true = HIGH)
    fn write(&self, pin: u8, high: bool) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct PinState {
    direction: PinDirection,
    level: bool,
}

/// In-memory GPIO backend
///
/// Newly configured inputs read HIGH (pull-up, contact open); outputs start
/// LOW. Test code flips input levels with [`MemoryGpio::set_input_level`].
#[derive(Default)]
pub struct MemoryGpio {
    pins: Mutex<FxHashMap<u8, PinState>>,
}

impl MemoryGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an external contact change on an input pin
    pub fn set_input_level(&self, pin: u8, high: bool) {
        let mut pins = self.pins.lock();
        if let Some(state) = pins.get_mut(&pin) {
            state.level = high;
        }
    }

    /// Current level of a pin, if configured
    pub fn level(&self, pin: u8) -> Option<bool> {
        self.pins.lock().get(&pin).map(|s| s.level)
    }

    /// Current direction of a pin, if configured
    pub fn direction(&self, pin: u8) -> Option<PinDirection> {
        self.pins.lock().get(&pin).map(|s| s.direction)
    }
}

impl GpioDriver for MemoryGpio {
    fn set_direction(&self, pin: u8, direction: PinDirection) -> anyhow::Result<()> {
        let level = match direction {
            PinDirection::Input => true,
            PinDirection::Output => false,
        };
        self.pins.lock().insert(pin, PinState { direction, level });
        Ok(())
    }

    fn read(&self, pin: u8) -> anyhow::Result<bool> {
        self.pins
            .lock()
            .get(&pin)
            .map(|s| s.level)
            .ok_or_else(|| anyhow::anyhow!("pin {} not configured", pin))
    }

    fn write(&self, pin: u8, high: bool) -> anyhow::Result<()> {
        let mut pins = self.pins.lock();
        match pins.get_mut(&pin) {
            Some(state) if state.direction == PinDirection::Output => {
                state.level = high;
                Ok(())
            }
            Some(_) => anyhow::bail!("pin {} is not an output", pin),
            None => anyhow::bail!("pin {} not configured", pin),
        }
    }
}
