//! Valve control through the OpenSprinkler Pi shift register. The `gpio`
//! feature gates the real rppal driver; without it, a mock implementation
//! records and logs each pattern.

use anyhow::Result;
use sprinkler::board::{format_pattern, Board};

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

/// BCM pin numbers, per the OSPi manual for hardware rev 1.42+.
pub(crate) mod pins {
    pub const DATA: u8 = 27;
    pub const CLOCK: u8 = 4;
    pub const OUTPUT_ENABLE: u8 = 17;
    pub const LATCH: u8 = 22;
}

/// The bits in the order they are clocked into the register: last station
/// first, so station 1 ends up in the first output. Inverted for
/// active-low relay boards.
pub(crate) fn shift_order(pattern: &[bool], active_low: bool) -> Vec<bool> {
    pattern.iter().rev().map(|on| *on != active_low).collect()
}

// ---------------------------------------------------------------------------
// Real shift register (production — requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub(crate) struct ShiftRegisterBoard {
    data: OutputPin,
    clock: OutputPin,
    output_enable: OutputPin, // active-low
    latch: OutputPin,
    active_low: bool,
    previous: Option<Vec<bool>>,
}

#[cfg(feature = "gpio")]
impl ShiftRegisterBoard {
    pub(crate) fn new(station_count: usize, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new()?;
        let mut board = Self {
            data: gpio.get(pins::DATA)?.into_output(),
            clock: gpio.get(pins::CLOCK)?.into_output(),
            output_enable: gpio.get(pins::OUTPUT_ENABLE)?.into_output(),
            latch: gpio.get(pins::LATCH)?.into_output(),
            active_low,
            previous: None,
        };

        // Pins come up in a random state: outputs disabled, lines low.
        board.output_enable.set_high();
        board.clock.set_low();
        board.data.set_low();
        board.latch.set_low();

        tracing::info!(stations = station_count, active_low, "shift register board initialised");
        Ok(board)
    }

    fn write_bits(&mut self, bits: &[bool]) {
        self.clock.set_low();
        self.latch.set_low();
        for bit in bits {
            self.clock.set_low();
            if *bit {
                self.data.set_high();
            } else {
                self.data.set_low();
            }
            self.clock.set_high();
        }
        self.latch.set_high();
    }
}

#[cfg(feature = "gpio")]
impl Board for ShiftRegisterBoard {
    fn apply_pattern(&mut self, pattern: &[bool]) -> Result<()> {
        // Don't bang on the register when nothing changed.
        if self.previous.as_deref() == Some(pattern) {
            return Ok(());
        }
        self.previous = Some(pattern.to_vec());

        let bits = shift_order(pattern, self.active_low);
        self.output_enable.set_high();
        self.write_bits(&bits);
        self.output_enable.set_low();
        tracing::info!(pattern = %format_pattern(pattern), "valves updated");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mock shift register (development — no hardware, logs patterns)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub(crate) struct ShiftRegisterBoard {
    active_low: bool,
    previous: Option<Vec<bool>>,
    pub(super) frames: Vec<Vec<bool>>, // bits as they would be clocked out
}

#[cfg(not(feature = "gpio"))]
impl ShiftRegisterBoard {
    pub(crate) fn new(station_count: usize, active_low: bool) -> Result<Self> {
        tracing::info!(
            stations = station_count,
            data = pins::DATA,
            clock = pins::CLOCK,
            output_enable = pins::OUTPUT_ENABLE,
            latch = pins::LATCH,
            "[mock-gpio] shift register board initialised (no hardware)"
        );
        Ok(Self {
            active_low,
            previous: None,
            frames: Vec::new(),
        })
    }
}

#[cfg(not(feature = "gpio"))]
impl Board for ShiftRegisterBoard {
    fn apply_pattern(&mut self, pattern: &[bool]) -> Result<()> {
        if self.previous.as_deref() == Some(pattern) {
            return Ok(());
        }
        self.previous = Some(pattern.to_vec());
        self.frames.push(shift_order(pattern, self.active_low));
        tracing::info!(pattern = %format_pattern(pattern), "[mock-gpio] valves updated");
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
