//! Analog front-end contract.
//!
//! The front-end is external to this crate: a configurable block that drives
//! or samples the 13.56 MHz field, delivers interleaved signed I/Q samples
//! through the DMA ring and consumes a modulation bit stream over the
//! synchronous serial link. Boards implement [`FieldDriver`]; the [`sim`]
//! module implements it (and the other hardware contracts) for host-side
//! tests.

mod config;
mod register;
pub mod sim;

pub use config::{ConfigError, ReceiverConfig, reader_transmit, simulator};
pub use register::{AdcMux, ControlWord, MajorMode};

/// Control surface of the analog front-end.
pub trait FieldDriver {
    /// Writes the control word, switching the major mode and its flags.
    fn configure(&mut self, word: ControlWord);

    /// Selects the ADC input path.
    fn select_adc(&mut self, mux: AdcMux);

    /// Turns the field and all sampling off.
    fn power_down(&mut self) {
        self.configure(ControlWord::OFF);
    }
}
