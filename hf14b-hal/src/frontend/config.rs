use embedded_time::rate::Hertz;

use crate::clocks::Clocks;
use crate::frontend::register::{ControlWord, MajorMode};

/// Error raised when a requested front-end configuration cannot be expressed
/// by the control word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The cross-correlator only supports the carrier/16 subcarrier.
    UnsupportedSubcarrier,
}

/// Configuration for the cross-correlated receive path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Subcarrier the cross-correlator is tuned to.
    pub subcarrier: Hertz,
    /// Also deliver hard-limited reader edges in the sample LSBs.
    pub snoop: bool,
}

impl ReceiverConfig {
    /// Creates a receiver configuration at the standard subcarrier, snoop
    /// off.
    pub fn new(clocks: Clocks) -> Self {
        Self {
            subcarrier: clocks.subcarrier(),
            snoop: false,
        }
    }

    /// Sets the subcarrier rate.
    pub fn set_subcarrier(mut self, subcarrier: Hertz) -> Self {
        self.subcarrier = subcarrier;
        self
    }

    /// Sets the snoop flag.
    pub fn set_snoop(mut self, snoop: bool) -> Self {
        self.snoop = snoop;
        self
    }

    /// Builds the HF_READER_RX_XCORR control word, validating the subcarrier
    /// selection against the clock tree.
    pub fn control_word(self, clocks: Clocks) -> Result<ControlWord, ConfigError> {
        if self.subcarrier != clocks.subcarrier() {
            return Err(ConfigError::UnsupportedSubcarrier);
        }
        Ok(ControlWord::OFF
            .with_major_mode(MajorMode::HfReaderRxXcorr)
            .with_subcarrier_848khz(true)
            .with_snoop(self.snoop))
    }
}

/// The HF_SIMULATOR word: listening quietly when `modulate` is false,
/// BPSK-modulating the subcarrier when true.
pub fn simulator(modulate: bool) -> ControlWord {
    ControlWord::OFF
        .with_major_mode(MajorMode::HfSimulator)
        .with_modulate_bpsk(modulate)
}

/// The HF_READER_TX word with shallow ASK modulation depth.
pub fn reader_transmit() -> ControlWord {
    ControlWord::OFF
        .with_major_mode(MajorMode::HfReaderTx)
        .with_shallow_modulation(true)
}
