use embedded_time::rate::{Extensions, Hertz};

/// Subcarrier divide ratio for the card-to-reader load modulation.
const SUBCARRIER_DIVISOR: u32 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Clocks;

impl Clocks {
    /// The 13.56 MHz field carrier.
    pub fn carrier(&self) -> Hertz {
        13_560_000.Hz()
    }

    /// The BPSK subcarrier the cross-correlator is tuned to (carrier / 16,
    /// nominally 847.5 kHz).
    pub fn subcarrier(&self) -> Hertz {
        Hertz(self.carrier().0 / SUBCARRIER_DIVISOR)
    }
}
