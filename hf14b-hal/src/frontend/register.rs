use bitbybit::{bitenum, bitfield};

/// Major operating mode of the analog front-end. The modes are mutually
/// exclusive; the minor flag bits below only apply to the mode noted on each.
#[bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum MajorMode {
    /// Field off, nothing sampled, nothing driven.
    Off = 0,
    /// Card side: present load modulation against an external reader field.
    HfSimulator = 1,
    /// Reader side: drive the 13.56 MHz field and ASK-modulate it.
    HfReaderTx = 2,
    /// Reader side: receive through the cross-correlator.
    HfReaderRxXcorr = 3,
}

/// The single control word that configures the analog front-end.
///
/// Written whole on every mode change; there is no read-back.
#[bitfield(u16)]
#[derive(Debug, PartialEq, Eq)]
pub struct ControlWord {
    #[bits(14..=15, rw)]
    pub major_mode: MajorMode,

    /// HF_SIMULATOR: BPSK-modulate the subcarrier instead of sitting quiet.
    #[bit(0, rw)]
    pub modulate_bpsk: bool,

    /// HF_READER_TX: shallow (10%) instead of full ASK modulation depth.
    #[bit(1, rw)]
    pub shallow_modulation: bool,

    /// HF_READER_RX_XCORR: tune the cross-correlator to the 847.5 kHz
    /// subcarrier rather than the carrier itself.
    #[bit(2, rw)]
    pub subcarrier_848khz: bool,

    /// HF_READER_RX_XCORR: deliver hard-limited reader edges in the sample
    /// LSBs alongside the I/Q stream (snoop).
    #[bit(3, rw)]
    pub snoop: bool,
}

impl ControlWord {
    /// The all-off word.
    pub const OFF: Self = Self::new_with_raw_value(0);
}

/// ADC input selection, as the two mux select lines.
#[bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum AdcMux {
    /// High-frequency peak-detected path; used while emulating a tag.
    HighPeakDetect = 0,
    /// High-frequency raw path.
    HighRaw = 1,
    /// Low-frequency peak-detected path.
    LowPeakDetect = 2,
    /// Low-frequency raw path.
    LowRaw = 3,
}
