//! Firmware core of an ISO/IEC 14443 Type B proximity-card interface.
//!
//! The device sits between an analog front-end (delivering interleaved I/Q
//! samples, consuming a modulation bit stream) and a host PC. This crate
//! holds the two software modems (the reader-side character UART over
//! hard-limited edges and the tag-side BPSK demodulator), the frame coders
//! for both directions, CRC-B, the DMA-ring sample transport, and the three
//! top-level operations: emulate a tag, read an SRI512, and snoop a
//! conversation.
//!
//! Hardware is reached only through traits ([`frontend::FieldDriver`],
//! [`transport::IqDma`], the `embedded-hal` pin and serial contracts); the
//! [`frontend::sim`] module implements all of them for host-side testing.
#![no_std]

#[cfg(test)]
extern crate std;

pub mod clocks;
pub mod coder;
pub mod crc;
pub mod demod;
pub mod emulator;
pub mod frontend;
pub mod host;
pub mod reader;
pub mod snoop;
pub mod trace;
pub mod transport;
