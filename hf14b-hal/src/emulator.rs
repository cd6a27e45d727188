//! Tag emulation: impersonate a Type B card against an external reader.

use embedded_hal::digital::InputPin;
use embedded_hal_nb::nb;
use embedded_hal_nb::serial::{Read, Write};

use crate::coder::{BitBuffer, encode_tag_frame};
use crate::crc;
use crate::demod::{Outcome, ReaderUart};
use crate::frontend::{self, AdcMux, FieldDriver};
use crate::host::HostChannel;
use crate::transport::{TransportError, Watchdog};

/// The one query the emulated tag answers: an ATQB-style request, CRC
/// included.
const QUERY_FRAME: [u8; 5] = [0x05, 0x00, 0x08, 0x39, 0x73];

/// The canned answer, CRC included.
const RESPONSE_FRAME: [u8; 14] = [
    0x50, 0x82, 0x0D, 0xE1, 0x74, 0x20, 0x38, 0x19, 0x22, 0x00, 0x21, 0x85, 0x5E, 0xD7,
];

/// Reader frames handled before the emulator retires on its own.
const FRAME_LIMIT: u32 = 0x30;

/// Longest reader command the emulator accepts.
const COMMAND_MAX: usize = 100;

/// Capacity for the pre-coded response bit stream.
const RESPONSE_CAP: usize = 128;

/// Emulates an SRI512-family tag against an external reader field.
///
/// The front-end listens on the high-frequency peak-detected ADC path and
/// delivers the reader's hard-limited waveform as serial bytes, eight
/// samples per byte MSB first. The canned response is coded once at
/// construction and replayed through the BPSK modulator on every matching
/// query.
pub struct TagEmulator<'a, F, S, B, W, H>
where
    F: FieldDriver,
    S: Read<u8> + Write<u8>,
    B: InputPin,
    W: Watchdog,
    H: HostChannel,
{
    frontend: &'a mut F,
    ssc: &'a mut S,
    button: &'a mut B,
    watchdog: &'a mut W,
    host: &'a mut H,
    response: BitBuffer<RESPONSE_CAP>,
    uart: ReaderUart<COMMAND_MAX>,
    frames: u32,
}

impl<'a, F, S, B, W, H> TagEmulator<'a, F, S, B, W, H>
where
    F: FieldDriver,
    S: Read<u8> + Write<u8>,
    B: InputPin,
    W: Watchdog,
    H: HostChannel,
{
    pub fn new(
        frontend: &'a mut F,
        ssc: &'a mut S,
        button: &'a mut B,
        watchdog: &'a mut W,
        host: &'a mut H,
    ) -> Self {
        let mut response = BitBuffer::new();
        encode_tag_frame(&RESPONSE_FRAME, &mut response);
        Self {
            frontend,
            ssc,
            button,
            watchdog,
            host,
            response,
            uart: ReaderUart::new(),
            frames: 0,
        }
    }

    /// Reader frames handled during the last run.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Runs the emulation loop until the frame limit, an unrecognized
    /// command, or the pushbutton ends it. The 32-bit operator parameter is
    /// reserved.
    pub fn run(&mut self, _param: u32) -> Result<(), TransportError> {
        self.frontend.select_adc(AdcMux::HighPeakDetect);
        self.frontend.configure(frontend::simulator(false));
        self.uart.reset();
        self.frames = 0;

        let result = self.listen();
        self.frontend.power_down();
        result
    }

    fn listen(&mut self) -> Result<(), TransportError> {
        loop {
            self.watchdog.pet();
            if self.button.is_high().unwrap_or(false) {
                return Ok(());
            }
            let byte = match self.ssc.read() {
                Ok(byte) => byte,
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(_)) => return Err(TransportError::Link),
            };
            for shift in (0..8).rev() {
                let bit = byte & (1 << shift) != 0;
                if self.uart.step(bit) != Outcome::FrameComplete {
                    continue;
                }
                self.frames += 1;
                if self.uart.frame() != &QUERY_FRAME[..] {
                    let length = self.uart.frame().len() as u32;
                    let crc_ok = crc::check(self.uart.frame()) as u32;
                    self.host.message("unexpected reader command");
                    self.host.values(length, crc_ok, self.frames);
                    return Ok(());
                }
                self.respond()?;
                if self.frames >= FRAME_LIMIT {
                    return Ok(());
                }
                self.uart.reset();
            }
        }
    }

    /// Replays the cached response through the BPSK modulator, then drops
    /// back to quiet listening.
    fn respond(&mut self) -> Result<(), TransportError> {
        self.frontend.configure(frontend::simulator(true));
        for &byte in self.response.as_bytes() {
            nb::block!(self.ssc.write(byte)).map_err(|_| TransportError::Link)?;
            let _ = self.ssc.read();
        }
        nb::block!(self.ssc.flush()).map_err(|_| TransportError::Link)?;
        self.frontend.configure(frontend::simulator(false));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coder::encode_reader_frame;
    use crate::frontend::sim::{SimButton, SimField, SimHost, SimSerial, SimWatchdog};
    use crate::frontend::{ControlWord, MajorMode};

    /// Packs a coded reader frame into the hard-limited serial byte stream
    /// the front-end delivers: four samples per bit, eight samples per byte,
    /// MSB first.
    fn hard_limited_bytes(frame: &[u8]) -> std::vec::Vec<u8> {
        let mut coded = BitBuffer::<256>::new();
        encode_reader_frame(frame, &mut coded);
        let samples: std::vec::Vec<bool> = coded.bits().flat_map(|b| [b; 4]).collect();
        samples
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .fold(0u8, |acc, &bit| (acc << 1) | bit as u8)
            })
            .collect()
    }

    fn expected_response_bytes() -> std::vec::Vec<u8> {
        let mut coded = BitBuffer::<RESPONSE_CAP>::new();
        encode_tag_frame(&RESPONSE_FRAME, &mut coded);
        coded.as_bytes().to_vec()
    }

    #[test]
    fn response_constant_carries_its_own_crc() {
        assert!(crc::check(&RESPONSE_FRAME));
        assert!(crc::check(&QUERY_FRAME));
    }

    #[test]
    fn answers_the_query_with_the_cached_response() {
        let mut field = SimField::new();
        let mut ssc = SimSerial::new();
        let mut button = SimButton::pressed_after(10_000);
        let mut watchdog = SimWatchdog::new();
        let mut host = SimHost::new();
        for byte in hard_limited_bytes(&QUERY_FRAME) {
            ssc.queue_rx(byte);
        }

        let mut emulator =
            TagEmulator::new(&mut field, &mut ssc, &mut button, &mut watchdog, &mut host);
        emulator.run(0).unwrap();

        assert_eq!(emulator.frames(), 1);
        assert_eq!(&ssc.sent[..], &expected_response_bytes()[..]);
        assert!(host.messages.is_empty());
        assert_eq!(field.adc, Some(AdcMux::HighPeakDetect));
        // Listen, modulate, listen again, then off.
        let words: std::vec::Vec<ControlWord> = field.configured.iter().copied().collect();
        assert_eq!(words[0], frontend::simulator(false));
        assert!(words.contains(&frontend::simulator(true)));
        assert_eq!(*words.last().unwrap(), ControlWord::OFF);
    }

    #[test]
    fn unmatched_frame_is_logged_and_ends_the_run() {
        let mut field = SimField::new();
        let mut ssc = SimSerial::new();
        let mut button = SimButton::released();
        let mut watchdog = SimWatchdog::new();
        let mut host = SimHost::new();
        let odd = [0x0Bu8, 0x2F, 0x28];
        for byte in hard_limited_bytes(&odd) {
            ssc.queue_rx(byte);
        }

        let mut emulator =
            TagEmulator::new(&mut field, &mut ssc, &mut button, &mut watchdog, &mut host);
        emulator.run(0).unwrap();

        assert!(ssc.sent.is_empty());
        assert!(host.saw_message("unexpected reader command"));
        // Length 3, CRC invalid for this arbitrary pattern.
        assert_eq!(host.records[0], (3, crc::check(&odd) as u32, 1));
    }

    #[test]
    fn retires_after_the_frame_limit() {
        let mut field = SimField::new();
        let mut ssc = SimSerial::new();
        let mut button = SimButton::released();
        let mut watchdog = SimWatchdog::new();
        let mut host = SimHost::new();
        let query_bytes = hard_limited_bytes(&QUERY_FRAME);
        for _ in 0..FRAME_LIMIT {
            for &byte in &query_bytes {
                ssc.queue_rx(byte);
            }
        }

        let mut emulator =
            TagEmulator::new(&mut field, &mut ssc, &mut button, &mut watchdog, &mut host);
        emulator.run(0).unwrap();

        assert_eq!(emulator.frames(), FRAME_LIMIT);
        assert_eq!(
            ssc.sent.len(),
            FRAME_LIMIT as usize * expected_response_bytes().len()
        );
        assert!(watchdog.pets > 0);
    }

    #[test]
    fn button_cancels_cleanly() {
        let mut field = SimField::new();
        let mut ssc = SimSerial::new();
        let mut button = SimButton::pressed_after(3);
        let mut watchdog = SimWatchdog::new();
        let mut host = SimHost::new();

        let mut emulator =
            TagEmulator::new(&mut field, &mut ssc, &mut button, &mut watchdog, &mut host);
        emulator.run(0).unwrap();

        assert!(ssc.sent.is_empty());
        assert_eq!(field.current(), Some(ControlWord::OFF));
        assert_eq!(
            field.current().map(|w| w.major_mode()),
            Some(MajorMode::Off)
        );
    }
}
