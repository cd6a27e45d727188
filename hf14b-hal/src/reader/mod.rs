//! Active reader: interrogate an SRI512-family tag and dump its memory.

pub mod commands;

use embedded_hal::digital::InputPin;
use embedded_hal_nb::serial::{Read, Write};

use crate::clocks::Clocks;
use crate::coder::{BitBuffer, encode_reader_frame};
use crate::crc;
use crate::demod::{BpskDemod, Outcome};
use crate::frontend::{ConfigError, ControlWord, FieldDriver, ReceiverConfig, reader_transmit};
use crate::host::HostChannel;
use crate::transport::{self, IqDma, TransportError, Watchdog};

/// Samples captured per exchange before giving up on a response.
const SAMPLE_BUDGET: usize = 2000;

/// Longest tag response the reader accepts.
const RESPONSE_MAX: usize = 100;

/// Capacity for one coded command's bit stream.
const COMMAND_BITS_CAP: usize = 64;

/// Reader failures that abort the read sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadError {
    Transport(TransportError),
    /// A response arrived with the wrong length (or not at all).
    UnexpectedLength { expected: usize, got: usize },
}

impl From<TransportError> for ReadError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

/// How one command/response exchange ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Exchange {
    /// A frame completed (or the budget lapsed); the demodulator holds
    /// whatever arrived.
    Frame,
    /// The pushbutton asserted mid-exchange.
    Cancelled,
}

/// Reads out an SRI512: INITIATE, SELECT, GET_UID, then every user block
/// and the system block.
///
/// Block iteration covers addresses 0 through 15 and then jumps to the 0xFF
/// system block; addresses 0x10 through 0xFE are intentionally left unread.
/// Per-block results go to the host as (address, little-endian contents,
/// CRC word) records. A CRC mismatch on a block is reported and the read
/// continues; a wrong-length response aborts the sequence.
pub struct CardReader<'a, F, S, D, B, W, H>
where
    F: FieldDriver,
    S: Read<u8> + Write<u8>,
    D: IqDma,
    B: InputPin,
    W: Watchdog,
    H: HostChannel,
{
    frontend: &'a mut F,
    ssc: &'a mut S,
    dma: &'a mut D,
    button: &'a mut B,
    watchdog: &'a mut W,
    host: &'a mut H,
    tx_word: ControlWord,
    rx_word: ControlWord,
    coded: BitBuffer<COMMAND_BITS_CAP>,
    demod: BpskDemod<RESPONSE_MAX>,
}

impl<'a, F, S, D, B, W, H> CardReader<'a, F, S, D, B, W, H>
where
    F: FieldDriver,
    S: Read<u8> + Write<u8>,
    D: IqDma,
    B: InputPin,
    W: Watchdog,
    H: HostChannel,
{
    pub fn new(
        frontend: &'a mut F,
        ssc: &'a mut S,
        dma: &'a mut D,
        button: &'a mut B,
        watchdog: &'a mut W,
        host: &'a mut H,
        clocks: Clocks,
    ) -> Result<Self, ConfigError> {
        let rx_word = ReceiverConfig::new(clocks).control_word(clocks)?;
        Ok(Self {
            frontend,
            ssc,
            dma,
            button,
            watchdog,
            host,
            tx_word: reader_transmit(),
            rx_word,
            coded: BitBuffer::new(),
            demod: BpskDemod::new(),
        })
    }

    /// Runs the full read sequence. The 32-bit operator parameter is
    /// reserved. Pushbutton cancellation is a clean `Ok` exit; the field is
    /// dropped on every path.
    pub fn run(&mut self, _param: u32) -> Result<(), ReadError> {
        let result = self.sequence();
        self.frontend.power_down();
        result
    }

    fn sequence(&mut self) -> Result<(), ReadError> {
        // INITIATE
        if self.exchange(&commands::initiate())? == Exchange::Cancelled {
            return Ok(());
        }
        self.expect_length(commands::INITIATE_RESPONSE_LEN, "Expected 3 bytes")?;
        let chip_id = self.demod.frame()[0];

        // SELECT
        if self.exchange(&commands::select(chip_id))? == Exchange::Cancelled {
            return Ok(());
        }
        self.expect_length(commands::SELECT_RESPONSE_LEN, "Expected 3 bytes")?;
        if self.demod.frame()[0] != chip_id {
            let echoed = self.demod.frame()[0];
            self.host.message("SELECT echo mismatch");
            self.host.values(echoed as u32, chip_id as u32, 0);
        }
        if !crc::check(self.demod.frame()) {
            self.host.message("CRC Error in SELECT response");
        }

        // GET_UID
        if self.exchange(&commands::get_uid())? == Exchange::Cancelled {
            return Ok(());
        }
        self.expect_length(commands::UID_RESPONSE_LEN, "Expected 10 bytes")?;
        if !crc::check(self.demod.frame()) {
            self.host.message("CRC Error in UID response");
        }
        let uid = self.demod.frame();
        let uid_lo = u32::from_le_bytes([uid[0], uid[1], uid[2], uid[3]]);
        let uid_hi = u32::from_le_bytes([uid[4], uid[5], uid[6], uid[7]]);
        let metric = self.demod.signal_metric().unwrap_or(0);
        self.host.values(uid_lo, uid_hi, metric);

        // READ_BLOCK over the user area, then the system block.
        for index in 0..=commands::USER_BLOCKS {
            let address = if index == commands::USER_BLOCKS {
                commands::SYSTEM_BLOCK_ADDRESS
            } else {
                index
            };
            if self.exchange(&commands::read_block(address))? == Exchange::Cancelled {
                return Ok(());
            }
            self.expect_length(commands::BLOCK_RESPONSE_LEN, "Expected 6 bytes")?;
            let block = self.demod.frame();
            if !crc::check(block) {
                self.host.message("CRC Error reading block!");
                continue;
            }
            let contents = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
            let crc_word = ((block[4] as u32) << 8) | block[5] as u32;
            self.host.values(address as u32, contents, crc_word);
        }
        Ok(())
    }

    /// Codes and transmits one command, then captures the response through
    /// the BPSK demodulator.
    fn exchange(&mut self, command: &[u8]) -> Result<Exchange, ReadError> {
        self.frontend.configure(self.tx_word);
        encode_reader_frame(command, &mut self.coded);
        transport::transmit_frame(&mut *self.ssc, self.coded.as_bytes())?;

        self.frontend.configure(self.rx_word);
        self.demod.reset();
        let button = &mut *self.button;
        let demod = &mut self.demod;
        let end = transport::drain(
            &mut *self.dma,
            &mut *self.watchdog,
            SAMPLE_BUDGET,
            || button.is_high().unwrap_or(false),
            |ci, cq| demod.step(ci, cq) == Outcome::FrameComplete,
        );
        match end {
            Ok(transport::DrainEnd::Cancelled) => Ok(Exchange::Cancelled),
            Ok(_) => Ok(Exchange::Frame),
            Err(TransportError::RingOverrun { behind_by }) => {
                self.host.message("blew circular buffer");
                self.host.values(behind_by as u32, 0, 0);
                Err(TransportError::RingOverrun { behind_by }.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Enforces a response length, reporting and aborting on mismatch.
    fn expect_length(&mut self, expected: usize, report: &str) -> Result<(), ReadError> {
        let got = self.demod.frame().len();
        if got == expected {
            return Ok(());
        }
        self.host.message(report);
        self.host.values(got as u32, expected as u32, 0);
        Err(ReadError::UnexpectedLength { expected, got })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coder::encode_tag_frame;
    use crate::frontend::sim::{SimButton, SimDma, SimField, SimHost, SimSerial, SimWatchdog};

    const AMPLITUDE: i8 = 100;
    /// Zero pairs ahead of each scripted response; enough for the
    /// demodulator to shed any leftover tail from the previous frame.
    const GAP_PAIRS: usize = 120;

    fn script_response(dma: &mut SimDma, bytes: &[u8]) {
        for _ in 0..GAP_PAIRS {
            dma.push_pair(0, 0);
        }
        let mut coded = BitBuffer::<768>::new();
        encode_tag_frame(bytes, &mut coded);
        let bits: std::vec::Vec<bool> = coded.bits().collect();
        for pair in bits.chunks(2) {
            let level = if pair[0] { AMPLITUDE } else { -AMPLITUDE };
            dma.push_pair(level, 0);
        }
    }

    fn with_crc(body: &[u8]) -> std::vec::Vec<u8> {
        let mut v = body.to_vec();
        v.extend_from_slice(&crc::compute(body));
        v
    }

    /// The exact serial bytes one transmitted command produces: ten idle
    /// bytes, then the coded frame with its slop.
    fn expected_tx(command: &[u8]) -> std::vec::Vec<u8> {
        let mut coded = BitBuffer::<COMMAND_BITS_CAP>::new();
        encode_reader_frame(command, &mut coded);
        let mut bytes = std::vec::Vec::from([0xFFu8; 10]);
        bytes.extend_from_slice(coded.as_bytes());
        bytes
    }

    struct Harness {
        field: SimField,
        ssc: SimSerial,
        dma: SimDma,
        button: SimButton,
        watchdog: SimWatchdog,
        host: SimHost,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                field: SimField::new(),
                ssc: SimSerial::new(),
                dma: SimDma::new(8),
                button: SimButton::released(),
                watchdog: SimWatchdog::new(),
                host: SimHost::new(),
            }
        }

        fn run(&mut self) -> Result<(), ReadError> {
            let mut reader = CardReader::new(
                &mut self.field,
                &mut self.ssc,
                &mut self.dma,
                &mut self.button,
                &mut self.watchdog,
                &mut self.host,
                Clocks,
            )
            .unwrap();
            reader.run(0)
        }
    }

    #[test]
    fn initiate_reply_drives_the_select_frame() {
        let mut h = Harness::new();
        let chip_id = 0x33;
        script_response(&mut h.dma, &with_crc(&[chip_id]));
        script_response(&mut h.dma, &with_crc(&[chip_id]));
        // No UID response: the sequence stops there with a length report.
        let err = h.run().unwrap_err();
        assert_eq!(
            err,
            ReadError::UnexpectedLength {
                expected: 10,
                got: 0
            }
        );
        assert!(h.host.saw_message("Expected 10 bytes"));

        let mut expected = expected_tx(&commands::initiate());
        expected.extend_from_slice(&expected_tx(&commands::select(chip_id)));
        expected.extend_from_slice(&expected_tx(&commands::get_uid()));
        assert_eq!(&h.ssc.sent[..], &expected[..]);
    }

    #[test]
    fn full_read_logs_every_block() {
        let mut h = Harness::new();
        let chip_id = 0x0B;
        script_response(&mut h.dma, &with_crc(&[chip_id]));
        script_response(&mut h.dma, &with_crc(&[chip_id]));
        let uid = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        script_response(&mut h.dma, &with_crc(&uid));
        for index in 0..=commands::USER_BLOCKS {
            let address = if index == commands::USER_BLOCKS {
                commands::SYSTEM_BLOCK_ADDRESS
            } else {
                index
            };
            let data = [address, address.wrapping_add(1), 0xC0, 0x10];
            script_response(&mut h.dma, &with_crc(&data));
        }

        h.run().unwrap();

        // UID record first: little-endian halves plus the signal metric.
        let (uid_lo, uid_hi, metric) = h.host.records[0];
        assert_eq!(uid_lo, 0x4433_2211);
        assert_eq!(uid_hi, 0x8877_6655);
        assert_eq!(metric, 2 * AMPLITUDE as u32);

        // Seventeen block records: user blocks 0..=15, then 0xFF.
        let blocks = &h.host.records[1..];
        assert_eq!(blocks.len(), 17);
        for (i, &(address, contents, crc_word)) in blocks.iter().enumerate() {
            let expected_address = if i == 16 { 0xFF } else { i as u32 };
            assert_eq!(address, expected_address);
            let data = [
                expected_address as u8,
                (expected_address as u8).wrapping_add(1),
                0xC0,
                0x10,
            ];
            assert_eq!(contents, u32::from_le_bytes(data));
            let crc = crc::compute(&data);
            assert_eq!(crc_word, ((crc[0] as u32) << 8) | crc[1] as u32);
        }
        assert!(!h.host.saw_message("CRC Error"));
        assert!(h.watchdog.pets > 0);
        // The front-end ends powered down.
        assert_eq!(h.field.current(), Some(ControlWord::OFF));
    }

    #[test]
    fn crc_failure_on_a_block_is_reported_and_skipped() {
        let mut h = Harness::new();
        let chip_id = 0x5A;
        script_response(&mut h.dma, &with_crc(&[chip_id]));
        script_response(&mut h.dma, &with_crc(&[chip_id]));
        script_response(&mut h.dma, &with_crc(&[0u8; 8]));
        for index in 0..=commands::USER_BLOCKS {
            let address = if index == commands::USER_BLOCKS {
                commands::SYSTEM_BLOCK_ADDRESS
            } else {
                index
            };
            let mut response = with_crc(&[address, 0, 0, 0]);
            if address == 5 {
                // Corrupt the CRC of block five only.
                response[4] ^= 0xFF;
            }
            script_response(&mut h.dma, &response);
        }

        h.run().unwrap();

        assert!(h.host.saw_message("CRC Error reading block!"));
        let blocks = &h.host.records[1..];
        assert_eq!(blocks.len(), 16);
        assert!(blocks.iter().all(|&(address, _, _)| address != 5));
        assert!(blocks.iter().any(|&(address, _, _)| address == 0xFF));
    }

    #[test]
    fn short_uid_response_aborts() {
        let mut h = Harness::new();
        let chip_id = 0x77;
        script_response(&mut h.dma, &with_crc(&[chip_id]));
        script_response(&mut h.dma, &with_crc(&[chip_id]));
        // Truncated UID: six bytes instead of ten.
        script_response(&mut h.dma, &with_crc(&[1, 2, 3, 4]));

        let err = h.run().unwrap_err();
        assert_eq!(err, ReadError::UnexpectedLength { expected: 10, got: 6 });
        assert!(h.host.saw_message("Expected 10 bytes"));
        assert_eq!(h.field.current(), Some(ControlWord::OFF));
    }

    #[test]
    fn silent_tag_reports_no_initiate_response() {
        let mut h = Harness::new();
        let err = h.run().unwrap_err();
        assert_eq!(err, ReadError::UnexpectedLength { expected: 3, got: 0 });
        assert!(h.host.saw_message("Expected 3 bytes"));
    }

    #[test]
    fn button_cancels_mid_sequence() {
        let mut h = Harness::new();
        h.button = SimButton::pressed_after(2);
        assert_eq!(h.run(), Ok(()));
        assert_eq!(h.field.current(), Some(ControlWord::OFF));
        assert!(h.host.records.is_empty());
    }

    #[test]
    fn select_echo_mismatch_is_reported() {
        let mut h = Harness::new();
        script_response(&mut h.dma, &with_crc(&[0x10]));
        // Tag echoes the wrong id; the read continues and then runs dry.
        script_response(&mut h.dma, &with_crc(&[0x99]));
        let _ = h.run();
        assert!(h.host.saw_message("SELECT echo mismatch"));
    }
}
