//! Passive observer: trace a conversation between an external reader and
//! tag without touching the field.

use embedded_hal::digital::InputPin;

use crate::clocks::Clocks;
use crate::demod::{BpskDemod, Outcome, ReaderUart};
use crate::frontend::{ConfigError, ControlWord, FieldDriver, ReceiverConfig};
use crate::host::HostChannel;
use crate::trace::TraceBuffer;
use crate::transport::{self, IqDma, TransportError, Watchdog};

/// Longest frame either demodulator will hold.
const FRAME_MAX: usize = 100;

/// Trace capacity: the advisory limit plus one maximal record.
const TRACE_CAP: usize = 1152;

/// Observes both halves of a reader/tag exchange through the snooping
/// cross-correlator.
///
/// Every I/Q pair is fed to both demodulators, the reader UART first: the
/// snoop front-end encodes the hard-limited reader waveform in bit 0 of each
/// sample byte, so `i & 1` and `q & 1` are two consecutive UART samples
/// while the full pair is one BPSK sample. Completed frames land in the
/// trace in completion order, stamped with the pair index.
pub struct Snooper<'a, F, D, B, W, H>
where
    F: FieldDriver,
    D: IqDma,
    B: InputPin,
    W: Watchdog,
    H: HostChannel,
{
    frontend: &'a mut F,
    dma: &'a mut D,
    button: &'a mut B,
    watchdog: &'a mut W,
    host: &'a mut H,
    rx_word: ControlWord,
    uart: ReaderUart<FRAME_MAX>,
    demod: BpskDemod<FRAME_MAX>,
    trace: TraceBuffer<TRACE_CAP>,
}

impl<'a, F, D, B, W, H> Snooper<'a, F, D, B, W, H>
where
    F: FieldDriver,
    D: IqDma,
    B: InputPin,
    W: Watchdog,
    H: HostChannel,
{
    pub fn new(
        frontend: &'a mut F,
        dma: &'a mut D,
        button: &'a mut B,
        watchdog: &'a mut W,
        host: &'a mut H,
        clocks: Clocks,
    ) -> Result<Self, ConfigError> {
        let rx_word = ReceiverConfig::new(clocks)
            .set_snoop(true)
            .control_word(clocks)?;
        Ok(Self {
            frontend,
            dma,
            button,
            watchdog,
            host,
            rx_word,
            uart: ReaderUart::new(),
            demod: BpskDemod::new(),
            trace: TraceBuffer::new(),
        })
    }

    /// The recorded trace, for the host to pull after the run.
    pub fn trace(&self) -> &[u8] {
        self.trace.as_bytes()
    }

    /// Observes until the trace fills, the pushbutton asserts, or the ring
    /// overruns. The 32-bit operator parameter is reserved.
    pub fn run(&mut self, _param: u32) -> Result<(), TransportError> {
        self.frontend.configure(self.rx_word);
        self.uart.reset();
        self.demod.reset();
        self.trace.clear();

        let mut timestamp: u32 = 0;
        let uart = &mut self.uart;
        let demod = &mut self.demod;
        let trace = &mut self.trace;
        let button = &mut *self.button;
        let end = transport::drain(
            &mut *self.dma,
            &mut *self.watchdog,
            usize::MAX,
            || button.is_high().unwrap_or(false),
            |ci, cq| {
                timestamp = timestamp.wrapping_add(1);
                for bit in [ci & 1 == 1, cq & 1 == 1] {
                    if uart.step(bit) == Outcome::FrameComplete {
                        trace.record_reader(timestamp, uart.frame());
                        uart.reset();
                        demod.reset();
                    }
                }
                if demod.step(ci, cq) == Outcome::FrameComplete {
                    let metric = demod.signal_metric().unwrap_or(0);
                    trace.record_tag(timestamp, metric, demod.frame());
                    uart.reset();
                    demod.reset();
                }
                trace.is_full()
            },
        );
        self.frontend.power_down();
        match end {
            Ok(_) => {
                self.host.message("snoop finished");
                self.host.values(self.trace.len() as u32, timestamp, 0);
                Ok(())
            }
            Err(TransportError::RingOverrun { behind_by }) => {
                self.host.message("blew circular buffer");
                self.host.values(behind_by as u32, timestamp, 0);
                Err(TransportError::RingOverrun { behind_by })
            }
            Err(err) => Err(err),
        }
    }
}
