//! Host-side simulation of the hardware contracts.
//!
//! Every trait the orchestrators need (field driver, DMA engine, serial
//! link, pushbutton, watchdog, host channel) has a scripted implementation
//! here. The crate's own tests drive the orchestrators through these; host
//! tooling can reuse them to replay captured exchanges.

use heapless::{Deque, String, Vec};

use crate::frontend::{AdcMux, ControlWord, FieldDriver};
use crate::host::HostChannel;
use crate::transport::{IqDma, Watchdog};

/// Ring size of the simulated DMA engine, in samples.
pub const SIM_RING_SIZE: usize = 256;

/// Records every control-word write and ADC selection.
#[derive(Default)]
pub struct SimField {
    pub configured: Vec<ControlWord, 128>,
    pub adc: Option<AdcMux>,
}

impl SimField {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently written control word.
    pub fn current(&self) -> Option<ControlWord> {
        self.configured.last().copied()
    }
}

impl FieldDriver for SimField {
    fn configure(&mut self, word: ControlWord) {
        // Saturating history: a long emulation run only needs the tail.
        if self.configured.is_full() {
            self.configured.remove(0);
        }
        let _ = self.configured.push(word);
    }

    fn select_adc(&mut self, mux: AdcMux) {
        self.adc = Some(mux);
    }
}

/// Scripted synchronous serial link: reads pop a queue, writes land in
/// `sent`.
pub struct SimSerial {
    rx: Deque<u8, 4096>,
    pub sent: Vec<u8, 8192>,
}

impl SimSerial {
    pub fn new() -> Self {
        Self {
            rx: Deque::new(),
            sent: Vec::new(),
        }
    }

    /// Queues one byte for the device to receive.
    pub fn queue_rx(&mut self, byte: u8) {
        let _ = self.rx.push_back(byte);
    }

    /// Queues a byte slice for the device to receive.
    pub fn queue_rx_slice(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.queue_rx(b);
        }
    }

    pub fn rx_is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for SimSerial {
    fn default() -> Self {
        Self::new()
    }
}

impl embedded_hal_nb::serial::ErrorType for SimSerial {
    type Error = core::convert::Infallible;
}

impl embedded_hal_nb::serial::Read<u8> for SimSerial {
    fn read(&mut self) -> embedded_hal_nb::nb::Result<u8, Self::Error> {
        self.rx
            .pop_front()
            .ok_or(embedded_hal_nb::nb::Error::WouldBlock)
    }
}

impl embedded_hal_nb::serial::Write<u8> for SimSerial {
    fn write(&mut self, word: u8) -> embedded_hal_nb::nb::Result<(), Self::Error> {
        let _ = self.sent.push(word);
        Ok(())
    }

    fn flush(&mut self) -> embedded_hal_nb::nb::Result<(), Self::Error> {
        Ok(())
    }
}

/// Simulated receive DMA engine.
///
/// Scripted samples are written into a real ring with descriptor-countdown
/// semantics; `rate` samples are produced per `transfers_remaining` poll to
/// model hardware running concurrently with the drain loop. An exhausted
/// script produces silence, so budget-bounded drains always terminate.
pub struct SimDma {
    ring: [i8; SIM_RING_SIZE],
    script: Deque<i8, 16384>,
    produced: usize,
    rate: usize,
    looping: bool,
    pub next_queued: usize,
    pub disabled: bool,
}

impl SimDma {
    /// Creates an engine producing `rate` samples per poll.
    pub fn new(rate: usize) -> Self {
        Self {
            ring: [0; SIM_RING_SIZE],
            script: Deque::new(),
            produced: 0,
            rate,
            looping: false,
            next_queued: 0,
            disabled: false,
        }
    }

    /// Replays the script cyclically instead of falling silent after it.
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Appends one I/Q pair to the script.
    pub fn push_pair(&mut self, ci: i8, cq: i8) {
        let _ = self.script.push_back(ci);
        let _ = self.script.push_back(cq);
    }

    /// Remaining scripted samples not yet produced into the ring.
    pub fn script_len(&self) -> usize {
        self.script.len()
    }

    fn produce(&mut self) {
        for _ in 0..self.rate {
            let sample = self.script.pop_front().unwrap_or(0);
            if self.looping {
                let _ = self.script.push_back(sample);
            }
            self.ring[self.produced % SIM_RING_SIZE] = sample;
            self.produced += 1;
        }
    }
}

impl IqDma for SimDma {
    fn capacity(&self) -> usize {
        SIM_RING_SIZE
    }

    fn arm(&mut self) {
        self.produced = 0;
        self.disabled = false;
    }

    fn transfers_remaining(&mut self) -> usize {
        self.produce();
        SIM_RING_SIZE - (self.produced % SIM_RING_SIZE)
    }

    fn sample(&self, index: usize) -> i8 {
        self.ring[index]
    }

    fn queue_next(&mut self) {
        self.next_queued += 1;
    }

    fn disable(&mut self) {
        self.disabled = true;
    }
}

/// Pushbutton that asserts after a configurable number of polls.
pub struct SimButton {
    press_after: Option<u32>,
    polls: u32,
}

impl SimButton {
    /// A button that is never pressed.
    pub fn released() -> Self {
        Self {
            press_after: None,
            polls: 0,
        }
    }

    /// A button that reads pressed from the `n`th poll on.
    pub fn pressed_after(n: u32) -> Self {
        Self {
            press_after: Some(n),
            polls: 0,
        }
    }
}

impl embedded_hal::digital::ErrorType for SimButton {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::InputPin for SimButton {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.polls += 1;
        Ok(match self.press_after {
            Some(n) => self.polls > n,
            None => false,
        })
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

/// Watchdog that only counts its pets.
#[derive(Default)]
pub struct SimWatchdog {
    pub pets: u32,
}

impl SimWatchdog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Watchdog for SimWatchdog {
    fn pet(&mut self) {
        self.pets = self.pets.saturating_add(1);
    }
}

/// Host channel capturing messages and records for assertions.
#[derive(Default)]
pub struct SimHost {
    pub messages: Vec<String<64>, 32>,
    pub records: Vec<(u32, u32, u32), 64>,
}

impl SimHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if any captured message contains `needle`.
    pub fn saw_message(&self, needle: &str) -> bool {
        self.messages.iter().any(|m| m.contains(needle))
    }
}

impl HostChannel for SimHost {
    fn message(&mut self, text: &str) {
        let mut entry = String::new();
        for c in text.chars().take(64) {
            let _ = entry.push(c);
        }
        let _ = self.messages.push(entry);
    }

    fn values(&mut self, a: u32, b: u32, c: u32) {
        let _ = self.records.push((a, b, c));
    }
}
