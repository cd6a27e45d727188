//! Sample transport: TX serialization over the synchronous serial link and
//! the receive-side DMA ring drain.
//!
//! The DMA engine is hardware that writes interleaved signed I/Q bytes into
//! an even-length ring and exposes a counting-down transfer cursor. The one
//! software reader chases that cursor; falling more than `capacity - 2`
//! samples behind is unrecoverable. In snoop mode the front-end additionally
//! encodes the hard-limited reader waveform in bit 0 of every sample byte;
//! consumers that feed a [`crate::demod::ReaderUart`] rely on that contract.

use embedded_hal_nb::nb;
use embedded_hal_nb::serial::{Read, Write};

/// Idle bytes sent ahead of every coded frame so the tag sees a settled
/// reference level.
const TX_IDLE_BYTES: usize = 10;
/// Fatal lag threshold for the ring reader, in samples.
const MAX_BEHIND: usize = 100;

/// Board watchdog; petted on every outer drain iteration.
pub trait Watchdog {
    fn pet(&mut self);
}

/// Transport failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The synchronous serial link failed.
    Link,
    /// The ring reader fell fatally behind the hardware cursor.
    RingOverrun { behind_by: usize },
}

impl embedded_io::Error for TransportError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

/// Streams a coded frame out the serial link: ten idle `0xFF` bytes, then
/// the frame, each byte gated on the TX-ready flag. RX bytes arriving during
/// transmission are drained and discarded.
pub fn transmit_frame<S>(ssc: &mut S, bytes: &[u8]) -> Result<(), TransportError>
where
    S: Read<u8> + Write<u8>,
{
    for _ in 0..TX_IDLE_BYTES {
        nb::block!(ssc.write(0xFF)).map_err(|_| TransportError::Link)?;
        let _ = ssc.read();
    }
    for &byte in bytes {
        nb::block!(ssc.write(byte)).map_err(|_| TransportError::Link)?;
        let _ = ssc.read();
    }
    nb::block!(ssc.flush()).map_err(|_| TransportError::Link)
}

/// Receive-side DMA engine for the I/Q sample ring.
///
/// `transfers_remaining` is the hardware-maintained count-down of the active
/// descriptor; it reloads to `capacity` when the queued next descriptor takes
/// over. The reader must call `queue_next` once per wrap to keep a next
/// descriptor armed.
pub trait IqDma {
    /// Ring size in samples. Always even.
    fn capacity(&self) -> usize;

    /// Points the engine at the ring start with a full transfer count and
    /// starts it. Called once per drain run.
    fn arm(&mut self);

    /// Samples left before the active descriptor is exhausted.
    fn transfers_remaining(&mut self) -> usize;

    /// Reads the ring at `index`.
    fn sample(&self, index: usize) -> i8;

    /// Re-arms the ring start as the next descriptor.
    fn queue_next(&mut self);

    /// Stops the engine.
    fn disable(&mut self);
}

/// Software read cursor chasing the hardware transfer counter.
pub struct RingCursor {
    pos: usize,
    last_counter: usize,
}

impl RingCursor {
    pub fn new<D: IqDma>(dma: &D) -> Self {
        Self {
            pos: 0,
            last_counter: dma.capacity(),
        }
    }

    /// Distance between the hardware cursor and this reader, in samples,
    /// modulo the ring size.
    pub fn behind_by<D: IqDma>(&self, dma: &mut D) -> usize {
        let capacity = dma.capacity();
        (self.last_counter + capacity - dma.transfers_remaining()) % capacity
    }

    /// Consumes the next (i, q) pair, re-arming the next descriptor when the
    /// read position wraps.
    pub fn take_pair<D: IqDma>(&mut self, dma: &mut D) -> (i8, i8) {
        let ci = dma.sample(self.pos);
        let cq = dma.sample(self.pos + 1);
        self.pos += 2;
        self.last_counter -= 2;
        if self.pos >= dma.capacity() {
            self.pos = 0;
            self.last_counter += dma.capacity();
            dma.queue_next();
        }
        (ci, cq)
    }
}

/// How a drain run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainEnd {
    /// The sink asked to stop (a frame completed, the trace filled, ...).
    Complete { samples: usize },
    /// The sample budget ran out first.
    Budget { samples: usize },
    /// The cancel condition asserted.
    Cancelled,
}

/// Drains the sample ring into `sink`, one (i, q) pair per call, until the
/// sink asks to stop, `budget` samples (counting both halves of each pair)
/// have been consumed, or `cancelled` asserts. The watchdog is petted once
/// per outer iteration. Falling more than [`MAX_BEHIND`] samples behind the
/// hardware cursor is the fatal overrun; the engine is disabled on every
/// exit path.
pub fn drain<D, W, C, F>(
    dma: &mut D,
    watchdog: &mut W,
    budget: usize,
    mut cancelled: C,
    mut sink: F,
) -> Result<DrainEnd, TransportError>
where
    D: IqDma,
    W: Watchdog,
    C: FnMut() -> bool,
    F: FnMut(i8, i8) -> bool,
{
    dma.arm();
    let mut cursor = RingCursor::new(dma);
    let mut samples = 0usize;
    loop {
        watchdog.pet();
        if cancelled() {
            dma.disable();
            return Ok(DrainEnd::Cancelled);
        }
        let mut behind = cursor.behind_by(dma);
        if behind > MAX_BEHIND {
            dma.disable();
            return Err(TransportError::RingOverrun { behind_by: behind });
        }
        while behind > 2 {
            let (ci, cq) = cursor.take_pair(dma);
            behind -= 2;
            samples += 2;
            if sink(ci, cq) {
                dma.disable();
                return Ok(DrainEnd::Complete { samples });
            }
            if samples >= budget {
                dma.disable();
                return Ok(DrainEnd::Budget { samples });
            }
        }
    }
}
