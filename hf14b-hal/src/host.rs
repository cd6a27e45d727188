//! Host-facing log channel.

/// Sink for operator-visible reports.
///
/// Two primitives only: a short text message and a three-integer record.
/// The transport to the host (USB, UART, shared memory) is the board's
/// concern.
pub trait HostChannel {
    /// Reports a short text message.
    fn message(&mut self, text: &str);

    /// Reports a three-integer record.
    fn values(&mut self, a: u32, b: u32, c: u32);
}
