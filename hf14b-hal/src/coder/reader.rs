use crate::coder::BitBuffer;

/// Codes a reader-to-tag frame as NRZ-L modulation bits, one stuffed bit per
/// logical bit time.
///
/// Layout: 40 idle ones for the tag's reference level, a 10-zero SOF, then
/// each byte as two stop/EGT ones, a zero start bit and eight data bits LSB
/// first (the next character's leading ones double as this one's stop), a
/// one-one/10-zero/8-one EOF, and 24 trailing ones so the shift register is
/// flushed before the receiver takes over.
///
/// `frame` must already carry its CRC; the coder does not add one.
pub fn encode_reader_frame<const N: usize>(frame: &[u8], out: &mut BitBuffer<N>) {
    out.clear();

    out.ones(40);
    out.zeros(10);

    for &byte in frame {
        out.ones(2);
        out.push(false);
        for bit in 0..8 {
            out.push(byte & (1 << bit) != 0);
        }
    }

    out.ones(1);
    out.zeros(10);
    out.ones(8);

    out.ones(24);
}
