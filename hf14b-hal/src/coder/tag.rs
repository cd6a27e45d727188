use crate::coder::BitBuffer;

/// Samples stuffed per logical symbol so downstream BPSK phase changes land
/// on transmit sample boundaries.
const OVERSAMPLE: usize = 4;

/// Codes a tag-to-reader response as BPSK-ready modulation bits at 4x symbol
/// resolution.
///
/// Layout: an 80-bit high TR1 burst for the reader's phase-reference
/// training, a 40-low/8-high SOF, each byte as a 4-low start, eight data
/// symbols LSB first at four stuffed bits each, and a 4-high stop, then a
/// 40-low/40-high tail. The buffer's two slop bytes ride along when the
/// transport flushes it.
pub fn encode_tag_frame<const N: usize>(frame: &[u8], out: &mut BitBuffer<N>) {
    out.clear();

    out.ones(20 * OVERSAMPLE);

    out.zeros(10 * OVERSAMPLE);
    out.ones(2 * OVERSAMPLE);

    for &byte in frame {
        out.zeros(OVERSAMPLE);
        for bit in 0..8 {
            if byte & (1 << bit) != 0 {
                out.ones(OVERSAMPLE);
            } else {
                out.zeros(OVERSAMPLE);
            }
        }
        out.ones(OVERSAMPLE);
    }

    out.zeros(10 * OVERSAMPLE);
    out.ones(10 * OVERSAMPLE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_length_is_forty_bits_per_byte_plus_delimiters() {
        for n in [0usize, 1, 4, 14] {
            let frame = [0x5Au8; 14];
            let mut buf = BitBuffer::<768>::new();
            encode_tag_frame(&frame[..n], &mut buf);
            assert_eq!(buf.bit_len(), 80 + 48 + 40 * n + 80);
        }
    }

    #[test]
    fn symbols_hold_their_level_for_four_bits() {
        let mut buf = BitBuffer::<768>::new();
        encode_tag_frame(&[0x01], &mut buf);
        let bits: heapless::Vec<bool, 1024> = buf.bits().collect();
        // Character starts after TR1 (80) and SOF (48).
        let ch = &bits[128..168];
        assert!(ch[..4].iter().all(|&b| !b), "start symbol low");
        assert!(ch[4..8].iter().all(|&b| b), "data bit 0 of 0x01 high");
        assert!(ch[8..36].iter().all(|&b| !b), "data bits 1..7 low");
        assert!(ch[36..40].iter().all(|&b| b), "stop symbol high");
    }

    #[test]
    fn tail_is_low_then_high() {
        let mut buf = BitBuffer::<768>::new();
        encode_tag_frame(&[], &mut buf);
        let bits: heapless::Vec<bool, 512> = buf.bits().collect();
        let tail = &bits[128..];
        assert!(tail[..40].iter().all(|&b| !b));
        assert!(tail[40..80].iter().all(|&b| b));
    }
}
