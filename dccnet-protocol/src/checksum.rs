//! Internet checksum
//!
//! 16-bit one's-complement sum over big-endian words (RFC 1071). Used both to
//! stamp outgoing frames and to verify incoming ones.

/// Compute the Internet checksum over `data`.
///
/// An odd trailing byte is padded with a zero byte on the right. The caller
/// must zero any checksum field inside `data` before calling this.
pub fn checksum(data: &[u8]) -> u16 {
    !fold(sum_words(data))
}

/// Check that `data`, which embeds its own checksum, sums to `0xFFFF`.
///
/// This is the receiver-side shortcut: summing a message together with its
/// stored checksum yields all ones when nothing was corrupted.
pub fn verify(data: &[u8]) -> bool {
    fold(sum_words(data)) == 0xFFFF
}

/// Compute the checksum of `data` as if the 16-bit field at `field` were zero.
///
/// `field` must sit on a word boundary (even offset) so the surrounding words
/// keep their alignment.
pub fn checksum_excluding(data: &[u8], field: usize) -> u16 {
    debug_assert!(field % 2 == 0, "checksum field must be word aligned");
    let end = (field + 2).min(data.len());
    let head = u32::from(fold(sum_words(&data[..field.min(data.len())])));
    let tail = u32::from(fold(sum_words(&data[end..])));
    !fold(head + tail)
}

fn sum_words(data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    let mut sum: u32 = 0;

    for word in &mut chunks {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
        // Fold early so the accumulator never overflows on huge inputs.
        if sum > 0xFFFF_0000 {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
    }

    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }

    sum
}

#[inline]
fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}
