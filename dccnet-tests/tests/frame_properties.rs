//! Property-based tests for DCCNET framing
//!
//! These tests use proptest to generate random frames and byte streams and
//! verify the codec, the checksum, and the reassembler for all valid inputs.

use bytes::Bytes;
use dccnet_protocol::checksum::{checksum, verify};
use dccnet_protocol::{Flags, FrameCodec, FrameId, StreamReassembler, HEADER_SIZE};
use proptest::prelude::*;

// Property test strategies

fn id_strategy() -> impl Strategy<Value = FrameId> {
    prop_oneof![
        Just(FrameId::ZERO),
        Just(FrameId::ONE),
        Just(FrameId::RESET),
        any::<u16>().prop_map(FrameId::from_raw),
    ]
}

fn flags_strategy() -> impl Strategy<Value = Flags> {
    prop_oneof![
        Just(Flags::empty()),
        Just(Flags::ACK),
        Just(Flags::FINAL),
        Just(Flags::RESET),
        Just(Flags::ACK | Flags::FINAL),
        any::<u8>().prop_map(Flags::from_bits),
    ]
}

fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=512)
}

/// A sequence of frames, each with its id alternating like a real sender
fn frames_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(payload_strategy(), 1..8)
}

/// Split `bytes` at the given (sorted, deduplicated) cut points
fn chunk(bytes: &[u8], mut cuts: Vec<usize>) -> Vec<&[u8]> {
    cuts.retain(|&c| c > 0 && c < bytes.len());
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        chunks.push(&bytes[start..cut]);
        start = cut;
    }
    chunks.push(&bytes[start..]);
    chunks
}

// Property tests

proptest! {
    #[test]
    fn prop_frame_roundtrip(
        id in id_strategy(),
        flags in flags_strategy(),
        payload in payload_strategy(),
    ) {
        let codec = FrameCodec::default();
        let wire = codec.encode(&payload, id, flags).unwrap();
        prop_assert_eq!(wire.len(), HEADER_SIZE + payload.len());

        let frame = codec.decode(&wire).unwrap();
        prop_assert_eq!(frame.id, id);
        prop_assert_eq!(frame.flags, flags);
        prop_assert_eq!(frame.payload, Bytes::from(payload));
    }

    #[test]
    fn prop_encoded_frame_verifies(
        id in id_strategy(),
        flags in flags_strategy(),
        payload in payload_strategy(),
    ) {
        let wire = FrameCodec::default().encode(&payload, id, flags).unwrap();
        prop_assert!(verify(&wire));
    }

    #[test]
    fn prop_single_bit_flip_is_detected(
        payload in prop::collection::vec(any::<u8>(), 1..=256),
        bit in any::<prop::sample::Index>(),
    ) {
        let codec = FrameCodec::default();
        let wire = codec.encode(&payload, FrameId::ZERO, Flags::empty()).unwrap();

        // Flip one bit outside the sync marker and length field so the
        // damage reaches the checksum comparison.
        let mut damaged = wire.to_vec();
        let positions: Vec<usize> = (8..10).chain(12..damaged.len()).collect();
        let pos = positions[bit.index(positions.len() * 8) / 8];
        damaged[pos] ^= 1 << (bit.index(8));

        prop_assert!(codec.decode(&damaged).is_err());
    }

    #[test]
    fn prop_appended_checksum_verifies(
        data in prop::collection::vec(any::<u8>(), 0..=256),
    ) {
        // Appending the checksum (even-aligned) makes the whole buffer verify.
        let mut buf = data;
        if buf.len() % 2 == 1 {
            buf.push(0);
        }
        let csum = checksum(&buf);
        buf.extend_from_slice(&csum.to_be_bytes());
        prop_assert!(verify(&buf));
    }

    #[test]
    fn prop_reassembly_under_arbitrary_chunking(
        payloads in frames_strategy(),
        cuts in prop::collection::vec(0usize..8192, 0..32),
    ) {
        let codec = FrameCodec::default();
        let mut stream = Vec::new();
        let mut id = FrameId::ZERO;
        for payload in &payloads {
            stream.extend_from_slice(&codec.encode(payload, id, Flags::empty()).unwrap());
            id.toggle();
        }

        let mut reassembler = StreamReassembler::new(codec);
        let mut frames = Vec::new();
        for piece in chunk(&stream, cuts) {
            frames.extend(reassembler.push(piece));
        }

        let got: Vec<&[u8]> = frames.iter().map(|f| &f.payload[..]).collect();
        let want: Vec<&[u8]> = payloads.iter().map(|p| &p[..]).collect();
        prop_assert_eq!(got, want);
        prop_assert_eq!(reassembler.buffered(), 0);
    }

    #[test]
    fn prop_reassembly_skips_garbage_prefix(
        garbage in prop::collection::vec(any::<u8>(), 0..256),
        payload in payload_strategy(),
    ) {
        let codec = FrameCodec::default();
        // Garbage must not contain the first sync byte, or it could open a
        // false candidate that swallows the real frame's header.
        let garbage: Vec<u8> = garbage.into_iter().filter(|&b| b != 0xDC).collect();

        let mut stream = garbage.clone();
        stream.extend_from_slice(&codec.encode(&payload, FrameId::ONE, Flags::FINAL).unwrap());

        let mut reassembler = StreamReassembler::new(codec);
        let frames = reassembler.push(&stream);

        prop_assert_eq!(frames.len(), 1);
        prop_assert_eq!(&frames[0].payload[..], &payload[..]);
        prop_assert!(frames[0].is_final());
        prop_assert_eq!(reassembler.stats().discarded_bytes, garbage.len() as u64);
    }
}
