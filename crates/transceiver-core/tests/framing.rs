//! Encode/decode properties of the packet format

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use transceiver_core::checksum::rfc1071;
use transceiver_core::config::{FrameOptions, LrcMode};
use transceiver_core::protocol::{
    decode, encode, encoded_len, Header, LengthField, ProtocolError, HEADER_LEN, MAX_PAYLOAD_LEN,
};

fn options() -> FrameOptions {
    FrameOptions {
        address: 0x00,
        ..FrameOptions::default()
    }
}

fn random_payload(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.gen()).collect()
}

#[test]
fn test_roundtrip_random_lengths() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..300 {
        let len = rng.gen_range(0..=600);
        let payload = random_payload(&mut rng, len);
        let bytes = encode(&payload, &options()).unwrap();
        assert_eq!(bytes.len(), encoded_len(len));
        let frame = decode(&bytes, &options()).unwrap();
        assert_eq!(frame.payload, payload);
    }
}

#[test]
fn test_roundtrip_boundary_lengths() {
    let mut rng = StdRng::seed_from_u64(1);
    for len in [0, 1, 2, 255, 256, 257, MAX_PAYLOAD_LEN - 1, MAX_PAYLOAD_LEN] {
        let payload = random_payload(&mut rng, len);
        let bytes = encode(&payload, &options()).unwrap();
        assert_eq!(decode(&bytes, &options()).unwrap().payload, payload, "len {}", len);
    }
}

#[test]
fn test_roundtrip_with_lrc() {
    let opts = FrameOptions {
        lrc: LrcMode::Append,
        ..options()
    };
    let mut rng = StdRng::seed_from_u64(2);
    for len in 0..64 {
        let payload = random_payload(&mut rng, len);
        let bytes = encode(&payload, &opts).unwrap();
        assert_eq!(decode(&bytes, &opts).unwrap().payload, payload);
    }
}

#[test]
fn test_empty_payload_frame() {
    let bytes = encode(&[], &options()).unwrap();
    assert_eq!(bytes.len(), 8);

    let mut raw = [0u8; HEADER_LEN];
    raw.copy_from_slice(&bytes[..HEADER_LEN]);
    let header = Header::parse(&raw);
    assert_eq!(header.length, LengthField { words: 0, padded: false });

    assert!(decode(&bytes, &options()).unwrap().payload.is_empty());
}

#[test]
fn test_odd_payload_sets_pad_flag() {
    let bytes = encode(&[0x01, 0x02, 0x03], &options()).unwrap();
    let length = u16::from_le_bytes([bytes[2], bytes[3]]);
    assert_eq!(length & 0x8000, 0x8000);
    assert_eq!(length & 0x7FFF, 2);
    // Pad byte sits right before the packet checksum
    assert_eq!(bytes[bytes.len() - 3], 0x00);
    assert_eq!(decode(&bytes, &options()).unwrap().payload, vec![0x01, 0x02, 0x03]);
}

#[test]
fn test_checksums_verify_to_zero() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..100 {
        let len = rng.gen_range(0..200);
        let payload = random_payload(&mut rng, len);
        let bytes = encode(&payload, &options()).unwrap();
        assert_eq!(rfc1071(&bytes[..HEADER_LEN]), [0, 0]);
        assert_eq!(rfc1071(&bytes), [0, 0]);
    }
}

#[test]
fn test_single_byte_corruption_never_yields_wrong_payload() {
    let mut rng = StdRng::seed_from_u64(4);
    for _ in 0..200 {
        let len = rng.gen_range(0..80);
        // Keep the start byte out of the payload so no embedded header can appear
        let payload: Vec<u8> = (0..len)
            .map(|_| loop {
                let b: u8 = rng.gen();
                if b != 0xAA {
                    break b;
                }
            })
            .collect();
        let bytes = encode(&payload, &options()).unwrap();

        for index in 0..bytes.len() {
            let mut corrupted = bytes.clone();
            corrupted[index] ^= rng.gen_range(1..=255u8);
            match decode(&corrupted, &options()) {
                Ok(frame) => panic!(
                    "corruption at {} decoded to {:02x?} (original {:02x?})",
                    index, frame.payload, payload
                ),
                Err(_) => {}
            }
        }
    }
}

#[test]
fn test_truncated_stream_is_bad_data() {
    let payload = vec![0x42; 40];
    let bytes = encode(&payload, &options()).unwrap();
    for cut in HEADER_LEN..bytes.len() {
        assert!(
            matches!(
                decode(&bytes[..cut], &options()),
                Err(ProtocolError::BadData { .. })
            ),
            "cut at {}",
            cut
        );
    }
}

#[test]
fn test_declared_length_beyond_stream() {
    // A valid header announcing 100 words with only 4 bytes behind it
    let header = Header {
        start: 0xAA,
        address: 0x00,
        length: LengthField { words: 100, padded: false },
    };
    let mut bytes = header.to_bytes().to_vec();
    bytes.extend_from_slice(&[1, 2, 3, 4]);
    assert!(matches!(
        decode(&bytes, &options()),
        Err(ProtocolError::BadData { context: "packet", .. })
    ));
}
