// tests/property/framing_test.rs

//! Property-based tests for framing
//! Tests that frames survive arbitrary TCP segmentation and that no input panics the parser

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};
use tutorlink::core::protocol::{Inbound, MessageCodec};

/// Printable payloads without the delimiter, never blank.
fn frame_strategy() -> impl Strategy<Value = String> {
    "[ -~]{0,200}[!-~]"
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_frames_survive_arbitrary_segmentation(
        frames in prop::collection::vec(frame_strategy(), 1..=20),
        cuts in prop::collection::vec(1usize..64, 1..=50)
    ) {
        let mut codec = MessageCodec::default();
        let mut wire = BytesMut::new();
        for frame in &frames {
            codec.encode(Bytes::from(frame.clone()), &mut wire).unwrap();
        }
        let wire = wire.freeze();

        let mut decoder = MessageCodec::default();
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        let mut offset = 0;
        let mut cut = cuts.iter().cycle();
        while offset < wire.len() {
            let step = (*cut.next().unwrap()).min(wire.len() - offset);
            buf.extend_from_slice(&wire[offset..offset + step]);
            offset += step;
            while let Some(frame) = decoder.decode(&mut buf).unwrap() {
                decoded.push(String::from_utf8(frame.to_vec()).unwrap());
            }
        }

        // A trailing space before the newline is kept; only `\r` is stripped.
        prop_assert_eq!(decoded, frames);
        prop_assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_input_always_errors(
        max in 1usize..256,
        extra in 1usize..256
    ) {
        let mut codec = MessageCodec::new(max);
        let mut buf = BytesMut::from(vec![b'a'; max + extra].as_slice());
        prop_assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_parse_never_panics(input in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = Inbound::parse(Bytes::from(input));
    }

    #[test]
    fn test_relayed_payload_is_untouched(
        content in ".{0,200}",
        padding in "[ \t]{0,4}"
    ) {
        let raw = format!(
            "{{{padding}\"type\":{padding}\"chat\",\"content\":{}}}",
            serde_json::to_string(&content).unwrap()
        );
        match Inbound::parse(Bytes::from(raw.clone())).unwrap() {
            Inbound::Relay { payload, .. } => prop_assert_eq!(payload, Bytes::from(raw)),
            other => prop_assert!(false, "expected a relayed message, got {:?}", other),
        }
    }
}
