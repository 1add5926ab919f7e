//! # comprehensive codec tests
//!
//! why: verify entries survive the trip to bytes and back exactly
//! relations: tests netlog-core crate
//! what: round-trips, limit boundaries, status shapes, malformed payloads

use netlog_core::{
    deserialize, encode, serialize, CodecLimits, DecodeError, Headers, LogEntry, Outcome,
    RawCapture, Status,
};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn capture(outcome: Outcome) -> RawCapture {
    RawCapture {
        method: "GET".into(),
        url: "https://api.example.com/phone-numbers/validate".into(),
        request_headers: Headers::new(),
        request_body: None,
        outcome,
        started_at: UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789),
        duration: Duration::from_micros(4_250),
        process_tag: "4242-1700000000000".into(),
    }
}

fn roundtrip(entry: &LogEntry) -> LogEntry {
    deserialize(&serialize(entry).unwrap()).unwrap()
}

// =============================================================================
// SECTION 1: ROUND-TRIP TESTS
// =============================================================================

mod roundtrip {
    use super::*;

    #[test]
    fn success_entry_roundtrips() {
        let entry = encode(
            capture(Outcome::Response {
                code: 403,
                headers: [("Content-Type", "application/json")].into_iter().collect(),
                body: Some(br#"{"error":"invalid_format"}"#.to_vec().into()),
            }),
            &CodecLimits::default(),
        )
        .seal(1);

        assert_eq!(roundtrip(&entry), entry);
    }

    #[test]
    fn duplicate_header_names_survive() {
        let mut raw = capture(Outcome::Response {
            code: 200,
            headers: [("Set-Cookie", "a=1"), ("Set-Cookie", "b=2"), ("set-cookie", "c=3")]
                .into_iter()
                .collect(),
            body: None,
        });
        raw.request_headers = [("X-Trace", "1"), ("X-Trace", "2")].into_iter().collect();
        let entry = encode(raw, &CodecLimits::default()).seal(9);

        let back = roundtrip(&entry);
        assert_eq!(back, entry);
        let cookies: Vec<_> = back.response_headers.get_all("set-cookie").collect();
        assert_eq!(cookies, vec!["a=1", "b=2", "c=3"]);
    }

    #[test]
    fn body_exactly_at_cap_is_kept_whole() {
        let limits = CodecLimits { max_body_bytes: 16, ..CodecLimits::default() };
        let entry = encode(
            capture(Outcome::Response {
                code: 200,
                headers: Headers::new(),
                body: Some(vec![0xAB; 16].into()),
            }),
            &limits,
        )
        .seal(2);

        let back = roundtrip(&entry);
        let body = back.response_body.unwrap();
        assert_eq!(body.data.len(), 16);
        assert!(!body.is_truncated());
    }

    #[test]
    fn body_one_past_cap_carries_marker() {
        let limits = CodecLimits { max_body_bytes: 16, ..CodecLimits::default() };
        let entry = encode(
            capture(Outcome::Response {
                code: 200,
                headers: Headers::new(),
                body: Some(vec![0xAB; 17].into()),
            }),
            &limits,
        )
        .seal(3);

        let back = roundtrip(&entry);
        assert_eq!(back, entry);
        let body = back.response_body.unwrap();
        assert_eq!(body.data.len(), 16);
        assert_eq!(body.original_len, 17);
        assert!(body.is_truncated());
    }

    #[test]
    fn failure_and_cancelled_roundtrip() {
        for outcome in [
            Outcome::Failure { error: "connection lost".into() },
            Outcome::Cancelled,
        ] {
            let entry = encode(capture(outcome), &CodecLimits::default()).seal(4);
            assert_eq!(roundtrip(&entry), entry);
        }
    }

    #[test]
    fn binary_request_body_roundtrips() {
        let mut raw = capture(Outcome::Response {
            code: 201,
            headers: Headers::new(),
            body: Some(Vec::new().into()),
        });
        raw.request_body = Some((0..=255u8).collect::<Vec<u8>>().into());
        let entry = encode(raw, &CodecLimits::default()).seal(5);

        let back = roundtrip(&entry);
        assert_eq!(back.request_body.as_ref().unwrap().data.len(), 256);
        assert_eq!(back.response_body.as_ref().unwrap().data.len(), 0);
        assert_eq!(back, entry);
    }
}

// =============================================================================
// SECTION 2: ENCODING TESTS
// =============================================================================

mod encoding {
    use super::*;

    #[test]
    fn timing_comes_from_capture() {
        let entry = encode(capture(Outcome::Cancelled), &CodecLimits::default()).seal(1);
        assert_eq!(entry.duration, Duration::from_micros(4_250));
        assert!(entry.started_at < SystemTime::now());
        assert_eq!(entry.status, Status::Cancelled);
    }

    #[test]
    fn request_headers_are_capped_too() {
        let limits = CodecLimits { max_header_value_bytes: 4, ..CodecLimits::default() };
        let mut raw = capture(Outcome::Failure { error: "timeout".into() });
        raw.request_headers = [("Authorization", "Bearer abcdef")].into_iter().collect();

        let entry = encode(raw, &limits).seal(1);
        let value = entry.request_headers.get("authorization").unwrap();
        assert!(value.starts_with("Bear"));
        assert!(value.ends_with(netlog_core::TRUNCATION_MARKER));
    }

    #[test]
    fn draft_exposes_status_before_sealing() {
        let draft = encode(
            capture(Outcome::Failure { error: "dns".into() }),
            &CodecLimits::default(),
        );
        assert_eq!(draft.status(), &Status::Failure { error: "dns".into() });
        assert!(draft.url().ends_with("/validate"));
    }
}

// =============================================================================
// SECTION 3: MALFORMED PAYLOAD TESTS
// =============================================================================

mod malformed {
    use super::*;

    #[test]
    fn truncated_payload_fails_to_decode() {
        let entry = encode(capture(Outcome::Cancelled), &CodecLimits::default()).seal(1);
        let bytes = serialize(&entry).unwrap();
        let result = deserialize(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(DecodeError::Json(_))));
    }

    #[test]
    fn bad_base64_body_fails_to_decode() {
        let entry = encode(
            capture(Outcome::Response {
                code: 200,
                headers: Headers::new(),
                body: Some(b"ok".to_vec().into()),
            }),
            &CodecLimits::default(),
        )
        .seal(1);
        let mut value: serde_json::Value = serde_json::from_slice(&serialize(&entry).unwrap()).unwrap();
        value["response_body"]["data"] = serde_json::Value::String("***".into());

        let result = deserialize(&serde_json::to_vec(&value).unwrap());
        assert!(result.is_err());
    }
}
