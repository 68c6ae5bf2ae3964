use serde_json::json;

use crate::DecodeError;
use crate::Payload;

#[test]
fn decodes_features_and_keeps_exact_text() {
    let text = r#"{"features":{"flag1":{"defaultValue":true,"someFutureField":[1,2]}},"dateUpdated":"2024-01-01"}"#;
    let payload = Payload::from_json(text).unwrap();

    assert_eq!(payload.as_json(), text);
    let flag = payload.feature("flag1").unwrap();
    assert_eq!(flag.default_value, Some(json!(true)));
    assert_eq!(flag.extra.get("someFutureField"), Some(&json!([1, 2])));
    assert!(payload.encrypted_features().is_none());
}

#[test]
fn accepts_encrypted_only_documents() {
    let payload = Payload::from_json(r#"{"encryptedFeatures":"m5ylFM6ndyOJA2OPadubkw=="}"#).unwrap();

    assert!(payload.features().is_empty());
    assert_eq!(payload.encrypted_features(), Some("m5ylFM6ndyOJA2OPadubkw=="));
}

#[test]
fn rejects_documents_of_the_wrong_shape() {
    assert!(matches!(Payload::from_json("[1,2,3]"), Err(DecodeError::Json(_))));
    assert!(matches!(Payload::from_json(r#"{"features":"nope"}"#), Err(DecodeError::Json(_))));
    assert!(matches!(Payload::from_json("{not json"), Err(DecodeError::Json(_))));
}

#[test]
fn rejects_non_utf8_bodies() {
    assert!(matches!(Payload::from_slice(&[0xff, 0xfe]), Err(DecodeError::InvalidUtf8)));
}

#[test]
fn serializes_as_the_original_text() {
    let text = r#"{"features":{"b":{"defaultValue":1},"a":{"defaultValue":null}}}"#;
    let payload = Payload::from_json(text).unwrap();

    #[derive(serde::Serialize)]
    struct Entry<'a> {
        data: &'a Payload,
    }
    let nested = serde_json::to_string(&Entry { data: &payload }).unwrap();
    assert_eq!(nested, format!("{{\"data\":{text}}}"));

    let back: Payload = serde_json::from_str(&serde_json::to_string(&payload).unwrap()).unwrap();
    assert_eq!(back, payload);
    assert_eq!(back.as_json(), text);
}
