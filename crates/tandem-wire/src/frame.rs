//! Envelope ⇄ text frame.

use tandem_core::constants::{
    DISPATCH_MARKER, ENVELOPE_TYPE, INTERFACE_MARKER, PARAMETER_COUNT, SENTINEL,
};
use tandem_core::{Envelope, SerializationError};
use tracing::trace;

use crate::serializer::Serializer;
use crate::stream::{StreamReader, StreamWriter};

/// Encode one envelope as a `//OK`-prefixed text frame.
///
/// Rejects argument graphs carrying unregistered object types before any
/// text is produced.
pub fn encode_frame(
    serializer: &dyn Serializer,
    envelope: &Envelope,
) -> Result<String, SerializationError> {
    envelope.validate()?;
    serializer.types().check_values(envelope.values())?;

    let mut writer = StreamWriter::new();
    writer.write_string(INTERFACE_MARKER);
    writer.write_string(DISPATCH_MARKER);
    writer.write_int(PARAMETER_COUNT);
    writer.write_string(ENVELOPE_TYPE);
    writer.write_object(envelope)?;

    let body = serializer.write_stream(writer.tokens())?;
    trace!(method = envelope.method(), bytes = body.len(), "encoded frame");
    Ok(format!("{SENTINEL}{body}"))
}

/// Decode a text frame into its envelope.
///
/// Checks, in order: sentinel, stream header, envelope shape, registered
/// object types.
pub fn decode_frame(
    serializer: &dyn Serializer,
    frame: &str,
) -> Result<Envelope, SerializationError> {
    let body = frame
        .strip_prefix(SENTINEL)
        .ok_or(SerializationError::MissingSentinel)?;

    let mut reader = StreamReader::new(serializer.read_stream(body)?);

    let interface = reader.read_string()?;
    if interface != INTERFACE_MARKER {
        return Err(SerializationError::HeaderMismatch(format!(
            "interface '{interface}'"
        )));
    }
    let dispatch = reader.read_string()?;
    if dispatch != DISPATCH_MARKER {
        return Err(SerializationError::HeaderMismatch(format!(
            "dispatch marker '{dispatch}'"
        )));
    }
    let count = reader.read_int()?;
    if count != PARAMETER_COUNT {
        return Err(SerializationError::HeaderMismatch(format!(
            "parameter count {count}"
        )));
    }
    let type_name = reader.read_string()?;
    if type_name != ENVELOPE_TYPE || !serializer.types().contains(&type_name) {
        return Err(SerializationError::HeaderMismatch(format!(
            "envelope type '{type_name}'"
        )));
    }

    let envelope: Envelope = reader.read_object()?;
    reader.finish()?;
    envelope.validate()?;
    serializer.types().check_values(envelope.values())?;
    trace!(method = envelope.method(), bytes = body.len(), "decoded frame");
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use crate::serializer::JsonSerializer;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn ser() -> JsonSerializer {
        JsonSerializer::new()
    }

    #[test]
    fn encoded_frame_layout() {
        let env = Envelope::new("ping", vec![json!(3)]).unwrap();
        let frame = encode_frame(&ser(), &env).unwrap();
        let body = frame.strip_prefix("//OK").unwrap();
        let tokens: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(
            tokens,
            json!([
                "tandem.Endpoint",
                "dummy",
                1,
                "tandem.Invocation",
                {"method": "ping", "arguments": [3]}
            ])
        );
    }

    #[test]
    fn round_trip_preserves_envelope() {
        let env = Envelope::new("echo", vec![json!("hi"), json!([1, 2]), json!(null)]).unwrap();
        let frame = encode_frame(&ser(), &env).unwrap();
        assert_eq!(decode_frame(&ser(), &frame).unwrap(), env);
    }

    #[test]
    fn missing_sentinel() {
        let frame = r#"["tandem.Endpoint","dummy",1,"tandem.Invocation",{"method":"a"}]"#;
        assert_matches!(
            decode_frame(&ser(), frame),
            Err(SerializationError::MissingSentinel)
        );
    }

    #[test]
    fn sentinel_is_case_sensitive() {
        assert_matches!(
            decode_frame(&ser(), "//ok[]"),
            Err(SerializationError::MissingSentinel)
        );
    }

    #[test]
    fn empty_frame() {
        assert_matches!(decode_frame(&ser(), ""), Err(SerializationError::MissingSentinel));
    }

    #[test]
    fn sentinel_only() {
        assert_matches!(decode_frame(&ser(), "//OK"), Err(SerializationError::Json(_)));
    }

    #[test]
    fn wrong_interface_marker() {
        let frame = r#"//OK["other.Service","dummy",1,"tandem.Invocation",{"method":"a"}]"#;
        assert_matches!(
            decode_frame(&ser(), frame),
            Err(SerializationError::HeaderMismatch(_))
        );
    }

    #[test]
    fn wrong_parameter_count() {
        let frame = r#"//OK["tandem.Endpoint","dummy",2,"tandem.Invocation",{"method":"a"}]"#;
        assert_matches!(
            decode_frame(&ser(), frame),
            Err(SerializationError::HeaderMismatch(msg)) if msg.contains('2')
        );
    }

    #[test]
    fn truncated_stream() {
        let frame = r#"//OK["tandem.Endpoint","dummy",1,"tandem.Invocation"]"#;
        assert_matches!(
            decode_frame(&ser(), frame),
            Err(SerializationError::EndOfStream { expected: "object" })
        );
    }

    #[test]
    fn trailing_tokens() {
        let frame =
            r#"//OK["tandem.Endpoint","dummy",1,"tandem.Invocation",{"method":"a"},"extra"]"#;
        assert_matches!(
            decode_frame(&ser(), frame),
            Err(SerializationError::TrailingTokens { count: 1 })
        );
    }

    #[test]
    fn empty_method_rejected_on_decode() {
        let frame = r#"//OK["tandem.Endpoint","dummy",1,"tandem.Invocation",{"method":""}]"#;
        assert_matches!(
            decode_frame(&ser(), frame),
            Err(SerializationError::EmptyMethodName)
        );
    }

    #[test]
    fn unregistered_type_rejected_both_ways() {
        let env = Envelope::new("draw", vec![json!({"$type": "demo.Point", "x": 1})]).unwrap();
        assert_matches!(
            encode_frame(&ser(), &env),
            Err(SerializationError::UnregisteredType { .. })
        );

        let permissive = JsonSerializer::new()
            .with_types(TypeRegistry::new().with_type("demo.Point"));
        let frame = encode_frame(&permissive, &env).unwrap();
        assert_matches!(
            decode_frame(&ser(), &frame),
            Err(SerializationError::UnregisteredType { .. })
        );
        assert_eq!(decode_frame(&permissive, &frame).unwrap(), env);
    }

    #[test]
    fn oversize_frame_rejected() {
        let small = JsonSerializer::new().with_max_frame_bytes(64);
        let env = Envelope::new("blob", vec![json!("x".repeat(128))]).unwrap();
        assert_matches!(
            encode_frame(&small, &env),
            Err(SerializationError::FrameTooLarge { .. })
        );
        let frame = encode_frame(&ser(), &env).unwrap();
        assert_matches!(
            decode_frame(&small, &frame),
            Err(SerializationError::FrameTooLarge { .. })
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_value() -> impl Strategy<Value = serde_json::Value> {
            let leaf = prop_oneof![
                Just(serde_json::Value::Null),
                any::<bool>().prop_map(serde_json::Value::from),
                any::<i64>().prop_map(serde_json::Value::from),
                "[a-zA-Z0-9 _]{0,16}".prop_map(serde_json::Value::from),
            ];
            leaf.prop_recursive(3, 24, 4, |inner| {
                prop_oneof![
                    proptest::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::from),
                    proptest::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(|m| {
                        serde_json::Value::Object(m.into_iter().collect())
                    }),
                ]
            })
        }

        proptest! {
            #[test]
            fn decode_inverts_encode(
                method in "[a-zA-Z][a-zA-Z0-9_]{0,24}",
                args in proptest::collection::vec(arb_value(), 0..6),
            ) {
                let env = Envelope::new(method, args).unwrap();
                let frame = encode_frame(&ser(), &env).unwrap();
                prop_assert!(frame.starts_with(SENTINEL));
                prop_assert_eq!(decode_frame(&ser(), &frame).unwrap(), env);
            }
        }
    }
}
