use crate::codec::{format_fixed, parse_hex, to_hex, CodecError, TypeTag, Value};

/// Decode raw attribute bytes (little-endian, CIP elementary layout).
///
/// Bytes past the tag's width are ignored.
pub fn decode_value(tag: TypeTag, raw: &[u8]) -> Result<Value, CodecError> {
    let needed = tag.width();
    if raw.len() < needed {
        return Err(CodecError::ShortBuffer {
            tag,
            needed,
            got: raw.len(),
        });
    }
    let v = match tag {
        TypeTag::Bool1 => Value::Bool(raw[0] != 0),
        TypeTag::UInt1 => Value::Int(i64::from(raw[0])),
        TypeTag::SInt1 => Value::Int(i64::from(raw[0] as i8)),
        TypeTag::UInt2 => Value::Int(i64::from(u16::from_le_bytes(le2(raw)))),
        TypeTag::SInt2 => Value::Int(i64::from(i16::from_le_bytes(le2(raw)))),
        TypeTag::UInt4 => Value::Int(i64::from(u32::from_le_bytes(le4(raw)))),
        TypeTag::SInt4 => Value::Int(i64::from(i32::from_le_bytes(le4(raw)))),
        TypeTag::Float4 => {
            let x = f32::from_le_bytes(le4(raw));
            // JSON has no NaN or infinity; carry those as text the encoder parses back
            if x.is_finite() {
                Value::Float(f64::from(x))
            } else {
                Value::Text(x.to_string())
            }
        }
        TypeTag::FixedPoint2 { decimals } => {
            let scaled = i64::from(i16::from_le_bytes(le2(raw)));
            Value::Text(format_fixed(scaled, decimals))
        }
        TypeTag::FixedPoint4 { decimals } => {
            let scaled = i64::from(i32::from_le_bytes(le4(raw)));
            Value::Text(format_fixed(scaled, decimals))
        }
        TypeTag::OpaqueBlob(n) => Value::Text(to_hex(&raw[..n])),
    };
    Ok(v)
}

/// Decode a catalog default literal: hex of the raw attribute bytes, read
/// through the same rules as a live value.
pub fn decode_default(tag: TypeTag, literal: &str) -> Result<Value, CodecError> {
    let raw = parse_hex(literal).ok_or_else(|| CodecError::FormatMismatch {
        tag,
        value: literal.to_string(),
    })?;
    decode_value(tag, &raw)
}

/// Best-effort decode when no tag is known: the whole reply as opaque hex.
pub fn decode_untyped(raw: &[u8]) -> Value {
    Value::Text(to_hex(raw))
}

fn le2(raw: &[u8]) -> [u8; 2] {
    [raw[0], raw[1]]
}

fn le4(raw: &[u8]) -> [u8; 4] {
    [raw[0], raw[1], raw[2], raw[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers() {
        assert_eq!(decode_value(TypeTag::UInt1, &[0xFF]).unwrap(), Value::Int(255));
        assert_eq!(decode_value(TypeTag::SInt1, &[0xFF]).unwrap(), Value::Int(-1));
        assert_eq!(
            decode_value(TypeTag::UInt2, &[0xE8, 0x03]).unwrap(),
            Value::Int(1000)
        );
        assert_eq!(
            decode_value(TypeTag::SInt2, &[0x18, 0xFC]).unwrap(),
            Value::Int(-1000)
        );
        assert_eq!(
            decode_value(TypeTag::UInt4, &[0xFF, 0xFF, 0xFF, 0xFF]).unwrap(),
            Value::Int(4_294_967_295)
        );
        assert_eq!(
            decode_value(TypeTag::SInt4, &[0xFE, 0xFF, 0xFF, 0xFF]).unwrap(),
            Value::Int(-2)
        );
    }

    #[test]
    fn test_bool_and_float() {
        assert_eq!(decode_value(TypeTag::Bool1, &[0]).unwrap(), Value::Bool(false));
        assert_eq!(decode_value(TypeTag::Bool1, &[7]).unwrap(), Value::Bool(true));
        let raw = 1.5f32.to_le_bytes();
        assert_eq!(decode_value(TypeTag::Float4, &raw).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_non_finite_float_is_text() {
        let nan = decode_value(TypeTag::Float4, &f32::NAN.to_le_bytes()).unwrap();
        assert_eq!(nan, Value::Text("NaN".into()));
        let inf = decode_value(TypeTag::Float4, &f32::INFINITY.to_le_bytes()).unwrap();
        assert_eq!(inf, Value::Text("inf".into()));
        let neg = decode_value(TypeTag::Float4, &f32::NEG_INFINITY.to_le_bytes()).unwrap();
        assert_eq!(neg, Value::Text("-inf".into()));
        let back = crate::encode::encode_value(TypeTag::Float4, &neg).unwrap();
        assert_eq!(back, f32::NEG_INFINITY.to_le_bytes().to_vec());
    }

    #[test]
    fn test_fixed_point_scaling() {
        let tag = TypeTag::FixedPoint2 { decimals: 2 };
        // 6000 -> 60.00 Hz
        assert_eq!(
            decode_value(tag, &[0x70, 0x17]).unwrap(),
            Value::Text("60.00".into())
        );
        let tag = TypeTag::FixedPoint2 { decimals: 1 };
        assert_eq!(
            decode_value(tag, &[0xFB, 0xFF]).unwrap(),
            Value::Text("-0.5".into())
        );
        let tag = TypeTag::FixedPoint4 { decimals: 3 };
        assert_eq!(
            decode_value(tag, &12_345i32.to_le_bytes()).unwrap(),
            Value::Text("12.345".into())
        );
    }

    #[test]
    fn test_opaque_and_extra_bytes() {
        assert_eq!(
            decode_value(TypeTag::OpaqueBlob(3), &[1, 2, 3, 4]).unwrap(),
            Value::Text("010203".into())
        );
        assert_eq!(
            decode_value(TypeTag::UInt1, &[5, 9, 9]).unwrap(),
            Value::Int(5)
        );
        assert_eq!(decode_untyped(&[0xAB, 0x01]), Value::Text("AB01".into()));
    }

    #[test]
    fn test_short_buffer_for_all_tags() {
        let tags = [
            TypeTag::Bool1,
            TypeTag::UInt1,
            TypeTag::UInt2,
            TypeTag::UInt4,
            TypeTag::SInt1,
            TypeTag::SInt2,
            TypeTag::SInt4,
            TypeTag::Float4,
            TypeTag::FixedPoint2 { decimals: 1 },
            TypeTag::FixedPoint4 { decimals: 2 },
            TypeTag::OpaqueBlob(6),
        ];
        let buf = [0u8; 8];
        for tag in tags {
            for len in 0..tag.width() {
                let err = decode_value(tag, &buf[..len]).unwrap_err();
                assert_eq!(
                    err,
                    CodecError::ShortBuffer {
                        tag,
                        needed: tag.width(),
                        got: len
                    }
                );
            }
        }
    }

    #[test]
    fn test_default_literals() {
        assert_eq!(
            decode_default(TypeTag::UInt2, "CC01").unwrap(),
            Value::Int(460)
        );
        assert_eq!(
            decode_default(TypeTag::FixedPoint2 { decimals: 2 }, "0xE803").unwrap(),
            Value::Text("10.00".into())
        );
        assert!(matches!(
            decode_default(TypeTag::UInt2, "zz"),
            Err(CodecError::FormatMismatch { .. })
        ));
        assert!(matches!(
            decode_default(TypeTag::UInt2, "01"),
            Err(CodecError::ShortBuffer { .. })
        ));
    }
}
