use crate::codec::{parse_hex, pow10, CodecError, TypeTag, Value};

/// Encode a value into the tag's attribute bytes. Inverse of `decode_value`.
///
/// Integer tags accept integers, integral floats and numeric text. Fixed-point
/// tags accept decimal text with at most `decimals` fractional digits,
/// integers (whole units) and floats (rounded to the tag's resolution).
pub fn encode_value(tag: TypeTag, value: &Value) -> Result<Vec<u8>, CodecError> {
    let out = match tag {
        TypeTag::Bool1 => vec![u8::from(to_bool(tag, value)?)],
        TypeTag::UInt1 => {
            let v: u8 = narrow(tag, to_integer(tag, value)?)?;
            vec![v]
        }
        TypeTag::SInt1 => {
            let v: i8 = narrow(tag, to_integer(tag, value)?)?;
            v.to_le_bytes().to_vec()
        }
        TypeTag::UInt2 => {
            let v: u16 = narrow(tag, to_integer(tag, value)?)?;
            v.to_le_bytes().to_vec()
        }
        TypeTag::SInt2 => {
            let v: i16 = narrow(tag, to_integer(tag, value)?)?;
            v.to_le_bytes().to_vec()
        }
        TypeTag::UInt4 => {
            let v: u32 = narrow(tag, to_integer(tag, value)?)?;
            v.to_le_bytes().to_vec()
        }
        TypeTag::SInt4 => {
            let v: i32 = narrow(tag, to_integer(tag, value)?)?;
            v.to_le_bytes().to_vec()
        }
        TypeTag::Float4 => to_f32(tag, value)?.to_le_bytes().to_vec(),
        TypeTag::FixedPoint2 { decimals } => {
            let v: i16 = narrow(tag, to_scaled(tag, value, decimals)?)?;
            v.to_le_bytes().to_vec()
        }
        TypeTag::FixedPoint4 { decimals } => {
            let v: i32 = narrow(tag, to_scaled(tag, value, decimals)?)?;
            v.to_le_bytes().to_vec()
        }
        TypeTag::OpaqueBlob(n) => {
            let bytes = match value {
                Value::Text(s) => parse_hex(s).ok_or_else(|| mismatch(tag, value))?,
                _ => return Err(mismatch(tag, value)),
            };
            if bytes.len() != n {
                return Err(mismatch(tag, value));
            }
            bytes
        }
    };
    Ok(out)
}

fn mismatch(tag: TypeTag, value: &Value) -> CodecError {
    CodecError::FormatMismatch {
        tag,
        value: value.to_string(),
    }
}

fn out_of_range(tag: TypeTag, value: impl ToString) -> CodecError {
    CodecError::ValueOutOfRange {
        tag,
        value: value.to_string(),
    }
}

fn narrow<T: TryFrom<i64>>(tag: TypeTag, v: i64) -> Result<T, CodecError> {
    T::try_from(v).map_err(|_| out_of_range(tag, v))
}

fn to_bool(tag: TypeTag, value: &Value) -> Result<bool, CodecError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Int(0) => Ok(false),
        Value::Int(1) => Ok(true),
        Value::Int(i) => Err(out_of_range(tag, i)),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => Ok(true),
            "false" | "0" | "off" => Ok(false),
            _ => Err(mismatch(tag, value)),
        },
        Value::Float(_) => Err(mismatch(tag, value)),
    }
}

fn to_integer(tag: TypeTag, value: &Value) -> Result<i64, CodecError> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Float(x) => {
            if !x.is_finite() || x.fract() != 0.0 {
                return Err(mismatch(tag, value));
            }
            if *x < i64::MIN as f64 || *x > i64::MAX as f64 {
                return Err(out_of_range(tag, x));
            }
            Ok(*x as i64)
        }
        Value::Text(s) => {
            let t = s.trim();
            match t.parse::<i64>() {
                Ok(i) => Ok(i),
                // digits that merely overflow i64 are a range problem, not a format one
                Err(_) if is_integer_text(t) => Err(out_of_range(tag, t)),
                Err(_) => Err(mismatch(tag, value)),
            }
        }
    }
}

fn is_integer_text(t: &str) -> bool {
    let digits = t.strip_prefix('-').or_else(|| t.strip_prefix('+')).unwrap_or(t);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn to_f32(tag: TypeTag, value: &Value) -> Result<f32, CodecError> {
    let x = match value {
        Value::Float(x) => *x,
        Value::Int(i) => *i as f64,
        Value::Text(s) => s.trim().parse::<f64>().map_err(|_| mismatch(tag, value))?,
        Value::Bool(_) => return Err(mismatch(tag, value)),
    };
    if x.is_finite() && x.abs() > f64::from(f32::MAX) {
        return Err(out_of_range(tag, x));
    }
    Ok(x as f32)
}

fn to_scaled(tag: TypeTag, value: &Value, decimals: u8) -> Result<i64, CodecError> {
    let scale = pow10(decimals);
    match value {
        Value::Int(i) => i.checked_mul(scale).ok_or_else(|| out_of_range(tag, i)),
        Value::Float(x) => {
            if !x.is_finite() {
                return Err(mismatch(tag, value));
            }
            let scaled = (x * scale as f64).round();
            if scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
                return Err(out_of_range(tag, x));
            }
            Ok(scaled as i64)
        }
        Value::Text(s) => parse_decimal(tag, s, decimals),
        Value::Bool(_) => Err(mismatch(tag, value)),
    }
}

/// Exact decimal text to a scaled integer, e.g. "12.3" at 2 decimals -> 1230.
fn parse_decimal(tag: TypeTag, text: &str, decimals: u8) -> Result<i64, CodecError> {
    let bad = || CodecError::FormatMismatch {
        tag,
        value: text.to_string(),
    };
    let t = text.trim();
    let (negative, body) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(bad());
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(bad());
    }
    if frac_part.len() > usize::from(decimals) {
        return Err(bad());
    }

    let range = || out_of_range(tag, t);
    let mut scaled: i64 = 0;
    for b in int_part.bytes().chain(frac_part.bytes()) {
        scaled = scaled
            .checked_mul(10)
            .and_then(|v| v.checked_add(i64::from(b - b'0')))
            .ok_or_else(range)?;
    }
    let pad = u32::from(decimals) - frac_part.len() as u32;
    scaled = scaled
        .checked_mul(10_i64.pow(pad))
        .ok_or_else(range)?;
    Ok(if negative { -scaled } else { scaled })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_value;

    #[test]
    fn test_roundtrip_law() {
        let cases: &[(TypeTag, &[u8])] = &[
            (TypeTag::Bool1, &[0x00]),
            (TypeTag::Bool1, &[0x01]),
            (TypeTag::UInt1, &[0xC8]),
            (TypeTag::UInt2, &[0xCC, 0x01]),
            (TypeTag::UInt2, &[0xFF, 0xFF]),
            (TypeTag::UInt4, &[0x78, 0x56, 0x34, 0x12]),
            (TypeTag::SInt1, &[0x80]),
            (TypeTag::SInt2, &[0x00, 0x80]),
            (TypeTag::SInt4, &[0xFF, 0xFF, 0xFF, 0x7F]),
            (TypeTag::Float4, &[0x00, 0x00, 0xC0, 0x3F]),
            (TypeTag::Float4, &[0xDB, 0x0F, 0x49, 0x40]),
            (TypeTag::FixedPoint2 { decimals: 2 }, &[0x70, 0x17]),
            (TypeTag::FixedPoint2 { decimals: 1 }, &[0x00, 0x80]),
            (TypeTag::FixedPoint2 { decimals: 0 }, &[0x2A, 0x00]),
            (TypeTag::FixedPoint4 { decimals: 3 }, &[0x39, 0x30, 0x00, 0x00]),
            (TypeTag::FixedPoint4 { decimals: 2 }, &[0x9C, 0xFF, 0xFF, 0xFF]),
        ];
        for (tag, raw) in cases {
            let v = decode_value(*tag, raw).unwrap();
            assert_eq!(encode_value(*tag, &v).unwrap(), raw.to_vec(), "{tag} {v:?}");
        }
    }

    #[test]
    fn test_integer_ranges() {
        assert_eq!(
            encode_value(TypeTag::SInt1, &Value::Int(128)),
            Err(CodecError::ValueOutOfRange {
                tag: TypeTag::SInt1,
                value: "128".into()
            })
        );
        assert!(matches!(
            encode_value(TypeTag::UInt2, &Value::Int(-1)),
            Err(CodecError::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            encode_value(TypeTag::UInt1, &Value::Text("99999999999999999999".into())),
            Err(CodecError::ValueOutOfRange { .. })
        ));
        assert_eq!(
            encode_value(TypeTag::UInt2, &Value::Text(" 460 ".into())).unwrap(),
            vec![0xCC, 0x01]
        );
        assert_eq!(
            encode_value(TypeTag::SInt2, &Value::Float(-3.0)).unwrap(),
            (-3i16).to_le_bytes().to_vec()
        );
    }

    #[test]
    fn test_format_mismatch() {
        assert!(matches!(
            encode_value(TypeTag::UInt2, &Value::Text("abc".into())),
            Err(CodecError::FormatMismatch { .. })
        ));
        assert!(matches!(
            encode_value(TypeTag::UInt2, &Value::Float(1.5)),
            Err(CodecError::FormatMismatch { .. })
        ));
        assert!(matches!(
            encode_value(TypeTag::Bool1, &Value::Text("maybe".into())),
            Err(CodecError::FormatMismatch { .. })
        ));
        assert!(matches!(
            encode_value(TypeTag::OpaqueBlob(2), &Value::Text("0102FF".into())),
            Err(CodecError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn test_fixed_point_inputs() {
        let tag = TypeTag::FixedPoint2 { decimals: 2 };
        assert_eq!(
            encode_value(tag, &Value::Text("12.3".into())).unwrap(),
            1230i16.to_le_bytes().to_vec()
        );
        assert_eq!(
            encode_value(tag, &Value::Text("-.5".into())).unwrap(),
            (-50i16).to_le_bytes().to_vec()
        );
        assert_eq!(
            encode_value(tag, &Value::Int(60)).unwrap(),
            6000i16.to_le_bytes().to_vec()
        );
        assert_eq!(
            encode_value(tag, &Value::Float(0.125)).unwrap(),
            13i16.to_le_bytes().to_vec()
        );
        assert!(matches!(
            encode_value(tag, &Value::Text("1.234".into())),
            Err(CodecError::FormatMismatch { .. })
        ));
        assert!(matches!(
            encode_value(tag, &Value::Text("400.00".into())),
            Err(CodecError::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            encode_value(tag, &Value::Text(".".into())),
            Err(CodecError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn test_bool_inputs() {
        assert_eq!(encode_value(TypeTag::Bool1, &Value::Bool(true)).unwrap(), vec![1]);
        assert_eq!(
            encode_value(TypeTag::Bool1, &Value::Text("OFF".into())).unwrap(),
            vec![0]
        );
        assert!(matches!(
            encode_value(TypeTag::Bool1, &Value::Int(2)),
            Err(CodecError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_float_range() {
        assert!(matches!(
            encode_value(TypeTag::Float4, &Value::Float(1e300)),
            Err(CodecError::ValueOutOfRange { .. })
        ));
        assert_eq!(
            encode_value(TypeTag::Float4, &Value::Text("1.5".into())).unwrap(),
            1.5f32.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn test_opaque_blob() {
        assert_eq!(
            encode_value(TypeTag::OpaqueBlob(3), &Value::Text("0a0b0c".into())).unwrap(),
            vec![0x0A, 0x0B, 0x0C]
        );
        assert!(matches!(
            encode_value(TypeTag::OpaqueBlob(1), &Value::Int(1)),
            Err(CodecError::FormatMismatch { .. })
        ));
    }
}
