use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-parameter codec failure. Never fatal for the device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unknown type tag: {0:?}")]
    UnknownTypeTag(String),
    #[error("short buffer: {tag} needs {needed} bytes, got {got}")]
    ShortBuffer {
        tag: TypeTag,
        needed: usize,
        got: usize,
    },
    #[error("value {value} out of range for {tag}")]
    ValueOutOfRange { tag: TypeTag, value: String },
    #[error("cannot read {value:?} as {tag}")]
    FormatMismatch { tag: TypeTag, value: String },
}

/// Compact type descriptor selecting how attribute bytes are interpreted.
///
/// Literal grammar (case-insensitive): `B1`, `U1`, `U2`, `U4`, `S1`, `S2`,
/// `S4`, `F4`, `X2.d`, `X4.d` (fixed point with `d` decimals), `O<n>`
/// (opaque blob of `n` bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Bool1,
    UInt1,
    UInt2,
    UInt4,
    SInt1,
    SInt2,
    SInt4,
    Float4,
    /// Signed 16-bit, scaled by 10^-decimals.
    FixedPoint2 { decimals: u8 },
    /// Signed 32-bit, scaled by 10^-decimals.
    FixedPoint4 { decimals: u8 },
    OpaqueBlob(usize),
}

const MAX_DECIMALS_2: u8 = 4;
const MAX_DECIMALS_4: u8 = 9;
const MAX_BLOB: usize = 255;

impl TypeTag {
    /// Number of attribute bytes the tag consumes.
    pub fn width(&self) -> usize {
        match self {
            TypeTag::Bool1 | TypeTag::UInt1 | TypeTag::SInt1 => 1,
            TypeTag::UInt2 | TypeTag::SInt2 | TypeTag::FixedPoint2 { .. } => 2,
            TypeTag::UInt4 | TypeTag::SInt4 | TypeTag::Float4 | TypeTag::FixedPoint4 { .. } => 4,
            TypeTag::OpaqueBlob(n) => *n,
        }
    }

    /// Decode a catalog literal.
    pub fn parse(literal: &str) -> Result<Self, CodecError> {
        let unknown = || CodecError::UnknownTypeTag(literal.to_string());
        let t = literal.trim().to_ascii_uppercase();
        let tag = match t.as_str() {
            "B1" => TypeTag::Bool1,
            "U1" => TypeTag::UInt1,
            "U2" => TypeTag::UInt2,
            "U4" => TypeTag::UInt4,
            "S1" => TypeTag::SInt1,
            "S2" => TypeTag::SInt2,
            "S4" => TypeTag::SInt4,
            "F4" => TypeTag::Float4,
            _ => {
                if let Some(rest) = t.strip_prefix("X2.") {
                    let decimals = parse_small(rest).ok_or_else(unknown)?;
                    if decimals > MAX_DECIMALS_2 {
                        return Err(unknown());
                    }
                    TypeTag::FixedPoint2 { decimals }
                } else if let Some(rest) = t.strip_prefix("X4.") {
                    let decimals = parse_small(rest).ok_or_else(unknown)?;
                    if decimals > MAX_DECIMALS_4 {
                        return Err(unknown());
                    }
                    TypeTag::FixedPoint4 { decimals }
                } else if let Some(rest) = t.strip_prefix('O') {
                    let n = parse_small(rest).map(usize::from).ok_or_else(unknown)?;
                    if n == 0 || n > MAX_BLOB {
                        return Err(unknown());
                    }
                    TypeTag::OpaqueBlob(n)
                } else {
                    return Err(unknown());
                }
            }
        };
        Ok(tag)
    }
}

fn parse_small(digits: &str) -> Option<u8> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u8>().ok()
}

impl FromStr for TypeTag {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Bool1 => f.write_str("B1"),
            TypeTag::UInt1 => f.write_str("U1"),
            TypeTag::UInt2 => f.write_str("U2"),
            TypeTag::UInt4 => f.write_str("U4"),
            TypeTag::SInt1 => f.write_str("S1"),
            TypeTag::SInt2 => f.write_str("S2"),
            TypeTag::SInt4 => f.write_str("S4"),
            TypeTag::Float4 => f.write_str("F4"),
            TypeTag::FixedPoint2 { decimals } => write!(f, "X2.{decimals}"),
            TypeTag::FixedPoint4 { decimals } => write!(f, "X4.{decimals}"),
            TypeTag::OpaqueBlob(n) => write!(f, "O{n}"),
        }
    }
}

/// A decoded parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Uppercase hex without separators.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = core::fmt::Write::write_fmt(&mut out, format_args!("{b:02X}"));
    }
    out
}

/// Parse hex text such as `"E803"`, `"0xE803"` or `"E8 03"`.
pub fn parse_hex(s: &str) -> Option<Vec<u8>> {
    let t = s.trim();
    let t = t
        .strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .unwrap_or(t);
    let digits: Vec<u8> = t.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        out.push((hi * 16 + lo) as u8);
    }
    Some(out)
}

pub(crate) fn pow10(decimals: u8) -> i64 {
    10_i64.pow(u32::from(decimals))
}

/// Render a scaled integer as a decimal string with exactly `decimals` digits.
pub(crate) fn format_fixed(scaled: i64, decimals: u8) -> String {
    if decimals == 0 {
        return scaled.to_string();
    }
    let scale = pow10(decimals).unsigned_abs();
    let abs = scaled.unsigned_abs();
    let sign = if scaled < 0 { "-" } else { "" };
    format!(
        "{sign}{int}.{frac:0width$}",
        int = abs / scale,
        frac = abs % scale,
        width = usize::from(decimals)
    )
}
