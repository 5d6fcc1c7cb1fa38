use crate::error::MetadataError;
use alloy::primitives::{hex, Address, I256, U256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Solidity elementary types as they appear in the frontend bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SolType {
    Uint(u16),
    Int(u16),
    Address,
    Bool,
    FixedBytes(u8),
    Bytes,
    Str,
}

/// Coarse grouping used when matching a parameter against a constant pool.
/// Fixed and dynamic byte arrays share a family; signed and unsigned
/// integers do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Uint,
    Int,
    Address,
    Bool,
    Bytes,
    Str,
}

impl SolType {
    pub fn parse(raw: &str) -> Result<Self, MetadataError> {
        let raw = raw.trim();
        let unknown = || MetadataError::UnknownType(raw.to_string());
        match raw {
            "address" | "address payable" => return Ok(Self::Address),
            "bool" => return Ok(Self::Bool),
            "bytes" => return Ok(Self::Bytes),
            "string" => return Ok(Self::Str),
            "uint" => return Ok(Self::Uint(256)),
            "int" => return Ok(Self::Int(256)),
            _ => {}
        }
        if let Some(bits) = raw.strip_prefix("uint") {
            let bits: u16 = bits.parse().map_err(|_| unknown())?;
            if bits == 0 || bits > 256 || bits % 8 != 0 {
                return Err(unknown());
            }
            return Ok(Self::Uint(bits));
        }
        if let Some(bits) = raw.strip_prefix("int") {
            let bits: u16 = bits.parse().map_err(|_| unknown())?;
            if bits == 0 || bits > 256 || bits % 8 != 0 {
                return Err(unknown());
            }
            return Ok(Self::Int(bits));
        }
        if let Some(width) = raw.strip_prefix("bytes") {
            let width: u8 = width.parse().map_err(|_| unknown())?;
            if width == 0 || width > 32 {
                return Err(unknown());
            }
            return Ok(Self::FixedBytes(width));
        }
        Err(unknown())
    }

    pub fn canonical(&self) -> String {
        match self {
            Self::Uint(bits) => format!("uint{bits}"),
            Self::Int(bits) => format!("int{bits}"),
            Self::Address => "address".to_string(),
            Self::Bool => "bool".to_string(),
            Self::FixedBytes(width) => format!("bytes{width}"),
            Self::Bytes => "bytes".to_string(),
            Self::Str => "string".to_string(),
        }
    }

    pub fn family(&self) -> TypeFamily {
        match self {
            Self::Uint(_) => TypeFamily::Uint,
            Self::Int(_) => TypeFamily::Int,
            Self::Address => TypeFamily::Address,
            Self::Bool => TypeFamily::Bool,
            Self::FixedBytes(_) | Self::Bytes => TypeFamily::Bytes,
            Self::Str => TypeFamily::Str,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Uint(_) | Self::Int(_))
    }

    /// Whether `value` sits inside this type's representable range.
    /// Non-numeric types accept everything; the boundary filter only
    /// applies to N-bit integers.
    pub fn bounds_contain(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Uint(bits), Value::Uint(v)) => *v <= uint_max(*bits),
            (Self::Uint(bits), Value::Int(v)) => {
                !v.is_negative() && v.into_raw() <= uint_max(*bits)
            }
            (Self::Int(bits), Value::Int(v)) => {
                let (min, max) = int_bounds(*bits);
                *v >= min && *v <= max
            }
            (Self::Int(bits), Value::Uint(v)) => {
                let (_, max) = int_bounds(*bits);
                match I256::try_from(*v) {
                    Ok(signed) => signed <= max,
                    Err(_) => false,
                }
            }
            _ => true,
        }
    }

    /// Parse a textual value from the bundle against this declared type.
    pub fn parse_value(&self, raw: &str) -> Result<Value, MetadataError> {
        let raw = raw.trim();
        let bad = || MetadataError::BadValue {
            value: raw.to_string(),
            ty: self.canonical(),
        };
        match self {
            Self::Uint(_) => crate::utils::num::to_u256(raw).map(Value::Uint).ok_or_else(bad),
            Self::Int(_) => parse_i256(raw).map(Value::Int).ok_or_else(bad),
            Self::Address => Address::from_str(raw).map(Value::Address).map_err(|_| bad()),
            Self::Bool => match raw {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(bad()),
            },
            Self::FixedBytes(_) | Self::Bytes => {
                let stripped = raw.strip_prefix("0x").unwrap_or(raw);
                hex::decode(stripped).map(Value::Bytes).map_err(|_| bad())
            }
            Self::Str => Ok(Value::Str(raw.to_string())),
        }
    }
}

impl fmt::Display for SolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

fn uint_max(bits: u16) -> U256 {
    if bits >= 256 {
        U256::MAX
    } else {
        (U256::from(1u8) << bits as usize) - U256::from(1u8)
    }
}

fn int_bounds(bits: u16) -> (I256, I256) {
    let half = U256::from(1u8) << (bits as usize - 1);
    let max = I256::from_raw(half - U256::from(1u8));
    let min = -max - I256::ONE;
    (min, max)
}

fn parse_i256(raw: &str) -> Option<I256> {
    if let Some(mag) = raw.strip_prefix('-') {
        let mag = crate::utils::num::to_u256(mag)?;
        let positive = I256::try_from(mag).ok()?;
        positive.checked_neg()
    } else {
        let mag = crate::utils::num::to_u256(raw)?;
        I256::try_from(mag).ok()
    }
}

/// A concrete Solidity-level value flowing through representative-value
/// domains, decoded test cases and transaction steps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Uint(U256),
    Int(I256),
    Address(Address),
    Bool(bool),
    Bytes(Vec<u8>),
    Str(String),
}

impl Value {
    /// 256-bit machine-word representation, two's complement for signed
    /// integers. Dynamic byte/string payloads have none.
    pub fn as_word(&self) -> Option<U256> {
        match self {
            Self::Uint(v) => Some(*v),
            Self::Int(v) => Some(v.into_raw()),
            Self::Address(a) => Some(U256::from_be_slice(a.as_slice())),
            Self::Bool(b) => Some(U256::from(u8::from(*b))),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Address(a) => write!(f, "{a}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// Observed index values, nested type -> indirection depth -> state variable
/// name -> ordered values. Ordering is deterministic (sorted keys, ordered
/// value lists) so domain construction is reproducible across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexValueStore {
    entries: BTreeMap<String, BTreeMap<u8, BTreeMap<String, Vec<Value>>>>,
}

impl IndexValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ordered-dedup insert: a value already recorded for the same
    /// (type, depth, variable) slot is ignored.
    pub fn record(&mut self, ty: &SolType, level: u8, state_var: &str, value: Value) {
        let slot = self
            .entries
            .entry(ty.canonical())
            .or_default()
            .entry(level)
            .or_default()
            .entry(state_var.to_string())
            .or_default();
        if !slot.contains(&value) {
            slot.push(value);
        }
    }

    /// Fold every value of `other` into self, keeping first-seen order.
    pub fn absorb(&mut self, other: &IndexValueStore) {
        for (ty, levels) in &other.entries {
            for (level, vars) in levels {
                for (sv, values) in vars {
                    let slot = self
                        .entries
                        .entry(ty.clone())
                        .or_default()
                        .entry(*level)
                        .or_default()
                        .entry(sv.clone())
                        .or_default();
                    for value in values {
                        if !slot.contains(value) {
                            slot.push(value.clone());
                        }
                    }
                }
            }
        }
    }

    pub fn levels_for(&self, ty: &SolType) -> Option<&BTreeMap<u8, BTreeMap<String, Vec<Value>>>> {
        self.entries.get(&ty.canonical())
    }

    pub fn values_at(&self, ty: &SolType, level: u8, state_var: &str) -> Option<&[Value]> {
        self.entries
            .get(&ty.canonical())?
            .get(&level)?
            .get(state_var)
            .map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_elementary_types() {
        assert_eq!(SolType::parse("uint256").unwrap(), SolType::Uint(256));
        assert_eq!(SolType::parse("uint").unwrap(), SolType::Uint(256));
        assert_eq!(SolType::parse("int8").unwrap(), SolType::Int(8));
        assert_eq!(SolType::parse("bytes32").unwrap(), SolType::FixedBytes(32));
        assert!(SolType::parse("uint7").is_err());
        assert!(SolType::parse("mapping(address=>uint256)").is_err());
    }

    #[test]
    fn integer_bounds() {
        let ty = SolType::Int(8);
        assert!(ty.bounds_contain(&ty.parse_value("127").unwrap()));
        assert!(ty.bounds_contain(&ty.parse_value("-128").unwrap()));
        assert!(!ty.bounds_contain(&SolType::Int(16).parse_value("300").unwrap()));

        let ty = SolType::Uint(8);
        assert!(ty.bounds_contain(&Value::Uint(U256::from(255u16))));
        assert!(!ty.bounds_contain(&Value::Uint(U256::from(256u16))));
    }

    #[test]
    fn index_store_dedups_in_order() {
        let mut store = IndexValueStore::new();
        let ty = SolType::Uint(256);
        store.record(&ty, 0, "balances", Value::Uint(U256::from(5u8)));
        store.record(&ty, 0, "balances", Value::Uint(U256::from(9u8)));
        store.record(&ty, 0, "balances", Value::Uint(U256::from(5u8)));
        assert_eq!(
            store.values_at(&ty, 0, "balances").unwrap(),
            &[Value::Uint(U256::from(5u8)), Value::Uint(U256::from(9u8))]
        );
    }
}
