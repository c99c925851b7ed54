//! Region-code key range derivation.
//!
//! Maps a discrete two-letter region code (a state or province
//! abbreviation such as `"CA"`) to the half-open shard-key range
//! `[code, successor(code))`. The successor is the smallest string
//! lexicographically greater than every key with prefix `code`, so a
//! single half-open range isolates exactly one region prefix in a
//! byte-ordered key space.
//!
//! ## Carry policy
//!
//! `successor` increments the last letter of the code in the uppercase
//! A-Z alphabet. A trailing `Z` carries into the first letter, as in
//! positional arithmetic: `"AZ" -> "BA"`. The maximum code `"ZZ"` has
//! no representable successor; its range upper bound is the
//! [`KeyBound::Max`] sentinel (unbounded maximum).

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TopologyError};

/// First valid region code. The coverage audit sweeps the key domain
/// starting here; keys sorting below it follow default placement.
pub const REGION_DOMAIN_START: &str = "AA";

/// Upper bound of a half-open key range.
///
/// `Max` is the unbounded-maximum sentinel: it sorts after every
/// concrete key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyBound {
    Value(String),
    Max,
}

impl KeyBound {
    pub fn as_value(&self) -> Option<&str> {
        match self {
            KeyBound::Value(v) => Some(v),
            KeyBound::Max => None,
        }
    }
}

impl Ord for KeyBound {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyBound::Max, KeyBound::Max) => Ordering::Equal,
            (KeyBound::Max, KeyBound::Value(_)) => Ordering::Greater,
            (KeyBound::Value(_), KeyBound::Max) => Ordering::Less,
            (KeyBound::Value(a), KeyBound::Value(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for KeyBound {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for KeyBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyBound::Value(v) => write!(f, "{}", v),
            KeyBound::Max => write!(f, "<max>"),
        }
    }
}

/// Whether `key` sorts strictly below `bound`.
pub fn key_below(key: &str, bound: &KeyBound) -> bool {
    match bound {
        KeyBound::Max => true,
        KeyBound::Value(v) => key < v.as_str(),
    }
}

/// Validate a two-letter uppercase region code.
pub fn check_region_code(code: &str) -> Result<()> {
    let bytes = code.as_bytes();
    if bytes.len() == 2 && bytes.iter().all(|b| b.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(TopologyError::InvalidRegionCode(code.to_string()))
    }
}

/// Compute the exclusive upper bound for a region code's range.
///
/// Increments the last letter; a trailing `Z` carries into the first
/// letter (`"AZ" -> "BA"`). `"ZZ"` yields [`KeyBound::Max`].
pub fn successor(code: &str) -> Result<KeyBound> {
    check_region_code(code)?;
    let bytes = code.as_bytes();
    let (first, last) = (bytes[0], bytes[1]);
    if first == b'Z' && last == b'Z' {
        return Ok(KeyBound::Max);
    }
    let next = if last == b'Z' {
        format!("{}{}", (first + 1) as char, 'A')
    } else {
        format!("{}{}", first as char, (last + 1) as char)
    };
    Ok(KeyBound::Value(next))
}

/// Derive the half-open range `[code, successor(code))` for a region
/// code. Returns `(min, max)`.
pub fn region_range(code: &str) -> Result<(String, KeyBound)> {
    let max = successor(code)?;
    Ok((code.to_string(), max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn successor_increments_last_letter() {
        assert_eq!(successor("CA").unwrap(), KeyBound::Value("CB".to_string()));
        assert_eq!(successor("NV").unwrap(), KeyBound::Value("NW".to_string()));
        assert_eq!(successor("WY").unwrap(), KeyBound::Value("WZ".to_string()));
    }

    #[test]
    fn trailing_z_carries_into_first_letter() {
        assert_eq!(successor("AZ").unwrap(), KeyBound::Value("BA".to_string()));
        assert_eq!(successor("MZ").unwrap(), KeyBound::Value("NA".to_string()));
    }

    #[test]
    fn max_code_has_unbounded_successor() {
        assert_eq!(successor("ZZ").unwrap(), KeyBound::Max);
    }

    #[test]
    fn invalid_codes_rejected() {
        for bad in ["", "C", "CAL", "ca", "C1", "Ca", "ÄB"] {
            assert!(matches!(
                successor(bad),
                Err(TopologyError::InvalidRegionCode(_))
            ));
        }
    }

    #[test]
    fn region_range_is_half_open() {
        let (min, max) = region_range("CA").unwrap();
        assert_eq!(min, "CA");
        // "CA" and "CA"-prefixed keys fall inside, "CB" does not.
        assert!("CA" >= min.as_str() && key_below("CA", &max));
        assert!(key_below("CAX", &max));
        assert!(!key_below("CB", &max));
    }

    #[test]
    fn bound_ordering() {
        let v = KeyBound::Value("ZZ".to_string());
        assert!(KeyBound::Max > v);
        assert!(KeyBound::Value("AA".to_string()) < v);
        assert_eq!(KeyBound::Max.cmp(&KeyBound::Max), std::cmp::Ordering::Equal);
    }

    proptest! {
        // min == code, max strictly above code, and no valid code
        // sorts strictly between code and max.
        #[test]
        fn successor_is_tight(a in "[A-Z]{2}", b in "[A-Z]{2}") {
            let (min, max) = region_range(&a).unwrap();
            prop_assert_eq!(&min, &a);
            prop_assert!(key_below(&a, &max));
            if b.as_str() > a.as_str() {
                prop_assert!(!key_below(&b, &max));
            }
        }
    }
}
