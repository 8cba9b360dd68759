//! Phase sets and phase-index mappings.
//!
//! A phase set is an ordered, strictly increasing subset of `{a, b, c}` written
//! as a short string (`"a"`, `"ab"`, `"bc"`, `"abc"`). Every per-node vector and
//! matrix is sized by the cardinality of the node's phase set, so two nodes with
//! different phase sets exchange values through *phase-index mappings*: the
//! position of each of the child's letters inside the parent's phase string.
//!
//! ```
//! use dopf_core::PhaseSet;
//!
//! let parent: PhaseSet = "abc".parse().unwrap();
//! let child: PhaseSet = "bc".parse().unwrap();
//! assert_eq!(child.indices_in(&parent).unwrap(), vec![1, 2]);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DopfError, DopfResult};

/// Validated phase set such as `"abc"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhaseSet(String);

/// Returns true if `phase` is non-empty, strictly increasing and within `a..=c`.
pub fn is_valid_phase(phase: &str) -> bool {
    let bytes = phase.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(&first), Some(&last)) => {
            first >= b'a' && last <= b'c' && bytes.windows(2).all(|pair| pair[0] < pair[1])
        }
        _ => false,
    }
}

impl PhaseSet {
    pub fn parse(phase: &str) -> DopfResult<Self> {
        if is_valid_phase(phase) {
            Ok(PhaseSet(phase.to_string()))
        } else {
            Err(DopfError::InvalidPhase(format!("invalid phase set '{phase}'")))
        }
    }

    /// All three phases.
    pub fn abc() -> Self {
        PhaseSet("abc".to_string())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a validated phase set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn letters(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars()
    }

    /// Offset of each letter from `'a'` (0 for a, 1 for b, 2 for c).
    pub fn offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.bytes().map(|b| (b - b'a') as usize)
    }

    pub fn contains(&self, letter: char) -> bool {
        self.0.contains(letter)
    }

    pub fn is_subset_of(&self, parent: &PhaseSet) -> bool {
        self.indices_in(parent).is_ok()
    }

    /// Positions of this set's letters inside `parent`.
    ///
    /// Both strings are strictly increasing, so a single merge-style scan
    /// suffices. Fails when a letter of `self` is missing from `parent`.
    pub fn indices_in(&self, parent: &PhaseSet) -> DopfResult<Vec<usize>> {
        let parent_bytes = parent.0.as_bytes();
        let mut indices = Vec::with_capacity(self.len());
        let mut at_parent = 0;
        for letter in self.0.bytes() {
            while at_parent < parent_bytes.len() && parent_bytes[at_parent] < letter {
                at_parent += 1;
            }
            if at_parent == parent_bytes.len() || parent_bytes[at_parent] > letter {
                return Err(DopfError::PhaseMismatch(format!(
                    "phase '{}' of '{}' is not contained in '{}'",
                    letter as char, self.0, parent.0
                )));
            }
            indices.push(at_parent);
            at_parent += 1;
        }
        Ok(indices)
    }
}

impl fmt::Display for PhaseSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PhaseSet {
    type Err = DopfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhaseSet::parse(s)
    }
}

impl TryFrom<String> for PhaseSet {
    type Error = DopfError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PhaseSet::parse(&value)
    }
}

impl From<PhaseSet> for String {
    fn from(phase: PhaseSet) -> Self {
        phase.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_phase_sets() {
        for phase in ["a", "b", "c", "ab", "ac", "bc", "abc"] {
            assert!(is_valid_phase(phase), "{phase} should be valid");
        }
    }

    #[test]
    fn test_invalid_phase_sets() {
        for phase in ["", "ba", "aa", "abcd", "d", "A", "cab"] {
            assert!(!is_valid_phase(phase), "{phase} should be invalid");
            assert!(PhaseSet::parse(phase).is_err());
        }
    }

    #[test]
    fn test_indices_in_parent() {
        let abc = PhaseSet::abc();
        let ac: PhaseSet = "ac".parse().unwrap();
        let c: PhaseSet = "c".parse().unwrap();
        assert_eq!(abc.indices_in(&abc).unwrap(), vec![0, 1, 2]);
        assert_eq!(ac.indices_in(&abc).unwrap(), vec![0, 2]);
        assert_eq!(c.indices_in(&ac).unwrap(), vec![1]);
    }

    #[test]
    fn test_indices_rejects_missing_phase() {
        let ab: PhaseSet = "ab".parse().unwrap();
        let bc: PhaseSet = "bc".parse().unwrap();
        let err = bc.indices_in(&ab).unwrap_err();
        assert!(matches!(err, DopfError::PhaseMismatch(_)));
        assert!(!bc.is_subset_of(&ab));
    }

    #[test]
    fn test_offsets() {
        let bc: PhaseSet = "bc".parse().unwrap();
        assert_eq!(bc.offsets().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let phase: PhaseSet = serde_json::from_str("\"ab\"").unwrap();
        assert_eq!(phase.as_str(), "ab");
        assert!(serde_json::from_str::<PhaseSet>("\"ba\"").is_err());
    }
}
