/**
 * LSEQ Identifier Allocation
 *
 * This module defines the dense ordered identifiers that position chunks
 * inside a document. An identifier is a finite, nonempty sequence of
 * components in `[0, 65535]`; ordering is lexicographic with the prefix
 * rule (a shorter prefix sorts before any of its extensions).
 *
 * `between` allocates a fresh identifier strictly between two neighbors.
 * An absent left neighbor contributes the virtual component `0` and an
 * absent right neighbor contributes `65536` at each depth. The chosen
 * terminal component is always in `[1, 65535]`; copied left components may
 * be `0` when allocation descends past the end of the left neighbor while
 * still pinned under the right neighbor.
 */
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Virtual component for an absent left neighbor.
const LEFT_SENTINEL: u32 = 0;
/// Exclusive upper bound for an absent right neighbor.
const RIGHT_SENTINEL: u32 = 65536;

/// A dense ordered identifier for one chunk.
///
/// Components are kept in a `Vec<u16>`; the derived lexicographic ordering
/// on vectors is exactly the LSEQ ordering, including the prefix rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LseqId(Vec<u16>);

impl LseqId {
    /// Build an identifier from raw components.
    ///
    /// Returns `None` when the sequence is empty or ends in `0`; the
    /// allocator always chooses the terminal component from `[1, 65535]`.
    pub fn from_components(components: Vec<u16>) -> Option<Self> {
        match components.last() {
            None | Some(0) => None,
            Some(_) => Some(Self(components)),
        }
    }

    /// The raw components.
    pub fn components(&self) -> &[u16] {
        &self.0
    }

    /// Number of depth levels in this identifier.
    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for LseqId {
    /// Renders as dot-joined fixed-width five-digit components,
    /// e.g. `00042.32768`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for component in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{:05}", component)?;
            first = false;
        }
        Ok(())
    }
}

/// Error parsing an identifier from its string rendering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid lseq id: {0}")]
pub struct ParseLseqIdError(String);

impl FromStr for LseqId {
    type Err = ParseLseqIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components = s
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .ok()
                    .filter(|&c| c < RIGHT_SENTINEL)
                    .map(|c| c as u16)
                    .ok_or_else(|| ParseLseqIdError(s.to_string()))
            })
            .collect::<Result<Vec<u16>, _>>()?;
        LseqId::from_components(components).ok_or_else(|| ParseLseqIdError(s.to_string()))
    }
}

// Identifiers travel on the wire and inside persisted chunk arrays as their
// string rendering, so the padded form is also the canonical JSON form.
impl Serialize for LseqId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LseqId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Allocate an identifier strictly between `left` and `right`.
///
/// At each depth the component interval is `(l, r)` with `l` taken from the
/// left neighbor (`0` past its end) and `r` from the right neighbor (`65536`
/// past its end). When the open interval contains at least one integer, a
/// value is chosen uniformly at random from it and allocation stops;
/// otherwise `l` is copied and allocation descends one level. The left
/// sequence is finite, so past its end `r - l` reaches `65536` and a value
/// is chosen.
///
/// Random interior selection keeps adversarial edit interleavings from
/// driving identifier depth monotonically upward, which is the failure mode
/// of deterministic midpoint allocation.
pub fn between(left: Option<&LseqId>, right: Option<&LseqId>) -> LseqId {
    let mut rng = rand::thread_rng();
    let left_components = left.map(|id| id.components()).unwrap_or(&[]);
    let right_components = right.map(|id| id.components()).unwrap_or(&[]);

    let mut components: Vec<u16> = Vec::new();
    for depth in 0.. {
        let l = left_components
            .get(depth)
            .map(|&c| c as u32)
            .unwrap_or(LEFT_SENTINEL);
        // The right neighbor only bounds this depth while the allocation
        // still runs along its prefix; once a copied component has dropped
        // below it, deeper right components no longer constrain.
        let on_right_prefix = depth <= right_components.len()
            && components
                .iter()
                .zip(right_components.iter())
                .all(|(a, b)| a == b);
        let r = if on_right_prefix {
            right_components
                .get(depth)
                .map(|&c| c as u32)
                .unwrap_or(RIGHT_SENTINEL)
        } else {
            RIGHT_SENTINEL
        };

        if r - l > 1 {
            components.push(rng.gen_range(l + 1..r) as u16);
            break;
        }
        components.push(l as u16);
    }

    LseqId(components)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(components: &[u16]) -> LseqId {
        LseqId::from_components(components.to_vec()).unwrap()
    }

    #[test]
    fn test_rejects_empty_and_trailing_zero() {
        assert!(LseqId::from_components(vec![]).is_none());
        assert!(LseqId::from_components(vec![0]).is_none());
        assert!(LseqId::from_components(vec![5, 0]).is_none());
    }

    #[test]
    fn test_prefix_sorts_before_extension() {
        assert!(id(&[5]) < id(&[5, 1]));
        assert!(id(&[5, 1]) < id(&[6]));
        assert!(id(&[5, 65535]) < id(&[6]));
        assert!(id(&[5, 0, 3]) < id(&[5, 1]));
    }

    #[test]
    fn test_display_pads_components() {
        assert_eq!(id(&[42]).to_string(), "00042");
        assert_eq!(id(&[42, 32768]).to_string(), "00042.32768");
    }

    #[test]
    fn test_display_round_trips() {
        let original = id(&[1, 65535, 300]);
        let parsed: LseqId = original.to_string().parse().unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("65536".parse::<LseqId>().is_err());
        assert!("".parse::<LseqId>().is_err());
        assert!("00005.".parse::<LseqId>().is_err());
        assert!("abc".parse::<LseqId>().is_err());
        assert!("00005.00000".parse::<LseqId>().is_err());
    }

    #[test]
    fn test_serde_uses_string_form() {
        let original = id(&[7, 19]);
        let json = serde_json::to_string(&original).unwrap();
        assert_eq!(json, "\"00007.00019\"");
        let back: LseqId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_between_nothing_yields_singleton() {
        for _ in 0..100 {
            let allocated = between(None, None);
            assert_eq!(allocated.depth(), 1);
            let c = allocated.components()[0];
            assert!((1..=65535).contains(&c));
        }
    }

    #[test]
    fn test_between_is_strictly_between() {
        let left = id(&[10]);
        let right = id(&[20]);
        for _ in 0..100 {
            let allocated = between(Some(&left), Some(&right));
            assert!(left < allocated, "{} !< {}", left, allocated);
            assert!(allocated < right, "{} !< {}", allocated, right);
        }
    }

    #[test]
    fn test_between_adjacent_components_descends() {
        let left = id(&[10]);
        let right = id(&[11]);
        for _ in 0..100 {
            let allocated = between(Some(&left), Some(&right));
            assert!(left < allocated);
            assert!(allocated < right);
            assert!(allocated.depth() > 1);
            assert_eq!(allocated.components()[0], 10);
        }
    }

    #[test]
    fn test_between_single_interior_value() {
        let left = id(&[10, 5]);
        let right = id(&[10, 7]);
        for _ in 0..100 {
            let allocated = between(Some(&left), Some(&right));
            assert_eq!(allocated, id(&[10, 6]));
        }
    }

    #[test]
    fn test_between_descends_past_left_under_right() {
        // No integer fits between [5] and [5,1] at depths 0 or 1, so the
        // allocator copies the virtual 0 and chooses at depth 2.
        let left = id(&[5]);
        let right = id(&[5, 1]);
        for _ in 0..100 {
            let allocated = between(Some(&left), Some(&right));
            assert!(left < allocated, "{} !< {}", left, allocated);
            assert!(allocated < right, "{} !< {}", allocated, right);
            assert_eq!(&allocated.components()[..2], &[5, 0]);
        }
    }

    #[test]
    fn test_between_left_deeper_than_right() {
        let left = id(&[10, 65535]);
        let right = id(&[11]);
        for _ in 0..100 {
            let allocated = between(Some(&left), Some(&right));
            assert!(left < allocated);
            assert!(allocated < right);
        }
    }

    #[test]
    fn test_between_open_left() {
        let right = id(&[2]);
        for _ in 0..100 {
            let allocated = between(None, Some(&right));
            assert!(allocated < right);
        }
    }

    #[test]
    fn test_between_open_right() {
        let left = id(&[65535]);
        for _ in 0..100 {
            let allocated = between(Some(&left), None);
            assert!(left < allocated);
        }
    }

    #[test]
    fn test_between_terminal_component_is_chosen_range() {
        let left = id(&[1]);
        let right = id(&[1, 1]);
        for _ in 0..200 {
            let allocated = between(Some(&left), Some(&right));
            let last = *allocated.components().last().unwrap();
            assert!((1..=65535).contains(&last));
            assert!(left < allocated);
            assert!(allocated < right);
        }
    }
}
