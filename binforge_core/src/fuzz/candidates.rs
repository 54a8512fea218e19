//! Per-kind candidate values for fuzzing a single field.

use crate::error::TreeError;
use crate::packing::Packing;
use crate::template::FuzzOptions;
use crate::tree::{LeafKind, NodeId, NodeKind, Tree};
use crate::value::Value;
use std::collections::HashSet;

/// Longest generated string candidate unless a field sets its own bound.
pub const DEFAULT_MAX_STRING_LENGTH: usize = (1 << 15) + 60;
/// Byte the string ramp is built from.
pub const DEFAULT_FILLER: u8 = b'A';

/// Every integer in `0..=SMALL_INT_LIMIT` is a candidate.
const SMALL_INT_LIMIT: i128 = 17;
/// Powers of two are bracketed by `±STEP`, `±2*STEP` and `±3*STEP`.
const POWER_STEP: i128 = 20;
const POWER_STEPS: i128 = 3;
/// The string ramp doubles from 1 byte up to `2^(STRING_RAMP_STEPS - 1)` bytes.
const STRING_RAMP_STEPS: u32 = 17;

fn dedup(values: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

/// Boundary-heavy integers for a field packed with `packing`: small values,
/// every power of two that fits, values just around each power, and the
/// all-ones mask. Values that do not fit are truncated by packing, so
/// `p - 20` style candidates wrap for unsigned fields the way real
/// off-by-something bugs do.
pub fn int_candidates(packing: &Packing, options: &FuzzOptions) -> Vec<Value> {
    if let Some(values) = &options.values {
        return values.clone();
    }
    let mask = i128::try_from(packing.mask()).unwrap_or(i128::MAX);
    let mut out: Vec<i128> = (0..=SMALL_INT_LIMIT).collect();
    let mut power: i128 = 1;
    while power <= mask {
        out.push(power);
        for step in 1..=POWER_STEPS {
            let delta = POWER_STEP * step;
            out.push(power - delta);
            if power + delta <= mask {
                out.push(power + delta);
            }
        }
        match power.checked_mul(2) {
            Some(next) => power = next,
            None => break,
        }
    }
    out.push(mask);
    dedup(
        out.into_iter()
            .map(Value::Int)
            .chain(options.extra.iter().cloned()),
    )
}

/// A ramp of `filler` runs doubling in length, capped at the field's maximum
/// length, followed by the empty string.
pub fn string_candidates(options: &FuzzOptions, filler: u8) -> Vec<Value> {
    if let Some(values) = &options.values {
        return values.clone();
    }
    let max_length = options.max_length.unwrap_or(DEFAULT_MAX_STRING_LENGTH);
    let ramp = (0..STRING_RAMP_STEPS)
        .map(|i| 1usize << i)
        .filter(|&len| len <= max_length)
        .map(|len| Value::Bytes(vec![filler; len]));
    dedup(
        ramp.chain(std::iter::once(Value::Bytes(Vec::new())))
            .chain(options.extra.iter().cloned()),
    )
}

pub fn bool_candidates() -> Vec<Value> {
    vec![Value::Bool(true), Value::Bool(false)]
}

/// Candidates for the leaf `id` under the effective `options`.
pub(crate) fn candidates_for(
    tree: &Tree,
    id: NodeId,
    options: &FuzzOptions,
    filler: u8,
) -> Result<Vec<Value>, TreeError> {
    Ok(match &tree.node(id)?.kind {
        NodeKind::Leaf(LeafKind::Int(spec)) => int_candidates(&spec.packing, options),
        NodeKind::Leaf(LeafKind::Str(_)) => string_candidates(options, filler),
        NodeKind::Leaf(LeafKind::Bool) => bool_candidates(),
        NodeKind::Leaf(LeafKind::Custom(codec)) => match &options.values {
            Some(values) => values.clone(),
            None => dedup(codec.fuzz_values().into_iter().chain(options.extra.iter().cloned())),
        },
        NodeKind::Composite | NodeKind::Repeated(_) => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packing::Endian;

    fn ints(values: &[Value]) -> Vec<i128> {
        values.iter().filter_map(Value::as_int).collect()
    }

    #[test]
    fn one_byte_ints_cover_boundaries() {
        let values = ints(&int_candidates(
            &Packing::unsigned(1, Endian::Big),
            &FuzzOptions::default(),
        ));
        assert_eq!(&values[..18], &(0..=17).collect::<Vec<_>>()[..]);
        for expected in [128, 108, 148, 88, 168, 68, 188, 255, -12, -52] {
            assert!(values.contains(&expected), "missing {expected}");
        }
        assert!(!values.contains(&276));
        assert_eq!(*values.last().unwrap(), 255);

        let unique: HashSet<_> = values.iter().collect();
        assert_eq!(unique.len(), values.len());
    }

    #[test]
    fn extras_append_and_values_replace() {
        let packing = Packing::unsigned(2, Endian::Little);
        let extra = FuzzOptions {
            extra: vec![Value::Int(4242), Value::Int(3)],
            ..FuzzOptions::default()
        };
        let values = ints(&int_candidates(&packing, &extra));
        assert_eq!(*values.last().unwrap(), 4242);
        assert_eq!(values.iter().filter(|v| **v == 3).count(), 1);

        let fixed = FuzzOptions {
            values: Some(vec![Value::Int(9)]),
            ..FuzzOptions::default()
        };
        assert_eq!(int_candidates(&packing, &fixed), vec![Value::Int(9)]);
    }

    #[test]
    fn string_ramp_respects_max_length() {
        let values = string_candidates(&FuzzOptions::default(), b'A');
        assert_eq!(values.len(), 17);
        assert_eq!(values[0], Value::Bytes(b"A".to_vec()));
        assert_eq!(values[15].as_bytes().unwrap().len(), 1 << 15);
        assert_eq!(values[16], Value::Bytes(Vec::new()));

        let short = FuzzOptions {
            max_length: Some(5),
            ..FuzzOptions::default()
        };
        let lens: Vec<usize> = string_candidates(&short, b'x')
            .iter()
            .map(|v| v.as_bytes().unwrap().len())
            .collect();
        assert_eq!(lens, vec![1, 2, 4, 0]);
    }
}
