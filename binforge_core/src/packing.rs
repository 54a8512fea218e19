use tracing::debug;

/// Default inclusive range for random numeric defaults.
pub const DEFAULT_INT_MIN: i128 = 0;
pub const DEFAULT_INT_MAX: i128 = 0xffff;

/// Default length range and alphabet for random string defaults.
pub const DEFAULT_STR_MIN_LEN: usize = 1;
pub const DEFAULT_STR_MAX_LEN: usize = 10;
pub const DEFAULT_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// Fixed-width integer layout.
///
/// Packing truncates the two's-complement representation of the value to
/// `width` bytes, so out-of-range values (negative numbers in unsigned fields,
/// fuzz candidates past the mask) wrap instead of failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Packing {
    width: usize,
    pub endian: Endian,
    pub signed: bool,
}

impl Packing {
    /// `width` is clamped to 1..=16 bytes.
    pub fn new(width: usize, endian: Endian, signed: bool) -> Self {
        Self {
            width: width.clamp(1, 16),
            endian,
            signed,
        }
    }

    pub fn unsigned(width: usize, endian: Endian) -> Self {
        Self::new(width, endian, false)
    }

    pub fn signed(width: usize, endian: Endian) -> Self {
        Self::new(width, endian, true)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// All-ones value for the field's bit width.
    pub fn mask(&self) -> u128 {
        if self.width >= 16 {
            u128::MAX
        } else {
            (1u128 << (self.width * 8)) - 1
        }
    }

    pub fn pack(&self, value: i128) -> Vec<u8> {
        let le = value.to_le_bytes();
        let mut out = le[..self.width].to_vec();
        if self.endian == Endian::Big {
            out.reverse();
        }
        out
    }

    /// Reads back a packed value; `None` if `bytes` has the wrong width.
    pub fn unpack(&self, bytes: &[u8]) -> Option<i128> {
        if bytes.len() != self.width {
            return None;
        }
        let mut le = bytes.to_vec();
        if self.endian == Endian::Big {
            le.reverse();
        }
        let negative = self.signed && le.last().is_some_and(|b| b & 0x80 != 0);
        let mut buf = if negative { [0xffu8; 16] } else { [0u8; 16] };
        buf[..self.width].copy_from_slice(&le);
        Some(i128::from_le_bytes(buf))
    }
}

/// Numeric leaf descriptor: layout plus the range random defaults are drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntSpec {
    pub packing: Packing,
    pub min: i128,
    pub max: i128,
}

impl IntSpec {
    pub fn new(packing: Packing) -> Self {
        Self {
            packing,
            min: DEFAULT_INT_MIN,
            max: DEFAULT_INT_MAX,
        }
    }

    pub fn with_range(mut self, min: i128, max: i128) -> Self {
        (self.min, self.max) = ordered(min, max);
        self
    }
}

/// String leaf descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrSpec {
    pub min_len: usize,
    pub max_len: usize,
    pub charset: Vec<u8>,
    /// When set, shorter values are right-padded with this byte up to `min_len`.
    pub pad: Option<u8>,
}

impl Default for StrSpec {
    fn default() -> Self {
        Self {
            min_len: DEFAULT_STR_MIN_LEN,
            max_len: DEFAULT_STR_MAX_LEN,
            charset: DEFAULT_CHARSET.to_vec(),
            pad: None,
        }
    }
}

impl StrSpec {
    pub fn with_length(mut self, min: usize, max: usize) -> Self {
        (self.min_len, self.max_len) = ordered(min, max);
        self
    }

    pub fn apply_padding(&self, mut bytes: Vec<u8>) -> Vec<u8> {
        if let Some(pad) = self.pad {
            if bytes.len() < self.min_len {
                bytes.resize(self.min_len, pad);
            }
        }
        bytes
    }
}

/// Swaps reversed bounds. Reversed bounds are a schema slip, not a user error.
pub(crate) fn ordered<T: PartialOrd + Copy + std::fmt::Debug>(min: T, max: T) -> (T, T) {
    if min > max {
        debug!(?min, ?max, "normalizing reversed bounds");
        (max, min)
    } else {
        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_fixed_width_in_both_byte_orders() {
        let be = Packing::unsigned(4, Endian::Big);
        let le = Packing::unsigned(4, Endian::Little);
        assert_eq!(be.pack(0x0102_0304), vec![1, 2, 3, 4]);
        assert_eq!(le.pack(0x0102_0304), vec![4, 3, 2, 1]);
        assert_eq!(Packing::unsigned(2, Endian::Big).pack(2), vec![0, 2]);
    }

    #[test]
    fn out_of_range_values_wrap() {
        let byte = Packing::unsigned(1, Endian::Big);
        assert_eq!(byte.pack(-19), vec![0xed]);
        assert_eq!(byte.pack(0x1ff), vec![0xff]);
    }

    #[test]
    fn unpack_honors_signedness() {
        let s16 = Packing::signed(2, Endian::Little);
        assert_eq!(s16.unpack(&s16.pack(-2)), Some(-2));
        let u16 = Packing::unsigned(2, Endian::Little);
        assert_eq!(u16.unpack(&u16.pack(-2)), Some(0xfffe));
        assert_eq!(u16.unpack(&[1]), None);
    }

    #[test]
    fn masks_follow_width() {
        assert_eq!(Packing::unsigned(1, Endian::Big).mask(), 0xff);
        assert_eq!(Packing::unsigned(8, Endian::Big).mask(), u64::MAX as u128);
        assert_eq!(Packing::unsigned(0, Endian::Big).width(), 1);
    }

    #[test]
    fn reversed_bounds_are_swapped() {
        let spec = IntSpec::new(Packing::unsigned(1, Endian::Big)).with_range(9, 3);
        assert_eq!((spec.min, spec.max), (3, 9));
        let s = StrSpec::default().with_length(8, 2);
        assert_eq!((s.min_len, s.max_len), (2, 8));
    }

    #[test]
    fn padding_fills_to_min_len() {
        let spec = StrSpec {
            pad: Some(b' '),
            ..StrSpec::default().with_length(4, 8)
        };
        assert_eq!(spec.apply_padding(b"ab".to_vec()), b"ab  ".to_vec());
        assert_eq!(spec.apply_padding(b"abcdef".to_vec()), b"abcdef".to_vec());
    }
}
