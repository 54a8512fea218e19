use crate::value::Value;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors from byte transforms, typically an external codec rejecting its input.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("{action} failed: {reason}")]
    Codec {
        action: &'static str,
        reason: String,
    },
    #[error("{action} has no inverse")]
    NotReversible { action: &'static str },
    #[error("{0}")]
    Custom(String),
}

/// A named, pure transform over the concatenation of its inputs.
///
/// Most actions return [`Value::Bytes`]; measuring actions such as [`Length`]
/// and [`Crc32`] return [`Value::Int`] so the receiving field packs them with
/// its own width and byte order.
pub trait Action: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn apply(&self, inputs: &[Vec<u8>]) -> Result<Value, ActionError>;

    /// `Some` for actions that declare an exact left inverse.
    fn reversible(&self) -> Option<&dyn Reversible> {
        None
    }
}

/// An [`Action`] whose output can be mapped back to its input.
///
/// For every `x` in the valid domain, `invert(apply(x)) == x`.
pub trait Reversible: Action {
    fn invert(&self, data: &[u8]) -> Result<Vec<u8>, ActionError>;
}

fn concat(inputs: &[Vec<u8>]) -> Vec<u8> {
    inputs.concat()
}

/// Passes the concatenated inputs through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl Action for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn apply(&self, inputs: &[Vec<u8>]) -> Result<Value, ActionError> {
        Ok(Value::Bytes(concat(inputs)))
    }
}

/// Byte length of the concatenated inputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct Length;

impl Action for Length {
    fn name(&self) -> &'static str {
        "length"
    }

    fn apply(&self, inputs: &[Vec<u8>]) -> Result<Value, ActionError> {
        Ok(Value::from(inputs.iter().map(Vec::len).sum::<usize>()))
    }
}

/// IEEE CRC-32 (the zlib/PNG polynomial) of the concatenated inputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct Crc32;

impl Action for Crc32 {
    fn name(&self) -> &'static str {
        "crc32"
    }

    fn apply(&self, inputs: &[Vec<u8>]) -> Result<Value, ActionError> {
        let mut hasher = crc32fast::Hasher::new();
        for input in inputs {
            hasher.update(input);
        }
        Ok(Value::from(hasher.finalize()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Reverse;

impl Action for Reverse {
    fn name(&self) -> &'static str {
        "reverse"
    }

    fn apply(&self, inputs: &[Vec<u8>]) -> Result<Value, ActionError> {
        let mut data = concat(inputs);
        data.reverse();
        Ok(Value::Bytes(data))
    }

    fn reversible(&self) -> Option<&dyn Reversible> {
        Some(self)
    }
}

impl Reversible for Reverse {
    fn invert(&self, data: &[u8]) -> Result<Vec<u8>, ActionError> {
        Ok(data.iter().rev().copied().collect())
    }
}

/// zlib-wrapped DEFLATE, the framing PNG `IDAT` and `zTXt` expect.
#[derive(Debug, Clone, Copy)]
pub struct Deflate {
    level: u32,
}

impl Deflate {
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for Deflate {
    fn default() -> Self {
        Self {
            level: Compression::default().level(),
        }
    }
}

impl Action for Deflate {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn apply(&self, inputs: &[Vec<u8>]) -> Result<Value, ActionError> {
        let codec_err = |e: std::io::Error| ActionError::Codec {
            action: "deflate",
            reason: e.to_string(),
        };
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(self.level));
        for input in inputs {
            encoder.write_all(input).map_err(codec_err)?;
        }
        Ok(Value::Bytes(encoder.finish().map_err(codec_err)?))
    }

    fn reversible(&self) -> Option<&dyn Reversible> {
        Some(self)
    }
}

impl Reversible for Deflate {
    fn invert(&self, data: &[u8]) -> Result<Vec<u8>, ActionError> {
        let mut out = Vec::new();
        ZlibDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| ActionError::Codec {
                action: "inflate",
                reason: e.to_string(),
            })?;
        Ok(out)
    }
}

/// Standard-alphabet, padded base64 without line wrapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct Base64;

impl Action for Base64 {
    fn name(&self) -> &'static str {
        "base64"
    }

    fn apply(&self, inputs: &[Vec<u8>]) -> Result<Value, ActionError> {
        Ok(Value::Bytes(BASE64.encode(concat(inputs)).into_bytes()))
    }

    fn reversible(&self) -> Option<&dyn Reversible> {
        Some(self)
    }
}

impl Reversible for Base64 {
    fn invert(&self, data: &[u8]) -> Result<Vec<u8>, ActionError> {
        BASE64.decode(data).map_err(|e| ActionError::Codec {
            action: "base64-decode",
            reason: e.to_string(),
        })
    }
}

/// Appends a terminator byte.
///
/// Inverting strips exactly one trailing terminator when present and otherwise
/// returns the data unchanged, so malformed fuzz output still round-trips.
#[derive(Debug, Clone, Copy)]
pub struct NullTerminate {
    pub terminator: u8,
}

impl Default for NullTerminate {
    fn default() -> Self {
        Self { terminator: 0 }
    }
}

impl Action for NullTerminate {
    fn name(&self) -> &'static str {
        "null-terminate"
    }

    fn apply(&self, inputs: &[Vec<u8>]) -> Result<Value, ActionError> {
        let mut data = concat(inputs);
        data.push(self.terminator);
        Ok(Value::Bytes(data))
    }

    fn reversible(&self) -> Option<&dyn Reversible> {
        Some(self)
    }
}

impl Reversible for NullTerminate {
    fn invert(&self, data: &[u8]) -> Result<Vec<u8>, ActionError> {
        match data.split_last() {
            Some((last, rest)) if *last == self.terminator => Ok(rest.to_vec()),
            _ => Ok(data.to_vec()),
        }
    }
}

/// Interleaves every byte with a zero byte (naive UTF-16LE for ASCII text).
///
/// Inverting re-pairs the bytes; odd-length input or a non-zero pad byte
/// returns the input unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Widen;

impl Action for Widen {
    fn name(&self) -> &'static str {
        "widen"
    }

    fn apply(&self, inputs: &[Vec<u8>]) -> Result<Value, ActionError> {
        let data = concat(inputs);
        let mut out = Vec::with_capacity(data.len() * 2);
        for b in data {
            out.push(b);
            out.push(0);
        }
        Ok(Value::Bytes(out))
    }

    fn reversible(&self) -> Option<&dyn Reversible> {
        Some(self)
    }
}

impl Reversible for Widen {
    fn invert(&self, data: &[u8]) -> Result<Vec<u8>, ActionError> {
        if data.len() % 2 != 0 || data.chunks(2).any(|pair| pair[1] != 0) {
            debug!(len = data.len(), "widened data has bad padding, leaving as is");
            return Ok(data.to_vec());
        }
        Ok(data.chunks(2).map(|pair| pair[0]).collect())
    }
}

type CustomFn = Arc<dyn Fn(&[Vec<u8>]) -> Result<Value, ActionError> + Send + Sync>;

/// A user-supplied transform over the inputs.
#[derive(Clone)]
pub struct Custom {
    name: &'static str,
    f: CustomFn,
}

impl Custom {
    pub fn new<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(&[Vec<u8>]) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        Self {
            name,
            f: Arc::new(f),
        }
    }
}

impl fmt::Debug for Custom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Custom").field("name", &self.name).finish()
    }
}

impl Action for Custom {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&self, inputs: &[Vec<u8>]) -> Result<Value, ActionError> {
        (self.f)(inputs)
    }
}

/// Inverts `data` through `action`, failing if the action declares no inverse.
pub fn invert(action: &dyn Action, data: &[u8]) -> Result<Vec<u8>, ActionError> {
    action
        .reversible()
        .ok_or(ActionError::NotReversible {
            action: action.name(),
        })?
        .invert(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(action: &dyn Action, inputs: &[&[u8]]) -> Vec<u8> {
        let owned: Vec<Vec<u8>> = inputs.iter().map(|i| i.to_vec()).collect();
        match action.apply(&owned).unwrap() {
            Value::Bytes(b) => b,
            other => panic!("expected bytes, got {other:?}"),
        }
    }

    #[test]
    fn measuring_actions_return_ints() {
        let inputs = vec![b"1234".to_vec(), b"56789".to_vec()];
        assert_eq!(Length.apply(&inputs).unwrap(), Value::Int(9));
        assert_eq!(Crc32.apply(&inputs).unwrap(), Value::Int(0xCBF4_3926));
        assert_eq!(Length.apply(&[]).unwrap(), Value::Int(0));
    }

    #[test]
    fn identity_concatenates() {
        assert_eq!(bytes(&Identity, &[b"ab", b"", b"c"]), b"abc".to_vec());
    }

    #[test]
    fn base64_is_unwrapped_and_padded() {
        assert_eq!(bytes(&Base64, &[b"hello"]), b"aGVsbG8=".to_vec());
        let long = vec![b'x'; 200];
        assert!(!bytes(&Base64, &[&long]).contains(&b'\n'));
    }

    #[test]
    fn deflate_emits_zlib_stream() {
        let out = bytes(&Deflate::default(), &[b"zTXt text"]);
        assert_eq!(out[0], 0x78);
        assert_eq!(Deflate::default().invert(&out).unwrap(), b"zTXt text".to_vec());
    }

    #[test]
    fn reversible_actions_round_trip() {
        let samples: [&[u8]; 4] = [b"", b"a", b"hello world", &[0, 1, 2, 255, 0]];
        let actions: Vec<Box<dyn Action>> = vec![
            Box::new(Reverse),
            Box::new(Deflate::default()),
            Box::new(Base64),
            Box::new(NullTerminate::default()),
            Box::new(Widen),
        ];
        for action in &actions {
            for sample in samples {
                let encoded = bytes(action.as_ref(), &[sample]);
                assert_eq!(
                    invert(action.as_ref(), &encoded).unwrap(),
                    sample.to_vec(),
                    "{} did not round-trip {:?}",
                    action.name(),
                    sample
                );
            }
        }
    }

    #[test]
    fn null_terminate_inverse_is_best_effort() {
        let nt = NullTerminate::default();
        assert_eq!(nt.invert(b"abc").unwrap(), b"abc".to_vec());
        assert_eq!(nt.invert(b"abc\0\0").unwrap(), b"abc\0".to_vec());
        assert_eq!(nt.invert(b"").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn widen_inverse_leaves_corrupt_input_alone() {
        assert_eq!(bytes(&Widen, &[b"hi"]), b"h\0i\0".to_vec());
        assert_eq!(Widen.invert(b"h\0i\x01").unwrap(), b"h\0i\x01".to_vec());
        assert_eq!(Widen.invert(b"h\0i").unwrap(), b"h\0i".to_vec());
    }

    #[test]
    fn irreversible_actions_refuse_to_invert() {
        assert!(matches!(
            invert(&Crc32, b"abc"),
            Err(ActionError::NotReversible { action: "crc32" })
        ));
    }

    #[test]
    fn bad_codec_input_is_an_error() {
        assert!(matches!(
            Base64.invert(b"@@@"),
            Err(ActionError::Codec { .. })
        ));
        assert!(matches!(
            Deflate::default().invert(b"not zlib"),
            Err(ActionError::Codec { .. })
        ));
    }

    #[test]
    fn custom_action_runs_closure() {
        let xor = Custom::new("xor", |inputs| {
            Ok(Value::Bytes(inputs.concat().iter().map(|b| b ^ 0xff).collect()))
        });
        assert_eq!(xor.name(), "xor");
        assert_eq!(bytes(&xor, &[&[0x0f]]), vec![0xf0]);
        assert!(xor.reversible().is_none());
    }
}
