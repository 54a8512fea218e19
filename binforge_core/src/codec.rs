use crate::error::TreeError;
use crate::value::Value;
use rand_chacha::ChaCha8Rng;
use std::fmt;

/// Encoding for leaf kinds the built-in int/str/bool nodes do not cover.
///
/// Only [`encode`](LeafCodec::encode) is mandatory. A codec that is asked for
/// something it does not provide reports [`TreeError::NotImplemented`], which
/// always indicates a schema-authoring bug.
pub trait LeafCodec: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, TreeError>;

    /// Value used when the field has none.
    fn default_value(&self, _rng: &mut ChaCha8Rng) -> Result<Value, TreeError> {
        Err(TreeError::NotImplemented {
            kind: self.name(),
            method: "default_value",
        })
    }

    /// Encoded length without encoding; needed for offset arithmetic.
    fn fixed_len(&self) -> Result<usize, TreeError> {
        Err(TreeError::NotImplemented {
            kind: self.name(),
            method: "fixed_len",
        })
    }

    fn fuzz_values(&self) -> Vec<Value> {
        Vec::new()
    }
}
