//! Label codecs.
//!
//! A codec turns a label into the journal's second field and back. The empty
//! string is the tombstone, so `serialize` must never produce it; the store
//! checks this before anything reaches disk.

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{JournalError, Result};

/// Serialize/deserialize capability for one label type.
pub trait LabelCodec {
    type Label: Clone + PartialEq + fmt::Debug;

    fn serialize(&self, label: &Self::Label) -> Result<String>;

    fn deserialize(&self, raw: &str) -> Result<Self::Label>;
}

/// Serialize `label` and reject the reserved empty string.
pub(crate) fn serialize_checked<C: LabelCodec>(
    codec: &C,
    example_id: &str,
    label: &C::Label,
) -> Result<String> {
    let raw = codec.serialize(label)?;
    if raw.is_empty() {
        return Err(JournalError::EmptyLabel(example_id.to_string()));
    }
    Ok(raw)
}

/// Labels are stored verbatim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCodec;

impl LabelCodec for RawCodec {
    type Label = String;

    fn serialize(&self, label: &String) -> Result<String> {
        Ok(label.clone())
    }

    fn deserialize(&self, raw: &str) -> Result<String> {
        Ok(raw.to_string())
    }
}

/// Check that class ids are non-empty and carry no surrounding whitespace.
pub fn validate_class_ids<S: AsRef<str>>(class_ids: &[S]) -> Result<()> {
    for id in class_ids {
        let id = id.as_ref();
        if id.is_empty() || id.trim() != id {
            return Err(JournalError::InvalidClassId(id.to_string()));
        }
    }
    Ok(())
}

/// Labels are class ids drawn from a fixed set.
///
/// Both directions reject ids outside the set, so a journal written for a
/// different class list fails to load instead of silently carrying stale
/// labels.
#[derive(Debug, Clone)]
pub struct ClassIdCodec {
    class_ids: Vec<String>,
    known: HashSet<String>,
}

impl ClassIdCodec {
    pub fn new<I, S>(class_ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let class_ids: Vec<String> = class_ids.into_iter().map(Into::into).collect();
        validate_class_ids(&class_ids)?;
        let known = class_ids.iter().cloned().collect();
        Ok(Self { class_ids, known })
    }

    pub fn class_ids(&self) -> &[String] {
        &self.class_ids
    }

    pub fn contains(&self, class_id: &str) -> bool {
        self.known.contains(class_id)
    }

    /// Index of `class_id` in declaration order.
    pub fn position(&self, class_id: &str) -> Option<usize> {
        self.class_ids.iter().position(|c| c == class_id)
    }

    pub fn len(&self) -> usize {
        self.class_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.class_ids.is_empty()
    }
}

impl LabelCodec for ClassIdCodec {
    type Label = String;

    fn serialize(&self, label: &String) -> Result<String> {
        if !self.contains(label) {
            return Err(JournalError::UnknownClass(label.clone()));
        }
        Ok(label.clone())
    }

    fn deserialize(&self, raw: &str) -> Result<String> {
        if !self.contains(raw) {
            return Err(JournalError::UnknownClass(raw.to_string()));
        }
        Ok(raw.to_string())
    }
}

/// Any serde type, stored as compact JSON. JSON text is never empty.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T> LabelCodec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug,
{
    type Label = T;

    fn serialize(&self, label: &T) -> Result<String> {
        Ok(serde_json::to_string(label)?)
    }

    fn deserialize(&self, raw: &str) -> Result<T> {
        Ok(serde_json::from_str(raw)?)
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_validate_class_ids() {
        assert!(validate_class_ids(&["cat", "dog"]).is_ok());
        for bad in ["", " cat", "dog ", "\tx"] {
            let err = validate_class_ids(&[bad]).unwrap_err();
            assert_eq!(err.code(), "INVALID_CLASS_ID", "{:?}", bad);
        }
    }

    #[test]
    fn test_class_id_codec_rejects_unknown() {
        let codec = ClassIdCodec::new(["cat", "dog"]).unwrap();
        assert_eq!(codec.serialize(&"cat".to_string()).unwrap(), "cat");
        assert_eq!(codec.deserialize("dog").unwrap(), "dog");
        assert!(matches!(
            codec.deserialize("bird"),
            Err(JournalError::UnknownClass(_))
        ));
        assert!(matches!(
            codec.serialize(&"bird".to_string()),
            Err(JournalError::UnknownClass(_))
        ));
        assert_eq!(codec.position("dog"), Some(1));
        assert_eq!(codec.len(), 2);
    }

    #[test]
    fn test_serialize_checked_rejects_empty() {
        let err = serialize_checked(&RawCodec, "img_1", &String::new()).unwrap_err();
        assert!(matches!(err, JournalError::EmptyLabel(id) if id == "img_1"));
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Span {
        start: usize,
        end: usize,
        tag: String,
    }

    #[test]
    fn test_json_codec_roundtrip() {
        let codec = JsonCodec::<Vec<Span>>::new();
        let label = vec![Span {
            start: 0,
            end: 4,
            tag: "PER\tSON".to_string(),
        }];
        let raw = codec.serialize(&label).unwrap();
        assert!(!raw.is_empty());
        assert_eq!(codec.deserialize(&raw).unwrap(), label);
    }

    #[test]
    fn test_json_codec_bad_input() {
        let codec = JsonCodec::<u32>::new();
        assert_eq!(codec.deserialize("not json").unwrap_err().code(), "INTERNAL_ERROR");
    }
}
