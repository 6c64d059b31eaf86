use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::AlignmentError;
use crate::types::AlignmentUnit;

const BLANK_TOKEN: &str = "<blank>";

/// Token ↔ id mapping of the CTC head, extended with the `<star>` wildcard.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    ids: HashMap<String, usize>,
    blank_id: usize,
    star_id: usize,
}

impl Vocabulary {
    /// Keys are lowercased in the order given; on collisions the later entry wins.
    ///
    /// `<star>` takes the first id after the model's output columns so it
    /// lines up with the extra emission column.
    pub fn new(
        entries: impl IntoIterator<Item = (String, usize)>,
        pad_token_id: usize,
        model_vocab_size: usize,
    ) -> Self {
        let mut ids = HashMap::new();
        for (token, id) in entries {
            ids.insert(token.to_lowercase(), id);
        }
        if ids.len() != model_vocab_size {
            tracing::warn!(
                vocab_entries = ids.len(),
                model_vocab_size,
                "vocab.json size differs from the model output size"
            );
        }

        let blank_id = ids.get(BLANK_TOKEN).copied().unwrap_or(pad_token_id);
        let star_id = model_vocab_size;
        ids.insert(AlignmentUnit::STAR_TOKEN.to_string(), star_id);

        Self {
            ids,
            blank_id,
            star_id,
        }
    }

    pub fn load(
        path: &Path,
        pad_token_id: usize,
        model_vocab_size: usize,
    ) -> Result<Self, AlignmentError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| AlignmentError::io("read vocab.json", e))?;
        let entries: FileOrderEntries = serde_json::from_str(&data)
            .map_err(|e| AlignmentError::json("parse vocab.json", e))?;
        Ok(Self::new(entries.0, pad_token_id, model_vocab_size))
    }

    pub fn id(&self, token: &str) -> Option<usize> {
        self.ids.get(token).copied()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.ids.contains_key(token)
    }

    pub fn blank_id(&self) -> usize {
        self.blank_id
    }

    pub fn star_id(&self) -> usize {
        self.star_id
    }

    /// Width of an emission row: model outputs plus the `<star>` column.
    pub fn emission_width(&self) -> usize {
        self.star_id + 1
    }
}

/// `vocab.json` entries in the order they appear in the file.
struct FileOrderEntries(Vec<(String, usize)>);

impl<'de> Deserialize<'de> for FileOrderEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = FileOrderEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of token to id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, usize>()? {
                    entries.push(entry);
                }
                Ok(FileOrderEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(entries: &[(&str, usize)]) -> Vec<(String, usize)> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn blank_prefers_blank_token_over_pad() {
        let vocab = Vocabulary::new(raw(&[("<blank>", 0), ("<pad>", 1), ("a", 2)]), 1, 3);
        assert_eq!(vocab.blank_id(), 0);
        assert_eq!(vocab.star_id(), 3);
        assert_eq!(vocab.id("<star>"), Some(3));
        assert_eq!(vocab.emission_width(), 4);
    }

    #[test]
    fn blank_falls_back_to_pad_token_id() {
        let vocab = Vocabulary::new(raw(&[("<pad>", 0), ("|", 1), ("A", 2)]), 0, 3);
        assert_eq!(vocab.blank_id(), 0);
        assert_eq!(vocab.id("a"), Some(2));
        assert_eq!(vocab.id("A"), None);
    }

    #[test]
    fn lowercase_collision_keeps_last_entry() {
        let vocab = Vocabulary::new(raw(&[("<pad>", 0), ("a", 5), ("A", 2)]), 0, 6);
        assert_eq!(vocab.id("a"), Some(2));
        let vocab = Vocabulary::new(raw(&[("<pad>", 0), ("A", 2), ("a", 5)]), 0, 6);
        assert_eq!(vocab.id("a"), Some(5));
    }

    #[test]
    fn load_follows_file_order_on_collisions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vocab.json");
        std::fs::write(&path, r#"{"<pad>": 0, "a": 5, "A": 2}"#).expect("write vocab");
        let vocab = Vocabulary::load(&path, 0, 6).expect("load vocab");
        assert_eq!(vocab.id("a"), Some(2));

        std::fs::write(&path, r#"{"<pad>": 0, "A": 2, "a": 5}"#).expect("write vocab");
        let vocab = Vocabulary::load(&path, 0, 6).expect("load vocab");
        assert_eq!(vocab.id("a"), Some(5));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vocab.json");
        std::fs::write(&path, r#"{"<blank>": 0, "a": 1, "b": 2}"#).expect("write vocab");
        let vocab = Vocabulary::load(&path, 0, 3).expect("load vocab");
        assert!(vocab.contains("b"));
        assert!(!vocab.contains("c"));
    }

    #[test]
    fn load_rejects_invalid_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vocab.json");
        std::fs::write(&path, "not json").expect("write vocab");
        let err = Vocabulary::load(&path, 0, 3).unwrap_err();
        assert!(matches!(err, AlignmentError::Json { .. }));
    }
}
