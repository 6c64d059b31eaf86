//! JSON rendering of aligned words.

use std::path::Path;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::error::AlignmentError;
use crate::types::WordSpan;

const INDENT: &[u8] = b"    ";

/// Words as a JSON array indented with four spaces. Non-ASCII text is kept verbatim.
pub fn to_json_pretty(words: &[WordSpan]) -> Result<String, AlignmentError> {
    let mut buf = Vec::with_capacity(words.len() * 96);
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(INDENT));
    words
        .serialize(&mut serializer)
        .map_err(|e| AlignmentError::json("serialize word spans", e))?;
    String::from_utf8(buf).map_err(|e| AlignmentError::runtime("serialize word spans", e))
}

/// Write the JSON array to `path`, creating parent directories as needed.
pub fn write_word_spans(path: impl AsRef<Path>, words: &[WordSpan]) -> Result<(), AlignmentError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| AlignmentError::io("create output directory", e))?;
    }
    let mut json = to_json_pretty(words)?;
    json.push('\n');
    std::fs::write(path, json).map_err(|e| AlignmentError::io("write alignment results", e))?;
    tracing::debug!(path = %path.display(), words = words.len(), "alignment results written");
    Ok(())
}
