//! Transcript handling ahead of tokenization.

mod normalize;
mod romanize;

use std::path::Path;

pub use normalize::normalize;
pub use romanize::Romanizer;

use crate::config::SplitSize;
use crate::error::AlignmentError;

/// Languages written without word separators; always split per character.
const CHAR_SPLIT_LANGUAGES: [&str; 4] = ["jpn", "chi", "zho", "cmn"];

/// Read a UTF-8 transcript, joining its lines with spaces.
pub fn read_transcript(path: impl AsRef<Path>) -> Result<String, AlignmentError> {
    let raw = std::fs::read_to_string(path.as_ref())
        .map_err(|e| AlignmentError::io("read transcript", e))?;
    Ok(join_lines(&raw))
}

pub fn join_lines(raw: &str) -> String {
    raw.replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}

pub fn effective_split_size(split_size: SplitSize, language: &str) -> SplitSize {
    if CHAR_SPLIT_LANGUAGES.contains(&language) {
        SplitSize::Char
    } else {
        split_size
    }
}

/// Split a transcript into the chunks that become output records.
pub fn split_text(text: &str, split_size: SplitSize) -> Vec<String> {
    match split_size {
        SplitSize::Word => text.split_whitespace().map(str::to_string).collect(),
        SplitSize::Char => text
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(String::from)
            .collect(),
        SplitSize::Sentence => split_sentences(text),
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        let at_boundary = matches!(c, '.' | '!' | '?' | '…')
            && chars.peek().map_or(true, |next| next.is_whitespace());
        if at_boundary {
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);
    sentences
}

fn push_trimmed(out: &mut Vec<String>, chunk: &str) {
    let chunk = chunk.split_whitespace().collect::<Vec<_>>().join(" ");
    if !chunk.is_empty() {
        out.push(chunk);
    }
}
