use crate::alignment::vocab::Vocabulary;
use crate::config::{StarFrequency, TextConfig};
use crate::error::AlignmentError;
use crate::text::{effective_split_size, normalize, split_text, Romanizer};
use crate::types::{AlignmentUnit, TokenSequence};

/// Turn a transcript into alignment units.
///
/// Each chunk keeps its original spelling for output; its tokens are the
/// characters of the normalized (and optionally romanized) chunk that the
/// vocabulary knows. Characters the model cannot emit are dropped here so
/// the target sequence and the units always agree.
pub fn build_token_sequence(
    transcript: &str,
    config: &TextConfig,
    romanizer: Option<&Romanizer>,
    vocab: &Vocabulary,
) -> Result<TokenSequence, AlignmentError> {
    let split_size = effective_split_size(config.split_size, &config.language);
    let chunks = split_text(transcript, split_size);
    if chunks.is_empty() {
        return Err(AlignmentError::invalid_input("empty transcript"));
    }

    let mut dropped = 0usize;
    let mut text_units = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let normalized = normalize(&chunk, &config.language);
        let spelled = match romanizer {
            Some(romanizer) => romanizer.romanize(&normalized),
            None => normalized,
        };

        let mut tokens = Vec::with_capacity(spelled.len());
        for c in spelled.chars().filter(|c| !c.is_whitespace()) {
            let token = c.to_string();
            if vocab.contains(&token) {
                tokens.push(token);
            } else {
                dropped += 1;
            }
        }
        if tokens.is_empty() {
            tracing::debug!(chunk = chunk.as_str(), "chunk has no alignable tokens");
        }
        text_units.push(AlignmentUnit::Text {
            text: chunk,
            tokens,
        });
    }
    if dropped > 0 {
        tracing::warn!(
            dropped,
            "transcript characters missing from the model vocabulary were skipped"
        );
    }

    Ok(TokenSequence {
        units: insert_stars(text_units, config.star_frequency),
    })
}

fn insert_stars(text_units: Vec<AlignmentUnit>, frequency: StarFrequency) -> Vec<AlignmentUnit> {
    match frequency {
        StarFrequency::Segment => text_units
            .into_iter()
            .flat_map(|unit| [AlignmentUnit::Star, unit])
            .collect(),
        StarFrequency::Edges => {
            let mut units = Vec::with_capacity(text_units.len() + 2);
            units.push(AlignmentUnit::Star);
            units.extend(text_units);
            units.push(AlignmentUnit::Star);
            units
        }
    }
}

/// Vocabulary ids of every token in the sequence, in alignment order.
pub fn target_ids(sequence: &TokenSequence, vocab: &Vocabulary) -> Vec<usize> {
    sequence
        .tokens()
        .filter_map(|token| vocab.id(token))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::SplitSize;

    fn vocab() -> Vocabulary {
        let mut raw = HashMap::new();
        raw.insert("<blank>".to_string(), 0);
        raw.insert("<pad>".to_string(), 1);
        for (i, c) in "abcdefghijklmnopqrstuvwxyz'".chars().enumerate() {
            raw.insert(c.to_string(), i + 2);
        }
        Vocabulary::new(raw, 1, 29)
    }

    fn text_config(star_frequency: StarFrequency) -> TextConfig {
        TextConfig {
            language: "rus".to_string(),
            romanize: true,
            split_size: SplitSize::Word,
            star_frequency,
            romanization_table: None,
        }
    }

    fn tokens_of(unit: &AlignmentUnit) -> Vec<&str> {
        (0..unit.token_count()).filter_map(|i| unit.token(i)).collect()
    }

    #[test]
    fn empty_transcript_is_rejected() {
        let err = build_token_sequence(
            "   ",
            &text_config(StarFrequency::Segment),
            None,
            &vocab(),
        )
        .unwrap_err();
        assert!(matches!(err, AlignmentError::InvalidInput { .. }));
    }

    #[test]
    fn segment_frequency_puts_star_before_each_chunk() {
        let romanizer = Romanizer::new("rus");
        let seq = build_token_sequence(
            "Это мой дом.",
            &text_config(StarFrequency::Segment),
            Some(&romanizer),
            &vocab(),
        )
        .expect("tokenize");

        assert_eq!(seq.units.len(), 6);
        assert!(seq.units[0].is_star());
        assert_eq!(seq.units[1].text(), "Это");
        assert_eq!(tokens_of(&seq.units[1]), ["e", "t", "o"]);
        assert!(seq.units[2].is_star());
        assert_eq!(tokens_of(&seq.units[3]), ["m", "o", "y"]);
        assert_eq!(seq.units[5].text(), "дом.");
        assert_eq!(tokens_of(&seq.units[5]), ["d", "o", "m"]);
    }

    #[test]
    fn edges_frequency_wraps_transcript() {
        let romanizer = Romanizer::new("rus");
        let seq = build_token_sequence(
            "мой дом",
            &text_config(StarFrequency::Edges),
            Some(&romanizer),
            &vocab(),
        )
        .expect("tokenize");
        assert_eq!(seq.units.len(), 4);
        assert!(seq.units[0].is_star());
        assert!(seq.units[3].is_star());
        assert_eq!(seq.text_units().count(), 2);
    }

    #[test]
    fn without_romanization_unknown_chars_are_dropped() {
        let seq = build_token_sequence(
            "дом home",
            &text_config(StarFrequency::Edges),
            None,
            &vocab(),
        )
        .expect("tokenize");
        assert!(tokens_of(&seq.units[1]).is_empty());
        assert_eq!(tokens_of(&seq.units[2]), ["h", "o", "m", "e"]);
    }

    #[test]
    fn punctuation_only_chunk_keeps_an_empty_unit() {
        let seq = build_token_sequence(
            "a — b",
            &text_config(StarFrequency::Segment),
            None,
            &vocab(),
        )
        .expect("tokenize");
        assert_eq!(seq.units[3].text(), "—");
        assert_eq!(seq.units[3].token_count(), 0);
    }

    #[test]
    fn target_ids_include_stars() {
        let vocab = vocab();
        let seq = build_token_sequence(
            "ab",
            &text_config(StarFrequency::Edges),
            None,
            &vocab,
        )
        .expect("tokenize");
        assert_eq!(target_ids(&seq, &vocab), vec![29, 2, 3, 29]);
    }
}
