use crate::error::AlignmentError;
use crate::types::{Segment, TokenSequence, WordSpan};

/// Convert per-unit spans into timed words, skipping `<star>` units.
///
/// Times are `frame * stride_ms / 1000` seconds. The score sums the path
/// log probabilities over `[start, end)` frames of the span.
pub fn to_word_spans(
    sequence: &TokenSequence,
    spans: &[Vec<Segment>],
    stride_ms: u32,
    scores: &[f32],
    merge_threshold_secs: f64,
) -> Result<Vec<WordSpan>, AlignmentError> {
    if spans.len() != sequence.units.len() {
        return Err(AlignmentError::runtime(
            "postprocess",
            format!("{} spans for {} units", spans.len(), sequence.units.len()),
        ));
    }

    let stride = stride_ms as f64;
    let mut words = Vec::with_capacity(spans.len());
    for (unit, span) in sequence.units.iter().zip(spans) {
        if unit.is_star() {
            continue;
        }
        let (Some(first), Some(last)) = (span.first(), span.last()) else {
            return Err(AlignmentError::runtime(
                "postprocess",
                format!("empty span for '{}'", unit.text()),
            ));
        };
        let (start, end) = (first.start, last.end);
        let score = scores
            .get(start..end.min(scores.len()))
            .unwrap_or_default()
            .iter()
            .map(|&s| s as f64)
            .sum::<f64>();
        words.push(WordSpan {
            start: start as f64 * stride / 1000.0,
            end: end as f64 * stride / 1000.0,
            text: unit.text().to_string(),
            score,
        });
    }

    merge_gaps(&mut words, merge_threshold_secs);
    Ok(words)
}

/// Close gaps shorter than `threshold_secs` by pulling the next start back.
///
/// A threshold of zero or below disables merging, so overlapping words keep
/// their own starts.
pub fn merge_gaps(words: &mut [WordSpan], threshold_secs: f64) {
    if threshold_secs <= 0.0 {
        return;
    }
    for i in 1..words.len() {
        if words[i].start - words[i - 1].end < threshold_secs {
            words[i].start = words[i - 1].end;
        }
    }
}
