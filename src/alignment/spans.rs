use crate::alignment::vocab::Vocabulary;
use crate::error::AlignmentError;
use crate::types::{Segment, TokenSequence};

/// Group token segments into one span per alignment unit.
///
/// Blank segments are skipped while walking; every non-blank segment must
/// match the next expected token. A unit without tokens reuses the last
/// segment of the unit before it. Each span is then padded with the blank
/// segment next to it: fully at the outer edges, up to the blank's midpoint
/// between two units.
pub fn word_spans(
    sequence: &TokenSequence,
    segments: &[Segment],
    vocab: &Vocabulary,
) -> Result<Vec<Vec<Segment>>, AlignmentError> {
    let intervals = unit_intervals(sequence, segments, vocab)?;
    let blank = vocab.blank_id();
    let last = intervals.len().saturating_sub(1);

    let spans = intervals
        .iter()
        .enumerate()
        .map(|(idx, &(start, end))| {
            let mut span = segments[start..=end].to_vec();
            if start > 0 {
                let prev = segments[start - 1];
                if prev.token == blank {
                    let pad_start = if idx == 0 {
                        prev.start
                    } else {
                        (prev.start + prev.end) / 2
                    };
                    span.insert(
                        0,
                        Segment {
                            token: blank,
                            start: pad_start,
                            end: segments[start].start,
                        },
                    );
                }
            }
            if let Some(next) = segments.get(end + 1).filter(|next| next.token == blank) {
                let pad_end = if idx == last {
                    next.end
                } else {
                    (next.start + next.end) / 2
                };
                span.push(Segment {
                    token: blank,
                    start: segments[end].end,
                    end: pad_end,
                });
            }
            span
        })
        .collect();
    Ok(spans)
}

/// Inclusive `(first, last)` segment indices covered by each unit.
fn unit_intervals(
    sequence: &TokenSequence,
    segments: &[Segment],
    vocab: &Vocabulary,
) -> Result<Vec<(usize, usize)>, AlignmentError> {
    let units = &sequence.units;
    let blank = vocab.blank_id();
    let leading_empty = units.iter().take_while(|u| u.token_count() == 0).count();

    let mut intervals = Vec::with_capacity(units.len());
    let mut unit_idx = leading_empty;
    let mut token_idx = 0usize;
    let mut start = 0usize;

    for (seg_idx, seg) in segments.iter().enumerate() {
        if unit_idx == units.len() {
            if seg.token != blank {
                return Err(AlignmentError::runtime(
                    "group spans",
                    format!("token {} aligned after the last unit", seg.token),
                ));
            }
            continue;
        }
        if seg.token == blank {
            continue;
        }

        let unit = &units[unit_idx];
        let expected = unit.token(token_idx).and_then(|token| vocab.id(token));
        if expected != Some(seg.token) {
            return Err(AlignmentError::runtime(
                "group spans",
                format!(
                    "segment token {} does not match {:?} of unit {unit_idx}",
                    seg.token,
                    unit.token(token_idx)
                ),
            ));
        }

        if token_idx == 0 {
            start = seg_idx;
        }
        if token_idx + 1 < unit.token_count() {
            token_idx += 1;
            continue;
        }

        if intervals.is_empty() {
            intervals.extend(std::iter::repeat((start, seg_idx)).take(leading_empty));
        }
        intervals.push((start, seg_idx));
        token_idx = 0;
        unit_idx += 1;
        while unit_idx < units.len() && units[unit_idx].token_count() == 0 {
            intervals.push((seg_idx, seg_idx));
            unit_idx += 1;
        }
    }

    if intervals.len() != units.len() {
        return Err(AlignmentError::runtime(
            "group spans",
            format!(
                "aligned {} of {} units",
                intervals.len(),
                units.len()
            ),
        ));
    }
    Ok(intervals)
}
