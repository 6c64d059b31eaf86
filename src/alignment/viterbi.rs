use crate::error::AlignmentError;
use crate::types::FramePath;

/// CTC forced alignment of `targets` against frame log probabilities.
///
/// Targets are interleaved with blanks (`blank t0 blank t1 ... blank`) and
/// the best path is decoded per frame.
pub fn align_targets(
    log_probs: &[Vec<f32>],
    targets: &[usize],
    blank_id: usize,
) -> Result<FramePath, AlignmentError> {
    if targets.is_empty() {
        return Err(AlignmentError::invalid_input("no alignment targets"));
    }
    if log_probs.is_empty() {
        return Err(AlignmentError::invalid_input("no emission frames"));
    }
    let width = log_probs[0].len();
    if let Some(&bad) = targets.iter().chain(std::iter::once(&blank_id)).find(|&&id| id >= width) {
        return Err(AlignmentError::invalid_input(format!(
            "token id {bad} outside emission width {width}"
        )));
    }
    if log_probs.iter().any(|row| row.len() != width) {
        return Err(AlignmentError::invalid_input("ragged emission rows"));
    }

    let repeats = targets.windows(2).filter(|w| w[0] == w[1]).count();
    let required = targets.len() + repeats;
    if log_probs.len() < required {
        return Err(AlignmentError::invalid_input(format!(
            "audio too short for transcript: {} frames, need at least {required}",
            log_probs.len()
        )));
    }

    let states = interleave_blanks(targets, blank_id);
    let path = forced_align_viterbi(log_probs, &states);

    let mut frame_path = FramePath {
        tokens: Vec::with_capacity(path.len()),
        scores: Vec::with_capacity(path.len()),
    };
    for (state, frame) in path {
        let token = states[state];
        frame_path.tokens.push(token);
        frame_path.scores.push(log_probs[frame][token]);
    }
    tracing::debug!(
        frames = frame_path.tokens.len(),
        targets = targets.len(),
        "viterbi path decoded"
    );
    Ok(frame_path)
}

fn interleave_blanks(targets: &[usize], blank_id: usize) -> Vec<usize> {
    let mut states = Vec::with_capacity(2 * targets.len() + 1);
    states.push(blank_id);
    for &target in targets {
        states.push(target);
        states.push(blank_id);
    }
    states
}

/// CTC Viterbi over a blank-interleaved state sequence.
///
/// Returns `(state, frame)` for every frame. The path starts in state 0 or 1
/// and ends in one of the last two states.
pub fn forced_align_viterbi(log_probs: &[Vec<f32>], tokens: &[usize]) -> Vec<(usize, usize)> {
    let t_len = log_probs.len();
    let s_len = tokens.len();
    if t_len == 0 || s_len == 0 {
        return Vec::new();
    }

    let mut prev = vec![f32::NEG_INFINITY; s_len];
    let mut curr = vec![f32::NEG_INFINITY; s_len];
    let mut bp = vec![0u8; t_len * s_len];

    prev[0] = log_probs[0][tokens[0]];
    if s_len > 1 {
        prev[1] = log_probs[0][tokens[1]];
    }

    let mut prev_start = 0usize;
    let mut prev_end = if s_len > 1 { 1 } else { 0 };
    let final_floor_state = s_len.saturating_sub(2);

    for t in 1..t_len {
        let row = &log_probs[t];
        let remaining = t_len - 1 - t;
        let curr_start = final_floor_state.saturating_sub(2 * remaining);
        let curr_end = (2 * t + 1).min(s_len - 1);

        curr.fill(f32::NEG_INFINITY);
        let bp_offset = t * s_len;
        for s in curr_start..=curr_end {
            let (best, step) = best_transition(&prev, s, prev_start, prev_end, tokens);
            curr[s] = best + row[tokens[s]];
            bp[bp_offset + s] = step;
        }

        std::mem::swap(&mut prev, &mut curr);
        prev_start = curr_start;
        prev_end = curr_end;
    }

    let mut s = s_len - 1;
    if s_len >= 2 && prev[s_len - 2] > prev[s_len - 1] {
        s = s_len - 2;
    }

    let mut path = Vec::with_capacity(t_len);
    path.push((s, t_len - 1));
    for t in (1..t_len).rev() {
        s = match bp[t * s_len + s] {
            1 => s.saturating_sub(1),
            2 => s.saturating_sub(2),
            _ => s,
        };
        path.push((s, t - 1));
    }
    path.reverse();
    path
}

#[inline(always)]
fn best_transition(
    prev: &[f32],
    s: usize,
    prev_start: usize,
    prev_end: usize,
    tokens: &[usize],
) -> (f32, u8) {
    let mut best = f32::NEG_INFINITY;
    let mut step = 0u8;

    if s >= prev_start && s <= prev_end {
        best = prev[s];
    }

    if s >= 1 {
        let p = s - 1;
        if p >= prev_start && p <= prev_end {
            let cand = prev[p];
            if cand > best {
                best = cand;
                step = 1;
            }
        }
    }

    if s >= 2 && tokens[s] != tokens[s - 2] {
        let p = s - 2;
        if p >= prev_start && p <= prev_end {
            let cand = prev[p];
            if cand > best {
                best = cand;
                step = 2;
            }
        }
    }

    (best, step)
}
