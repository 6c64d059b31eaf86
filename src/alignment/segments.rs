use crate::types::{FramePath, Segment};

/// Collapse consecutive frames with the same token into segments.
pub fn merge_repeats(path: &FramePath) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    for (frame, &token) in path.tokens.iter().enumerate() {
        match segments.last_mut() {
            Some(last) if last.token == token => last.end = frame,
            _ => segments.push(Segment {
                token,
                start: frame,
                end: frame,
            }),
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(tokens: &[usize]) -> FramePath {
        FramePath {
            tokens: tokens.to_vec(),
            scores: vec![0.0; tokens.len()],
        }
    }

    #[test]
    fn merges_runs_with_inclusive_ends() {
        let segments = merge_repeats(&path(&[0, 0, 3, 3, 3, 0, 4]));
        assert_eq!(
            segments,
            vec![
                Segment { token: 0, start: 0, end: 1 },
                Segment { token: 3, start: 2, end: 4 },
                Segment { token: 0, start: 5, end: 5 },
                Segment { token: 4, start: 6, end: 6 },
            ]
        );
    }

    #[test]
    fn empty_path_has_no_segments() {
        assert!(merge_repeats(&path(&[])).is_empty());
    }
}
