/// Apostrophe look-alikes folded into ASCII `'`.
const APOSTROPHES: [char; 5] = ['\'', '’', 'ʼ', '‘', '`'];

/// Lowercase a chunk, turn punctuation and symbols into spaces and collapse
/// whitespace. Apostrophes survive as `'` since alignment vocabularies keep
/// them as a token.
pub fn normalize(chunk: &str, language: &str) -> String {
    let lowered = chunk.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        if APOSTROPHES.contains(&c) {
            out.push('\'');
        } else if is_separator(c) {
            out.push(' ');
        } else {
            out.push(fold_language_specific(c, language));
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_separator(c: char) -> bool {
    if c.is_whitespace() || c.is_ascii_punctuation() || c.is_control() {
        return true;
    }
    matches!(
        c,
        '«' | '»'
            | '„'
            | '“'
            | '”'
            | '‚'
            | '‹'
            | '›'
            | '—'
            | '–'
            | '‐'
            | '‑'
            | '…'
            | '¡'
            | '¿'
            | '·'
            | '•'
            | '§'
            | '№'
            | '°'
            | '¶'
            | '。'
            | '、'
            | '，'
            | '．'
            | '！'
            | '？'
            | '：'
            | '；'
            | '「'
            | '」'
            | '『'
            | '』'
            | '（'
            | '）'
            | '【'
            | '】'
            | '《'
            | '》'
            | '〈'
            | '〉'
            | '\u{00a0}'
            | '\u{200b}'
            | '\u{feff}'
    )
}

fn fold_language_specific(c: char, language: &str) -> char {
    match (language, c) {
        // Russian text routinely writes ё as е; the two align identically.
        ("rus", 'ё') => 'е',
        _ => c,
    }
}
