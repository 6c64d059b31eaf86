use std::collections::HashMap;
use std::path::Path;

use crate::error::AlignmentError;

const CYRILLIC: &[(char, &str)] = &[
    ('а', "a"),
    ('б', "b"),
    ('в', "v"),
    ('г', "g"),
    ('д', "d"),
    ('е', "e"),
    ('ё', "e"),
    ('ж', "zh"),
    ('з', "z"),
    ('и', "i"),
    ('й', "y"),
    ('к', "k"),
    ('л', "l"),
    ('м', "m"),
    ('н', "n"),
    ('о', "o"),
    ('п', "p"),
    ('р', "r"),
    ('с', "s"),
    ('т', "t"),
    ('у', "u"),
    ('ф', "f"),
    ('х', "kh"),
    ('ц', "ts"),
    ('ч', "ch"),
    ('ш', "sh"),
    ('щ', "shch"),
    ('ъ', ""),
    ('ы', "y"),
    ('ь', ""),
    ('э', "e"),
    ('ю', "yu"),
    ('я', "ya"),
    ('є', "ye"),
    ('і', "i"),
    ('ї', "yi"),
    ('ґ', "g"),
    ('ў', "u"),
    ('ђ', "dj"),
    ('ј', "j"),
    ('љ', "lj"),
    ('њ', "nj"),
    ('ћ', "c"),
    ('џ', "dz"),
    ('ѓ', "gj"),
    ('ќ', "kj"),
    ('ѕ', "dz"),
];

const GREEK: &[(char, &str)] = &[
    ('α', "a"),
    ('ά', "a"),
    ('β', "v"),
    ('γ', "g"),
    ('δ', "d"),
    ('ε', "e"),
    ('έ', "e"),
    ('ζ', "z"),
    ('η', "i"),
    ('ή', "i"),
    ('θ', "th"),
    ('ι', "i"),
    ('ί', "i"),
    ('ϊ', "i"),
    ('ΐ', "i"),
    ('κ', "k"),
    ('λ', "l"),
    ('μ', "m"),
    ('ν', "n"),
    ('ξ', "x"),
    ('ο', "o"),
    ('ό', "o"),
    ('π', "p"),
    ('ρ', "r"),
    ('σ', "s"),
    ('ς', "s"),
    ('τ', "t"),
    ('υ', "y"),
    ('ύ', "y"),
    ('ϋ', "y"),
    ('ΰ', "y"),
    ('φ', "f"),
    ('χ', "ch"),
    ('ψ', "ps"),
    ('ω', "o"),
    ('ώ', "o"),
];

const LATIN_EXTENDED: &[(&str, &str)] = &[
    ("àáâãäåāăą", "a"),
    ("çćĉċč", "c"),
    ("ďđð", "d"),
    ("èéêëēĕėęě", "e"),
    ("ĝğġģ", "g"),
    ("ĥħ", "h"),
    ("ìíîïĩīĭįı", "i"),
    ("ĵ", "j"),
    ("ķ", "k"),
    ("ĺļľŀł", "l"),
    ("ñńņň", "n"),
    ("òóôõöøōŏő", "o"),
    ("ŕŗř", "r"),
    ("śŝşšș", "s"),
    ("ţťŧț", "t"),
    ("ùúûüũūŭůűų", "u"),
    ("ŵ", "w"),
    ("ýÿŷ", "y"),
    ("źżž", "z"),
    ("æ", "ae"),
    ("œ", "oe"),
    ("ß", "ss"),
    ("þ", "th"),
];

/// Per-language deviations from the shared Cyrillic table.
fn language_overrides(language: &str) -> &'static [(char, &'static str)] {
    match language {
        "ukr" => &[('г', "h"), ('и', "y")],
        "bel" => &[('г', "h")],
        "bul" => &[('щ', "sht"), ('ъ', "a")],
        "srp" | "mkd" => &[('ц', "c"), ('ч', "c"), ('ш', "s"), ('ж', "z"), ('х', "h")],
        _ => &[],
    }
}

/// Table-driven transliteration into the Latin alphabet.
///
/// Output is reduced to what MMS-style alignment vocabularies contain:
/// lowercase `a-z`, `'` and single spaces.
#[derive(Debug, Clone)]
pub struct Romanizer {
    chars: HashMap<char, String>,
    /// Multi-character sources from an external table, longest first.
    sequences: Vec<(Vec<char>, String)>,
}

impl Romanizer {
    pub fn new(language: &str) -> Self {
        let mut chars = HashMap::new();
        for &(c, latin) in CYRILLIC.iter().chain(GREEK) {
            chars.insert(c, latin.to_string());
        }
        for &(sources, latin) in LATIN_EXTENDED {
            for c in sources.chars() {
                chars.insert(c, latin.to_string());
            }
        }
        for &(c, latin) in language_overrides(language) {
            chars.insert(c, latin.to_string());
        }
        Self {
            chars,
            sequences: Vec::new(),
        }
    }

    /// Extend the built-in tables from a `source<TAB>latin` file.
    ///
    /// Blank lines and lines starting with `#` are ignored. Entries override
    /// the built-in mapping for the same source.
    pub fn with_table_file(mut self, path: impl AsRef<Path>) -> Result<Self, AlignmentError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| AlignmentError::io("read romanization table", e))?;
        let mut loaded = 0usize;
        for (line_no, line) in data.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            let Some((source, latin)) = line.split_once('\t') else {
                return Err(AlignmentError::invalid_input(format!(
                    "{}:{}: expected `source<TAB>latin`",
                    path.display(),
                    line_no + 1
                )));
            };
            let source = source.to_lowercase().chars().collect::<Vec<_>>();
            let latin = latin.trim().to_string();
            match source.as_slice() {
                [] => continue,
                [c] => {
                    self.chars.insert(*c, latin);
                }
                _ => self.sequences.push((source, latin)),
            }
            loaded += 1;
        }
        self.sequences
            .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
        tracing::debug!(path = %path.display(), entries = loaded, "romanization table loaded");
        Ok(self)
    }

    /// Transliterate `text` and keep only `[a-z' ]`, collapsing spaces.
    pub fn romanize(&self, text: &str) -> String {
        let chars = text.to_lowercase().chars().collect::<Vec<_>>();
        let mut latin = String::with_capacity(chars.len());
        let mut idx = 0;
        'outer: while idx < chars.len() {
            for (source, target) in &self.sequences {
                if chars[idx..].starts_with(source) {
                    latin.push_str(target);
                    idx += source.len();
                    continue 'outer;
                }
            }
            let c = chars[idx];
            if c.is_ascii() {
                latin.push(c);
            } else if let Some(target) = self.chars.get(&c) {
                latin.push_str(target);
            } else if c.is_whitespace() {
                latin.push(' ');
            }
            idx += 1;
        }
        restrict_to_alignment_alphabet(&latin)
    }
}

fn restrict_to_alignment_alphabet(latin: &str) -> String {
    let filtered = latin
        .to_ascii_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c == '\'' {
                c
            } else {
                ' '
            }
        })
        .collect::<String>();
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}
