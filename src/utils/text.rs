use url::Url;

/// Collapses runs of whitespace into single spaces and trims the ends.
pub fn clean_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Like [`clean_text`] per line, dropping blank lines.
pub fn clean_multiline(value: &str) -> String {
    value
        .lines()
        .map(clean_text)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolves `value` against `base`. Empty input stays empty; unparseable input
/// is returned as-is.
pub fn absolute_url(base: &Url, value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return String::new();
    }
    match base.join(value) {
        Ok(url) => url.to_string(),
        Err(_) => value.to_string(),
    }
}

// Each row lists a base letter followed by its five toned forms:
// huyền, sắc, hỏi, ngã, nặng.
const TONED_VOWELS: [&str; 12] = [
    "aàáảãạ", "ăằắẳẵặ", "âầấẩẫậ", "eèéẻẽẹ", "êềếểễệ", "iìíỉĩị",
    "oòóỏõọ", "ôồốổỗộ", "ơờớởỡợ", "uùúủũụ", "ưừứửữự", "yỳýỷỹỵ",
];

// Vietnamese alphabetical order, with the Latin letters it does not use slotted in.
const ALPHABET: &str = "aăâbcdđeêfghijklmnoôơpqrstuưvwxyz";

/// Splits a lowercase character into its tone-less letter and tone index (0 = level).
fn split_tone(c: char) -> (char, u8) {
    for row in TONED_VOWELS {
        if let Some(tone) = row.chars().position(|t| t == c) {
            let base = row.chars().next().unwrap_or(c);
            return (base, tone as u8);
        }
    }
    (c, 0)
}

fn strip_modifier(c: char) -> char {
    match c {
        'ă' | 'â' => 'a',
        'ê' => 'e',
        'ô' | 'ơ' => 'o',
        'ư' => 'u',
        'đ' => 'd',
        other => other,
    }
}

/// Removes tones and letter modifiers, leaving plain ASCII letters where possible.
pub fn ascii_fold(value: &str) -> String {
    value
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| strip_modifier(split_tone(c).0))
        .collect()
}

/// Lowercase, diacritic-free, dash-separated form of `value`.
pub fn slugify(value: &str) -> String {
    let folded = ascii_fold(value);
    let mut slug = String::with_capacity(folded.len());
    let mut pending_dash = false;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Sort key approximating Vietnamese collation: letters compare by the
/// Vietnamese alphabet first, tones only break ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollationKey {
    primary: Vec<u32>,
    tones: Vec<u8>,
}

pub fn collation_key(value: &str) -> CollationKey {
    let mut primary = Vec::with_capacity(value.len());
    let mut tones = Vec::with_capacity(value.len());

    for c in value.chars().flat_map(char::to_lowercase) {
        let (base, tone) = split_tone(c);
        let rank = match ALPHABET.chars().position(|letter| letter == base) {
            Some(index) => 1_000 + index as u32,
            // punctuation and digits sort before letters, anything else after
            None if (base as u32) < 128 => base as u32,
            None => 2_000 + base as u32,
        };
        primary.push(rank);
        tones.push(tone);
    }

    CollationKey { primary, tones }
}
