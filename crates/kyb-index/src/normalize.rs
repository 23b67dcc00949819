//! Text normalization and term search
//!
//! Matching always happens on normalized text: lowercased, punctuation turned
//! into spaces, whitespace collapsed. Offsets reported by the matcher are byte
//! offsets into the normalized string.

/// Normalize text for matching
///
/// Apostrophes and ampersands are kept so that "joe's" and "b&b" survive as
/// single tokens; every other non-alphanumeric character becomes a space.
///
/// # Examples
///
/// ```
/// use kyb_index::normalize::normalize;
///
/// assert_eq!(normalize("  Cash-Only, OFFSHORE!! "), "cash only offshore");
/// ```
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() || ch == '\'' || ch == '&' {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }

    out
}

/// Normalize and cap the input at `max_chars` characters
///
/// The cap bounds the work any single request can cause in the matcher and the
/// pattern library.
pub fn normalize_capped(text: &str, max_chars: usize) -> String {
    let normalized = normalize(text);
    match normalized.char_indices().nth(max_chars) {
        Some((cut, _)) => normalized[..cut].trim_end().to_string(),
        None => normalized,
    }
}

/// Largest char boundary `<= idx`
pub fn floor_boundary(text: &str, idx: usize) -> usize {
    let mut idx = idx.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Smallest char boundary `>= idx`
pub fn ceil_boundary(text: &str, idx: usize) -> usize {
    let mut idx = idx.min(text.len());
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Up to `radius` bytes either side of `[start, end)`, snapped to char boundaries
pub fn context_window(text: &str, start: usize, end: usize, radius: usize) -> String {
    let from = floor_boundary(text, start.saturating_sub(radius));
    let to = ceil_boundary(text, end.saturating_add(radius));
    text[from..to].trim().to_string()
}

/// Word-boundary occurrences of `needle` in `haystack`
///
/// Both arguments must already be normalized. An occurrence counts only when
/// it is not glued to a neighbouring alphanumeric character, so "cafe" does not
/// match inside "cafeteria".
pub fn find_term(haystack: &str, needle: &str) -> Vec<(usize, usize)> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }

    haystack
        .match_indices(needle)
        .filter(|(start, matched)| {
            let end = start + matched.len();
            let before_ok = haystack[..*start]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric());
            let after_ok = haystack[end..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric());
            before_ok && after_ok
        })
        .map(|(start, matched)| (start, start + matched.len()))
        .collect()
}

/// Whether `needle` occurs at a word boundary in `haystack`
pub fn contains_term(haystack: &str, needle: &str) -> bool {
    !find_term(haystack, needle).is_empty()
}

/// Words of a normalized string with their byte spans
pub fn words(text: &str) -> Vec<(usize, usize, &str)> {
    let mut out = Vec::new();
    let mut offset = 0;
    for word in text.split(' ') {
        if !word.is_empty() {
            out.push((offset, offset + word.len(), word));
        }
        offset += word.len() + 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_punctuation() {
        assert_eq!(normalize("Joe's Coffee-Shop."), "joe's coffee shop");
        assert_eq!(normalize("B&B   Inn"), "b&b inn");
        assert_eq!(normalize("!!!"), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_normalize_unicode() {
        assert_eq!(normalize("CAFÉ Crème"), "café crème");
    }

    #[test]
    fn test_normalize_capped() {
        let capped = normalize_capped("alpha beta gamma", 10);
        assert_eq!(capped, "alpha beta");
        assert_eq!(normalize_capped("short", 100), "short");
    }

    #[test]
    fn test_find_term_word_boundaries() {
        let text = "cafe and cafeteria near the cafe";
        assert_eq!(find_term(text, "cafe"), vec![(0, 4), (28, 32)]);
        assert!(find_term(text, "teria").is_empty());
    }

    #[test]
    fn test_find_term_multiword() {
        let text = "offshore nominee company no physical operations";
        assert_eq!(find_term(text, "no physical operations"), vec![(25, 47)]);
    }

    #[test]
    fn test_context_window_char_boundaries() {
        let text = "ééé coffee ééé";
        let (start, end) = find_term(text, "coffee")[0];
        let ctx = context_window(text, start, end, 3);
        assert!(ctx.contains("coffee"));
    }

    #[test]
    fn test_words() {
        let w = words("no physical operations");
        assert_eq!(w.len(), 3);
        assert_eq!(w[1], (3, 11, "physical"));
    }
}
