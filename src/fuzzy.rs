use regex::{Regex, RegexBuilder};

/// Boundary-anchored subsequence match.
///
/// The first query character must land on a word boundary of `candidate`
/// (string start, after a separator, or a lower→upper camel hump); the rest
/// must follow in order anywhere after it. Case-insensitive; whitespace in the
/// query is ignored, and an empty query matches everything.
pub fn fuzzy_match(query: &str, candidate: &str) -> bool {
    let q: Vec<char> = query
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    let Some(&first) = q.first() else {
        return true;
    };

    let cand: Vec<char> = candidate.chars().collect();
    (0..cand.len())
        .filter(|&i| is_boundary(&cand, i) && lower_eq(cand[i], first))
        .any(|i| is_subsequence(&q[1..], &cand[i + 1..]))
}

fn is_boundary(chars: &[char], i: usize) -> bool {
    if i == 0 {
        return true;
    }
    let prev = chars[i - 1];
    let cur = chars[i];
    if !prev.is_alphanumeric() {
        return true;
    }
    prev.is_lowercase() && cur.is_uppercase()
}

fn lower_eq(c: char, lower: char) -> bool {
    c.to_lowercase().eq(std::iter::once(lower))
}

fn is_subsequence(needle: &[char], haystack: &[char]) -> bool {
    let mut it = haystack.iter();
    needle.iter().all(|&n| it.any(|&h| lower_eq(h, n)))
}

/// Content prefilter for unopened files: query characters joined by `\w*`,
/// case-insensitive, anchored at string start or after whitespace, `_` or `-`.
///
/// `None` for an empty query (nothing to filter on).
pub fn prefilter_regex(query: &str) -> Option<Regex> {
    let parts: Vec<String> = query
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| regex::escape(&c.to_string()))
        .collect();
    if parts.is_empty() {
        return None;
    }
    let pattern = format!(r"(?:^|[\s_\-]){}", parts.join(r"\w*"));
    RegexBuilder::new(&pattern).case_insensitive(true).build().ok()
}
