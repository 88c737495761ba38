use regex::Regex;

/// Extract the inner text of the first `<tag>...</tag>` occurrence.
///
/// Case-insensitive, multi-line, non-greedy. An unterminated tag counts
/// as no match. The inner text is returned trimmed.
pub fn extract(raw: &str, tag: &str) -> Option<String> {
    let re = tag_regex(tag)?;
    re.captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Remove every well-formed `<tag>...</tag>` occurrence and trim the rest.
///
/// Runs to a fixpoint: removing a match can splice the surrounding text
/// into a new well-formed tag, so a single pass is not idempotent. Each
/// pass shrinks the input, so the loop terminates.
pub fn strip_all(raw: &str, tag: &str) -> String {
    let Some(re) = tag_regex(tag) else {
        return raw.trim().to_string();
    };
    let mut current = raw.to_string();
    loop {
        let next = re.replace_all(&current, "").into_owned();
        if next == current {
            return current.trim().to_string();
        }
        current = next;
    }
}

fn tag_regex(tag: &str) -> Option<Regex> {
    // Tag names come from a fixed routing table, but escape anyway so an
    // odd name can never produce an invalid pattern.
    let pattern = format!("(?is)<{0}>(.*?)</{0}>", regex::escape(tag));
    Regex::new(&pattern).ok()
}
