/// Maximum stored length for prompts and summaries.
pub const PROMPT_MAX_LEN: usize = 140;

/// Fallback slug when the input contains no usable characters.
const SLUG_FALLBACK: &str = "feature";

/// Lowercase the input, collapse non-alphanumeric runs into single hyphens,
/// trim hyphens, and cap the length. Empty results map to a fixed token so
/// the slug is always a valid git branch-name component.
pub fn slugify(text: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for ch in text.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else {
            pending_hyphen = true;
        }
    }
    let mut slug: String = slug.chars().take(max_len).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        SLUG_FALLBACK.to_string()
    } else {
        slug
    }
}

/// Collapse all whitespace runs to single spaces and truncate to `max_len`
/// characters, marking truncation with an ellipsis.
pub fn single_line(text: &str, max_len: usize) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.chars().count() <= max_len {
        return joined;
    }
    let cut: String = joined.chars().take(max_len.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}

/// Normalization applied to every prompt/summary before storage.
pub fn normalize_prompt(text: &str) -> String {
    single_line(text, PROMPT_MAX_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_runs_and_trims() {
        assert_eq!(slugify("Add user AUTH!! (v2)", 40), "add-user-auth-v2");
        assert_eq!(slugify("  --hello--world--  ", 40), "hello-world");
    }

    #[test]
    fn slugify_caps_length_without_trailing_hyphen() {
        assert_eq!(slugify("ab cd", 3), "ab");
    }

    #[test]
    fn slugify_falls_back_on_empty_input() {
        assert_eq!(slugify("", 40), "feature");
        assert_eq!(slugify("!!!", 40), "feature");
    }

    #[test]
    fn single_line_collapses_whitespace() {
        assert_eq!(single_line("a\n  b\tc", 120), "a b c");
    }

    #[test]
    fn single_line_truncates_with_ellipsis() {
        let out = single_line("abcdefgh", 5);
        assert_eq!(out, "abcd…");
        assert_eq!(out.chars().count(), 5);
    }

    #[test]
    fn short_input_is_untouched() {
        assert_eq!(single_line("short", 140), "short");
    }
}
