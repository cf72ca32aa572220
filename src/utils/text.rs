// utils/text.rs

/// Truncate a message body to a toast-sized preview without splitting a
/// character, appending an ellipsis when anything was cut.
pub fn truncate_preview(content: &str, max_chars: usize) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }

    let mut preview: String = trimmed.chars().take(max_chars).collect();
    preview.push('…');
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_untouched() {
        assert_eq!(truncate_preview("hello", 80), "hello");
    }

    #[test]
    fn long_content_is_cut_with_ellipsis() {
        let preview = truncate_preview(&"x".repeat(100), 10);
        assert_eq!(preview, format!("{}…", "x".repeat(10)));
    }

    #[test]
    fn multibyte_content_is_not_split() {
        let preview = truncate_preview("héllo wörld", 5);
        assert_eq!(preview, "héllo…");
    }
}
