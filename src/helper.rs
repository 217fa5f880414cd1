use std::collections::BTreeSet;

use crate::strip_html;

// Helper method for parsing tags
pub fn parse_tags(tags: Option<String>) -> Vec<String> {
    tags.map(|t| {
        t.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// Same as [`parse_tags`], collapsing duplicates.
pub fn parse_tag_set(tags: Option<String>) -> BTreeSet<String> {
    parse_tags(tags).into_iter().collect()
}

/// First `max_len` characters of the text inside an HTML body.
pub fn content_preview(html: &str, max_len: usize) -> String {
    let text = strip_html(html);
    if text.chars().count() <= max_len {
        text
    } else {
        let cut: String = text.chars().take(max_len).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_trimmed_and_empty_ones_dropped() {
        assert_eq!(
            parse_tags(Some(" rust, ,cli ,rust".to_string())),
            ["rust", "cli", "rust"]
        );
        assert_eq!(parse_tag_set(Some("b,a,b".to_string())).len(), 2);
        assert!(parse_tags(None).is_empty());
    }

    #[test]
    fn preview_cuts_on_characters() {
        assert_eq!(content_preview("<p>héllo wörld</p>", 5), "héllo...");
        assert_eq!(content_preview("<p>short</p>", 10), "short");
    }
}
