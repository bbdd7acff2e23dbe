//! Description sanitizer for remote-supplied tool metadata.
//!
//! Tool descriptions come from untrusted servers and are ultimately fed to
//! an LLM. Strips the character classes used to smuggle invisible
//! instructions:
//! - Unicode Tag block (U+E0000–U+E007F) — invisible to humans, readable by LLMs
//! - Directional overrides (U+202A–U+202E, U+2066–U+2069)
//! - Zero-width characters (U+200B–U+200F, U+2060, U+FEFF)
//! - HTML tags
//!
//! Over-long descriptions are truncated with an ellipsis marker.

use regex::Regex;

use crate::DESCRIPTION_MAX_LENGTH;

/// Sanitizes remote tool descriptions before they enter the catalog.
///
/// All regexes are compiled once at construction time.
#[derive(Debug)]
pub struct DescriptionSanitizer {
    /// Invisible/bidirectional codepoint classes, removed outright.
    invisible: Vec<Regex>,
    /// HTML tag pattern.
    html_tags: Regex,
    /// Maximum character count before truncation.
    max_chars: usize,
}

impl DescriptionSanitizer {
    /// Create a sanitizer with the default 2000-character cap.
    pub fn new() -> Self {
        Self::with_max_chars(DESCRIPTION_MAX_LENGTH)
    }

    /// Create a sanitizer with a custom character cap.
    pub fn with_max_chars(max_chars: usize) -> Self {
        let invisible = vec![
            // Unicode Tag block.
            Regex::new(r"[\u{E0000}-\u{E007F}]").expect("static regex"),
            // Directional overrides and isolates.
            Regex::new(r"[\u{202A}-\u{202E}\u{2066}-\u{2069}]").expect("static regex"),
            // Zero-width characters, word joiner, BOM.
            Regex::new(r"[\u{200B}-\u{200F}\u{2060}\u{FEFF}]").expect("static regex"),
        ];
        let html_tags = Regex::new(r"<[^>]*>").expect("static regex");
        Self {
            invisible,
            html_tags,
            max_chars,
        }
    }

    /// Sanitize a description: strip hostile codepoints and markup,
    /// truncate to the character cap, trim surrounding whitespace.
    pub fn sanitize(&self, description: &str) -> String {
        let mut s = description.to_string();
        for pattern in &self.invisible {
            s = pattern.replace_all(&s, "").into_owned();
        }
        s = self.html_tags.replace_all(&s, "").into_owned();

        if s.chars().count() > self.max_chars {
            s = s.chars().take(self.max_chars).collect::<String>() + "...";
        }

        s.trim().to_string()
    }
}

impl Default for DescriptionSanitizer {
    fn default() -> Self {
        Self::new()
    }
}
