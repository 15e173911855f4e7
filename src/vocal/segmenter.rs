//! Text segmentation into word-level units.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One word of the source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    /// Position in the segment sequence (0-based)
    pub index: usize,
    /// The word, without surrounding punctuation
    pub text: String,
    /// Character (not byte) offsets of `text` in the source
    pub span: Range<usize>,
}

/// Splits text on whitespace and trims surrounding punctuation
///
/// Tokens with no letters (verse numbers, stray marks) are dropped. Segments
/// keep source order and are never merged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSegmenter;

impl TextSegmenter {
    pub fn new() -> Self {
        Self
    }

    pub fn segment(&self, text: &str) -> Vec<TextSegment> {
        let chars: Vec<char> = text.chars().collect();
        let mut segments = Vec::new();
        let mut pos = 0;

        while pos < chars.len() {
            if chars[pos].is_whitespace() {
                pos += 1;
                continue;
            }
            let token_start = pos;
            while pos < chars.len() && !chars[pos].is_whitespace() {
                pos += 1;
            }
            let token = &chars[token_start..pos];

            let Some(first) = token.iter().position(|c| c.is_alphanumeric()) else {
                continue;
            };
            let last = token
                .iter()
                .rposition(|c| c.is_alphanumeric())
                .unwrap_or(first);
            let word = &token[first..=last];
            if !word.iter().any(|c| c.is_alphabetic()) {
                continue;
            }

            segments.push(TextSegment {
                index: segments.len(),
                text: word.iter().collect(),
                span: token_start + first..token_start + last + 1,
            });
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn words(text: &str) -> Vec<String> {
        TextSegmenter::new()
            .segment(text)
            .into_iter()
            .map(|s| s.text)
            .collect()
    }

    #[test]
    fn test_basic_words() {
        assert_eq!(words("Deus misereatur nostri"), vec!["Deus", "misereatur", "nostri"]);
    }

    #[test]
    fn test_punctuation_and_verse_numbers() {
        assert_eq!(
            words("1 Deus, misereatur nostri, et benedicat nobis: *"),
            vec!["Deus", "misereatur", "nostri", "et", "benedicat", "nobis"]
        );
    }

    #[test]
    fn test_spans_are_char_offsets() {
        let text = "«Glória» Patri";
        let segments = TextSegmenter::new().segment(text);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "Glória");
        assert_eq!(segments[0].span, 1..7);
        let chars: Vec<char> = text.chars().collect();
        let from_span: String = chars[segments[1].span.clone()].iter().collect();
        assert_eq!(from_span, "Patri");
        assert_eq!(segments[1].index, 1);
    }

    #[test]
    fn test_empty_text() {
        assert!(words("   \n\t ").is_empty());
        assert!(words("1 2 3 —").is_empty());
    }

    #[test]
    fn test_inner_punctuation_kept() {
        assert_eq!(words("(Israel-que)."), vec!["Israel-que"]);
    }
}
