//! Response shaper (spec §4.6): normalize, truncate, and segment assistant
//! text for a constrained display.
//!
//! Favors hand-written scanning over pulling `regex` into a hot path, the
//! same way frame boundaries are parsed by hand elsewhere in this crate;
//! the sentence-terminator search here is a manual reverse scan rather
//! than a compiled pattern.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
pub struct ShapeLimits {
    pub max_segment_chars: usize,
    pub max_segments: usize,
    pub max_total_chars: usize,
}

impl Default for ShapeLimits {
    fn default() -> Self {
        ShapeLimits {
            max_segment_chars: 240,
            max_segments: 8,
            max_total_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    pub text: String,
    pub continuation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapedReply {
    pub full_text: String,
    pub segments: Vec<Segment>,
    pub truncated: bool,
}

const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Strip ASCII control characters except tab/newline; normalize newlines;
/// collapse 3+ consecutive blank lines to exactly one blank line; trim
/// outer whitespace.
fn normalize(input: &str) -> String {
    let mut unified = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                unified.push('\n');
            }
            '\t' | '\n' => unified.push(c),
            c if c.is_ascii_control() => {}
            c => unified.push(c),
        }
    }

    let mut collapsed = String::with_capacity(unified.len());
    let mut newline_run = 0usize;
    for c in unified.chars() {
        if c == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                collapsed.push(c);
            }
        } else {
            newline_run = 0;
            collapsed.push(c);
        }
    }

    collapsed.trim().to_string()
}

/// Split `paragraph` into chunks of at most `max_chars`, preferring to break
/// right after the latest sentence terminator at or before the limit.
fn split_paragraph(paragraph: &str, max_chars: usize) -> Vec<String> {
    if paragraph.chars().count() <= max_chars || max_chars == 0 {
        return vec![paragraph.to_string()];
    }

    let chars: Vec<char> = paragraph.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let remaining = chars.len() - start;
        if remaining <= max_chars {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        let window_end = start + max_chars;
        let mut break_at = None;
        // Scan backward from window_end for the latest terminator.
        for i in (start..window_end).rev() {
            if SENTENCE_TERMINATORS.contains(&chars[i]) {
                break_at = Some(i + 1);
                break;
            }
        }

        let cut = break_at.unwrap_or(window_end);
        let chunk: String = chars[start..cut].iter().collect();
        chunks.push(chunk.trim_start().to_string());
        start = cut;
    }

    chunks
}

/// Normalize, truncate, and segment `text` into a `ShapedReply`.
pub fn shape(text: &str, limits: ShapeLimits) -> ShapedReply {
    let normalized = normalize(text);

    let (body, truncated) = if normalized.chars().count() > limits.max_total_chars {
        let cut: String = normalized.chars().take(limits.max_total_chars).collect();
        (cut, true)
    } else {
        (normalized, false)
    };

    let mut segments = Vec::new();
    'paragraphs: for paragraph in body.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        for (i, chunk) in split_paragraph(paragraph, limits.max_segment_chars)
            .into_iter()
            .enumerate()
        {
            if segments.len() >= limits.max_segments {
                break 'paragraphs;
            }
            segments.push(Segment {
                index: segments.len(),
                text: chunk,
                continuation: i > 0,
            });
        }
    }

    ShapedReply {
        full_text: body,
        segments,
        truncated,
    }
}
