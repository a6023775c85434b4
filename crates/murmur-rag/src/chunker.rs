//! Boundary-aware text chunking for vector indexing.
//!
//! Splits normalized text into overlapping windows, preferring to cut at
//! natural boundaries (paragraph, sentence, clause, word) near the end of
//! each window. Deterministic for identical input and parameters.

use regex::Regex;

/// One chunk of source text with its character span in the normalized input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    /// The chunk content, trimmed of surrounding whitespace.
    pub text: String,
    /// Start offset in the normalized source text.
    pub start: usize,
    /// End offset (exclusive) in the normalized source text.
    pub end: usize,
}

/// Splits raw text into overlapping, boundary-aware segments.
#[derive(Debug)]
pub struct TextChunker {
    target_size: usize,
    overlap: usize,
    min_size: usize,
    respect_boundaries: bool,
    blank_lines: Regex,
    spaces: Regex,
}

/// How far back from a window's end to look for a natural boundary.
const BOUNDARY_WINDOW: usize = 200;

/// Minimum offset into the search window for a boundary to be usable. Keeps
/// chunks from collapsing to a few characters when a boundary sits right at
/// the window start.
const MIN_BOUNDARY_POS: usize = 50;

impl TextChunker {
    /// Create a chunker with explicit sizes, all in characters.
    pub fn new(target_size: usize, overlap: usize, min_size: usize) -> Self {
        Self {
            target_size: target_size.max(1),
            overlap,
            min_size,
            respect_boundaries: true,
            blank_lines: Regex::new(r"\n{3,}").unwrap(),
            spaces: Regex::new(r" {2,}").unwrap(),
        }
    }

    /// Disable boundary detection; every cut lands exactly at the target size.
    pub fn without_boundaries(mut self) -> Self {
        self.respect_boundaries = false;
        self
    }

    /// Split `text` into chunks.
    ///
    /// Whitespace is normalized first (runs of blank lines collapse to one
    /// paragraph break, runs of spaces to one space). Consecutive chunks
    /// overlap by stepping back `overlap` characters from each chunk's end.
    /// Forward progress is guaranteed: the same start position is never
    /// emitted twice.
    pub fn split(&self, text: &str) -> Vec<ChunkSpan> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let text = self.normalize(text);
        let len = text.len();

        if len <= self.target_size {
            return vec![ChunkSpan {
                text: text.trim().to_string(),
                start: 0,
                end: len,
            }];
        }

        let mut chunks: Vec<ChunkSpan> = Vec::new();
        let mut start = 0usize;

        while start < len {
            let mut end = floor_char_boundary(&text, (start + self.target_size).min(len));

            if end < len && self.respect_boundaries {
                end = self.find_split_point(&text, start, end);
            }

            let slice = text[start..end].trim();
            let is_tail = start + self.target_size >= len;
            if slice.len() >= self.min_size || is_tail {
                chunks.push(ChunkSpan {
                    text: slice.to_string(),
                    start,
                    end,
                });
            }

            let last_start = chunks.last().map(|c| c.start).unwrap_or(0);
            let next = floor_char_boundary(&text, end.saturating_sub(self.overlap));
            start = if next <= last_start && !chunks.is_empty() {
                end
            } else if next == start {
                // No progress possible at this position; jump past the window.
                end
            } else {
                next
            };
        }

        chunks
    }

    /// Normalize whitespace while preserving paragraph structure.
    fn normalize(&self, text: &str) -> String {
        let text = text.replace("\r\n", "\n");
        let text = self.blank_lines.replace_all(&text, "\n\n");
        let text = self.spaces.replace_all(&text, " ");
        text.trim().to_string()
    }

    /// Find a natural split point in the trailing window before `end`.
    ///
    /// Preference order: paragraph break, sentence-ending punctuation,
    /// clause-separating punctuation, plain word boundary. Falls back to a
    /// hard cut at `end` when nothing usable exists.
    fn find_split_point(&self, text: &str, start: usize, end: usize) -> usize {
        let search_start = floor_char_boundary(text, start.max(end.saturating_sub(BOUNDARY_WINDOW)));
        let window = &text[search_start..end];

        // Paragraph break.
        if let Some(pos) = window.rfind("\n\n") {
            if pos > MIN_BOUNDARY_POS {
                return search_start + pos + 2;
            }
        }

        // Sentence-ending punctuation: take the latest match of any pattern.
        let sentence_patterns = [". ", "! ", "? ", ".\n", "!\n", "?\n"];
        let mut best: Option<usize> = None;
        for pattern in sentence_patterns {
            if let Some(pos) = window.rfind(pattern) {
                if best.map(|b| pos > b).unwrap_or(true) {
                    best = Some(pos);
                }
            }
        }
        if let Some(pos) = best {
            if pos > MIN_BOUNDARY_POS {
                return search_start + pos + 2;
            }
        }

        // Clause-separating punctuation.
        let clause_patterns = [", ", "; ", ":\n", " - "];
        for pattern in clause_patterns {
            if let Some(pos) = window.rfind(pattern) {
                if pos > MIN_BOUNDARY_POS {
                    return search_start + pos + pattern.len();
                }
            }
        }

        // Plain word boundary.
        if let Some(pos) = window.rfind(' ') {
            if pos > MIN_BOUNDARY_POS {
                return search_start + pos + 1;
            }
        }

        end
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(2000, 200, 400)
    }
}

/// Largest index `<= at` that lands on a UTF-8 char boundary.
fn floor_char_boundary(text: &str, at: usize) -> usize {
    let mut at = at.min(text.len());
    while at > 0 && !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}
