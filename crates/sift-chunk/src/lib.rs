//! # sift-chunk
//!
//! Deterministic text splitting for the ingest pipeline. The chunker:
//!
//! - Advances a line window of `max_lines` in steps of
//!   `max(1, max_lines − overlap)`, so consecutive chunks share `overlap`
//!   lines of context
//! - Caps every emitted chunk at `max_chunk_size` characters, subdividing
//!   oversized windows with a greedy character split that prefers cutting at
//!   whitespace or punctuation near the cap
//! - Trims each emitted chunk and skips empty ones
//! - Assigns dense indices `0..N-1` in emission order
//!
//! The chunker is stateless; two calls with the same input and configuration
//! produce identical sequences. Lengths are measured in Unicode scalar
//! values, not bytes.

use sift_core::error::ConfigError;
use sift_core::types::Chunk;

/// Chunker configuration. All options have defaults; construction validates
/// the ranges.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Maximum lines per window.
    pub max_lines: usize,
    /// Lines shared between consecutive windows. Must stay below
    /// `max_lines`.
    pub overlap: usize,
    /// Hard cap on emitted chunk length, in characters.
    pub max_chunk_size: usize,
    /// Trimmed pieces shorter than this are dropped. Zero keeps everything.
    pub min_chunk_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_lines: 150,
            overlap: 30,
            max_chunk_size: 10_000,
            min_chunk_size: 0,
        }
    }
}

/// Splits text into overlapping, size-capped fragments.
#[derive(Debug, Clone)]
pub struct LineChunker {
    config: ChunkerConfig,
}

impl Default for LineChunker {
    fn default() -> Self {
        Self {
            config: ChunkerConfig::default(),
        }
    }
}

impl LineChunker {
    /// Build a chunker from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when `max_lines` or
    /// `max_chunk_size` is zero, or `overlap` is not below `max_lines`.
    pub fn new(config: ChunkerConfig) -> Result<Self, ConfigError> {
        if config.max_lines == 0 {
            return Err(ConfigError::InvalidValue {
                option: "max_lines",
                reason: "must be greater than zero".to_string(),
            });
        }
        if config.overlap >= config.max_lines {
            return Err(ConfigError::InvalidValue {
                option: "overlap",
                reason: format!(
                    "must be less than max_lines ({} >= {})",
                    config.overlap, config.max_lines
                ),
            });
        }
        if config.max_chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                option: "max_chunk_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(Self { config })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into chunks with dense indices starting at 0.
    ///
    /// Empty input, or input whose windows trim to nothing, yields an empty
    /// vector.
    #[must_use]
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let lines: Vec<&str> = text.split('\n').collect();
        let step = (self.config.max_lines - self.config.overlap).max(1);
        // A single line past this length forces a character split even when
        // the window as a whole fits.
        let oversize_line = self.config.max_chunk_size * 4 / 5;

        let mut chunks = Vec::new();
        let mut pos = 0;
        while pos < lines.len() {
            let end = (pos + self.config.max_lines).min(lines.len());
            let window = &lines[pos..end];
            let joined = window.join("\n");

            if !joined.trim().is_empty() {
                let needs_split = char_len(&joined) > self.config.max_chunk_size
                    || window.iter().any(|line| char_len(line) > oversize_line);
                if needs_split {
                    for piece in self.char_split(&joined) {
                        push_chunk(&mut chunks, piece);
                    }
                } else {
                    self.emit(&mut chunks, joined.trim());
                }
            }

            pos += step;
        }
        chunks
    }

    /// Walk the string greedily in pieces of up to `max_chunk_size`
    /// characters, preferring to cut after the last whitespace or
    /// punctuation (`,.;!?`) within the final 20% of each window. Pieces
    /// are trimmed; empty or below-minimum pieces are dropped.
    fn char_split(&self, text: &str) -> Vec<String> {
        let cap = self.config.max_chunk_size;
        let chars: Vec<char> = text.chars().collect();
        let mut pieces = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            if chars.len() - start <= cap {
                self.collect_piece(&mut pieces, &chars[start..]);
                break;
            }
            let hard_end = start + cap;
            let scan_from = hard_end - cap / 5;
            let cut = (scan_from..hard_end)
                .rev()
                .find(|&i| is_break_char(chars[i]))
                .map_or(hard_end, |i| i + 1);
            self.collect_piece(&mut pieces, &chars[start..cut]);
            start = cut;
        }
        pieces
    }

    fn collect_piece(&self, pieces: &mut Vec<String>, piece: &[char]) {
        let text: String = piece.iter().collect();
        let trimmed = text.trim();
        if !trimmed.is_empty() && char_len(trimmed) >= self.config.min_chunk_size {
            pieces.push(trimmed.to_string());
        }
    }

    fn emit(&self, chunks: &mut Vec<Chunk>, trimmed: &str) {
        if char_len(trimmed) >= self.config.min_chunk_size {
            push_chunk(chunks, trimmed.to_string());
        }
    }
}

fn push_chunk(chunks: &mut Vec<Chunk>, content: String) {
    let index = u32::try_from(chunks.len()).unwrap_or(u32::MAX);
    chunks.push(Chunk { content, index });
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

const fn is_break_char(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | '.' | ';' | '!' | '?')
}
