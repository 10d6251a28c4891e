//! Recursive, overlap-aware text splitting for retrieval.
//!
//! Documents are cut into fragments small enough to embed, while trying hard to
//! keep paragraphs, then lines, then words together. Consecutive fragments
//! share a tail of up to `chunk_overlap` characters so that a sentence cut at a
//! fragment boundary is still retrievable from either side.
//!
//! # Algorithm
//!
//! *   **Separator selection**: at each recursion level the first separator
//!     (from coarsest to finest) that occurs in the text is used. The empty
//!     separator always matches and splits into single characters.
//! *   **Kept separators**: each separator stays attached to the start of the
//!     piece that follows it, so no text is lost between pieces.
//! *   **Recursion**: a piece whose length is not below `chunk_size` is split
//!     again with the remaining, finer separators.
//! *   **Merging**: small pieces are merged greedily into fragments of at most
//!     `chunk_size` characters. When a fragment is emitted, pieces are dropped
//!     from its front until what remains is no longer than `chunk_overlap` and
//!     the next piece fits; that remainder opens the next fragment.
//!
//! All lengths are counted in characters (Unicode scalar values), and fragments
//! always end on a character boundary. Fragments are whitespace-trimmed and
//! empty ones are discarded.
//!
//! # Usage
//!
//! ```
//! use studyrag_context::text::RecursiveSplitter;
//!
//! let splitter = RecursiveSplitter::new(1000, 200).unwrap();
//!
//! let text = "A".repeat(2500);
//! let fragments = splitter.split_text(&text);
//!
//! assert_eq!(fragments.len(), 3);
//! assert!(fragments.iter().all(|f| f.chars().count() <= 1000));
//! // Each fragment after the first starts with the tail of its predecessor
//! assert_eq!(&fragments[1][..200], &fragments[0][800..]);
//! ```
use regex::Regex;
use serde::Serialize;
use std::collections::VecDeque;

/// Default chunk size, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive fragments, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Separators tried from coarsest to finest.
///
/// - `\n\n`: paragraph breaks
/// - `\n`: line breaks
/// - ` `: words
/// - empty: single characters, which always succeeds
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Invalid splitter settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitterError {
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

/// A separator and the pattern that finds it.
#[derive(Debug, Clone)]
struct Separator {
    text: String,
    /// `None` for the empty, character-level separator
    pattern: Option<Regex>,
}

impl Separator {
    fn new(text: &str) -> Self {
        let pattern = if text.is_empty() {
            None
        } else {
            // Escaped input is always a valid pattern
            Regex::new(&regex::escape(text)).ok()
        };
        Self {
            text: text.to_string(),
            pattern,
        }
    }

    fn occurs_in(&self, text: &str) -> bool {
        match &self.pattern {
            Some(pattern) => pattern.is_match(text),
            None => true,
        }
    }

    /// Split `text`, keeping each separator at the start of the following piece.
    /// Empty pieces are dropped.
    fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let Some(pattern) = &self.pattern else {
            return text
                .char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect();
        };

        let mut pieces = Vec::new();
        let mut start = 0;
        for mat in pattern.find_iter(text) {
            if mat.start() > start {
                pieces.push(&text[start..mat.start()]);
            }
            start = mat.start();
        }
        if start < text.len() {
            pieces.push(&text[start..]);
        }
        pieces.retain(|p| !p.is_empty());
        pieces
    }
}

/// A fragment produced by [`RecursiveSplitter::get_chunks`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    /// Position of this fragment in the split output (0-indexed).
    pub sequence: usize,
    /// Length of `text` in characters.
    pub length: usize,
    /// The trimmed fragment text.
    pub text: String,
}

/// Splits text recursively on a list of separators and merges the pieces back
/// into overlapping fragments.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<Separator>,
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| Separator::new(s)).collect(),
        }
    }
}

impl RecursiveSplitter {
    /// Creates a splitter with [`DEFAULT_SEPARATORS`].
    ///
    /// # Errors
    ///
    /// Fails when `chunk_size` is zero or `chunk_overlap` is not smaller than
    /// `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, SplitterError> {
        if chunk_size == 0 {
            return Err(SplitterError::ZeroChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(SplitterError::OverlapTooLarge {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        })
    }

    /// Replaces the separator list. Separators are matched literally and tried
    /// in the given order; include `""` last to guarantee every piece can be
    /// brought under `chunk_size`.
    pub fn with_separators<S: AsRef<str>>(self, separators: &[S]) -> Self {
        Self {
            separators: separators.iter().map(|s| Separator::new(s.as_ref())).collect(),
            ..self
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into trimmed, non-empty fragments.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursively(text, &self.separators)
    }

    /// Split `text` into numbered fragments.
    pub fn get_chunks(&self, text: &str) -> Vec<TextChunk> {
        self.split_text(text)
            .into_iter()
            .enumerate()
            .map(|(sequence, text)| TextChunk {
                sequence,
                length: text.chars().count(),
                text,
            })
            .collect()
    }

    fn split_recursively(&self, text: &str, separators: &[Separator]) -> Vec<String> {
        let mut fragments = Vec::new();

        // Pick the first separator present in the text; the finer ones are
        // kept for pieces that are still too long.
        let mut separator = separators.last();
        let mut finer: &[Separator] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.text.is_empty() {
                separator = Some(candidate);
                break;
            }
            if candidate.occurs_in(text) {
                separator = Some(candidate);
                finer = &separators[i + 1..];
                break;
            }
        }

        let pieces = match separator {
            Some(separator) => separator.split(text),
            None => vec![text],
        };

        let mut small: Vec<&str> = Vec::new();
        for piece in pieces {
            if piece.chars().count() < self.chunk_size {
                small.push(piece);
                continue;
            }

            if !small.is_empty() {
                fragments.extend(self.merge(&small));
                small.clear();
            }
            if finer.is_empty() {
                if let Some(fragment) = trimmed(piece) {
                    fragments.push(fragment);
                }
            } else {
                fragments.extend(self.split_recursively(piece, finer));
            }
        }
        if !small.is_empty() {
            fragments.extend(self.merge(&small));
        }

        fragments
    }

    /// Greedily merge pieces into fragments of at most `chunk_size` characters,
    /// carrying up to `chunk_overlap` characters into the next fragment.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut fragments = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = piece.chars().count();

            if total + len > self.chunk_size && !current.is_empty() {
                if let Some(fragment) = joined(&current) {
                    fragments.push(fragment);
                }
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match current.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            current.push_back((piece, len));
            total += len;
        }

        if let Some(fragment) = joined(&current) {
            fragments.push(fragment);
        }
        fragments
    }
}

/// Decode bytes as UTF-8, dropping invalid sequences instead of replacing them.
pub fn decode_utf8_dropping_invalid(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

fn joined(pieces: &VecDeque<(&str, usize)>) -> Option<String> {
    let text: String = pieces.iter().map(|(piece, _)| *piece).collect();
    trimmed(&text)
}

fn trimmed(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn test_single_paragraph_with_overlap() {
        let splitter = RecursiveSplitter::new(1000, 200).unwrap();
        let text = "A".repeat(2500);
        let fragments = splitter.split_text(&text);

        assert_eq!(fragments.len(), 3);
        assert_eq!(char_len(&fragments[0]), 1000);
        assert_eq!(char_len(&fragments[1]), 1000);
        assert_eq!(char_len(&fragments[2]), 900);

        for pair in fragments.windows(2) {
            let tail: String = pair[0].chars().skip(char_len(&pair[0]) - 200).collect();
            assert!(pair[1].starts_with(&tail));
        }
    }

    #[test]
    fn test_short_text_is_one_fragment() {
        let splitter = RecursiveSplitter::default();
        let fragments = splitter.split_text("  A short note about Rust.\n");
        assert_eq!(fragments, vec!["A short note about Rust.".to_string()]);
    }

    #[test]
    fn test_empty_and_whitespace_only() {
        let splitter = RecursiveSplitter::new(10, 2).unwrap();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text(" \n\n \t \n").is_empty());
    }

    #[test]
    fn test_paragraphs_kept_together() {
        let splitter = RecursiveSplitter::new(30, 0).unwrap();
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird one.";
        let fragments = splitter.split_text(text);

        assert_eq!(
            fragments,
            vec![
                "First paragraph here.".to_string(),
                "Second paragraph here.".to_string(),
                "Third one.".to_string(),
            ]
        );
    }

    #[test]
    fn test_separator_kept_with_following_piece() {
        let separator = Separator::new("\n\n");
        let pieces = separator.split("one\n\ntwo\n\nthree");
        assert_eq!(pieces, vec!["one", "\n\ntwo", "\n\nthree"]);

        let separator = Separator::new(" ");
        assert_eq!(separator.split(" lead"), vec![" lead"]);
    }

    #[test]
    fn test_words_merge_with_overlap() {
        let splitter = RecursiveSplitter::new(10, 4).unwrap();
        let fragments = splitter.split_text("aa bb cc dd ee ff");

        assert_eq!(
            fragments,
            vec![
                "aa bb cc".to_string(),
                "cc dd ee".to_string(),
                "ee ff".to_string(),
            ]
        );
        assert!(fragments.iter().all(|f| char_len(f) <= 10));
    }

    #[test]
    fn test_long_line_falls_through_to_characters() {
        let splitter = RecursiveSplitter::new(8, 0).unwrap();
        let text = "short\nabcdefghijklmnop";
        let fragments = splitter.split_text(text);

        // The line break opens the first character window and is trimmed away
        assert_eq!(
            fragments,
            vec![
                "short".to_string(),
                "abcdefg".to_string(),
                "hijklmno".to_string(),
                "p".to_string(),
            ]
        );
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let splitter = RecursiveSplitter::new(5, 1).unwrap();
        let text = "ééééééééé";
        let fragments = splitter.split_text(text);

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], "ééééé");
        assert_eq!(fragments[1], "ééééé");
        assert!(fragments.iter().all(|f| char_len(f) <= 5));
    }

    #[test]
    fn test_every_fragment_within_budget() {
        let splitter = RecursiveSplitter::new(120, 30).unwrap();
        let text = (0..200)
            .map(|i| format!("Sentence number {i} talks about vectors."))
            .collect::<Vec<_>>()
            .join(" ");
        let fragments = splitter.split_text(&text);

        assert!(fragments.len() > 1);
        assert!(fragments.iter().all(|f| char_len(f) <= 120));
        assert!(fragments.iter().all(|f| !f.trim().is_empty()));
    }

    #[test]
    fn test_get_chunks_numbering() {
        let splitter = RecursiveSplitter::new(1000, 200).unwrap();
        let chunks = splitter.get_chunks(&"A".repeat(2500));

        let sequences: Vec<usize> = chunks.iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(chunks[2].length, 900);
    }

    #[test]
    fn test_custom_separators() {
        let splitter = RecursiveSplitter::new(12, 0)
            .unwrap()
            .with_separators(&["|", ""]);
        let fragments = splitter.split_text("alpha|beta|gamma");
        assert_eq!(fragments, vec!["alpha|beta".to_string(), "|gamma".to_string()]);
    }

    #[test]
    fn test_decode_drops_invalid_bytes() {
        let bytes = b"caf\xc3\xa9 \xff\xfebar";
        assert_eq!(decode_utf8_dropping_invalid(bytes), "café bar");
        assert_eq!(decode_utf8_dropping_invalid("\u{FFFD}".as_bytes()), "\u{FFFD}");
    }

    #[test]
    fn test_invalid_settings() {
        assert_eq!(
            RecursiveSplitter::new(0, 0).unwrap_err(),
            SplitterError::ZeroChunkSize
        );
        assert_eq!(
            RecursiveSplitter::new(100, 100).unwrap_err(),
            SplitterError::OverlapTooLarge {
                size: 100,
                overlap: 100
            }
        );
    }
}
