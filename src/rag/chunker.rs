//! Fixed-window chunking with exact character overlap.
//!
//! Windows are measured in `char`s, so multi-byte text never splits inside a
//! code point. Every window except the last is exactly `chunk_size` long and
//! the next one starts `chunk_size - overlap` characters later.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::document::Document;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkConfigError {
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,
    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// One window of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Position of the segment within its document, starting at 0.
    pub index: usize,
    pub text: String,
    /// Character offset of the first character in the document.
    pub char_start: usize,
    /// Number of leading characters shared with the previous segment.
    pub overlap: usize,
}

impl Segment {
    /// The part of the segment not already covered by its predecessor.
    pub fn fresh_text(&self) -> &str {
        match self.text.char_indices().nth(self.overlap) {
            Some((byte_offset, _)) => &self.text[byte_offset..],
            None => "",
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Stable id for a segment: re-ingesting the same source overwrites it.
pub fn segment_id(source: &str, index: usize) -> String {
    let digest = Sha256::digest(source.as_bytes());
    let prefix = hex::encode(&digest[..8]);
    format!("{}-{}", prefix, index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkSplitter {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkConfigError> {
        if chunk_size == 0 {
            return Err(ChunkConfigError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkConfigError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Lazily splits `document`. Calling again (or cloning the iterator)
    /// restarts from the beginning.
    pub fn split<'a>(&self, document: &'a Document) -> Segments<'a> {
        self.split_text(&document.text)
    }

    pub fn split_text<'a>(&self, text: &'a str) -> Segments<'a> {
        Segments {
            text,
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            byte_start: 0,
            char_start: 0,
            index: 0,
            finished: text.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Segments<'a> {
    text: &'a str,
    chunk_size: usize,
    overlap: usize,
    byte_start: usize,
    char_start: usize,
    index: usize,
    finished: bool,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.finished {
            return None;
        }

        let rest = &self.text[self.byte_start..];
        let step = self.chunk_size - self.overlap;

        let mut next_start = None;
        let mut end = rest.len();
        for (count, (offset, _)) in rest.char_indices().enumerate() {
            if count == step {
                next_start = Some(offset);
            }
            if count == self.chunk_size {
                end = offset;
                break;
            }
        }

        let segment = Segment {
            index: self.index,
            text: rest[..end].to_string(),
            char_start: self.char_start,
            overlap: if self.index == 0 { 0 } else { self.overlap },
        };

        match next_start {
            Some(offset) if end < rest.len() => {
                self.byte_start += offset;
                self.char_start += step;
                self.index += 1;
            }
            _ => self.finished = true,
        }

        Some(segment)
    }
}

impl std::iter::FusedIterator for Segments<'_> {}
