//! Recursive character text splitter.
//!
//! Splits on the coarsest separator present (paragraph, line, sentence,
//! word, character) and recurses into pieces that are still too long, then
//! greedily merges neighbouring pieces into chunks of at most `chunk_size`
//! characters with roughly `chunk_overlap` characters carried over.

use std::collections::VecDeque;

use supportdesk_core::error::KnowledgeError;

const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, KnowledgeError> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(KnowledgeError::Ingestion(format!(
                "invalid chunking: size {chunk_size}, overlap {chunk_overlap}"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `text` into trimmed, non-empty chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, rest) = pick_separator(text, separators);

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator).map(String::from).collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending, separator));
                pending.clear();
            }
            if rest.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(&piece, rest));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending, separator));
        }
        chunks
    }

    /// Greedily join small pieces, keeping an overlapping tail between chunks.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joiner = if current.is_empty() { 0 } else { sep_len };

            if total + len + joiner > self.chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current, separator);

                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if current.is_empty() { 0 } else { sep_len }
                            > self.chunk_size)
                {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if current.is_empty() { 0 } else { sep_len };
                }
            }

            let joiner = if current.is_empty() { 0 } else { sep_len };
            current.push_back(piece.as_str());
            total += len + joiner;
        }

        push_joined(&mut docs, &current, separator);
        docs
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [&'a str]) -> (&'a str, &'a [&'a str]) {
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() || text.contains(sep) {
            return (*sep, &separators[i + 1..]);
        }
    }
    ("", &[])
}

fn push_joined(docs: &mut Vec<String>, parts: &VecDeque<&str>, separator: &str) {
    let joined = parts.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
