/// Recursive character text splitter used when loading documents.
///
/// Text is split on the first separator that occurs in it, small pieces are
/// merged back up to `chunk_size` characters, and oversized pieces are split
/// again with the remaining separators. Lengths are counted in `char`s.
use std::collections::VecDeque;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

#[derive(Debug, Clone)]
pub struct RecursiveCharacterTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for RecursiveCharacterTextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl RecursiveCharacterTextSplitter {
    /// `chunk_overlap` is clamped below `chunk_size`.
    #[must_use]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: ["\n\n", "\n", " ", ""].map(String::from).to_vec(),
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, s) in separators.iter().enumerate() {
            if s.is_empty() {
                separator = "";
                break;
            }
            if text.contains(s.as_str()) {
                separator = s;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut good: Vec<&str> = Vec::new();
        for piece in splits {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge_splits(&good, separator));
                good.clear();
            }
            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(piece, remaining));
            }
        }
        if !good.is_empty() {
            chunks.extend(self.merge_splits(&good, separator));
        }
        chunks
    }

    /// Greedily join pieces up to `chunk_size`, carrying up to
    /// `chunk_overlap` characters into the next chunk.
    fn merge_splits(&self, splits: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece);
            if !current.is_empty() && total + len + sep_len > self.chunk_size {
                push_joined(&mut docs, &current, separator);
                while let Some(&front) = current.front() {
                    let fits = total + len + sep_len <= self.chunk_size;
                    if total <= self.chunk_overlap && fits {
                        break;
                    }
                    current.pop_front();
                    let removed_sep = if current.is_empty() { 0 } else { sep_len };
                    total -= char_len(front) + removed_sep;
                }
            }
            let joiner = if current.is_empty() { 0 } else { sep_len };
            current.push_back(piece);
            total += len + joiner;
        }
        push_joined(&mut docs, &current, separator);
        docs
    }
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
