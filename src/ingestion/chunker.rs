//! Sliding-window text chunking

/// Text chunker with configurable window size and overlap
///
/// Splits text into overlapping fixed-size character windows. The overlap
/// guarantees no content is lost at a window boundary, including the final
/// window, which always reaches the end of the text.
pub struct TextChunker {
    /// Window size in characters
    chunk_size: usize,
    /// Overlap between consecutive windows
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker
    ///
    /// `chunk_size` must exceed `overlap`; otherwise the stride would be
    /// non-positive and the window would never advance. Violations are
    /// clamped to a stride of 1.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let overlap = overlap.min(chunk_size - 1);
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Split `text` into overlapping windows
    ///
    /// Whitespace-only input yields no chunks. Each window's trimmed content
    /// becomes one chunk; empty-after-trim windows are dropped. After a
    /// window ending at the text length the loop stops; otherwise the next
    /// window starts `overlap` characters before the previous end.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < len {
            let end = (start + self.chunk_size).min(len);
            let window: String = chars[start..end].iter().collect();
            let trimmed = window.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
            if end == len {
                break;
            }
            start = end - self.overlap;
        }

        chunks
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(2000, 200)
    }
}
