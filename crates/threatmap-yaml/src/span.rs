//! Byte ranges into the YAML source.

use std::{fmt, ops::Range};

/// A half-open byte range `start..end` in the source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Span {
    start: usize,
    end: usize,
}

impl Span {
    /// Create a new span from a byte range.
    pub fn new(range: Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end.max(range.start),
        }
    }

    /// Get the start offset of the span
    pub fn start(&self) -> usize {
        self.start
    }

    /// Get the end offset of the span
    pub fn end(&self) -> usize {
        self.end
    }

    /// Get the length of the span
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if the span is empty
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Create a union of two spans (encompassing both)
    pub fn union(&self, other: Span) -> Span {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// The span covering line `line` (0-based) of `src`, without its newline.
    ///
    /// Lines past the end of the text collapse to an empty span at the end.
    pub fn of_line(src: &str, line: usize) -> Span {
        let mut offset = 0;
        for (idx, text) in src.split_inclusive('\n').enumerate() {
            if idx == line {
                let content = text.trim_end_matches(['\n', '\r']);
                return Span::new(offset..offset + content.len());
            }
            offset += text.len();
        }
        Span::new(src.len()..src.len())
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Self::new(range)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union() {
        let span = Span::new(4..8).union(Span::new(1..5));
        assert_eq!(span, Span::new(1..8));
        assert_eq!(span.len(), 7);
    }

    #[test]
    fn test_of_line() {
        let src = "name: x\ncomponents:\n  - ref: a\n";
        assert_eq!(Span::of_line(src, 0), Span::new(0..7));
        assert_eq!(Span::of_line(src, 2), Span::new(20..30));
        assert!(Span::of_line(src, 9).is_empty());
    }
}
