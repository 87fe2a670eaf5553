//! Window specifications and the synopses that buffer window contents.
//!
//! A [`Window`] is an immutable width/stride pair plus a kind tag. Each
//! aggregation operator owns one [`Synopsis`] built from its window.

mod synopsis;

pub use synopsis::{Synopsis, TimeSynopsis, TupleSynopsis, WindowContents};

use std::fmt;

/// How width and stride are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    /// Width and stride count tuples.
    Tuples,
    /// Width and stride are spans of logical time.
    Time,
}

/// Width and stride of a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    width: u64,
    stride: u64,
    kind: WindowKind,
}

impl Window {
    /// Creates a tuple-count window.
    ///
    /// Width is at least 1 and the stride is clamped into `[1, width]`.
    #[must_use]
    pub fn tuples(width: u64, stride: u64) -> Self {
        let width = width.max(1);
        Self {
            width,
            stride: stride.clamp(1, width),
            kind: WindowKind::Tuples,
        }
    }

    /// Creates a time window. Width and stride are at least 1.
    #[must_use]
    pub fn time(width: u64, stride: u64) -> Self {
        Self {
            width: width.max(1),
            stride: stride.max(1),
            kind: WindowKind::Time,
        }
    }

    /// Returns the width.
    #[must_use]
    pub fn width(&self) -> u64 {
        self.width
    }

    /// Returns the stride.
    #[must_use]
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Returns the kind.
    #[must_use]
    pub fn kind(&self) -> WindowKind {
        self.kind
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            WindowKind::Tuples => write!(f, "[{} rows, {}]", self.width, self.stride),
            WindowKind::Time => write!(f, "[{} ms, {}]", self.width, self.stride),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamping() {
        let w = Window::tuples(0, 0);
        assert_eq!((w.width(), w.stride()), (1, 1));
        let w = Window::tuples(3, 10);
        assert_eq!(w.stride(), 3);
        let w = Window::time(10, 20);
        assert_eq!((w.width(), w.stride()), (10, 20));
        assert_eq!(w.kind(), WindowKind::Time);
    }

    #[test]
    fn test_display() {
        assert_eq!(Window::tuples(5, 1).to_string(), "[5 rows, 1]");
        assert_eq!(Window::time(100, 50).to_string(), "[100 ms, 50]");
    }
}
