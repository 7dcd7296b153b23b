//! Source positions and source text
//!
//! Every byte the compiler emits carries the position of the expression it
//! came from, so a fault can be traced back to the source.

use serde::{Deserialize, Serialize};

/// Position in the source text
///
/// `line` is 1-based, `column` is 0-based. The default location (line 0)
/// means "unknown".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Line number, starting at 1
    pub line: usize,
    /// Column offset within the line, starting at 0
    pub column: usize,
}

impl Location {
    /// Create a new location
    #[inline]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Whether this location carries no position
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.line == 0
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column + 1)
    }
}

/// Source text of a compiled program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    text: String,
}

impl Source {
    /// Wrap source text
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Full text
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether there is no source text
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Text of a 1-based line, without its line terminator
    pub fn snippet(&self, line: usize) -> Option<&str> {
        let index = line.checked_sub(1)?;
        self.text
            .split('\n')
            .nth(index)
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }
}

impl From<&str> for Source {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Source {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
