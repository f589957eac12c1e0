//! Line spans and language mapping.

use crate::primitives::PrimitiveError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 1-based, inclusive line range inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineSpan {
    start_line: u32,
    end_line: u32,
}

impl LineSpan {
    /// Validate and build a line span (`1 <= start <= end`).
    pub fn new(start_line: u32, end_line: u32) -> Result<Self, PrimitiveError> {
        if start_line == 0 || end_line == 0 {
            return Err(PrimitiveError::LineSpanNonPositive {
                start_line,
                end_line,
            });
        }
        if start_line > end_line {
            return Err(PrimitiveError::LineSpanStartAfterEnd {
                start_line,
                end_line,
            });
        }
        Ok(Self {
            start_line,
            end_line,
        })
    }

    /// Starting line (1-based).
    #[must_use]
    pub const fn start_line(self) -> u32 {
        self.start_line
    }

    /// Ending line (1-based, inclusive).
    #[must_use]
    pub const fn end_line(self) -> u32 {
        self.end_line
    }

    /// Number of lines covered.
    #[must_use]
    pub const fn line_count(self) -> u32 {
        self.end_line - self.start_line + 1
    }
}

impl fmt::Display for LineSpan {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}-{}", self.start_line, self.end_line)
    }
}

/// Source languages the splitter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Rust sources.
    Rust,
    /// Go sources.
    Go,
    /// Java sources.
    Java,
    /// JavaScript (including JSX).
    JavaScript,
    /// TypeScript (including TSX).
    TypeScript,
    /// Python sources.
    Python,
    /// C sources and headers.
    C,
    /// C++ sources and headers.
    Cpp,
    /// Anything else; handled by the size splitter.
    Text,
}

impl Language {
    /// Map a file extension (with or without the leading dot) to a language.
    ///
    /// Unknown extensions map to `Text`, which routes the file to the
    /// size-based splitter.
    #[must_use]
    pub fn from_extension(extension: &str) -> Self {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "rs" => Self::Rust,
            "go" => Self::Go,
            "java" => Self::Java,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "py" | "pyi" => Self::Python,
            "c" | "h" => Self::C,
            "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => Self::Cpp,
            _ => Self::Text,
        }
    }

    /// Canonical lowercase name (stored in chunk metadata).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
