//! file: core/src/location.rs
//! description: source positions carried by typed nodes.
//!
//! Typed programs often record only a line and column per node and name
//! the file once, at the program level. A location with an empty `file`
//! picks that name up when it is reported.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Empty when the node did not name its file.
    #[serde(default)]
    pub file: String,
    /// 1-based; 0 means unknown.
    pub line: usize,
    /// 1-based; 0 means unknown.
    #[serde(default)]
    pub column: usize,
}

impl Location {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self { file: file.into(), line, column }
    }

    /// Whether the location points at an actual source line.
    pub fn is_known(&self) -> bool {
        self.line > 0
    }

    /// Name the file if the location does not already.
    pub fn fill_file(&mut self, file: &str) {
        if self.file.is_empty() {
            self.file = file.to_string();
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.file.is_empty() {
            write!(f, "{}:", self.file)?;
        }
        write!(f, "{}", self.line)?;
        if self.column > 0 {
            write!(f, ":{}", self.column)?;
        }
        Ok(())
    }
}
