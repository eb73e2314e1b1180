//! file: core/src/options.rs
//! description: code generation options.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CodegenError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenOptions {
    /// Attach source locations and subprogram records to the module.
    pub debug_info: bool,
    /// Source file name recorded in debug info; defaults to the program's.
    pub filename: Option<String>,
    /// Dump the partially built module when generation fails.
    pub dump_on_error: bool,
    /// Where dumps go. Without one, dumps are written to the log.
    pub dump_dir: Option<PathBuf>,
    /// Run the structural verifier on the finished module.
    pub verify: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            debug_info: false,
            filename: None,
            dump_on_error: cfg!(debug_assertions),
            dump_dir: None,
            verify: true,
        }
    }
}

impl CodegenOptions {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CodegenError::input(format!("cannot read {}: {}", path.as_ref().display(), e)))?;
        serde_json::from_str(&raw).map_err(|e| CodegenError::input(format!("bad options file: {}", e)))
    }

    /// Overlay `BASALT_DEBUG_INFO` and `BASALT_DUMP_DIR`.
    pub fn from_env(mut self) -> Self {
        if let Ok(v) = std::env::var("BASALT_DEBUG_INFO") {
            self.debug_info = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Ok(dir) = std::env::var("BASALT_DUMP_DIR") {
            if !dir.is_empty() {
                self.dump_dir = Some(PathBuf::from(dir));
                self.dump_on_error = true;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let opts: CodegenOptions = serde_json::from_str(r#"{"debug_info": true}"#).unwrap();
        assert!(opts.debug_info);
        assert!(opts.verify);
        assert_eq!(opts.dump_dir, None);
    }
}
