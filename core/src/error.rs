use std::fmt;

use crate::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level_str = match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        };
        write!(f, "{}", level_str)
    }
}

pub trait BasaltErrorExt {
    fn level(&self) -> Level;
    fn message(&self) -> String;
    fn issuer(&self) -> String;
    fn location(&self) -> Option<Location>;
}

impl fmt::Debug for dyn BasaltErrorExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc_str = match self.location() {
            Some(loc) => loc.to_string(),
            None => "unknown".to_string(),
        };

        write!(f, "BASALT | {} | {} | {} | {}", self.level(), loc_str, self.issuer(), self.message())
    }
}

impl fmt::Display for dyn BasaltErrorExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// What went wrong during generation. There is no recoverable kind: every
/// one of these aborts the whole pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodegenErrorKind {
    /// The typed input broke an invariant the type stage is supposed to
    /// guarantee (bad tag read, non-exhaustive dispatch, dangling reference).
    InternalInconsistency,
    /// The produced module failed structural verification.
    InvalidModule,
    /// The typed program could not be read or decoded.
    Input,
}

impl fmt::Display for CodegenErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CodegenErrorKind::InternalInconsistency => "internal inconsistency",
            CodegenErrorKind::InvalidModule => "invalid generated module",
            CodegenErrorKind::Input => "input error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct CodegenError {
    kind: CodegenErrorKind,
    level: Level,
    message: String,
    issuer: String,
    location: Option<Location>,
}

impl CodegenError {
    pub fn with(
        kind: CodegenErrorKind,
        level: Level,
        message: String,
        issuer: String,
        location: Option<Location>,
    ) -> Self {
        CodegenError { kind, level, message, issuer, location }
    }

    pub fn internal(message: impl Into<String>, location: Option<Location>) -> Self {
        CodegenError::with(
            CodegenErrorKind::InternalInconsistency,
            Level::Critical,
            message.into(),
            "codegen".to_string(),
            location,
        )
    }

    pub fn invalid_module(findings: &[String]) -> Self {
        CodegenError::with(
            CodegenErrorKind::InvalidModule,
            Level::Critical,
            format!("module failed verification: {}", findings.join("; ")),
            "verifier".to_string(),
            None,
        )
    }

    pub fn input(message: impl Into<String>) -> Self {
        CodegenError::with(
            CodegenErrorKind::Input,
            Level::Error,
            message.into(),
            "program".to_string(),
            None,
        )
    }

    pub fn kind(&self) -> CodegenErrorKind {
        self.kind
    }

    /// Name the file of a location that did not record one.
    pub fn in_file(mut self, file: Option<&str>) -> Self {
        if let (Some(loc), Some(file)) = (self.location.as_mut(), file) {
            loc.fill_file(file);
        }
        self
    }

    /// Attach a location if none was recorded where the error was raised.
    pub fn or_at(mut self, location: Option<&Location>) -> Self {
        if self.location.is_none() {
            self.location = location.cloned();
        }
        self
    }
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(loc) = &self.location {
            write!(f, "{}: {} (at {})", self.kind, self.message, loc)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for CodegenError {}

impl BasaltErrorExt for CodegenError {
    fn level(&self) -> Level {
        self.level
    }

    fn message(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }

    fn issuer(&self) -> String {
        self.issuer.clone()
    }

    fn location(&self) -> Option<Location> {
        self.location.clone()
    }
}

pub type Result<T> = std::result::Result<T, CodegenError>;
