pub mod ansi;
pub mod json;

use std::fmt;

use serde::Serialize;

use crate::codegen::CompileError;
use crate::parser::ParseError;
use crate::vm::RuntimeError;

/// Pipeline stage a diagnostic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Lexical errors.
    Syntax,
    /// Grammar errors.
    Parse,
    Compile,
    Runtime,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Syntax => "syntax",
            Phase::Parse => "parse",
            Phase::Compile => "compile",
            Phase::Runtime => "runtime",
        })
    }
}

/// A failure as plain data, for the caller to present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub message: String,
    /// Text of the offending line, when the source is at hand.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_line: Option<String>,
}

impl Diagnostic {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Diagnostic {
            filename: String::new(),
            line: None,
            phase,
            context: None,
            message: message.into(),
            source_line: None,
        }
    }

    pub fn in_file(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Attach the text of the reported line. No-op without a line number.
    pub fn with_source(mut self, source: &crate::source::Source) -> Self {
        if let Some(line) = self.line {
            let text = source.line_text(line);
            if !text.trim().is_empty() {
                self.source_line = Some(text.to_string());
            }
        }
        self
    }
}

// ---- From impls for pipeline errors ----

impl From<&ParseError> for Diagnostic {
    fn from(e: &ParseError) -> Self {
        let phase = if e.is_lexical() { Phase::Syntax } else { Phase::Parse };
        Diagnostic::new(phase, e.message())
            .in_file(e.filename())
            .with_line(e.line())
            .with_context(e.context())
    }
}

impl From<&CompileError> for Diagnostic {
    fn from(e: &CompileError) -> Self {
        Diagnostic::new(Phase::Compile, e.to_string()).with_line(e.line())
    }
}

impl From<&RuntimeError> for Diagnostic {
    fn from(e: &RuntimeError) -> Self {
        Diagnostic::new(Phase::Runtime, e.to_string())
    }
}

impl From<&crate::Error> for Diagnostic {
    fn from(e: &crate::Error) -> Self {
        match e {
            crate::Error::Parse(e) => e.into(),
            crate::Error::Compile(e) => e.into(),
            crate::Error::Runtime(e) => e.into(),
        }
    }
}
