//! Parse errors.
//!
//! The parser never recovers: the first unexpected input produces a
//! `ParseError` that unwinds out of `parse_file` through every
//! production's `Result`. `report` prints the message with a source
//! excerpt in the standard error format.

use std::sync::Arc;

use crate::sourcefile::{highlight_error_stderr, use_color, SourceFile};

#[derive(Clone, Debug)]
pub struct ParseError {
    pub file: Arc<SourceFile>,
    pub start: usize,
    pub end: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(file: &Arc<SourceFile>, start: usize, end: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            file: Arc::clone(file),
            start,
            end: end.max(start),
            message: message.into(),
        }
    }

    pub fn line(&self) -> usize {
        self.file.line_number(self.start)
    }

    pub fn column(&self) -> usize {
        self.file.line_column(self.start)
    }

    /// Print the error with a highlighted source excerpt to stderr.
    pub fn report(&self) {
        if use_color() {
            eprintln!(
                "\x1b[31;1m{}:{}.{}: {}\x1b[m\n",
                self.file.relative_filename,
                self.line(),
                self.column(),
                self.message
            );
        } else {
            eprintln!(
                "{}:{}.{}: {}\n",
                self.file.relative_filename,
                self.line(),
                self.column(),
                self.message
            );
        }
        highlight_error_stderr(&self.file, self.start, self.end, 2);
        eprintln!();
        if std::env::var_os("TOMO_STACKTRACE").is_some() {
            eprintln!("{}", std::backtrace::Backtrace::force_capture());
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}.{}: {}",
            self.file.relative_filename,
            self.line(),
            self.column(),
            self.message
        )
    }
}

impl std::error::Error for ParseError {}
