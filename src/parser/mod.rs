//! The Tomo parser: a tokenless recursive-descent reader over the raw
//! UTF-8 buffer with explicit cursor positions.
//!
//! There is no token stream. The primitives in [`cursor`] match
//! literals and words directly against the buffer; indentation is
//! measured per line (a tab counts as [`SPACES_PER_INDENT`] spaces,
//! mixing tabs and spaces on one line is a hard error). Productions
//! return `Ok(None)` to mean "not this construct, try the next
//! alternative" and `Err` for malformed input that no alternative can
//! accept; errors propagate out of `parse_file` without recovery.
//!
//! Parsed files are memoized by absolute path in a FIFO cache of
//! [`PARSE_CACHE_SIZE`] entries. Spoofed file names start with `<` and
//! carry their content after the closing `>`.

pub mod cursor;
pub mod errors;
pub mod expressions;
pub mod statements;
pub mod text_literals;
pub mod types;

use std::cell::Cell;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use crate::ast::{Ast, AstNode, TypeAst};
use crate::hashing::Table;
use crate::sourcefile::SourceFile;

pub use errors::ParseError;

/// One indentation level, measured in spaces.
pub const SPACES_PER_INDENT: i64 = 4;

/// The parse cache holds at most this many files; eviction is FIFO.
pub const PARSE_CACHE_SIZE: usize = 100;

pub type PResult<T> = Result<T, ParseError>;
/// The usual production result: `Ok(None)` means "not this construct".
pub type Parsed = PResult<Option<Ast>>;
pub type ParsedType = PResult<Option<TypeAst>>;

/// Reserved words, sorted for binary search.
pub const KEYWORDS: &[&str] = &[
    "C_code", "_max_", "_min_", "and", "assert", "break", "continue", "defer", "deserialize",
    "do", "else", "enum", "extend", "extern", "for", "func", "if", "in", "lang", "mod", "mod1",
    "no", "none", "not", "or", "pass", "return", "skip", "stop", "struct", "then", "unless",
    "use", "when", "while", "xor", "yes",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.binary_search(&word).is_ok()
}

/// Parser state for one file: the file handle plus the counter that
/// numbers lambdas within the file.
pub(crate) struct Parser {
    pub(crate) file: Arc<SourceFile>,
    pub(crate) next_lambda_id: Cell<i64>,
}

impl Parser {
    pub(crate) fn new(file: Arc<SourceFile>) -> Parser {
        Parser {
            file,
            next_lambda_id: Cell::new(0),
        }
    }

    pub(crate) fn text(&self) -> &str {
        &self.file.text
    }

    pub(crate) fn err(&self, start: usize, end: usize, message: impl Into<String>) -> ParseError {
        ParseError::new(&self.file, start, end, message)
    }

    pub(crate) fn node(&self, start: usize, end: usize, node: AstNode) -> Ast {
        Ast::new(&self.file, start, end, node)
    }
}

fn parse_cache() -> &'static Mutex<Table<String, Arc<Ast>>> {
    static CACHE: OnceLock<Mutex<Table<String, Arc<Ast>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(Table::new()))
}

/// Parse a file by absolute path, memoized. A path starting with `<`
/// is a spoofed file: the name runs through the closing `>` and the
/// content is everything after it.
pub fn parse_file(path: &str) -> PResult<Arc<Ast>> {
    assert!(
        path.starts_with('<') || path.starts_with('/'),
        "path is not fully resolved: {path}"
    );

    {
        let cache = parse_cache().lock().expect("parse cache lock poisoned");
        if let Some(ast) = cache.get(&path.to_string()) {
            return Ok(Arc::clone(ast));
        }
    }

    let file = if let Some(end_bracket) = path.starts_with('<').then(|| path.find('>')).flatten() {
        SourceFile::spoof(&path[..=end_bracket], &path[end_bracket + 1..])
    } else {
        match SourceFile::load(Path::new(path)) {
            Ok(file) => file,
            Err(e) => {
                let file = SourceFile::spoof(path, "");
                return Err(ParseError::new(&file, 0, 0, format!("Could not load file: {e}")));
            }
        }
    };

    let ast = Arc::new(parse_file_contents(file)?);

    let mut cache = parse_cache().lock().expect("parse cache lock poisoned");
    if cache.len() > PARSE_CACHE_SIZE {
        // FIFO-ish eviction: drop the first entry in the table.
        if let Some((oldest, _)) = cache.entry(1) {
            let oldest = oldest.clone();
            cache.remove(&oldest);
        }
    }
    cache.set(path.to_string(), Arc::clone(&ast));
    Ok(ast)
}

fn parse_file_contents(file: Arc<SourceFile>) -> PResult<Ast> {
    let parser = Parser::new(file);
    let mut pos = 0;

    // Shebang line:
    if let Some(after) = parser.match_str(pos, "#!") {
        pos = parser.eol(after);
    }

    pos = parser.whitespace(pos)?;
    let ast = parser.parse_file_body(pos)?;
    let end = parser.whitespace(ast.span.end)?;
    if end < parser.text().len() {
        return Err(parser.err(end, parser.text().len(), "I couldn't parse this part of the file"));
    }
    Ok(ast)
}

/// Parse a whole source string (as the spoofed file `<string>`).
pub fn parse(source: &str) -> PResult<Ast> {
    parse_file_contents(SourceFile::spoof("<string>", source))
}

/// Parse a single expression from a string.
pub fn parse_expression(source: &str) -> PResult<Ast> {
    let parser = Parser::new(SourceFile::spoof("<string>", source));
    let pos = parser.whitespace(0)?;
    let ast = match parser.parse_extended_expr(pos)? {
        Some(ast) => ast,
        None => return Err(parser.err(pos, source.len(), "I couldn't parse this expression")),
    };
    let end = parser.whitespace(ast.span.end)?;
    if end < source.len() {
        return Err(parser.err(end, source.len(), "I couldn't parse this part of the string"));
    }
    Ok(ast)
}

/// Parse a single type expression from a string.
pub fn parse_type_str(source: &str) -> PResult<Option<TypeAst>> {
    let parser = Parser::new(SourceFile::spoof("<type>", source));
    let pos = parser.whitespace(0)?;
    let t = match parser.parse_type(pos)? {
        Some(t) => t,
        None => return Ok(None),
    };
    let end = parser.whitespace(t.span.end)?;
    if end < source.len() {
        return Err(parser.err(end, source.len(), "I couldn't parse this part of the type"));
    }
    Ok(Some(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_file_is_memoized() {
        let a = parse_file("<cache-test>x := 1\n").unwrap();
        let b = parse_file("<cache-test>x := 1\n").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn keywords_are_sorted_for_binary_search() {
        let mut sorted = KEYWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, KEYWORDS);
        assert!(is_keyword("for"));
        assert!(is_keyword("_min_"));
        assert!(!is_keyword("forx"));
    }

    #[test]
    fn shebang_is_skipped() {
        let ast = parse_file("<shebang>#!/usr/bin/env tomo\nx := 1\n").unwrap();
        match &ast.node {
            AstNode::Block(stmts) => assert_eq!(stmts.len(), 1),
            other => panic!("expected block, got {other:?}"),
        }
    }
}
