//! Text literals: the five string forms, escape sequences,
//! interpolation, path literals, and inline C code (which reuses the
//! interpolated-text machinery with `@` as its interpolation
//! character).

use crate::ast::{Ast, AstNode};
use crate::parser::{Parsed, Parser, PResult, SPACES_PER_INDENT};

/// The mirrored closer for pair-style quote characters.
fn closing_quote(open: char) -> Option<char> {
    match open {
        '(' => Some(')'),
        '[' => Some(']'),
        '<' => Some('>'),
        '{' => Some('}'),
        _ => None,
    }
}

const INTERP_CHARS: &str = "~!@#$%^&*+=\\?";
const QUOTE_CHARS: &str = "\"'`|/;([{<";

/// Sentinel for "interpolation disabled" (`$$...`).
const NO_INTERP: char = '\x03';

impl Parser {
    /// Decode one escape sequence starting at a backslash. Returns the
    /// unescaped string and the position after the escape.
    fn unescape(&self, pos: usize) -> PResult<(String, usize)> {
        debug_assert_eq!(self.byte(pos), Some(b'\\'));
        let after = pos + 1;
        match self.byte(after) {
            Some(b'a') => Ok(("\x07".to_string(), after + 1)),
            Some(b'b') => Ok(("\x08".to_string(), after + 1)),
            Some(b'e') => Ok(("\x1b".to_string(), after + 1)),
            Some(b'f') => Ok(("\x0c".to_string(), after + 1)),
            Some(b'n') => Ok(("\n".to_string(), after + 1)),
            Some(b'r') => Ok(("\r".to_string(), after + 1)),
            Some(b't') => Ok(("\t".to_string(), after + 1)),
            Some(b'v') => Ok(("\x0b".to_string(), after + 1)),
            Some(b'_') => Ok((" ".to_string(), after + 1)),
            Some(b'[') => {
                // ANSI Control Sequence Introducer: \[...] is ESC [ ... m
                let body_start = after + 1;
                let body_end = self.some_not(body_start, b"\r\n]");
                if self.byte(body_end) != Some(b']') {
                    return Err(self.err(pos, body_end, "Missing closing ']'"));
                }
                Ok((format!("\x1b[{}m", &self.text()[body_start..body_end]), body_end + 1))
            }
            Some(b'{') => {
                // Unicode codepoint, by name or `Uxxxx` hex value:
                let body_start = after + 1;
                let body_end = self.some_not(body_start, b"\r\n}");
                if self.byte(body_end) != Some(b'}') {
                    return Err(self.err(pos, body_end, "Missing closing '}'"));
                }
                let name = &self.text()[body_start..body_end];
                if let Some(hex) = name.strip_prefix('U') {
                    if !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()) {
                        let codepoint = u32::from_str_radix(hex, 16).unwrap_or(0);
                        let c = char::from_u32(codepoint).unwrap_or(char::REPLACEMENT_CHARACTER);
                        return Ok((c.to_string(), body_end + 1));
                    }
                }
                match unicode_names2::character(name) {
                    Some(c) => Ok((c.to_string(), body_end + 1)),
                    None => Err(self.err(
                        pos,
                        body_end + 1,
                        format!("Invalid unicode codepoint name: \"{name}\""),
                    )),
                }
            }
            Some(b'x') => {
                let hex = self.text().get(after + 1..after + 3);
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => Ok(((byte as char).to_string(), after + 3)),
                    None => {
                        // Not a hex escape; take the `x` literally.
                        Ok(("x".to_string(), after + 1))
                    }
                }
            }
            Some(b'0'..=b'7')
                if matches!(self.byte(after + 1), Some(b'0'..=b'7'))
                    && matches!(self.byte(after + 2), Some(b'0'..=b'7')) =>
            {
                let octal = &self.text()[after..after + 3];
                let byte = u8::from_str_radix(octal, 8).unwrap_or(0);
                Ok(((byte as char).to_string(), after + 3))
            }
            Some(_) => {
                let c = self.char_at(after).expect("byte exists so char exists");
                Ok((c.to_string(), after + c.len_utf8()))
            }
            None => Ok(("\\".to_string(), after)),
        }
    }

    /// The shared text-literal body reader: handles interpolation,
    /// escapes, nested quote pairs, and multi-line indentation. Returns
    /// the chunks and the position after the closing quote.
    fn parse_text_body(
        &self,
        pos: usize,
        open_quote: char,
        close_quote: char,
        open_interp: char,
        allow_escapes: bool,
    ) -> PResult<(Vec<Ast>, usize)> {
        let starting_indent = self.get_indent(pos)?;
        let string_indent = starting_indent + SPACES_PER_INDENT;

        let mut chunks: Vec<Ast> = Vec::new();
        let mut chunk = String::new();
        let mut chunk_start = pos;
        let mut pos = pos;
        let mut depth = 1;
        let mut leading_newline = false;

        let flush = |parser: &Parser, chunks: &mut Vec<Ast>, chunk: &mut String, start: usize, end: usize| {
            if !chunk.is_empty() {
                chunks.push(parser.node(start, end, AstNode::TextLiteral(std::mem::take(chunk))));
            }
        };

        while pos < self.text().len() && depth > 0 {
            let c = self.char_at(pos).expect("in bounds");
            if c == open_interp {
                let interp_start = pos;
                flush(self, &mut chunks, &mut chunk, chunk_start, pos);
                let mut p = pos + c.len_utf8();
                if matches!(self.byte(p), Some(b' ') | Some(b'\t')) {
                    return Err(self.err(p, p + 1, "Whitespace is not allowed before an interpolation here"));
                }
                let interp = self.expect(
                    interp_start,
                    &mut p,
                    Parser::parse_term_no_suffix,
                    "I expected an interpolation term here",
                )?;
                chunks.push(interp);
                pos = p;
                chunk_start = pos;
            } else if allow_escapes && c == '\\' {
                let (unescaped, after) = self.unescape(pos)?;
                chunk.push_str(&unescaped);
                pos = after;
            } else if !leading_newline && c == open_quote && closing_quote(open_quote).is_some() {
                // Nested pair opens, but only at the opener's own indent:
                if self.get_indent(pos)? == starting_indent {
                    depth += 1;
                }
                chunk.push(c);
                pos += c.len_utf8();
            } else if !leading_newline && c == close_quote {
                if self.get_indent(pos)? == starting_indent {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                chunk.push(c);
                pos += c.len_utf8();
            } else if let Some(after) = self.newline_with_indentation(pos, string_indent) {
                pos = after;
                if !leading_newline && chunk.is_empty() && chunks.is_empty() {
                    leading_newline = true;
                } else {
                    chunk.push('\n');
                }
            } else if let Some(after) = self.newline_with_indentation(pos, starting_indent) {
                pos = after;
                if self.char_at(pos) == Some(close_quote) {
                    break;
                }
                let after_dots = self.some_of(pos, b".");
                if after_dots - pos >= 2 {
                    // `..` joins the continuation line without a newline
                    pos = after_dots;
                } else {
                    return Err(self.err(
                        pos,
                        self.eol(pos),
                        "This multi-line string should be either indented or have '..' at the front",
                    ));
                }
            } else {
                chunk.push(c);
                pos += c.len_utf8();
            }
        }

        flush(self, &mut chunks, &mut chunk, chunk_start, pos);
        let mut p = pos;
        self.expect_closing(
            &mut p,
            &close_quote.to_string(),
            &format!("I was expecting a {close_quote} to finish this string"),
        )?;
        Ok((chunks, p))
    }

    /// The five text literal forms (minus path literals, which are
    /// [`Parser::parse_path`]).
    pub(crate) fn parse_text(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut lang = None;
        let mut open_interp = '$';
        let mut custom = false;

        let (open_quote, close_quote, body_start) = if let Some(p) = self.match_str(pos, "\"") {
            ('"', '"', p)
        } else if let Some(p) = self.match_str(pos, "`") {
            ('`', '`', p)
        } else if let Some(p) = self.match_str(pos, "'") {
            ('\'', '\'', p)
        } else if let Some(p) = self.match_str(pos, "$") {
            // Customized string: `$[lang][interp-char]quote ... close`
            custom = true;
            let mut p = p;
            if let Some((id, after)) = self.get_id(p) {
                lang = Some(id);
                p = after;
            }
            if let Some(after) = self.match_str(p, "$") {
                // `$$` disables interpolation entirely
                open_interp = NO_INTERP;
                p = after;
            } else if let Some(c) = self.char_at(p) {
                if INTERP_CHARS.contains(c) {
                    open_interp = c;
                    p += c.len_utf8();
                }
            }
            let quote = match self.char_at(p) {
                Some(c) if QUOTE_CHARS.contains(c) => c,
                _ => {
                    return Err(self.err(
                        p,
                        p + 1,
                        "This is not a valid string quotation character. Valid characters are: \"'`|/;([{<",
                    ))
                }
            };
            p += quote.len_utf8();
            (quote, closing_quote(quote).unwrap_or(quote), p)
        } else {
            return Ok(None);
        };

        // Plain double quotes take escapes; plain single quotes and
        // backticks don't. Custom strings take escapes unless their
        // quote is a backtick.
        let allow_escapes = if custom { open_quote != '`' } else { open_quote == '"' };

        let (children, end) =
            self.parse_text_body(body_start, open_quote, close_quote, open_interp, allow_escapes)?;
        Ok(Some(self.node(start, end, AstNode::TextJoin { lang, children })))
    }

    /// Path literals: `(~/...)`, `(./...)`, `(../...)`, `(/...)`.
    pub(crate) fn parse_path(&self, pos: usize) -> Parsed {
        let start = pos;
        let p = match self.match_str(pos, "(") {
            Some(p) => p,
            None => return Ok(None),
        };
        let rest = &self.text()[p..];
        if !(rest.starts_with("~/")
            || rest.starts_with("./")
            || rest.starts_with("../")
            || rest.starts_with('/'))
        {
            return Ok(None);
        }

        let path_start = p;
        let mut end = p;
        let mut paren_depth = 1;
        let bytes = self.text().as_bytes();
        while end < bytes.len() {
            match bytes[end] {
                b'\\' => {
                    end += 2;
                    continue;
                }
                b'(' => paren_depth += 1,
                b')' => {
                    paren_depth -= 1;
                    if paren_depth <= 0 {
                        break;
                    }
                }
                b'\r' | b'\n' => {
                    return Err(self.err(path_start, end, "This path was not closed"));
                }
                _ => {}
            }
            end += 1;
        }
        if end >= bytes.len() {
            return Err(self.err(path_start, end, "This path was not closed"));
        }

        let raw = &self.text()[path_start..end];
        let mut path = String::with_capacity(raw.len());
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    path.push(escaped);
                }
            } else {
                path.push(c);
            }
        }
        Ok(Some(self.node(start, end + 1, AstNode::Path(path))))
    }

    /// `C_code [: Type] { ... }` - raw C with `@`-interpolation.
    pub(crate) fn parse_inline_c(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "C_code") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.spaces(p);

        let mut type_ast = None;
        let chunks;
        if let Some(after) = self.match_str(p, ":") {
            p = after;
            type_ast = Some(self.expect_type(start, &mut p, "I couldn't parse the type for this C_code code")?);
            p = self.spaces(p);
            p = match self.match_str(p, "(") {
                Some(p) => p,
                None => return Err(self.err(start, p, "I expected a '(' here")),
            };
            let (body, end) = self.parse_text_body(p, '(', ')', '@', false)?;
            // A typed C_code expression becomes a statement-expression:
            let mut wrapped = vec![self.node(p, p, AstNode::TextLiteral("({".to_string()))];
            wrapped.extend(body);
            wrapped.push(self.node(end, end, AstNode::TextLiteral("; })".to_string())));
            chunks = wrapped;
            p = end;
        } else {
            p = match self.match_str(p, "{") {
                Some(p) => p,
                None => return Err(self.err(start, p, "I expected a '{' here")),
            };
            let (body, end) = self.parse_text_body(p, '{', '}', '@', false)?;
            chunks = body;
            p = end;
        }

        Ok(Some(self.node(start, p, AstNode::InlineCCode { chunks, type_ast })))
    }
}
