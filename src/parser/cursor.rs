//! Text-based parsing primitives: the cursor is a plain byte offset
//! into the file buffer, and every helper returns the advanced offset
//! rather than mutating shared state.

use unicode_ident::{is_xid_continue, is_xid_start};

use crate::parser::{is_keyword, PResult, Parser, SPACES_PER_INDENT};

impl Parser {
    pub(crate) fn byte(&self, pos: usize) -> Option<u8> {
        self.text().as_bytes().get(pos).copied()
    }

    pub(crate) fn char_at(&self, pos: usize) -> Option<char> {
        self.text().get(pos..)?.chars().next()
    }

    /// Advance over characters in `allow`; returns the new offset.
    pub(crate) fn some_of(&self, mut pos: usize, allow: &[u8]) -> usize {
        while self.byte(pos).is_some_and(|b| allow.contains(&b)) {
            pos += 1;
        }
        pos
    }

    /// Advance to the first character in `forbid` (or the end).
    pub(crate) fn some_not(&self, mut pos: usize, forbid: &[u8]) -> usize {
        while self.byte(pos).is_some_and(|b| !forbid.contains(&b)) {
            pos += 1;
        }
        pos
    }

    /// Advance over spaces and tabs.
    pub(crate) fn spaces(&self, pos: usize) -> usize {
        self.some_of(pos, b" \t")
    }

    /// Advance over spaces, tabs, newlines, and `#` line comments.
    /// Mixed-indentation errors surface here because crossing a newline
    /// inspects the next line's indentation.
    pub(crate) fn whitespace(&self, mut pos: usize) -> PResult<usize> {
        loop {
            let after_spaces = self.some_of(pos, b" \t\r\n");
            let after_comment = match self.comment(after_spaces) {
                Some(p) => p,
                None => {
                    if after_spaces == pos {
                        return Ok(pos);
                    }
                    // Validate indentation of the line we landed on:
                    self.get_indent(after_spaces)?;
                    pos = after_spaces;
                    continue;
                }
            };
            pos = after_comment;
        }
    }

    /// Match an exact literal; returns the offset after it.
    pub(crate) fn match_str(&self, pos: usize, target: &str) -> Option<usize> {
        if self.text()[pos.min(self.text().len())..].starts_with(target) {
            Some(pos + target.len())
        } else {
            None
        }
    }

    pub(crate) fn is_xid_continue_next(&self, pos: usize) -> bool {
        self.char_at(pos).is_some_and(is_xid_continue)
    }

    /// Match a word (after optional spaces), requiring that the next
    /// character does not continue an identifier.
    pub(crate) fn match_word(&self, pos: usize, word: &str) -> Option<usize> {
        let pos = self.spaces(pos);
        let after = self.match_str(pos, word)?;
        if self.is_xid_continue_next(after) {
            None
        } else {
            Some(after)
        }
    }

    /// Read a Unicode identifier (XID start or `_`, then XID continue),
    /// allowing reserved words.
    pub(crate) fn get_word(&self, pos: usize) -> Option<(String, usize)> {
        let start = self.spaces(pos);
        let mut chars = self.text().get(start..)?.char_indices();
        let (_, first) = chars.next()?;
        if !is_xid_start(first) && first != '_' {
            return None;
        }
        let mut end = start + first.len_utf8();
        for (offset, c) in chars {
            if !is_xid_continue(c) {
                end = start + offset;
                break;
            }
            end = start + offset + c.len_utf8();
        }
        Some((self.text()[start..end].to_string(), end))
    }

    /// Read an identifier, rejecting reserved words.
    pub(crate) fn get_id(&self, pos: usize) -> Option<(String, usize)> {
        let (word, end) = self.get_word(pos)?;
        if is_keyword(&word) {
            None
        } else {
            Some((word, end))
        }
    }

    /// Skip a `#` comment through the end of the line.
    pub(crate) fn comment(&self, pos: usize) -> Option<usize> {
        if self.byte(pos) == Some(b'#') {
            Some(self.some_not(pos, b"\r\n"))
        } else {
            None
        }
    }

    /// Offset of the end of the line containing `pos`.
    pub(crate) fn eol(&self, pos: usize) -> usize {
        self.some_not(pos, b"\r\n")
    }

    /// Indentation (in spaces) of the line containing `pos`. A tab
    /// counts as four spaces; mixing tabs and spaces is a hard error.
    pub(crate) fn get_indent(&self, pos: usize) -> PResult<i64> {
        let line_number = self.file.line_number(pos);
        let line_start = match self.file.line_offset(line_number) {
            Some(offset) => offset,
            None => return Ok(0),
        };
        match self.byte(line_start) {
            Some(b' ') => {
                let end = self.some_of(line_start, b" ");
                if self.byte(end) == Some(b'\t') {
                    return Err(self.err(
                        end,
                        end + 1,
                        "This is a tab following spaces, and you can't mix tabs and spaces",
                    ));
                }
                Ok((end - line_start) as i64)
            }
            Some(b'\t') => {
                let end = self.some_of(line_start, b"\t");
                if self.byte(end) == Some(b' ') {
                    return Err(self.err(
                        end,
                        end + 1,
                        "This is a space following tabs, and you can't mix tabs and spaces",
                    ));
                }
                Ok((end - line_start) as i64 * SPACES_PER_INDENT)
            }
            _ => Ok(0),
        }
    }

    /// If the next nonempty line is indented exactly one level beyond
    /// the line containing `pos`, return the offset of its first
    /// non-whitespace character.
    pub(crate) fn indent(&self, pos: usize) -> PResult<Option<usize>> {
        let starting_indent = self.get_indent(pos)?;
        let next = self.whitespace(pos)?;
        let next_line_number = self.file.line_number(next);
        let next_line = match self.file.line_offset(next_line_number) {
            Some(offset) => offset,
            None => return Ok(None),
        };
        if next_line <= pos {
            return Ok(None);
        }
        if self.get_indent(next_line)? != starting_indent + SPACES_PER_INDENT {
            return Ok(None);
        }
        Ok(Some(self.some_of(next_line, b" \t")))
    }

    /// Match a newline followed by at least `target` spaces of
    /// indentation; returns the offset just past that indentation.
    /// Empty lines match with no indentation requirement.
    pub(crate) fn newline_with_indentation(&self, pos: usize, target: i64) -> Option<usize> {
        let mut p = pos;
        if self.byte(p) == Some(b'\r') {
            p += 1;
        }
        if self.byte(p) != Some(b'\n') {
            return None;
        }
        p += 1;
        match self.byte(p) {
            None | Some(b'\r') | Some(b'\n') => return Some(p), // Empty line
            _ => {}
        }
        if self.byte(p) == Some(b' ') {
            let span = self.some_of(p, b" ") - p;
            if span as i64 >= target {
                return Some(p + target as usize);
            }
        } else {
            let span = self.some_of(p, b"\t") - p;
            if span as i64 * SPACES_PER_INDENT >= target {
                return Some(p + (target / SPACES_PER_INDENT) as usize);
            }
        }
        None
    }

    /// Match at least one comma or newline separator (plus any spaces
    /// and comments around them).
    pub(crate) fn match_separator(&self, pos: usize) -> Option<usize> {
        let mut p = pos;
        let mut separators = 0;
        loop {
            let after = self.some_of(p, b"\r\n,");
            if after != p {
                separators += after - p;
                p = after;
                continue;
            }
            if let Some(after) = self.comment(p) {
                p = after;
                continue;
            }
            let after = self.some_of(p, b" \t");
            if after == p {
                break;
            }
            p = after;
        }
        if separators > 0 {
            Some(p)
        } else {
            None
        }
    }
}
