//! Expression parsing: terms, suffixes, and precedence-climbing infix
//! expressions.

use crate::ast::{Arg, Ast, AstNode, BinOp};
use crate::parser::{Parsed, Parser, PResult};

const RADIANS_PER_DEGREE: f64 = 0.017453292519943295;

impl Parser {
    /// Run a sub-parser after optional spaces; on success advance `pos`
    /// past the node.
    pub(crate) fn optional<F>(&self, pos: &mut usize, f: F) -> Parsed
    where
        F: Fn(&Parser, usize) -> Parsed,
    {
        let p = self.spaces(*pos);
        match f(self, p)? {
            Some(ast) => {
                *pos = ast.span.end;
                Ok(Some(ast))
            }
            None => Ok(None),
        }
    }

    /// Like [`Parser::optional`], but a missing node is a hard error.
    pub(crate) fn expect<F>(&self, start: usize, pos: &mut usize, f: F, message: &str) -> PResult<Ast>
    where
        F: Fn(&Parser, usize) -> Parsed,
    {
        let p = self.spaces(*pos);
        match f(self, p)? {
            Some(ast) => {
                *pos = ast.span.end;
                Ok(ast)
            }
            None => Err(self.err(start, p, message)),
        }
    }

    /// Expect a literal string (after optional spaces).
    pub(crate) fn expect_str(
        &self,
        start: usize,
        pos: &mut usize,
        target: &str,
        message: &str,
    ) -> PResult<()> {
        let p = self.spaces(*pos);
        let after = match self.match_str(p, target) {
            Some(after) => after,
            None => return Err(self.err(start, p, message)),
        };
        if target
            .chars()
            .last()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
            && self.is_xid_continue_next(after)
        {
            return Err(self.err(start, after, message));
        }
        *pos = after;
        Ok(())
    }

    /// Expect a closing delimiter, with an error span that runs to the
    /// delimiter (or end of line) when it's missing.
    pub(crate) fn expect_closing(&self, pos: &mut usize, close: &str, message: &str) -> PResult<()> {
        let start = *pos;
        let p = self.spaces(*pos);
        if let Some(after) = self.match_str(p, close) {
            *pos = after;
            return Ok(());
        }
        let eol = self.eol(p);
        let next = self.text()[p..].find(close).map(|i| p + i).unwrap_or(eol);
        Err(self.err(start, eol.min(next), message))
    }

    pub(crate) fn parse_expr(&self, pos: usize) -> Parsed {
        self.parse_infix_expr(pos, 0)
    }

    /// An expression, also allowing block-valued forms (`if`, `when`,
    /// `for`, `while`, `repeat`, `do`).
    pub(crate) fn parse_extended_expr(&self, pos: usize) -> Parsed {
        let mut p = pos;
        for f in [
            Parser::parse_for,
            Parser::parse_while,
            Parser::parse_if,
            Parser::parse_when,
            Parser::parse_repeat,
            Parser::parse_do,
        ] {
            if let Some(ast) = self.optional(&mut p, f)? {
                return Ok(Some(ast));
            }
        }
        self.parse_expr(pos)
    }

    /// Match one binary operator at `pos` (no leading whitespace).
    pub(crate) fn match_binary_operator(&self, pos: usize) -> Option<(BinOp, usize)> {
        use BinOp::*;
        match self.byte(pos)? {
            b'+' => {
                if self.byte(pos + 1) == Some(b'+') {
                    Some((Concat, pos + 2))
                } else {
                    Some((Plus, pos + 1))
                }
            }
            b'-' => {
                // ` -x` with no space after the minus looks like a
                // negative literal argument (`fn -5`), not subtraction:
                let space_before = pos > 0 && self.byte(pos - 1) == Some(b' ');
                let space_after = self.byte(pos + 1) == Some(b' ');
                if space_before && !space_after {
                    None
                } else {
                    Some((Minus, pos + 1))
                }
            }
            b'*' => Some((Multiply, pos + 1)),
            b'/' => Some((Divide, pos + 1)),
            b'^' => Some((Power, pos + 1)),
            b'<' => match self.byte(pos + 1) {
                Some(b'=') => Some((LessThanOrEquals, pos + 2)),
                Some(b'>') => Some((Compare, pos + 2)),
                Some(b'<') => {
                    if self.byte(pos + 2) == Some(b'<') {
                        Some((UnsignedLeftShift, pos + 3))
                    } else {
                        Some((LeftShift, pos + 2))
                    }
                }
                _ => Some((LessThan, pos + 1)),
            },
            b'>' => match self.byte(pos + 1) {
                Some(b'=') => Some((GreaterThanOrEquals, pos + 2)),
                Some(b'>') => {
                    if self.byte(pos + 2) == Some(b'>') {
                        Some((UnsignedRightShift, pos + 3))
                    } else {
                        Some((RightShift, pos + 2))
                    }
                }
                _ => Some((GreaterThan, pos + 1)),
            },
            _ => {
                if let Some(p) = self.match_str(pos, "!=") {
                    Some((NotEquals, p))
                } else if let Some(p) = self.match_str(pos, "==") {
                    if self.byte(p) == Some(b'=') {
                        None
                    } else {
                        Some((Equals, p))
                    }
                } else if let Some(p) = self.match_word(pos, "and") {
                    Some((And, p))
                } else if let Some(p) = self.match_word(pos, "or") {
                    Some((Or, p))
                } else if let Some(p) = self.match_word(pos, "xor") {
                    Some((Xor, p))
                } else if let Some(p) = self.match_word(pos, "mod1") {
                    Some((Mod1, p))
                } else if let Some(p) = self.match_word(pos, "mod") {
                    Some((Mod, p))
                } else if let Some(p) = self.match_word(pos, "_min_") {
                    Some((Min, p))
                } else if let Some(p) = self.match_word(pos, "_max_") {
                    Some((Max, p))
                } else {
                    None
                }
            }
        }
    }

    /// A `_min_`/`_max_` key: suffixes applied to a sentinel `$`
    /// variable, so `a _min_.field b` keys the comparison on `.field`.
    pub(crate) fn parse_key_chain(&self, pos: &mut usize) -> PResult<Option<Ast>> {
        let mut key = self.node(*pos, *pos, AstNode::Var("$".to_string()));
        loop {
            if let Some(k) = self.parse_index_suffix(&key)? {
                key = k;
            } else if let Some(k) = self.parse_method_call_suffix(&key)? {
                key = k;
            } else if let Some(k) = self.parse_field_suffix(&key)? {
                key = k;
            } else if let Some(k) = self.parse_fncall_suffix(&key)? {
                key = k;
            } else if let Some(k) = self.parse_optional_suffix(&key)? {
                key = k;
            } else if let Some(k) = self.parse_non_optional_suffix(&key)? {
                key = k;
            } else {
                break;
            }
        }
        if matches!(key.node, AstNode::Var(_)) {
            Ok(None)
        } else {
            *pos = key.span.end;
            Ok(Some(key))
        }
    }

    /// Left-associative precedence climbing over binary operators at or
    /// above `min_tightness`.
    pub(crate) fn parse_infix_expr(&self, pos: usize, min_tightness: i32) -> Parsed {
        let mut pos = pos;
        let mut lhs = match self.optional(&mut pos, Parser::parse_term)? {
            Some(lhs) => lhs,
            None => return Ok(None),
        };

        let starting_line = self.file.line_number(pos);
        let starting_indent = self.get_indent(pos)?;
        pos = self.spaces(pos);
        loop {
            let (op, after_op) = match self.match_binary_operator(pos) {
                Some(matched) => matched,
                None => break,
            };
            if op.tightness() < min_tightness {
                break;
            }
            let mut p = after_op;
            let key = if matches!(op, BinOp::Min | BinOp::Max) {
                self.parse_key_chain(&mut p)?
            } else {
                None
            };

            p = self.whitespace(p)?;
            if self.file.line_number(p) != starting_line && self.get_indent(p)? < starting_indent {
                return Err(self.err(
                    p,
                    self.eol(p),
                    "I expected this line to be at least as indented than the line above it",
                ));
            }

            let rhs = match self.parse_infix_expr(p, op.tightness() + 1)? {
                Some(rhs) => rhs,
                None => break,
            };
            let (start, end) = (lhs.span.start, rhs.span.end);
            match op {
                BinOp::Min => {
                    return Ok(Some(self.node(
                        start,
                        end,
                        AstNode::Min { lhs: Box::new(lhs), rhs: Box::new(rhs), key: key.map(Box::new) },
                    )))
                }
                BinOp::Max => {
                    return Ok(Some(self.node(
                        start,
                        end,
                        AstNode::Max { lhs: Box::new(lhs), rhs: Box::new(rhs), key: key.map(Box::new) },
                    )))
                }
                _ => {
                    lhs = self.node(
                        start,
                        end,
                        AstNode::BinaryOp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                    );
                }
            }
            pos = self.spaces(end);
        }
        Ok(Some(lhs))
    }

    pub(crate) fn parse_term(&self, pos: usize) -> Parsed {
        let pos = self.spaces(pos);
        if let Some(after) = self.match_str(pos, "???") {
            return Err(self.err(pos, after, "This value needs to be filled in!"));
        }
        let mut term = match self.parse_term_no_suffix(pos)? {
            Some(term) => term,
            None => return Ok(None),
        };
        loop {
            if let Some(t) = self.parse_index_suffix(&term)? {
                term = t;
            } else if let Some(t) = self.parse_method_call_suffix(&term)? {
                term = t;
            } else if let Some(t) = self.parse_field_suffix(&term)? {
                term = t;
            } else if let Some(t) = self.parse_fncall_suffix(&term)? {
                term = t;
            } else if let Some(t) = self.parse_optional_suffix(&term)? {
                term = t;
            } else if let Some(t) = self.parse_non_optional_suffix(&term)? {
                term = t;
            } else {
                break;
            }
        }
        Ok(Some(term))
    }

    pub(crate) fn parse_term_no_suffix(&self, pos: usize) -> Parsed {
        let pos = self.spaces(pos);
        for f in [
            Parser::parse_none,
            Parser::parse_num, // must come before int
            Parser::parse_int,
            Parser::parse_negative, // must come after num/int
            Parser::parse_heap_alloc,
            Parser::parse_stack_reference,
            Parser::parse_bool,
            Parser::parse_text,
            Parser::parse_path,
            Parser::parse_lambda,
            Parser::parse_parens,
            Parser::parse_table,
            Parser::parse_set,
            Parser::parse_deserialize,
            Parser::parse_var,
            Parser::parse_array,
            Parser::parse_reduction,
            Parser::parse_pass,
            Parser::parse_defer,
            Parser::parse_skip,
            Parser::parse_stop,
            Parser::parse_return,
            Parser::parse_not,
            Parser::parse_extern,
            Parser::parse_inline_c,
        ] {
            if let Some(term) = f(self, pos)? {
                return Ok(Some(term));
            }
        }
        Ok(None)
    }

    pub(crate) fn parse_var(&self, pos: usize) -> Parsed {
        match self.get_id(pos) {
            Some((name, end)) => Ok(Some(self.node(pos, end, AstNode::Var(name)))),
            None => Ok(None),
        }
    }

    pub(crate) fn parse_bool(&self, pos: usize) -> Parsed {
        if let Some(end) = self.match_word(pos, "yes") {
            Ok(Some(self.node(pos, end, AstNode::Bool(true))))
        } else if let Some(end) = self.match_word(pos, "no") {
            Ok(Some(self.node(pos, end, AstNode::Bool(false))))
        } else {
            Ok(None)
        }
    }

    pub(crate) fn parse_none(&self, pos: usize) -> Parsed {
        match self.match_word(pos, "none") {
            Some(end) => Ok(Some(self.node(pos, end, AstNode::Null(None)))),
            None => Ok(None),
        }
    }

    pub(crate) fn parse_int(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = self.match_str(pos, "-").unwrap_or(pos);
        if !self.byte(p).is_some_and(|b| b.is_ascii_digit()) {
            return Ok(None);
        }
        if let Some(after) = self.match_str(p, "0x") {
            p = self.some_of(after, b"0123456789abcdefABCDEF_");
        } else if let Some(after) = self.match_str(p, "0b") {
            p = self.some_of(after, b"01_");
        } else if let Some(after) = self.match_str(p, "0o") {
            p = self.some_of(after, b"01234567_");
        } else {
            p = self.some_of(p, b"0123456789_");
        }
        let digits: String = self.text()[start..p].chars().filter(|&c| c != '_').collect();

        // A float marker means this is actually a num literal:
        if matches!(self.byte(p), Some(b'e') | Some(b'f')) {
            return Ok(None);
        }

        if let Some(after) = self.match_str(p, "%") {
            let n: f64 = digits.parse().unwrap_or(0.0);
            return Ok(Some(self.node(start, after, AstNode::Num { value: n / 100.0, bits: 64 })));
        }
        if let Some(after) = self.match_str(p, "deg") {
            let n: f64 = digits.parse().unwrap_or(0.0);
            return Ok(Some(self.node(
                start,
                after,
                AstNode::Num { value: n * RADIANS_PER_DEGREE, bits: 64 },
            )));
        }

        Ok(Some(self.node(start, p, AstNode::Int { digits, bits: 64 })))
    }

    pub(crate) fn parse_num(&self, pos: usize) -> Parsed {
        let start = pos;
        let negative = self.match_str(pos, "-").is_some();
        let p = if negative { pos + 1 } else { pos };

        let first = self.byte(p);
        if !first.is_some_and(|b| b.is_ascii_digit() || b == b'.') {
            return Ok(None);
        }
        if first == Some(b'.') && !self.byte(p + 1).is_some_and(|b| b.is_ascii_digit()) {
            return Ok(None);
        }

        let mut end = self.some_of(p, b"0123456789_");
        if self.match_str(end, "..").is_some() {
            return Ok(None); // a range, not a decimal point
        }
        let mut has_marker = false;
        if self.byte(end) == Some(b'.') {
            end = self.some_of(end + 1, b"0123456789");
            has_marker = true;
        }
        if self.byte(end) == Some(b'e') {
            let mut exp = end + 1;
            if self.byte(exp) == Some(b'-') {
                exp += 1;
            }
            end = self.some_of(exp, b"0123456789_");
            has_marker = true;
        } else if self.byte(end) == Some(b'f') && !self.is_xid_continue_next(end + 1) {
            // A trailing `f` marks a num without changing its value:
            end += 1;
            has_marker = true;
        }

        if !has_marker && !matches!(self.byte(end), Some(b'%')) {
            return Ok(None);
        }

        let mantissa_end = if self.byte(end.saturating_sub(1)) == Some(b'f') { end - 1 } else { end };
        let digits: String = self.text()[p..mantissa_end].chars().filter(|&c| c != '_').collect();
        let mut value: f64 = digits.parse().unwrap_or(0.0);
        if negative {
            value = -value;
        }

        let mut p = end;
        if let Some(after) = self.match_str(p, "%") {
            value /= 100.0;
            p = after;
        } else if let Some(after) = self.match_str(p, "deg") {
            value *= RADIANS_PER_DEGREE;
            p = after;
        }

        Ok(Some(self.node(start, p, AstNode::Num { value, bits: 64 })))
    }

    pub(crate) fn parse_negative(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_str(pos, "-") {
            Some(p) => p,
            None => return Ok(None),
        };
        let value = self.expect(start, &mut p, Parser::parse_term, "I expected an expression for this '-'")?;
        Ok(Some(self.node(start, p, AstNode::Negative(Box::new(value)))))
    }

    pub(crate) fn parse_not(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "not") {
            Some(p) => p,
            None => return Ok(None),
        };
        let value = self.expect(start, &mut p, Parser::parse_term, "I expected an expression for this 'not'")?;
        Ok(Some(self.node(start, p, AstNode::Not(Box::new(value)))))
    }

    fn parse_reference(&self, pos: usize, sigil: &str) -> Parsed {
        let start = pos;
        let mut p = match self.match_str(pos, sigil) {
            Some(p) => p,
            None => return Ok(None),
        };
        let mut value = self.expect(
            start,
            &mut p,
            Parser::parse_term_no_suffix,
            "I expected an expression for this reference",
        )?;
        loop {
            if let Some(t) = self.parse_index_suffix(&value)? {
                value = t;
            } else if let Some(t) = self.parse_fncall_suffix(&value)? {
                value = t;
            } else if let Some(t) = self.parse_method_call_suffix(&value)? {
                value = t;
            } else if let Some(t) = self.parse_field_suffix(&value)? {
                value = t;
            } else {
                break;
            }
        }
        let end = value.span.end;
        let node = if sigil == "@" {
            AstNode::HeapAllocate(Box::new(value))
        } else {
            AstNode::StackReference(Box::new(value))
        };
        let mut ast = self.node(start, end, node);
        loop {
            if let Some(t) = self.parse_optional_suffix(&ast)? {
                ast = t;
            } else if let Some(t) = self.parse_non_optional_suffix(&ast)? {
                ast = t;
            } else {
                break;
            }
        }
        Ok(Some(ast))
    }

    pub(crate) fn parse_heap_alloc(&self, pos: usize) -> Parsed {
        self.parse_reference(pos, "@")
    }

    pub(crate) fn parse_stack_reference(&self, pos: usize) -> Parsed {
        self.parse_reference(pos, "&")
    }

    pub(crate) fn parse_parens(&self, pos: usize) -> Parsed {
        let start = pos;
        let p = self.spaces(pos);
        let mut p = match self.match_str(p, "(") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.whitespace(p)?;
        let mut expr = match self.optional(&mut p, Parser::parse_extended_expr)? {
            Some(expr) => expr,
            None => return Ok(None),
        };
        while let Some(suffixed) = self.parse_comprehension_suffix(&expr)? {
            p = suffixed.span.end;
            expr = suffixed;
        }
        p = self.whitespace(p)?;
        self.expect_closing(&mut p, ")", "I wasn't able to parse the rest of this expression")?;
        // Widen the span to include the parentheses:
        Ok(Some(expr.respanned(start, p)))
    }

    pub(crate) fn parse_array(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_str(pos, "[") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.whitespace(p)?;

        let mut items = Vec::new();
        loop {
            let mut item = match self.optional(&mut p, Parser::parse_extended_expr)? {
                Some(item) => item,
                None => break,
            };
            while let Some(suffixed) = self.parse_comprehension_suffix(&item)? {
                p = suffixed.span.end;
                item = suffixed;
            }
            items.push(item);
            match self.match_separator(p) {
                Some(after) => p = after,
                None => break,
            }
        }
        p = self.whitespace(p)?;
        self.expect_closing(&mut p, "]", "I wasn't able to parse the rest of this array")?;
        Ok(Some(self.node(start, p, AstNode::Array { item_type: None, items })))
    }

    pub(crate) fn parse_set(&self, pos: usize) -> Parsed {
        let start = pos;
        if let Some(end) = self.match_str(pos, "||") {
            return Ok(Some(self.node(start, end, AstNode::Set { item_type: None, items: vec![] })));
        }
        let mut p = match self.match_str(pos, "|") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.whitespace(p)?;

        let mut items = Vec::new();
        loop {
            let mut item = match self.optional(&mut p, Parser::parse_extended_expr)? {
                Some(item) => item,
                None => break,
            };
            p = self.whitespace(p)?;
            while let Some(suffixed) = self.parse_comprehension_suffix(&item)? {
                p = suffixed.span.end;
                item = suffixed;
            }
            items.push(item);
            match self.match_separator(p) {
                Some(after) => p = after,
                None => break,
            }
        }
        p = self.whitespace(p)?;
        self.expect_closing(&mut p, "|", "I wasn't able to parse the rest of this set")?;
        Ok(Some(self.node(start, p, AstNode::Set { item_type: None, items })))
    }

    pub(crate) fn parse_table(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_str(pos, "{") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.whitespace(p)?;

        let mut entries = Vec::new();
        loop {
            let entry_start = self.spaces(p);
            let key = match self.optional(&mut p, Parser::parse_extended_expr)? {
                Some(key) => key,
                None => break,
            };
            p = self.whitespace(p)?;
            let eq = match self.match_str(p, "=") {
                Some(eq) => eq,
                None => return Ok(None),
            };
            let mut p2 = eq;
            let value =
                self.expect(eq - 1, &mut p2, Parser::parse_expr, "I couldn't parse the value for this table entry")?;
            p = p2;
            let mut entry = self.node(
                entry_start,
                p,
                AstNode::TableEntry { key: Box::new(key), value: Box::new(value) },
            );
            while let Some(suffixed) = self.parse_comprehension_suffix(&entry)? {
                p = suffixed.span.end;
                entry = suffixed;
            }
            entries.push(entry);
            match self.match_separator(p) {
                Some(after) => p = after,
                None => break,
            }
        }

        p = self.whitespace(p)?;
        let mut fallback = None;
        let mut default = None;
        if let Some(after) = self.match_str(p, ";") {
            p = after;
            loop {
                p = self.whitespace(p)?;
                let attr_start = p;
                if let Some(after) = self.match_word(p, "fallback") {
                    p = self.whitespace(after)?;
                    match self.match_str(p, "=") {
                        Some(after) => p = after,
                        None => return Err(self.err(attr_start, p, "I expected an '=' after 'fallback'")),
                    }
                    if fallback.is_some() {
                        return Err(self.err(attr_start, p, "This table already has a fallback"));
                    }
                    fallback = Some(self.expect(attr_start, &mut p, Parser::parse_expr, "I expected a fallback table")?);
                } else if let Some(after) = self.match_word(p, "default") {
                    p = self.whitespace(after)?;
                    match self.match_str(p, "=") {
                        Some(after) => p = after,
                        None => return Err(self.err(attr_start, p, "I expected an '=' after 'default'")),
                    }
                    if default.is_some() {
                        return Err(self.err(attr_start, p, "This table already has a default"));
                    }
                    default = Some(self.expect(attr_start, &mut p, Parser::parse_expr, "I expected a default value")?);
                } else {
                    break;
                }
                p = self.whitespace(p)?;
                match self.match_str(p, ",") {
                    Some(after) => p = after,
                    None => break,
                }
            }
        }

        p = self.whitespace(p)?;
        self.expect_closing(&mut p, "}", "I wasn't able to parse the rest of this table")?;
        Ok(Some(self.node(
            start,
            p,
            AstNode::Table {
                key_type: None,
                value_type: None,
                entries,
                fallback: fallback.map(Box::new),
                default: default.map(Box::new),
            },
        )))
    }

    pub(crate) fn parse_reduction(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_str(pos, "(") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.whitespace(p)?;
        let (op, after_op) = match self.match_binary_operator(p) {
            Some(matched) => matched,
            None => return Ok(None),
        };
        p = after_op;
        let key = self.parse_key_chain(&mut p)?;

        p = self.whitespace(p)?;
        p = match self.match_str(p, ":") {
            Some(p) => p,
            None => return Ok(None),
        };

        let mut iter = match self.optional(&mut p, Parser::parse_extended_expr)? {
            Some(iter) => iter,
            None => return Ok(None),
        };
        while let Some(suffixed) = self.parse_comprehension_suffix(&iter)? {
            p = suffixed.span.end;
            iter = suffixed;
        }

        p = self.whitespace(p)?;
        self.expect_closing(&mut p, ")", "I wasn't able to parse the rest of this reduction")?;
        Ok(Some(self.node(
            start,
            p,
            AstNode::Reduction { iter: Box::new(iter), op, key: key.map(Box::new) },
        )))
    }

    pub(crate) fn parse_deserialize(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "deserialize") {
            Some(p) => p,
            None => return Ok(None),
        };
        self.expect_str(start, &mut p, "(", "I expected arguments for this `deserialize` call")?;
        p = self.whitespace(p)?;
        let value = self.expect(start, &mut p, Parser::parse_extended_expr, "I expected an expression here")?;
        p = self.whitespace(p)?;
        self.expect_str(
            start,
            &mut p,
            "->",
            "I expected a `-> Type` for this `deserialize` call so I know what it deserializes to",
        )?;
        p = self.whitespace(p)?;
        let type_ast = self.expect_type(start, &mut p, "I couldn't parse the type for this deserialization")?;
        p = self.whitespace(p)?;
        self.expect_closing(&mut p, ")", "I expected a closing ')' for this `deserialize` call")?;
        Ok(Some(self.node(
            start,
            p,
            AstNode::Deserialize { value: Box::new(value), type_ast },
        )))
    }

    pub(crate) fn parse_lambda(&self, pos: usize) -> Parsed {
        let start = pos;
        let p = match self.match_word(pos, "func") {
            Some(p) => p,
            None => return Ok(None),
        };
        let p = self.spaces(p);
        let mut p = match self.match_str(p, "(") {
            Some(p) => p,
            None => return Ok(None),
        };
        let args = self.parse_args(&mut p)?;
        p = self.spaces(p);
        let ret_type = if let Some(after) = self.match_str(p, "->") {
            p = after;
            self.optional_type(&mut p)?
        } else {
            None
        };
        p = self.spaces(p);
        self.expect_closing(&mut p, ")", "I was expecting a ')' to finish this anonymous function's arguments")?;
        let body = match self.parse_block(p)? {
            Some(body) => {
                p = body.span.end;
                body
            }
            None => self.node(p, p, AstNode::Block(vec![])),
        };
        let id = self.next_lambda_id.get();
        self.next_lambda_id.set(id + 1);
        Ok(Some(self.node(
            start,
            p,
            AstNode::Lambda { id, args, ret_type, body: Box::new(body) },
        )))
    }

    // --- Suffix parsers ---

    pub(crate) fn parse_index_suffix(&self, lhs: &Ast) -> Parsed {
        let start = lhs.span.start;
        let mut p = match self.match_str(lhs.span.end, "[") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.whitespace(p)?;
        let index = self.optional(&mut p, Parser::parse_extended_expr)?;
        p = self.whitespace(p)?;
        let mut unchecked = false;
        if let Some(after) = self.match_str(p, ";") {
            let after = self.spaces(after);
            if let Some(after) = self.match_word(after, "unchecked") {
                unchecked = true;
                p = after;
            }
        }
        self.expect_closing(&mut p, "]", "I wasn't able to parse the rest of this index")?;
        Ok(Some(self.node(
            start,
            p,
            AstNode::Index { indexed: Box::new(lhs.clone()), index: index.map(Box::new), unchecked },
        )))
    }

    pub(crate) fn parse_field_suffix(&self, lhs: &Ast) -> Parsed {
        let mut p = self.whitespace(lhs.span.end)?;
        p = match self.match_str(p, ".") {
            Some(p) => p,
            None => return Ok(None),
        };
        if self.byte(p) == Some(b'.') {
            return Ok(None);
        }
        p = self.whitespace(p)?;
        let dollar = self.match_str(p, "$");
        if let Some(after) = dollar {
            p = after;
        }
        let (field, end) = match self.get_id(p) {
            Some(found) => found,
            None => return Ok(None),
        };
        let field = if dollar.is_some() { format!("${field}") } else { field };
        Ok(Some(self.node(
            lhs.span.start,
            end,
            AstNode::FieldAccess { fielded: Box::new(lhs.clone()), field },
        )))
    }

    pub(crate) fn parse_optional_suffix(&self, lhs: &Ast) -> Parsed {
        match self.match_str(lhs.span.end, "?") {
            Some(end) => Ok(Some(self.node(lhs.span.start, end, AstNode::Optional(Box::new(lhs.clone()))))),
            None => Ok(None),
        }
    }

    pub(crate) fn parse_non_optional_suffix(&self, lhs: &Ast) -> Parsed {
        match self.match_str(lhs.span.end, "!") {
            Some(end) => Ok(Some(self.node(lhs.span.start, end, AstNode::NonOptional(Box::new(lhs.clone()))))),
            None => Ok(None),
        }
    }

    /// Call arguments: `name=value` or positional `value`, separated by
    /// commas or newlines. The cursor must be just inside the `(`.
    fn parse_call_args(&self, pos: &mut usize) -> PResult<Vec<Arg>> {
        let mut args = Vec::new();
        loop {
            let arg_start = *pos;
            let mut p = arg_start;
            let mut name = None;
            if let Some((id, after)) = self.get_id(p) {
                let after_ws = self.whitespace(after)?;
                // `name=value`, but not `name==value` (a comparison):
                if self.match_str(after_ws, "==").is_none() {
                    if let Some(after_eq) = self.match_str(after_ws, "=") {
                        name = Some(id);
                        p = after_eq;
                    }
                }
            }
            if name.is_none() {
                p = arg_start;
            }
            match self.optional(&mut p, Parser::parse_expr)? {
                Some(value) => {
                    args.push(Arg { name, type_ast: None, value: Some(value) });
                    *pos = p;
                    match self.match_separator(p) {
                        Some(after) => *pos = after,
                        None => break,
                    }
                }
                None => {
                    if name.is_some() {
                        return Err(self.err(arg_start, p, "I expected an argument here"));
                    }
                    break;
                }
            }
        }
        Ok(args)
    }

    pub(crate) fn parse_method_call_suffix(&self, lhs: &Ast) -> Parsed {
        let start = lhs.span.start;
        let mut p = match self.match_str(lhs.span.end, ".") {
            Some(p) => p,
            None => return Ok(None),
        };
        if self.byte(p) == Some(b' ') {
            return Ok(None);
        }
        let (name, after) = match self.get_id(p) {
            Some(found) => found,
            None => return Ok(None),
        };
        p = self.spaces(after);
        p = match self.match_str(p, "(") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.whitespace(p)?;
        let args = self.parse_call_args(&mut p)?;
        p = self.whitespace(p)?;
        p = match self.match_str(p, ")") {
            Some(p) => p,
            None => return Err(self.err(start, p, "This parenthesis is unclosed")),
        };
        Ok(Some(self.node(
            start,
            p,
            AstNode::MethodCall { target: Box::new(lhs.clone()), name, args },
        )))
    }

    pub(crate) fn parse_fncall_suffix(&self, lhs: &Ast) -> Parsed {
        let start = lhs.span.start;
        let mut p = match self.match_str(lhs.span.end, "(") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.whitespace(p)?;
        let args = self.parse_call_args(&mut p)?;
        p = self.whitespace(p)?;
        p = match self.match_str(p, ")") {
            Some(p) => p,
            None => return Err(self.err(start, p, "This parenthesis is unclosed")),
        };
        Ok(Some(self.node(
            start,
            p,
            AstNode::FunctionCall { function: Box::new(lhs.clone()), args },
        )))
    }

    /// `<expr> for [vars in] iter [if cond | unless cond]`
    pub(crate) fn parse_comprehension_suffix(&self, expr: &Ast) -> Parsed {
        let start = expr.span.start;
        let p = self.whitespace(expr.span.end)?;
        let mut p = match self.match_word(p, "for") {
            Some(p) => p,
            None => return Ok(None),
        };

        let mut vars = Vec::new();
        loop {
            if let Some(var) = self.optional(&mut p, Parser::parse_var)? {
                vars.push(var);
            }
            p = self.spaces(p);
            match self.match_str(p, ",") {
                Some(after) => p = after,
                None => break,
            }
        }

        self.expect_str(start, &mut p, "in", "I expected an 'in' for this 'for'")?;
        let iter = self.expect(start, &mut p, Parser::parse_expr, "I expected an iterable value for this 'for'")?;

        let next = self.whitespace(p)?;
        let mut filter = None;
        if let Some(after) = self.match_word(next, "if") {
            p = after;
            filter = Some(self.expect(next, &mut p, Parser::parse_expr, "I expected a condition for this 'if'")?);
        } else if let Some(after) = self.match_word(next, "unless") {
            p = after;
            let cond = self.expect(next, &mut p, Parser::parse_expr, "I expected a condition for this 'unless'")?;
            let span = cond.span;
            filter = Some(self.node(span.start, span.end, AstNode::Not(Box::new(cond))));
        }

        Ok(Some(self.node(
            start,
            p,
            AstNode::Comprehension {
                expr: Box::new(expr.clone()),
                vars,
                iter: Box::new(iter),
                filter: filter.map(Box::new),
            },
        )))
    }

    /// `<statement> if cond` / `<statement> unless cond` wrappers.
    pub(crate) fn parse_optional_conditional_suffix(&self, stmt: Ast) -> PResult<Ast> {
        let start = stmt.span.start;
        if let Some(mut p) = self.match_word(stmt.span.end, "if") {
            let condition = self.expect(start, &mut p, Parser::parse_expr, "I expected a condition for this 'if'")?;
            return Ok(self.node(
                start,
                p,
                AstNode::If { condition: Box::new(condition), body: Box::new(stmt), else_body: None },
            ));
        }
        if let Some(mut p) = self.match_word(stmt.span.end, "unless") {
            let condition = self.expect(start, &mut p, Parser::parse_expr, "I expected a condition for this 'unless'")?;
            let span = condition.span;
            let negated = self.node(span.start, span.end, AstNode::Not(Box::new(condition)));
            return Ok(self.node(
                start,
                p,
                AstNode::If { condition: Box::new(negated), body: Box::new(stmt), else_body: None },
            ));
        }
        Ok(stmt)
    }
}
