//! Statement parsing: blocks, control flow, definitions, and the file
//! body.

use crate::ast::{Arg, Ast, AstNode, BinOp, EnumTag, UseKind, WhenClause};
use crate::parser::{Parsed, Parser, PResult};

impl Parser {
    pub(crate) fn parse_pass(&self, pos: usize) -> Parsed {
        match self.match_word(pos, "pass") {
            Some(end) => Ok(Some(self.node(pos, end, AstNode::Pass))),
            None => Ok(None),
        }
    }

    pub(crate) fn parse_defer(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "defer") {
            Some(p) => p,
            None => return Ok(None),
        };
        let body = self.expect(start, &mut p, Parser::parse_block, "I expected a block to be deferred here")?;
        Ok(Some(self.node(start, p, AstNode::Defer(Box::new(body)))))
    }

    fn parse_loop_control(&self, pos: usize, words: [&str; 2]) -> PResult<Option<(Option<String>, usize)>> {
        let p = match words.iter().find_map(|w| self.match_word(pos, w)) {
            Some(p) => p,
            None => return Ok(None),
        };
        let (target, p) = if let Some(after) = self.match_word(p, "for") {
            (Some("for".to_string()), after)
        } else if let Some(after) = self.match_word(p, "while") {
            (Some("while".to_string()), after)
        } else if let Some((id, after)) = self.get_id(p) {
            (Some(id), after)
        } else {
            (None, p)
        };
        Ok(Some((target, p)))
    }

    pub(crate) fn parse_skip(&self, pos: usize) -> Parsed {
        let start = pos;
        let (target, p) = match self.parse_loop_control(pos, ["continue", "skip"])? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };
        let skip = self.node(start, p, AstNode::Skip { target });
        Ok(Some(self.parse_optional_conditional_suffix(skip)?))
    }

    pub(crate) fn parse_stop(&self, pos: usize) -> Parsed {
        let start = pos;
        let (target, p) = match self.parse_loop_control(pos, ["stop", "break"])? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };
        let stop = self.node(start, p, AstNode::Stop { target });
        Ok(Some(self.parse_optional_conditional_suffix(stop)?))
    }

    pub(crate) fn parse_return(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "return") {
            Some(p) => p,
            None => return Ok(None),
        };
        let value = self.optional(&mut p, Parser::parse_expr)?;
        let ret = self.node(start, p, AstNode::Return(value.map(Box::new)));
        Ok(Some(self.parse_optional_conditional_suffix(ret)?))
    }

    /// `if cond [then] body [else body|if...]` and `unless cond body`.
    pub(crate) fn parse_if(&self, pos: usize) -> Parsed {
        let start = pos;
        let starting_indent = self.get_indent(pos)?;

        let (unless, mut p) = if let Some(p) = self.match_word(pos, "if") {
            (false, p)
        } else if let Some(p) = self.match_word(pos, "unless") {
            (true, p)
        } else {
            return Ok(None);
        };

        let mut condition = if unless {
            None
        } else {
            self.optional(&mut p, Parser::parse_declaration)?
        };
        if condition.is_none() {
            condition = Some(self.expect(start, &mut p, Parser::parse_expr, "I expected to find a condition for this 'if'")?);
        }
        let mut condition = condition.expect("condition was just parsed");
        if unless {
            let span = condition.span;
            condition = self.node(span.start, span.end, AstNode::Not(Box::new(condition)));
        }

        if let Some(after) = self.match_word(p, "then") {
            p = after;
        }
        let body = self.expect(start, &mut p, Parser::parse_block, "I expected a body for this 'if' statement")?;

        let mut else_body = None;
        let probe = self.whitespace(p)?;
        if self.get_indent(probe)? == starting_indent {
            if let Some(after_else) = self.match_word(probe, "else") {
                let else_start = after_else;
                let mut p2 = self.spaces(after_else);
                else_body = self.optional(&mut p2, Parser::parse_if)?;
                if else_body.is_none() {
                    else_body =
                        Some(self.expect(else_start, &mut p2, Parser::parse_block, "I expected a body for this 'else'")?);
                }
                p = p2;
            }
        }
        Ok(Some(self.node(
            start,
            p,
            AstNode::If {
                condition: Box::new(condition),
                body: Box::new(body),
                else_body: else_body.map(Box::new),
            },
        )))
    }

    /// `when subject (is pattern[, pattern...] [then] body)* [else body]`
    pub(crate) fn parse_when(&self, pos: usize) -> Parsed {
        let start = pos;
        let starting_indent = self.get_indent(pos)?;

        let mut p = match self.match_word(pos, "when") {
            Some(p) => p,
            None => return Ok(None),
        };

        let subject = match self.optional(&mut p, Parser::parse_declaration)? {
            Some(decl) => decl,
            None => self.expect(start, &mut p, Parser::parse_expr, "I expected to find an expression for this 'when'")?,
        };

        let mut clauses = Vec::new();
        loop {
            let probe = self.whitespace(p)?;
            if self.get_indent(probe)? != starting_indent {
                break;
            }
            let after_is = match self.match_word(probe, "is") {
                Some(after) => after,
                None => break,
            };
            let mut p2 = self.spaces(after_is);
            let mut patterns =
                vec![self.expect(start, &mut p2, Parser::parse_expr, "I expected a pattern to match here")?];
            p2 = self.spaces(p2);
            while let Some(after_comma) = self.match_str(p2, ",") {
                p2 = after_comma;
                patterns.push(self.expect(start, &mut p2, Parser::parse_expr, "I expected a pattern to match here")?);
                p2 = self.spaces(p2);
            }
            if let Some(after) = self.match_word(p2, "then") {
                p2 = after;
            }
            let body = self.expect(start, &mut p2, Parser::parse_block, "I expected a body for this 'when' clause")?;
            clauses.push(WhenClause { patterns, body });
            p = p2;
        }

        let mut else_body = None;
        let probe = self.whitespace(p)?;
        if self.get_indent(probe)? == starting_indent {
            if let Some(after_else) = self.match_word(probe, "else") {
                let mut p2 = after_else;
                else_body =
                    Some(self.expect(after_else, &mut p2, Parser::parse_block, "I expected a body for this 'else'")?);
                p = p2;
            }
        }
        Ok(Some(self.node(
            start,
            p,
            AstNode::When {
                subject: Box::new(subject),
                clauses,
                else_body: else_body.map(Box::new),
            },
        )))
    }

    /// `for [v,] v in iter [do] body [else body-when-empty]`
    pub(crate) fn parse_for(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "for") {
            Some(p) => p,
            None => return Ok(None),
        };
        let starting_indent = self.get_indent(p)?;
        p = self.spaces(p);

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

        p = self.spaces(p);
        self.expect_str(start, &mut p, "in", "I expected an 'in' for this 'for'")?;
        let iter = self.expect(start, &mut p, Parser::parse_expr, "I expected an iterable value for this 'for'")?;

        if let Some(after) = self.match_word(p, "do") {
            p = after;
        }
        let body = self.expect(start, &mut p, Parser::parse_block, "I expected a body for this 'for'")?;

        let mut empty = None;
        let probe = self.whitespace(p)?;
        if let Some(after_else) = self.match_word(probe, "else") {
            if self.get_indent(after_else)? == starting_indent {
                let mut p2 = after_else;
                empty = Some(self.expect(after_else, &mut p2, Parser::parse_block, "I expected a body for this 'else'")?);
                p = p2;
            }
        }
        Ok(Some(self.node(
            start,
            p,
            AstNode::For {
                vars,
                iter: Box::new(iter),
                body: Box::new(body),
                empty: empty.map(Box::new),
            },
        )))
    }

    /// `while cond [do] body`, plus the `while when ...` shorthand
    /// whose missing `else` becomes `stop`.
    pub(crate) fn parse_while(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "while") {
            Some(p) => p,
            None => return Ok(None),
        };

        if self.match_word(p, "when").is_some() {
            let mut when = self.expect(start, &mut p, Parser::parse_when, "I expected a 'when' block after this")?;
            if let AstNode::When { else_body, .. } = &mut when.node {
                if else_body.is_none() {
                    *else_body = Some(Box::new(self.node(p, p, AstNode::Stop { target: None })));
                }
            }
            return Ok(Some(self.node(
                start,
                p,
                AstNode::While { condition: None, body: Box::new(when) },
            )));
        }

        let condition = self.expect(start, &mut p, Parser::parse_expr, "I don't see a viable condition for this 'while'")?;
        if let Some(after) = self.match_word(p, "do") {
            p = after;
        }
        let body = self.expect(start, &mut p, Parser::parse_block, "I expected a body for this 'while'")?;
        Ok(Some(self.node(
            start,
            p,
            AstNode::While { condition: Some(Box::new(condition)), body: Box::new(body) },
        )))
    }

    pub(crate) fn parse_repeat(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "repeat") {
            Some(p) => p,
            None => return Ok(None),
        };
        let body = self.expect(start, &mut p, Parser::parse_block, "I expected a body for this 'repeat'")?;
        Ok(Some(self.node(start, p, AstNode::Repeat(Box::new(body)))))
    }

    /// `do body` is just a scoped block.
    pub(crate) fn parse_do(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "do") {
            Some(p) => p,
            None => return Ok(None),
        };
        let body = self.expect(start, &mut p, Parser::parse_block, "I expected a body for this 'do'")?;
        let statements = match body.node {
            AstNode::Block(statements) => statements,
            _ => unreachable!("parse_block always returns a block"),
        };
        Ok(Some(self.node(start, p, AstNode::Block(statements))))
    }

    /// `var : [Type] [= value]`
    pub(crate) fn parse_declaration(&self, pos: usize) -> Parsed {
        let start = pos;
        let var = match self.parse_var(pos)? {
            Some(var) => var,
            None => return Ok(None),
        };
        let mut p = self.spaces(var.span.end);
        p = match self.match_str(p, ":") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.spaces(p);
        let type_ast = self.optional_type(&mut p)?;
        p = self.spaces(p);
        let mut value = None;
        if let Some(after) = self.match_str(p, "=") {
            p = after;
            value = self.optional(&mut p, Parser::parse_extended_expr)?;
            if value.is_none() {
                let mut p2 = p;
                if self.optional(&mut p2, Parser::parse_use)?.is_some() {
                    return Err(self.err(start, p2, "'use' statements are only allowed at the top level of a file"));
                }
                return Err(self.err(p, self.eol(p), "This is not a valid expression"));
            }
        }
        Ok(Some(self.node(
            start,
            p,
            AstNode::Declare {
                var: Box::new(var),
                type_ast,
                value: value.map(Box::new),
                top_level: false,
            },
        )))
    }

    fn parse_top_declaration(&self, pos: usize) -> Parsed {
        Ok(self.parse_declaration(pos)?.map(|mut decl| {
            if let AstNode::Declare { top_level, .. } = &mut decl.node {
                *top_level = true;
            }
            decl
        }))
    }

    /// `lhs op= rhs`
    pub(crate) fn parse_update(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = pos;
        let lhs = match self.optional(&mut p, Parser::parse_expr)? {
            Some(lhs) => lhs,
            None => return Ok(None),
        };
        p = self.spaces(p);
        // Longest operators first so `<<<=` isn't read as `<<` `<=`:
        const UPDATE_OPS: &[(&str, BinOp)] = &[
            ("<<<=", BinOp::UnsignedLeftShift),
            (">>>=", BinOp::UnsignedRightShift),
            ("<<=", BinOp::LeftShift),
            (">>=", BinOp::RightShift),
            ("++=", BinOp::Concat),
            ("+=", BinOp::Plus),
            ("-=", BinOp::Minus),
            ("*=", BinOp::Multiply),
            ("/=", BinOp::Divide),
            ("^=", BinOp::Power),
            ("and=", BinOp::And),
            ("or=", BinOp::Or),
            ("xor=", BinOp::Xor),
        ];
        let (op, after) = match UPDATE_OPS
            .iter()
            .find_map(|(text, op)| self.match_str(p, text).map(|after| (*op, after)))
        {
            Some(matched) => matched,
            None => return Ok(None),
        };
        p = after;
        let rhs = self.expect(start, &mut p, Parser::parse_extended_expr, "I expected an expression here")?;
        Ok(Some(self.node(
            start,
            p,
            AstNode::UpdateAssign { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
        )))
    }

    /// `target[, target] = value[, value]`
    pub(crate) fn parse_assignment(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = pos;
        let mut targets = Vec::new();
        loop {
            match self.optional(&mut p, Parser::parse_term)? {
                Some(lhs) => targets.push(lhs),
                None => break,
            }
            p = self.spaces(p);
            match self.match_str(p, ",") {
                Some(after) => p = self.whitespace(after)?,
                None => break,
            }
        }
        if targets.is_empty() {
            return Ok(None);
        }

        p = self.spaces(p);
        p = match self.match_str(p, "=") {
            Some(p) => p,
            None => return Ok(None),
        };
        if self.byte(p) == Some(b'=') {
            return Ok(None); // == comparison
        }

        let mut values = Vec::new();
        loop {
            match self.optional(&mut p, Parser::parse_extended_expr)? {
                Some(rhs) => values.push(rhs),
                None => break,
            }
            p = self.spaces(p);
            match self.match_str(p, ",") {
                Some(after) => p = self.whitespace(after)?,
                None => break,
            }
        }

        Ok(Some(self.node(start, p, AstNode::Assign { targets, values })))
    }

    pub(crate) fn parse_statement(&self, pos: usize) -> Parsed {
        for f in [Parser::parse_declaration, Parser::parse_doctest, Parser::parse_assert] {
            if let Some(stmt) = f(self, pos)? {
                return Ok(Some(stmt));
            }
        }

        let mut stmt = if let Some(stmt) = self.parse_update(pos)? {
            stmt
        } else if let Some(stmt) = self.parse_assignment(pos)? {
            stmt
        } else {
            match self.parse_extended_expr(pos)? {
                Some(stmt) => stmt,
                None => return Ok(None),
            }
        };

        loop {
            match &stmt.node {
                AstNode::Var(_) => {
                    if let Some(new_stmt) = self.parse_method_call_suffix(&stmt)? {
                        stmt = new_stmt;
                    } else if let Some(new_stmt) = self.parse_fncall_suffix(&stmt)? {
                        stmt = new_stmt;
                    } else {
                        break;
                    }
                }
                AstNode::FunctionCall { .. } | AstNode::MethodCall { .. } => {
                    let end = stmt.span.end;
                    stmt = self.parse_optional_conditional_suffix(stmt)?;
                    if stmt.span.end == end {
                        break;
                    }
                }
                _ => break,
            }
        }
        Ok(Some(stmt))
    }

    /// A block: either inline statements separated by `;`, or an
    /// indented run of statements one level deeper.
    pub(crate) fn parse_block(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut pos = self.spaces(pos);
        let mut statements = Vec::new();

        match self.indent(pos)? {
            Some(indented) => {
                pos = self.parse_indented_statements(indented, &mut statements)?;
            }
            None => {
                // Inline block:
                pos = self.spaces(pos);
                while pos < self.text().len() {
                    pos = self.spaces(pos);
                    match self.optional(&mut pos, Parser::parse_statement)? {
                        Some(stmt) => statements.push(stmt),
                        None => break,
                    }
                    pos = self.spaces(pos);
                    match self.match_str(pos, ";") {
                        Some(after) => pos = after,
                        None => break,
                    }
                }
                // An indented continuation can follow the inline part:
                if let Some(indented) = self.indent(pos)? {
                    pos = self.parse_indented_statements(indented, &mut statements)?;
                }
            }
        }
        Ok(Some(self.node(start, pos, AstNode::Block(statements))))
    }

    fn parse_indented_statements(&self, pos: usize, statements: &mut Vec<Ast>) -> PResult<usize> {
        let block_indent = self.get_indent(pos)?;
        let mut pos = self.whitespace(pos)?;
        while pos < self.text().len() {
            let stmt = match self.optional(&mut pos, Parser::parse_statement)? {
                Some(stmt) => stmt,
                None => {
                    let line_start = pos;
                    if self.match_word(pos, "struct").is_some() {
                        return Err(self.err(line_start, self.eol(pos), "Struct definitions are only allowed at the top level"));
                    } else if self.match_word(pos, "enum").is_some() {
                        return Err(self.err(line_start, self.eol(pos), "Enum definitions are only allowed at the top level"));
                    } else if self.match_word(pos, "func").is_some() {
                        return Err(self.err(line_start, self.eol(pos), "Function definitions are only allowed at the top level"));
                    } else if self.match_word(pos, "use").is_some() {
                        return Err(self.err(line_start, self.eol(pos), "'use' statements are only allowed at the top level"));
                    }
                    pos = self.spaces(pos);
                    if !matches!(self.byte(pos), None | Some(b'\r') | Some(b'\n')) {
                        return Err(self.err(pos, self.eol(pos), "I couldn't parse this line"));
                    }
                    break;
                }
            };
            let stmt_end = stmt.span.end;
            statements.push(stmt);
            pos = self.whitespace(pos)?;

            // Two statements on one line (no newline between them) is
            // an error unless we're at the end of input:
            if !self.text()[stmt_end..pos].contains('\n') {
                if pos < self.text().len() {
                    return Err(self.err(pos, self.eol(pos), "I don't know how to parse the rest of this line"));
                }
                pos = stmt_end;
                break;
            }

            if self.get_indent(pos)? != block_indent {
                pos = stmt_end; // backtrack: the block ends here
                break;
            }
        }
        Ok(pos)
    }

    /// The statements nested under a `struct`/`enum`/`lang`/`extend`.
    pub(crate) fn parse_namespace(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut pos = self.whitespace(pos)?;
        let indent = self.get_indent(pos)?;
        let mut statements = Vec::new();
        loop {
            let next = self.whitespace(pos)?;
            if self.get_indent(next)? != indent {
                break;
            }
            let mut parsed = None;
            for f in [
                Parser::parse_struct_def,
                Parser::parse_func_def,
                Parser::parse_enum_def,
                Parser::parse_lang_def,
                Parser::parse_extend,
                Parser::parse_convert_def,
                Parser::parse_use,
                Parser::parse_extern,
                Parser::parse_inline_c,
                Parser::parse_declaration,
            ] {
                if let Some(stmt) = self.optional(&mut pos, f)? {
                    parsed = Some(stmt);
                    break;
                }
            }
            match parsed {
                Some(stmt) => {
                    statements.push(stmt);
                    pos = self.whitespace(pos)?;
                }
                None => {
                    if self.get_indent(next)? > indent && next < self.eol(next) {
                        return Err(self.err(next, self.eol(next), "I couldn't parse this namespace declaration"));
                    }
                    break;
                }
            }
        }
        Ok(Some(self.node(start, pos, AstNode::Block(statements))))
    }

    pub(crate) fn parse_file_body(&self, pos: usize) -> PResult<Ast> {
        let start = pos;
        let mut pos = self.whitespace(pos)?;
        let mut statements = Vec::new();
        loop {
            let next = self.whitespace(pos)?;
            if self.get_indent(next)? != 0 {
                break;
            }
            let mut parsed = None;
            for f in [
                Parser::parse_struct_def,
                Parser::parse_func_def,
                Parser::parse_enum_def,
                Parser::parse_lang_def,
                Parser::parse_extend,
                Parser::parse_convert_def,
                Parser::parse_use,
                Parser::parse_extern,
                Parser::parse_inline_c,
                Parser::parse_top_declaration,
            ] {
                if let Some(stmt) = self.optional(&mut pos, f)? {
                    parsed = Some(stmt);
                    break;
                }
            }
            match parsed {
                Some(stmt) => {
                    statements.push(stmt);
                    pos = self.whitespace(pos)?;
                }
                None => break,
            }
        }
        pos = self.whitespace(pos)?;
        if pos < self.text().len() {
            return Err(self.err(pos, self.eol(pos), "I expect all top-level statements to be declarations of some kind"));
        }
        Ok(self.node(start, pos, AstNode::Block(statements)))
    }

    /// Definition argument lists, with name batches: `x, y: Int` gives
    /// both names the shared type.
    pub(crate) fn parse_args(&self, pos: &mut usize) -> PResult<Vec<Arg>> {
        let mut args = Vec::new();
        loop {
            let batch_start = *pos;
            let mut p = *pos;
            let mut names: Vec<String> = Vec::new();
            let mut type_ast = None;
            let mut default = None;
            loop {
                p = self.whitespace(p)?;
                let (name, after) = match self.get_id(p) {
                    Some(found) => found,
                    None => break,
                };
                p = self.whitespace(after)?;

                if let Some(after_colon) = self.match_str(p, ":") {
                    p = after_colon;
                    type_ast = Some(self.expect_type(after_colon - 1, &mut p, "I expected a type here")?);
                    names.push(name);
                    p = self.whitespace(p)?;
                    if let Some(after_eq) = self.match_str(p, "=") {
                        p = after_eq;
                        default = Some(self.expect(after_eq - 1, &mut p, Parser::parse_term, "I expected a value after this '='")?);
                    }
                    break;
                } else if self.match_str(p, "==").is_none() && self.match_str(p, "=").is_some() {
                    let after_eq = self.match_str(p, "=").expect("just matched");
                    p = after_eq;
                    default = Some(self.expect(after_eq - 1, &mut p, Parser::parse_term, "I expected a value after this '='")?);
                    names.push(name);
                    break;
                } else {
                    names.push(name);
                    p = self.spaces(p);
                    match self.match_str(p, ",") {
                        Some(after) => p = after,
                        None => break,
                    }
                }
            }
            if names.is_empty() {
                break;
            }
            if type_ast.is_none() && default.is_none() {
                return Err(self.err(
                    batch_start,
                    p,
                    format!(
                        "I expected a ':' and type, or '=' and a default value after this parameter ({})",
                        names[0]
                    ),
                ));
            }
            for name in names {
                args.push(Arg {
                    name: Some(name),
                    type_ast: type_ast.clone(),
                    value: default.clone(),
                });
            }
            *pos = p;
            match self.match_separator(p) {
                Some(after) => *pos = after,
                None => break,
            }
        }
        Ok(args)
    }

    /// `struct Name(fields [; flags]) [: namespace]`
    pub(crate) fn parse_struct_def(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "struct") {
            Some(p) => p,
            None => return Ok(None),
        };
        let starting_indent = self.get_indent(p)?;
        p = self.spaces(p);
        let (name, after) = match self.get_id(p) {
            Some(found) => found,
            None => return Err(self.err(start, p, "I expected a name for this struct")),
        };
        p = self.spaces(after);
        p = match self.match_str(p, "(") {
            Some(p) => p,
            None => return Err(self.err(p, p, "I expected a '(' and a list of fields here")),
        };
        let fields = self.parse_args(&mut p)?;

        p = self.whitespace(p)?;
        let mut secret = false;
        let mut external = false;
        let mut opaque = false;
        if let Some(after) = self.match_str(p, ";") {
            p = self.whitespace(after)?;
            loop {
                if let Some(after) = self.match_word(p, "secret") {
                    secret = true;
                    p = after;
                } else if let Some(after) = self.match_word(p, "extern") {
                    external = true;
                    p = after;
                } else if let Some(after) = self.match_word(p, "opaque") {
                    if !fields.is_empty() {
                        return Err(self.err(p, after, "A struct can't be opaque if it has fields defined"));
                    }
                    opaque = true;
                    p = after;
                } else {
                    break;
                }
                match self.match_separator(p) {
                    Some(after) => p = after,
                    None => break,
                }
            }
        }

        self.expect_closing(&mut p, ")", "I wasn't able to parse the rest of this struct")?;
        let namespace = self.parse_optional_namespace(&mut p, starting_indent)?;
        Ok(Some(self.node(
            start,
            p,
            AstNode::StructDef {
                name,
                fields,
                namespace: Box::new(namespace),
                secret,
                external,
                opaque,
            },
        )))
    }

    fn parse_optional_namespace(&self, pos: &mut usize, starting_indent: i64) -> PResult<Ast> {
        let probe = self.whitespace(*pos)?;
        if self.get_indent(probe)? > starting_indent {
            if let Some(namespace) = self.parse_namespace(probe)? {
                *pos = namespace.span.end;
                return Ok(namespace);
            }
        }
        Ok(self.node(*pos, *pos, AstNode::Block(vec![])))
    }

    /// `enum Name(tag, tag(fields), ...) [: namespace]`
    pub(crate) fn parse_enum_def(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "enum") {
            Some(p) => p,
            None => return Ok(None),
        };
        let starting_indent = self.get_indent(p)?;
        p = self.spaces(p);
        let (name, after) = match self.get_id(p) {
            Some(found) => found,
            None => return Err(self.err(start, p, "I expected a name for this enum")),
        };
        p = self.spaces(after);
        p = match self.match_str(p, "(") {
            Some(p) => p,
            None => return Ok(None),
        };

        let mut tags = Vec::new();
        p = self.whitespace(p)?;
        loop {
            p = self.spaces(p);
            let (tag_name, after) = match self.get_id(p) {
                Some(found) => found,
                None => break,
            };
            p = self.spaces(after);

            let mut fields = Vec::new();
            let mut secret = false;
            if let Some(after) = self.match_str(p, "(") {
                p = self.whitespace(after)?;
                fields = self.parse_args(&mut p)?;
                p = self.whitespace(p)?;
                if let Some(after) = self.match_str(p, ";") {
                    p = self.whitespace(after)?;
                    if let Some(after) = self.match_word(p, "secret") {
                        secret = true;
                        p = after;
                    }
                    p = self.whitespace(p)?;
                }
                self.expect_closing(&mut p, ")", "I wasn't able to parse the rest of this tagged union member")?;
            }

            tags.push(EnumTag { name: tag_name, fields, secret });
            match self.match_separator(p) {
                Some(after) => p = after,
                None => break,
            }
        }

        p = self.whitespace(p)?;
        self.expect_closing(&mut p, ")", "I wasn't able to parse the rest of this enum definition")?;

        if tags.is_empty() {
            return Err(self.err(start, p, "This enum does not have any tags!"));
        }

        let namespace = self.parse_optional_namespace(&mut p, starting_indent)?;
        Ok(Some(self.node(
            start,
            p,
            AstNode::EnumDef { name, tags, namespace: Box::new(namespace) },
        )))
    }

    pub(crate) fn parse_lang_def(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "lang") {
            Some(p) => p,
            None => return Ok(None),
        };
        let starting_indent = self.get_indent(p)?;
        p = self.spaces(p);
        let (name, after) = match self.get_id(p) {
            Some(found) => found,
            None => return Err(self.err(start, p, "I expected a name for this lang")),
        };
        let mut p = self.spaces(after);
        let namespace = self.parse_optional_namespace(&mut p, starting_indent)?;
        Ok(Some(self.node(
            start,
            p,
            AstNode::LangDef { name, namespace: Box::new(namespace) },
        )))
    }

    pub(crate) fn parse_extend(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "extend") {
            Some(p) => p,
            None => return Ok(None),
        };
        let starting_indent = self.get_indent(p)?;
        p = self.spaces(p);
        let (name, after) = match self.get_id(p) {
            Some(found) => found,
            None => return Err(self.err(start, p, "I expected a name for this extend")),
        };
        let mut p = after;
        let body = self.parse_optional_namespace(&mut p, starting_indent)?;
        Ok(Some(self.node(start, p, AstNode::Extend { name, body: Box::new(body) })))
    }

    fn parse_function_flags(&self, pos: &mut usize) -> PResult<(bool, Option<Ast>)> {
        let mut is_inline = false;
        let mut cache = None;
        let mut p = *pos;
        let mut specials = match self.match_str(p, ";") {
            Some(after) => {
                p = after;
                true
            }
            None => false,
        };
        while specials {
            let flag_start = self.spaces(p);
            if let Some(after) = self.match_word(p, "inline") {
                is_inline = true;
                p = after;
            } else if let Some(after) = self.match_word(p, "cached") {
                p = after;
                if cache.is_none() {
                    cache = Some(self.node(p, p, AstNode::Int { digits: "-1".to_string(), bits: 64 }));
                }
            } else if let Some(after) = self.match_word(p, "cache_size") {
                p = self.whitespace(after)?;
                p = match self.match_str(p, "=") {
                    Some(after) => after,
                    None => return Err(self.err(flag_start, p, "I expected a value for 'cache_size'")),
                };
                p = self.whitespace(p)?;
                cache = Some(self.expect(flag_start, &mut p, Parser::parse_expr, "I expected a maximum size for the cache")?);
            }
            match self.match_separator(p) {
                Some(after) => {
                    p = after;
                    specials = true;
                }
                None => specials = false,
            }
        }
        *pos = p;
        Ok((is_inline, cache))
    }

    /// `func name(args [-> Type] [; flags]) body`
    pub(crate) fn parse_func_def(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "func") {
            Some(p) => p,
            None => return Ok(None),
        };
        let name = match self.optional(&mut p, Parser::parse_var)? {
            Some(name) => name,
            None => return Ok(None),
        };
        p = self.spaces(p);
        self.expect_str(start, &mut p, "(", "I expected a parenthesis for this function's arguments")?;

        let args = self.parse_args(&mut p)?;
        p = self.spaces(p);
        let ret_type = if let Some(after) = self.match_str(p, "->") {
            p = after;
            self.optional_type(&mut p)?
        } else {
            None
        };
        p = self.whitespace(p)?;
        let (is_inline, cache) = self.parse_function_flags(&mut p)?;
        self.expect_closing(&mut p, ")", "I wasn't able to parse the rest of this function definition")?;

        let body = self.expect(start, &mut p, Parser::parse_block, "This function needs a body block")?;
        Ok(Some(self.node(
            start,
            p,
            AstNode::FunctionDef {
                name: Box::new(name),
                args,
                ret_type,
                body: Box::new(body),
                cache: cache.map(Box::new),
                is_inline,
            },
        )))
    }

    /// `convert(args [-> Type] [; flags]) body`
    pub(crate) fn parse_convert_def(&self, pos: usize) -> Parsed {
        let start = pos;
        let p = match self.match_word(pos, "convert") {
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
        p = self.whitespace(p)?;
        let (is_inline, cache) = self.parse_function_flags(&mut p)?;
        self.expect_closing(&mut p, ")", "I wasn't able to parse the rest of this function definition")?;

        let body = self.expect(start, &mut p, Parser::parse_block, "This function needs a body block")?;
        Ok(Some(self.node(
            start,
            p,
            AstNode::ConvertDef {
                args,
                ret_type,
                body: Box::new(body),
                cache: cache.map(Box::new),
                is_inline,
            },
        )))
    }

    pub(crate) fn parse_extern(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "extern") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.spaces(p);
        let (name, after) = match self.get_id(p) {
            Some(found) => found,
            None => return Err(self.err(start, p, "I couldn't get a name for this extern")),
        };
        p = self.spaces(after);
        p = match self.match_str(p, ":") {
            Some(p) => p,
            None => return Err(self.err(start, p, "I couldn't get a type for this extern")),
        };
        let type_ast = self.expect_type(start, &mut p, "I couldn't parse the type for this extern")?;
        Ok(Some(self.node(start, p, AstNode::Extern { name, type_ast })))
    }

    /// `>> expr [= expected]`
    pub(crate) fn parse_doctest(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_str(pos, ">>") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.spaces(p);
        let expr = self.expect(start, &mut p, Parser::parse_statement, "I couldn't parse the expression for this doctest")?;
        let probe = self.whitespace(p)?;
        let mut expected = None;
        if let Some(after) = self.match_str(probe, "=") {
            p = self.spaces(after);
            expected = Some(self.expect(start, &mut p, Parser::parse_extended_expr, "I couldn't parse the expected expression here")?);
        } else {
            p = expr.span.end;
        }
        Ok(Some(self.node(
            start,
            p,
            AstNode::DocTest { expr: Box::new(expr), expected: expected.map(Box::new) },
        )))
    }

    /// `assert expr [, message]`
    pub(crate) fn parse_assert(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = match self.match_word(pos, "assert") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.spaces(p);
        let expr = self.expect(start, &mut p, Parser::parse_extended_expr, "I couldn't parse the expression for this assert")?;
        p = self.spaces(p);
        let mut message = None;
        if let Some(after) = self.match_str(p, ",") {
            p = self.whitespace(after)?;
            message = Some(self.expect(start, &mut p, Parser::parse_extended_expr, "I couldn't parse the error message for this assert")?);
        } else {
            p = expr.span.end;
        }
        Ok(Some(self.node(
            start,
            p,
            AstNode::Assert { expr: Box::new(expr), message: message.map(Box::new) },
        )))
    }

    /// `[var :=] use path`
    pub(crate) fn parse_use(&self, pos: usize) -> Parsed {
        let start = pos;
        let mut p = pos;
        let var = match self.parse_var(p)? {
            Some(var) => {
                p = self.spaces(var.span.end);
                p = match self.match_str(p, ":=") {
                    Some(after) => self.spaces(after),
                    None => return Ok(None),
                };
                Some(var)
            }
            None => None,
        };

        p = match self.match_word(p, "use") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.spaces(p);
        let name_end = self.some_not(p, b" \t\r\n;");
        if name_end == p {
            return Err(self.err(start, p, "There is no module name here to use"));
        }
        let name = self.text()[p..name_end].to_string();
        p = name_end;
        while let Some(after) = self.match_str(p, ";") {
            p = after;
        }

        let what = if name.starts_with('<') || name.ends_with(".h") {
            UseKind::Header
        } else if name.starts_with("-l") {
            UseKind::SharedObject
        } else if name.ends_with(".c") {
            UseKind::CCode
        } else if name.ends_with(".S") || name.ends_with(".s") {
            UseKind::Asm
        } else if name.starts_with("./")
            || name.starts_with('/')
            || name.starts_with("../")
            || name.starts_with("~/")
        {
            UseKind::Local
        } else {
            UseKind::Module
        };

        Ok(Some(self.node(
            start,
            p,
            AstNode::Use { var: var.map(Box::new), path: name, what },
        )))
    }
}
