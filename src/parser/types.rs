//! Type expression parsing: `@T`, `&T`, `[T]`, `|T|`, `{K=V}`,
//! `func(args -> T)`, dotted type names, and `?` optional wrappers.

use crate::ast::{TypeAst, TypeAstNode};
use crate::parser::{ParsedType, Parser, PResult};

impl Parser {
    pub(crate) fn type_node(&self, start: usize, end: usize, node: TypeAstNode) -> TypeAst {
        TypeAst::new(&self.file, start, end, node)
    }

    /// Run the type parser after optional spaces, advancing on success.
    pub(crate) fn optional_type(&self, pos: &mut usize) -> PResult<Option<TypeAst>> {
        let p = self.spaces(*pos);
        match self.parse_type(p)? {
            Some(t) => {
                *pos = t.span.end;
                Ok(Some(t))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn expect_type(&self, start: usize, pos: &mut usize, message: &str) -> PResult<TypeAst> {
        match self.optional_type(pos)? {
            Some(t) => Ok(t),
            None => Err(self.err(start, *pos, message)),
        }
    }

    pub(crate) fn parse_type(&self, pos: usize) -> ParsedType {
        let start = pos;
        let mut t = match self.parse_non_optional_type(pos)? {
            Some(t) => t,
            None => return Ok(None),
        };
        let mut p = self.spaces(t.span.end);
        while let Some(after) = self.match_str(p, "?") {
            t = self.type_node(start, after, TypeAstNode::Optional(Box::new(t)));
            p = after;
        }
        Ok(Some(t))
    }

    fn parse_non_optional_type(&self, pos: usize) -> ParsedType {
        for f in [
            Parser::parse_pointer_type,
            Parser::parse_array_type,
            Parser::parse_table_type,
            Parser::parse_set_type,
            Parser::parse_type_name,
            Parser::parse_func_type,
        ] {
            if let Some(t) = f(self, pos)? {
                return Ok(Some(t));
            }
        }
        // Parenthesized type:
        let start = pos;
        let mut p = match self.match_str(pos, "(") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.whitespace(p)?;
        let t = match self.parse_type(p)? {
            Some(t) => t,
            None => return Ok(None),
        };
        let mut p = self.whitespace(t.span.end)?;
        self.expect_closing(&mut p, ")", "I wasn't able to parse the rest of this type")?;
        Ok(Some(self.type_node(start, p, t.node)))
    }

    /// `@T` (heap) or `&T` (stack), with optional `?` wrappers bound to
    /// the pointer.
    fn parse_pointer_type(&self, pos: usize) -> ParsedType {
        let start = pos;
        let (is_stack, p) = if let Some(p) = self.match_str(pos, "@") {
            (false, p)
        } else if let Some(p) = self.match_str(pos, "&") {
            (true, p)
        } else {
            return Ok(None);
        };
        let mut p = self.spaces(p);
        let pointed = match self.parse_non_optional_type(p)? {
            Some(t) => t,
            None => return Err(self.err(start, p, "I couldn't parse a pointer type after this point")),
        };
        let mut t = self.type_node(
            start,
            pointed.span.end,
            TypeAstNode::Pointer { is_stack, pointed: Box::new(pointed) },
        );
        p = self.spaces(t.span.end);
        while let Some(after) = self.match_str(p, "?") {
            t = self.type_node(start, after, TypeAstNode::Optional(Box::new(t)));
            p = after;
        }
        Ok(Some(t))
    }

    /// `[T]`
    fn parse_array_type(&self, pos: usize) -> ParsedType {
        let start = pos;
        let mut p = match self.match_str(pos, "[") {
            Some(p) => p,
            None => return Ok(None),
        };
        let item = self.expect_type(start, &mut p, "I couldn't parse an array item type after this point")?;
        self.expect_closing(&mut p, "]", "I wasn't able to parse the rest of this array type")?;
        Ok(Some(self.type_node(start, p, TypeAstNode::Array(Box::new(item)))))
    }

    /// `|T|`
    fn parse_set_type(&self, pos: usize) -> ParsedType {
        let start = pos;
        let mut p = match self.match_str(pos, "|") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.whitespace(p)?;
        let item = match self.parse_type(p)? {
            Some(t) => t,
            None => return Ok(None),
        };
        let mut p = self.whitespace(item.span.end)?;
        self.expect_closing(&mut p, "|", "I wasn't able to parse the rest of this set type")?;
        Ok(Some(self.type_node(start, p, TypeAstNode::Set(Box::new(item)))))
    }

    /// `{K=V [; default=expr]}`
    fn parse_table_type(&self, pos: usize) -> ParsedType {
        let start = pos;
        let mut p = match self.match_str(pos, "{") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.whitespace(p)?;
        let key = match self.parse_type(p)? {
            Some(t) => t,
            None => return Ok(None),
        };
        let mut p = self.whitespace(key.span.end)?;
        let value = match self.match_str(p, "=") {
            Some(after) => {
                p = after;
                self.expect_type(start, &mut p, "I couldn't parse the rest of this table type")?
            }
            None => return Ok(None),
        };
        p = self.spaces(p);
        let mut default = None;
        if let Some(after) = self.match_str(p, ";") {
            if let Some(after) = self.match_word(after, "default") {
                p = after;
                let eq_start = p;
                self.expect_str(eq_start, &mut p, "=", "I expected an '=' here")?;
                default = Some(self.expect(
                    start,
                    &mut p,
                    Parser::parse_extended_expr,
                    "I couldn't parse the default value for this table",
                )?);
            }
        }
        p = self.whitespace(p)?;
        self.expect_closing(&mut p, "}", "I wasn't able to parse the rest of this table type")?;
        Ok(Some(self.type_node(
            start,
            p,
            TypeAstNode::Table {
                key: Box::new(key),
                value: Box::new(value),
                default: default.map(Box::new),
            },
        )))
    }

    /// `func(args [-> T])`
    fn parse_func_type(&self, pos: usize) -> ParsedType {
        let start = pos;
        let mut p = match self.match_word(pos, "func") {
            Some(p) => p,
            None => return Ok(None),
        };
        p = self.spaces(p);
        self.expect_str(start, &mut p, "(", "I expected a parenthesis here")?;
        let args = self.parse_args(&mut p)?;
        p = self.spaces(p);
        let ret = if let Some(after) = self.match_str(p, "->") {
            p = after;
            self.optional_type(&mut p)?
        } else {
            None
        };
        self.expect_closing(&mut p, ")", "I wasn't able to parse the rest of this function type")?;
        Ok(Some(self.type_node(
            start,
            p,
            TypeAstNode::Function { args, ret: ret.map(Box::new) },
        )))
    }

    /// A (possibly dotted) named type.
    fn parse_type_name(&self, pos: usize) -> ParsedType {
        let start = pos;
        let (mut name, mut p) = match self.get_id(pos) {
            Some(found) => found,
            None => return Ok(None),
        };
        loop {
            let next = self.spaces(p);
            let after_dot = match self.match_str(next, ".") {
                Some(after) => after,
                None => break,
            };
            match self.get_id(after_dot) {
                Some((next_id, after)) => {
                    name = format!("{name}.{next_id}");
                    p = after;
                }
                None => break,
            }
        }
        Ok(Some(self.type_node(start, p, TypeAstNode::Var(name))))
    }
}
