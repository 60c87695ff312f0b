//! Debug dumps of the AST: a compact XML rendering (the traditional
//! `-p` output) and a JSON rendering via serde.

use std::fmt::Write;

use quick_xml::escape::escape;

use crate::ast::{Arg, Ast, AstNode, EnumTag, TypeAst, TypeAstNode, WhenClause};

pub fn ast_to_json(ast: &Ast) -> String {
    serde_json::to_string_pretty(ast).expect("AST serialization cannot fail")
}

pub fn ast_to_xml(ast: &Ast) -> String {
    let mut out = String::new();
    write_ast(&mut out, ast);
    out
}

pub fn type_ast_to_xml(t: &TypeAst) -> String {
    let mut out = String::new();
    write_type(&mut out, t);
    out
}

fn write_opt(out: &mut String, tag: &str, ast: Option<&Ast>) {
    if let Some(ast) = ast {
        let _ = write!(out, "<{tag}>");
        write_ast(out, ast);
        let _ = write!(out, "</{tag}>");
    }
}

fn write_opt_type(out: &mut String, tag: &str, t: Option<&TypeAst>) {
    if let Some(t) = t {
        let _ = write!(out, "<{tag}>");
        write_type(out, t);
        let _ = write!(out, "</{tag}>");
    }
}

fn write_list(out: &mut String, asts: &[Ast]) {
    for ast in asts {
        write_ast(out, ast);
    }
}

fn write_args(out: &mut String, args: &[Arg]) {
    out.push_str("<args>");
    for arg in args {
        match &arg.name {
            Some(name) => {
                let _ = write!(out, "<arg name=\"{}\">", escape(name.as_str()));
            }
            None => out.push_str("<arg>"),
        }
        write_opt_type(out, "type", arg.type_ast.as_ref());
        write_opt(out, "value", arg.value.as_ref());
        out.push_str("</arg>");
    }
    out.push_str("</args>");
}

fn write_tags(out: &mut String, tags: &[EnumTag]) {
    for tag in tags {
        let _ = write!(out, "<tag name=\"{}\">", escape(tag.name.as_str()));
        write_args(out, &tag.fields);
        out.push_str("</tag>");
    }
}

fn write_when_clauses(out: &mut String, clauses: &[WhenClause]) {
    for clause in clauses {
        out.push_str("<case><patterns>");
        write_list(out, &clause.patterns);
        out.push_str("</patterns>");
        write_ast(out, &clause.body);
        out.push_str("</case>");
    }
}

fn write_ast(out: &mut String, ast: &Ast) {
    use AstNode::*;
    match &ast.node {
        Int { digits, bits } => {
            let _ = write!(out, "<Int bits=\"{bits}\">{}</Int>", escape(digits.as_str()));
        }
        Num { value, bits } => {
            let _ = write!(out, "<Num bits=\"{bits}\">{value}</Num>");
        }
        Bool(b) => {
            let _ = write!(out, "<Bool value=\"{}\" />", if *b { "yes" } else { "no" });
        }
        TextLiteral(text) => {
            let _ = write!(out, "{}", escape(text.as_str()));
        }
        TextJoin { lang, children } => {
            match lang {
                Some(lang) => {
                    let _ = write!(out, "<Text lang=\"{}\">", escape(lang.as_str()));
                }
                None => out.push_str("<Text>"),
            }
            write_list(out, children);
            out.push_str("</Text>");
        }
        Null(t) => {
            out.push_str("<Null>");
            if let Some(t) = t {
                write_type(out, t);
            }
            out.push_str("</Null>");
        }
        Path(path) => {
            let _ = write!(out, "<Path>{}</Path>", escape(path.as_str()));
        }
        Var(name) => {
            let _ = write!(out, "<Var>{}</Var>", escape(name.as_str()));
        }
        BinaryOp { op, lhs, rhs } => {
            let _ = write!(out, "<BinaryOp op=\"{}\">", escape(op.symbol()));
            write_ast(out, lhs);
            out.push(' ');
            write_ast(out, rhs);
            out.push_str("</BinaryOp>");
        }
        UpdateAssign { op, lhs, rhs } => {
            let _ = write!(out, "<UpdateAssign op=\"{}\">", escape(op.symbol()));
            write_ast(out, lhs);
            out.push(' ');
            write_ast(out, rhs);
            out.push_str("</UpdateAssign>");
        }
        Negative(v) => {
            out.push_str("<Negative>");
            write_ast(out, v);
            out.push_str("</Negative>");
        }
        Not(v) => {
            out.push_str("<Not>");
            write_ast(out, v);
            out.push_str("</Not>");
        }
        Min { lhs, rhs, key } => {
            out.push_str("<Min>");
            write_ast(out, lhs);
            write_ast(out, rhs);
            write_opt(out, "key", key.as_deref());
            out.push_str("</Min>");
        }
        Max { lhs, rhs, key } => {
            out.push_str("<Max>");
            write_ast(out, lhs);
            write_ast(out, rhs);
            write_opt(out, "key", key.as_deref());
            out.push_str("</Max>");
        }
        Index { indexed, index, unchecked } => {
            let _ = write!(out, "<Index unchecked=\"{unchecked}\">");
            write_opt(out, "indexed", Some(indexed));
            write_opt(out, "index", index.as_deref());
            out.push_str("</Index>");
        }
        FieldAccess { fielded, field } => {
            let _ = write!(out, "<FieldAccess field=\"{}\">", escape(field.as_str()));
            write_ast(out, fielded);
            out.push_str("</FieldAccess>");
        }
        Optional(v) => {
            out.push_str("<Optional>");
            write_ast(out, v);
            out.push_str("</Optional>");
        }
        NonOptional(v) => {
            out.push_str("<NonOptional>");
            write_ast(out, v);
            out.push_str("</NonOptional>");
        }
        HeapAllocate(v) => {
            out.push_str("<HeapAllocate>");
            write_ast(out, v);
            out.push_str("</HeapAllocate>");
        }
        StackReference(v) => {
            out.push_str("<StackReference>");
            write_ast(out, v);
            out.push_str("</StackReference>");
        }
        Array { item_type, items } => {
            out.push_str("<Array>");
            write_opt_type(out, "item-type", item_type.as_ref());
            write_list(out, items);
            out.push_str("</Array>");
        }
        Set { item_type, items } => {
            out.push_str("<Set>");
            write_opt_type(out, "item-type", item_type.as_ref());
            write_list(out, items);
            out.push_str("</Set>");
        }
        Table { key_type, value_type, entries, fallback, default } => {
            out.push_str("<Table>");
            write_opt_type(out, "key-type", key_type.as_ref());
            write_opt_type(out, "value-type", value_type.as_ref());
            write_list(out, entries);
            write_opt(out, "fallback", fallback.as_deref());
            write_opt(out, "default", default.as_deref());
            out.push_str("</Table>");
        }
        TableEntry { key, value } => {
            out.push_str("<TableEntry>");
            write_ast(out, key);
            write_ast(out, value);
            out.push_str("</TableEntry>");
        }
        Channel { item_type, max_size } => {
            out.push_str("<Channel>");
            write_type(out, item_type);
            write_opt(out, "max-size", max_size.as_deref());
            out.push_str("</Channel>");
        }
        Comprehension { expr, vars, iter, filter } => {
            out.push_str("<Comprehension>");
            write_opt(out, "expr", Some(expr));
            write_list(out, vars);
            write_opt(out, "iter", Some(iter));
            write_opt(out, "filter", filter.as_deref());
            out.push_str("</Comprehension>");
        }
        Reduction { iter, op, key } => {
            let _ = write!(out, "<Reduction op=\"{}\">", escape(op.symbol()));
            write_opt(out, "iter", Some(iter));
            write_opt(out, "key", key.as_deref());
            out.push_str("</Reduction>");
        }
        FunctionCall { function, args } => {
            out.push_str("<FunctionCall><function>");
            write_ast(out, function);
            out.push_str("</function>");
            write_args(out, args);
            out.push_str("</FunctionCall>");
        }
        MethodCall { target, name, args } => {
            out.push_str("<MethodCall><self>");
            write_ast(out, target);
            let _ = write!(out, "</self><method>{}</method>", escape(name.as_str()));
            write_args(out, args);
            out.push_str("</MethodCall>");
        }
        Declare { var, type_ast, value, top_level: _ } => {
            out.push_str("<Declare var=\"");
            if let AstNode::Var(name) = &var.node {
                let _ = write!(out, "{}", escape(name.as_str()));
            }
            out.push_str("\">");
            write_opt_type(out, "type", type_ast.as_ref());
            write_opt(out, "value", value.as_deref());
            out.push_str("</Declare>");
        }
        Assign { targets, values } => {
            out.push_str("<Assign><targets>");
            write_list(out, targets);
            out.push_str("</targets><values>");
            write_list(out, values);
            out.push_str("</values></Assign>");
        }
        Block(statements) => {
            out.push_str("<Block>");
            write_list(out, statements);
            out.push_str("</Block>");
        }
        If { condition, body, else_body } => {
            out.push_str("<If>");
            write_opt(out, "condition", Some(condition));
            write_opt(out, "body", Some(body));
            write_opt(out, "else", else_body.as_deref());
            out.push_str("</If>");
        }
        When { subject, clauses, else_body } => {
            out.push_str("<When><subject>");
            write_ast(out, subject);
            out.push_str("</subject>");
            write_when_clauses(out, clauses);
            write_opt(out, "else", else_body.as_deref());
            out.push_str("</When>");
        }
        For { vars, iter, body, empty } => {
            out.push_str("<For>");
            write_list(out, vars);
            write_opt(out, "iterable", Some(iter));
            write_opt(out, "body", Some(body));
            write_opt(out, "empty", empty.as_deref());
            out.push_str("</For>");
        }
        While { condition, body } => {
            out.push_str("<While>");
            write_opt(out, "condition", condition.as_deref());
            write_opt(out, "body", Some(body));
            out.push_str("</While>");
        }
        Repeat(body) => {
            out.push_str("<Repeat>");
            write_ast(out, body);
            out.push_str("</Repeat>");
        }
        Defer(body) => {
            out.push_str("<Defer>");
            write_ast(out, body);
            out.push_str("</Defer>");
        }
        Return(value) => {
            out.push_str("<Return>");
            if let Some(value) = value {
                write_ast(out, value);
            }
            out.push_str("</Return>");
        }
        Skip { target } => {
            let _ = write!(out, "<Skip>{}</Skip>", escape(target.as_deref().unwrap_or("")));
        }
        Stop { target } => {
            let _ = write!(out, "<Stop>{}</Stop>", escape(target.as_deref().unwrap_or("")));
        }
        Pass => out.push_str("<Pass/>"),
        PrintStatement { to_print } => {
            out.push_str("<PrintStatement>");
            write_list(out, to_print);
            out.push_str("</PrintStatement>");
        }
        FunctionDef { name, args, ret_type, body, cache, is_inline } => {
            out.push_str("<FunctionDef name=\"");
            if let AstNode::Var(n) = &name.node {
                let _ = write!(out, "{}", escape(n.as_str()));
            }
            let _ = write!(out, "\" inline=\"{is_inline}\">");
            write_args(out, args);
            write_opt_type(out, "return-type", ret_type.as_ref());
            write_opt(out, "cache", cache.as_deref());
            write_opt(out, "body", Some(body));
            out.push_str("</FunctionDef>");
        }
        ConvertDef { args, ret_type, body, cache, is_inline } => {
            let _ = write!(out, "<ConvertDef inline=\"{is_inline}\">");
            write_args(out, args);
            write_opt_type(out, "return-type", ret_type.as_ref());
            write_opt(out, "cache", cache.as_deref());
            write_opt(out, "body", Some(body));
            out.push_str("</ConvertDef>");
        }
        Lambda { id, args, ret_type, body } => {
            let _ = write!(out, "<Lambda id=\"{id}\">");
            write_args(out, args);
            write_opt_type(out, "return-type", ret_type.as_ref());
            write_opt(out, "body", Some(body));
            out.push_str("</Lambda>");
        }
        StructDef { name, fields, namespace, secret, external, opaque } => {
            let _ = write!(
                out,
                "<StructDef name=\"{}\" secret=\"{secret}\" extern=\"{external}\" opaque=\"{opaque}\">",
                escape(name.as_str())
            );
            write_args(out, fields);
            out.push_str("<namespace>");
            write_ast(out, namespace);
            out.push_str("</namespace></StructDef>");
        }
        EnumDef { name, tags, namespace } => {
            let _ = write!(out, "<EnumDef name=\"{}\"><tags>", escape(name.as_str()));
            write_tags(out, tags);
            out.push_str("</tags><namespace>");
            write_ast(out, namespace);
            out.push_str("</namespace></EnumDef>");
        }
        LangDef { name, namespace } => {
            let _ = write!(out, "<LangDef name=\"{}\">", escape(name.as_str()));
            write_ast(out, namespace);
            out.push_str("</LangDef>");
        }
        Extend { name, body } => {
            let _ = write!(out, "<Extend name=\"{}\">", escape(name.as_str()));
            write_ast(out, body);
            out.push_str("</Extend>");
        }
        Extern { name, type_ast } => {
            let _ = write!(out, "<Extern name=\"{}\">", escape(name.as_str()));
            write_type(out, type_ast);
            out.push_str("</Extern>");
        }
        Use { var, path, what } => {
            let _ = write!(out, "<Use what=\"{what:?}\">");
            write_opt(out, "var", var.as_deref());
            let _ = write!(out, "{}", escape(path.as_str()));
            out.push_str("</Use>");
        }
        InlineCCode { chunks, type_ast } => {
            out.push_str("<InlineCode>");
            write_opt_type(out, "type", type_ast.as_ref());
            write_list(out, chunks);
            out.push_str("</InlineCode>");
        }
        DocTest { expr, expected } => {
            out.push_str("<DocTest>");
            write_opt(out, "expression", Some(expr));
            write_opt(out, "expected", expected.as_deref());
            out.push_str("</DocTest>");
        }
        Assert { expr, message } => {
            out.push_str("<Assert>");
            write_opt(out, "expression", Some(expr));
            write_opt(out, "message", message.as_deref());
            out.push_str("</Assert>");
        }
        Deserialize { value, type_ast } => {
            out.push_str("<Deserialize>");
            write_ast(out, value);
            out.push_str("<type>");
            write_type(out, type_ast);
            out.push_str("</type></Deserialize>");
        }
    }
}

fn write_type(out: &mut String, t: &TypeAst) {
    use TypeAstNode::*;
    match &t.node {
        Var(name) => {
            let _ = write!(out, "{}", escape(name.as_str()));
        }
        Pointer { is_stack, pointed } => {
            let _ = write!(
                out,
                "<PointerType is_stack=\"{}\">",
                if *is_stack { "yes" } else { "no" }
            );
            write_type(out, pointed);
            out.push_str("</PointerType>");
        }
        Optional(inner) => {
            out.push_str("<OptionalType>");
            write_type(out, inner);
            out.push_str("</OptionalType>");
        }
        Array(item) => {
            out.push_str("<ArrayType>");
            write_type(out, item);
            out.push_str("</ArrayType>");
        }
        Set(item) => {
            out.push_str("<SetType>");
            write_type(out, item);
            out.push_str("</SetType>");
        }
        Table { key, value, default } => {
            out.push_str("<TableType>");
            write_type(out, key);
            out.push(' ');
            write_type(out, value);
            write_opt(out, "default", default.as_deref());
            out.push_str("</TableType>");
        }
        Channel(item) => {
            out.push_str("<ChannelType>");
            write_type(out, item);
            out.push_str("</ChannelType>");
        }
        Function { args, ret } => {
            out.push_str("<FunctionType>");
            write_args(out, args);
            write_opt_type(out, "return", ret.as_deref());
            out.push_str("</FunctionType>");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    #[test]
    fn xml_escapes_special_characters() {
        let ast = parser::parse_expression("\"a < b & c\"").unwrap();
        let xml = ast_to_xml(&ast);
        assert!(xml.contains("a &lt; b &amp; c"), "{xml}");
    }

    #[test]
    fn binary_op_dump() {
        let ast = parser::parse_expression("1 + 2 * 3").unwrap();
        let xml = ast_to_xml(&ast);
        assert!(xml.starts_with("<BinaryOp op=\"+\">"), "{xml}");
        assert!(xml.contains("<BinaryOp op=\"*\">"), "{xml}");
    }

    #[test]
    fn json_dump_is_valid() {
        let ast = parser::parse_expression("[x for x in xs]").unwrap();
        let json = ast_to_json(&ast);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_object());
    }
}
