//! AST utilities used by the emitter and the orchestrator:
//! idempotence checking and the topological visitor over top-level
//! statements.

use std::collections::{HashMap, HashSet};

use crate::ast::{Ast, AstNode, TypeAstNode};

/// True when the emitter may evaluate the expression more than once
/// without observable effect.
pub fn is_idempotent(ast: &Ast) -> bool {
    match &ast.node {
        AstNode::Int { .. }
        | AstNode::Bool(_)
        | AstNode::Num { .. }
        | AstNode::Var(_)
        | AstNode::Null(_)
        | AstNode::TextLiteral(_) => true,
        AstNode::Index { indexed, index, .. } => {
            is_idempotent(indexed) && index.as_deref().is_some_and(is_idempotent)
        }
        AstNode::FieldAccess { fielded, .. } => is_idempotent(fielded),
        _ => false,
    }
}

fn type_definition_name(ast: &Ast) -> Option<&str> {
    match &ast.node {
        AstNode::StructDef { name, .. }
        | AstNode::EnumDef { name, .. }
        | AstNode::LangDef { name, .. } => Some(name),
        _ => None,
    }
}

fn is_use(ast: &Ast) -> bool {
    match &ast.node {
        AstNode::Use { .. } => true,
        AstNode::Declare { value: Some(value), .. } => matches!(value.node, AstNode::Use { .. }),
        _ => false,
    }
}

/// The type names a definition's fields refer to directly. Only plain
/// named types count; fields behind pointers or containers are reached
/// through a name the checker resolves later, which is what makes
/// pointer cycles between structs legal.
fn field_dependencies<'a>(ast: &'a Ast, out: &mut Vec<&'a str>) {
    let field_lists: Vec<&[crate::ast::Arg]> = match &ast.node {
        AstNode::StructDef { fields, .. } => vec![fields],
        AstNode::EnumDef { tags, .. } => tags.iter().map(|t| t.fields.as_slice()).collect(),
        _ => vec![],
    };
    for fields in field_lists {
        for field in fields {
            if let Some(type_ast) = &field.type_ast {
                if let TypeAstNode::Var(name) = &type_ast.node {
                    out.push(name);
                }
            }
        }
    }
}

fn visit_type_def<'a>(
    ast: &'a Ast,
    definitions: &HashMap<&'a str, &'a Ast>,
    visited: &mut HashSet<String>,
    visitor: &mut dyn FnMut(&'a Ast),
) {
    let name = match type_definition_name(ast) {
        Some(name) => name,
        None => {
            visitor(ast);
            return;
        }
    };
    if visited.contains(name) {
        return;
    }
    visited.insert(name.to_string());

    let mut dependencies = Vec::new();
    field_dependencies(ast, &mut dependencies);
    for dep in dependencies {
        if let Some(dependency) = definitions.get(dep) {
            visit_type_def(dependency, definitions, visited, visitor);
        }
    }
    visitor(ast);
}

/// Visit a list of top-level statements in three phases:
///
/// 1. `use` statements (and declarations of a `use`) in source order.
/// 2. Type definitions in topological order of their field-type
///    dependencies.
/// 3. Everything else in source order.
///
/// The visitor is called exactly once per statement.
pub fn visit_topologically<'a>(statements: &'a [Ast], mut visitor: impl FnMut(&'a Ast)) {
    let mut definitions: HashMap<&str, &Ast> = HashMap::new();
    for stmt in statements {
        if let Some(name) = type_definition_name(stmt) {
            definitions.insert(name, stmt);
        }
    }

    for stmt in statements {
        if is_use(stmt) {
            visitor(stmt);
        }
    }

    let mut visited = HashSet::new();
    for stmt in statements {
        if type_definition_name(stmt).is_some() {
            visit_type_def(stmt, &definitions, &mut visited, &mut visitor);
        }
    }

    for stmt in statements {
        if type_definition_name(stmt).is_none() && !is_use(stmt) {
            visitor(stmt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn statements(source: &str) -> Vec<Ast> {
        match parser::parse(source).unwrap().node {
            AstNode::Block(stmts) => stmts,
            other => panic!("expected a block, got {other:?}"),
        }
    }

    #[test]
    fn idempotence() {
        assert!(is_idempotent(&parser::parse_expression("123").unwrap()));
        assert!(is_idempotent(&parser::parse_expression("x").unwrap()));
        assert!(is_idempotent(&parser::parse_expression("yes").unwrap()));
        assert!(is_idempotent(&parser::parse_expression("x.field").unwrap()));
        assert!(is_idempotent(&parser::parse_expression("x[1]").unwrap()));
        assert!(!is_idempotent(&parser::parse_expression("f()").unwrap()));
        assert!(!is_idempotent(&parser::parse_expression("x[f()]").unwrap()));
        assert!(!is_idempotent(&parser::parse_expression("f().field").unwrap()));
    }

    #[test]
    fn uses_come_first_then_types_in_dependency_order() {
        let stmts = statements(
            "func helper() pass\n\
             struct Pair(left:Point, right:Point)\n\
             use ./dep.tm\n\
             struct Point(x:Int, y:Int)\n",
        );
        let mut order = Vec::new();
        visit_topologically(&stmts, |stmt| {
            order.push(match &stmt.node {
                AstNode::Use { path, .. } => path.clone(),
                AstNode::StructDef { name, .. } => name.clone(),
                AstNode::FunctionDef { .. } => "func".to_string(),
                other => panic!("unexpected {other:?}"),
            });
        });
        assert_eq!(order, ["./dep.tm", "Point", "Pair", "func"]);
    }

    #[test]
    fn pointer_cycles_are_allowed() {
        // Mutually recursive through pointers: no direct VarType name
        // reference, so no cycle in the visit.
        let stmts = statements(
            "struct Node(value:Int, next:@Node?)\n\
             struct List(head:@Node?)\n",
        );
        let mut order = Vec::new();
        visit_topologically(&stmts, |stmt| {
            if let AstNode::StructDef { name, .. } = &stmt.node {
                order.push(name.clone());
            }
        });
        assert_eq!(order, ["Node", "List"]);
    }

    #[test]
    fn each_statement_visited_exactly_once() {
        let stmts = statements(
            "struct A(b:B)\n\
             struct B(x:Int)\n\
             struct C(a:A, b:B)\n\
             x := 1\n",
        );
        let mut count = 0;
        visit_topologically(&stmts, |_| count += 1);
        assert_eq!(count, stmts.len());
    }
}
