//! Statement-level parser tests: blocks and indentation, control
//! flow, definitions, `use` classification, and the round-trip
//! invariant.

use rstest::rstest;
use tomo::ast::{Ast, AstNode, UseKind};
use tomo::parser::{parse, parse_expression};

fn statements(source: &str) -> Vec<Ast> {
    match parse(source).unwrap_or_else(|e| panic!("failed to parse:\n{source}\n{e}")).node {
        AstNode::Block(stmts) => stmts,
        other => panic!("expected a block, got {other:?}"),
    }
}

fn single(source: &str) -> Ast {
    let mut stmts = statements(source);
    assert_eq!(stmts.len(), 1, "expected one statement in {source:?}");
    stmts.pop().expect("one statement")
}

#[test]
fn declarations() {
    match single("x := 1\n").node {
        AstNode::Declare { var, type_ast, value, top_level } => {
            assert!(matches!(var.node, AstNode::Var(ref n) if n == "x"));
            assert!(type_ast.is_none());
            assert!(value.is_some());
            assert!(top_level);
        }
        other => panic!("expected Declare, got {other:?}"),
    }
    match single("x : Int = 1\n").node {
        AstNode::Declare { type_ast: Some(_), value: Some(_), .. } => {}
        other => panic!("expected typed Declare, got {other:?}"),
    }
}

#[test]
fn function_definitions() {
    let src = "func add(x, y: Int -> Int)\n    return x + y\n";
    match single(src).node {
        AstNode::FunctionDef { name, args, ret_type, body, cache, is_inline } => {
            assert!(matches!(name.node, AstNode::Var(ref n) if n == "add"));
            // The `x, y: Int` batch expands to two records sharing a type:
            assert_eq!(args.len(), 2);
            assert_eq!(args[0].name.as_deref(), Some("x"));
            assert_eq!(args[1].name.as_deref(), Some("y"));
            assert!(args[0].type_ast.is_some());
            assert!(args[1].type_ast.is_some());
            assert!(ret_type.is_some());
            assert!(cache.is_none());
            assert!(!is_inline);
            assert!(matches!(body.node, AstNode::Block(ref stmts) if stmts.len() == 1));
        }
        other => panic!("expected FunctionDef, got {other:?}"),
    }
}

#[test]
fn function_flags() {
    match single("func fib(n:Int -> Int; cached) n\n").node {
        AstNode::FunctionDef { cache: Some(cache), .. } => {
            assert!(matches!(cache.node, AstNode::Int { ref digits, .. } if digits == "-1"));
        }
        other => panic!("expected cached FunctionDef, got {other:?}"),
    }
    match single("func hot(n:Int; inline, cache_size=100) n\n").node {
        AstNode::FunctionDef { is_inline: true, cache: Some(_), .. } => {}
        other => panic!("expected inline cached FunctionDef, got {other:?}"),
    }
}

#[test]
fn struct_definitions() {
    match single("struct Point(x, y: Num)\n").node {
        AstNode::StructDef { name, fields, secret: false, opaque: false, .. } => {
            assert_eq!(name, "Point");
            assert_eq!(fields.len(), 2);
        }
        other => panic!("expected StructDef, got {other:?}"),
    }
    match single("struct Secretive(password:Text; secret)\n").node {
        AstNode::StructDef { secret: true, .. } => {}
        other => panic!("expected secret StructDef, got {other:?}"),
    }
    match single("struct Handle(; opaque)\n").node {
        AstNode::StructDef { opaque: true, .. } => {}
        other => panic!("expected opaque StructDef, got {other:?}"),
    }
}

#[test]
fn struct_with_namespace() {
    let src = "struct Point(x, y: Num)\n    func origin(-> Point)\n        return Point(0, 0)\n";
    match single(src).node {
        AstNode::StructDef { namespace, .. } => match namespace.node {
            AstNode::Block(stmts) => {
                assert_eq!(stmts.len(), 1);
                assert!(matches!(stmts[0].node, AstNode::FunctionDef { .. }));
            }
            other => panic!("expected namespace block, got {other:?}"),
        },
        other => panic!("expected StructDef, got {other:?}"),
    }
}

#[test]
fn enum_definitions() {
    match single("enum Shape(Circle(radius:Num), Square(side:Num), Empty)\n").node {
        AstNode::EnumDef { name, tags, .. } => {
            assert_eq!(name, "Shape");
            assert_eq!(tags.len(), 3);
            assert_eq!(tags[0].name, "Circle");
            assert_eq!(tags[0].fields.len(), 1);
            assert!(tags[2].fields.is_empty());
        }
        other => panic!("expected EnumDef, got {other:?}"),
    }
    assert!(parse("enum Empty()\n").is_err());
}

#[test]
fn lang_and_extend_definitions() {
    assert!(matches!(single("lang Sh\n").node, AstNode::LangDef { ref name, .. } if name == "Sh"));
    let src = "extend Text\n    func shout(t:Text -> Text)\n        return t\n";
    match single(src).node {
        AstNode::Extend { name, body } => {
            assert_eq!(name, "Text");
            assert!(matches!(body.node, AstNode::Block(ref stmts) if stmts.len() == 1));
        }
        other => panic!("expected Extend, got {other:?}"),
    }
}

#[rstest]
#[case("use ./sibling.tm\n", UseKind::Local)]
#[case("use /abs/path.tm\n", UseKind::Local)]
#[case("use ~/home.tm\n", UseKind::Local)]
#[case("use mymodule\n", UseKind::Module)]
#[case("use -lcurl\n", UseKind::SharedObject)]
#[case("use <stdio.h>\n", UseKind::Header)]
#[case("use local.h\n", UseKind::Header)]
#[case("use helper.c\n", UseKind::CCode)]
#[case("use impl.S\n", UseKind::Asm)]
fn use_classification(#[case] source: &str, #[case] expected: UseKind) {
    match single(source).node {
        AstNode::Use { what, .. } => assert_eq!(what, expected, "{source}"),
        other => panic!("expected Use for {source}, got {other:?}"),
    }
}

#[test]
fn use_with_binding() {
    match single("foo := use ./foo.tm\n").node {
        AstNode::Use { var: Some(var), path, .. } => {
            assert!(matches!(var.node, AstNode::Var(ref n) if n == "foo"));
            assert_eq!(path, "./foo.tm");
        }
        other => panic!("expected bound Use, got {other:?}"),
    }
}

#[test]
fn if_else_chains() {
    let src = "func f(x:Int)\n    if x > 1\n        big()\n    else if x > 0\n        small()\n    else\n        zero()\n";
    match single(src).node {
        AstNode::FunctionDef { body, .. } => match &body.node {
            AstNode::Block(stmts) => match &stmts[0].node {
                AstNode::If { else_body: Some(else_body), .. } => {
                    assert!(matches!(else_body.node, AstNode::If { .. }));
                }
                other => panic!("expected If with else, got {other:?}"),
            },
            other => panic!("expected block body, got {other:?}"),
        },
        other => panic!("expected FunctionDef, got {other:?}"),
    }
}

#[test]
fn unless_is_negated_if() {
    match parse_expression("unless done then stop()").unwrap().node {
        AstNode::If { condition, .. } => assert!(matches!(condition.node, AstNode::Not(_))),
        other => panic!("expected If, got {other:?}"),
    }
}

#[test]
fn trailing_conditionals() {
    let src = "func f(x:Int)\n    return if x > 0\n";
    match single(src).node {
        AstNode::FunctionDef { body, .. } => match &body.node {
            AstNode::Block(stmts) => {
                assert!(matches!(stmts[0].node, AstNode::If { .. }));
            }
            other => panic!("expected block, got {other:?}"),
        },
        other => panic!("expected FunctionDef, got {other:?}"),
    }
}

#[test]
fn when_clauses_share_bodies() {
    let src = "func f(x:Int)\n    when x\n    is 1, 2\n        low()\n    is 3\n        three()\n    else\n        other()\n";
    match single(src).node {
        AstNode::FunctionDef { body, .. } => match &body.node {
            AstNode::Block(stmts) => match &stmts[0].node {
                AstNode::When { clauses, else_body, .. } => {
                    assert_eq!(clauses.len(), 2);
                    assert_eq!(clauses[0].patterns.len(), 2);
                    assert_eq!(clauses[1].patterns.len(), 1);
                    assert!(else_body.is_some());
                }
                other => panic!("expected When, got {other:?}"),
            },
            other => panic!("expected block, got {other:?}"),
        },
        other => panic!("expected FunctionDef, got {other:?}"),
    }
}

#[test]
fn loops() {
    let src = "func f(xs:[Int])\n    for i, x in xs\n        handle(x)\n    else\n        empty()\n";
    match single(src).node {
        AstNode::FunctionDef { body, .. } => match &body.node {
            AstNode::Block(stmts) => match &stmts[0].node {
                AstNode::For { vars, empty: Some(_), .. } => assert_eq!(vars.len(), 2),
                other => panic!("expected For with empty clause, got {other:?}"),
            },
            other => panic!("expected block, got {other:?}"),
        },
        other => panic!("expected FunctionDef, got {other:?}"),
    }

    match parse_expression("while x < 10 do bump()").unwrap().node {
        AstNode::While { condition: Some(_), .. } => {}
        other => panic!("expected While, got {other:?}"),
    }
    match parse_expression("repeat spin()").unwrap().node {
        AstNode::Repeat(_) => {}
        other => panic!("expected Repeat, got {other:?}"),
    }
}

#[test]
fn while_when_gets_an_implicit_stop() {
    let src = "func f(state:State)\n    while when state\n    is Running\n        step()\n";
    match single(src).node {
        AstNode::FunctionDef { body, .. } => match &body.node {
            AstNode::Block(stmts) => match &stmts[0].node {
                AstNode::While { condition: None, body } => match &body.node {
                    AstNode::When { else_body: Some(else_body), .. } => {
                        assert!(matches!(else_body.node, AstNode::Stop { .. }));
                    }
                    other => panic!("expected When body, got {other:?}"),
                },
                other => panic!("expected While, got {other:?}"),
            },
            other => panic!("expected block, got {other:?}"),
        },
        other => panic!("expected FunctionDef, got {other:?}"),
    }
}

#[test]
fn skip_and_stop_targets() {
    let src = "func f(xs:[Int])\n    for x in xs\n        skip for\n        stop if x\n        continue\n";
    match single(src).node {
        AstNode::FunctionDef { body, .. } => match &body.node {
            AstNode::Block(stmts) => match &stmts[0].node {
                AstNode::For { body, .. } => match &body.node {
                    AstNode::Block(inner) => {
                        assert!(matches!(inner[0].node, AstNode::Skip { target: Some(ref t) } if t == "for"));
                        assert!(matches!(inner[1].node, AstNode::If { .. }));
                        assert!(matches!(inner[2].node, AstNode::Skip { target: None }));
                    }
                    other => panic!("expected loop body, got {other:?}"),
                },
                other => panic!("expected For, got {other:?}"),
            },
            other => panic!("expected block, got {other:?}"),
        },
        other => panic!("expected FunctionDef, got {other:?}"),
    }
}

#[test]
fn assignment_and_update() {
    let src = "func f(x:Int)\n    a, b = 1, 2\n    x += 1\n";
    match single(src).node {
        AstNode::FunctionDef { body, .. } => match &body.node {
            AstNode::Block(stmts) => {
                match &stmts[0].node {
                    AstNode::Assign { targets, values } => {
                        assert_eq!(targets.len(), 2);
                        assert_eq!(values.len(), 2);
                    }
                    other => panic!("expected Assign, got {other:?}"),
                }
                assert!(matches!(
                    stmts[1].node,
                    AstNode::UpdateAssign { op: tomo::ast::BinOp::Plus, .. }
                ));
            }
            other => panic!("expected block, got {other:?}"),
        },
        other => panic!("expected FunctionDef, got {other:?}"),
    }
}

#[test]
fn doctests_and_asserts() {
    let src = "func f(x:Int)\n    >> x + 1\n    = 2\n    assert x > 0, \"positive\"\n";
    match single(src).node {
        AstNode::FunctionDef { body, .. } => match &body.node {
            AstNode::Block(stmts) => {
                assert!(matches!(stmts[0].node, AstNode::DocTest { expected: Some(_), .. }));
                assert!(matches!(stmts[1].node, AstNode::Assert { message: Some(_), .. }));
            }
            other => panic!("expected block, got {other:?}"),
        },
        other => panic!("expected FunctionDef, got {other:?}"),
    }
}

#[test]
fn inline_c_code() {
    match single("func f(->Int)\n    return C_code : Int (my_c_function(@x))\n").node {
        AstNode::FunctionDef { body, .. } => match &body.node {
            AstNode::Block(stmts) => match &stmts[0].node {
                AstNode::Return(Some(value)) => {
                    assert!(matches!(value.node, AstNode::InlineCCode { type_ast: Some(_), .. }));
                }
                other => panic!("expected Return, got {other:?}"),
            },
            other => panic!("expected block, got {other:?}"),
        },
        other => panic!("expected FunctionDef, got {other:?}"),
    }
}

#[test]
fn inline_blocks_with_semicolons() {
    let src = "func f(x:Int)\n    if x then a(); b()\n";
    match single(src).node {
        AstNode::FunctionDef { body, .. } => match &body.node {
            AstNode::Block(stmts) => match &stmts[0].node {
                AstNode::If { body, .. } => {
                    assert!(matches!(body.node, AstNode::Block(ref inner) if inner.len() == 2));
                }
                other => panic!("expected If, got {other:?}"),
            },
            other => panic!("expected block, got {other:?}"),
        },
        other => panic!("expected FunctionDef, got {other:?}"),
    }
}

// --- Indentation ---

#[test]
fn dedent_ends_a_block() {
    let src = "func f(x:Int)\n    a()\n    b()\nfunc g(x:Int)\n    c()\n";
    let stmts = statements(src);
    assert_eq!(stmts.len(), 2);
    match &stmts[0].node {
        AstNode::FunctionDef { body, .. } => {
            assert!(matches!(body.node, AstNode::Block(ref inner) if inner.len() == 2));
        }
        other => panic!("expected FunctionDef, got {other:?}"),
    }
}

#[test]
fn over_indentation_is_an_error() {
    assert!(parse("func f(x:Int)\n    a()\n            b()\n").is_err());
}

#[test]
fn mixing_tabs_and_spaces_is_an_error() {
    assert!(parse("func f(x:Int)\n  \tmixed()\n").is_err());
}

#[test]
fn statement_level_definitions_are_top_level_only() {
    assert!(parse("func f(x:Int)\n    struct Inner(y:Int)\n").is_err());
    assert!(parse("func f(x:Int)\n    use ./dep.tm\n").is_err());
}

#[test]
fn reserved_words_are_not_identifiers() {
    for source in ["for := 1\n", "while := 1\n", "struct := 1\n", "none := 1\n"] {
        assert!(parse(source).is_err(), "{source} should not parse");
    }
}

#[test]
fn top_level_rejects_bare_junk() {
    assert!(parse("1 + \n").is_err());
}

// --- Round-trip: a node's own source text re-parses to an equal node ---

#[rstest]
#[case("a + b * c")]
#[case("[x*2 for x in xs if x > 0]")]
#[case("f(1, x=2).field[3]?")]
#[case("\"interp $(a+b) done\"")]
#[case("@Point(1, 2)")]
#[case("(_min_: xs)")]
fn round_trip(#[case] source: &str) {
    let first = parse_expression(source).unwrap();
    let reparsed = parse_expression(first.source_text()).unwrap();
    assert_eq!(first, reparsed, "{source}");
}

#[test]
fn spans_cover_the_source() {
    let src = "x := 1 + 2\n";
    let stmt = single(src);
    assert_eq!(stmt.source_text(), "x := 1 + 2");
    match stmt.node {
        AstNode::Declare { value: Some(value), .. } => {
            assert_eq!(value.source_text(), "1 + 2");
        }
        other => panic!("expected Declare, got {other:?}"),
    }
}
