//! Expression-level parser tests: literals, operators, suffixes,
//! strings, and comprehensions.

use rstest::rstest;
use tomo::ast::{AstNode, BinOp};
use tomo::parser::{parse_expression, parse_type_str};

fn expr(source: &str) -> AstNode {
    parse_expression(source)
        .unwrap_or_else(|e| panic!("failed to parse {source:?}: {e}"))
        .node
}

#[test]
fn integer_literals() {
    match expr("123_456") {
        AstNode::Int { digits, .. } => assert_eq!(digits, "123456"),
        other => panic!("expected Int, got {other:?}"),
    }
    for (source, expected) in [("0xff", "0xff"), ("0o777", "0o777"), ("0b10_10", "0b1010"), ("-42", "-42")] {
        match expr(source) {
            AstNode::Int { digits, .. } => assert_eq!(digits, expected, "{source}"),
            other => panic!("expected Int for {source}, got {other:?}"),
        }
    }
}

#[rstest]
#[case("3.5", 3.5)]
#[case("-2.5", -2.5)]
#[case("1e3", 1000.0)]
#[case("2.5e-1", 0.25)]
#[case("50%", 0.5)]
#[case("1_000.5", 1000.5)]
fn num_literals(#[case] source: &str, #[case] expected: f64) {
    match expr(source) {
        AstNode::Num { value, .. } => assert!((value - expected).abs() < 1e-12, "{source}: {value}"),
        other => panic!("expected Num for {source}, got {other:?}"),
    }
}

#[test]
fn degree_literals_convert_to_radians() {
    match expr("180deg") {
        AstNode::Num { value, .. } => assert!((value - std::f64::consts::PI).abs() < 1e-12),
        other => panic!("expected Num, got {other:?}"),
    }
}

#[test]
fn int_with_float_marker_is_a_num() {
    assert!(matches!(expr("5f"), AstNode::Num { .. }));
    assert!(matches!(expr("5e2"), AstNode::Num { .. }));
}

#[test]
fn bools_and_none() {
    assert!(matches!(expr("yes"), AstNode::Bool(true)));
    assert!(matches!(expr("no"), AstNode::Bool(false)));
    assert!(matches!(expr("none"), AstNode::Null(None)));
}

#[test]
fn precedence_multiplication_binds_tighter() {
    match expr("a + b * c") {
        AstNode::BinaryOp { op: BinOp::Plus, lhs, rhs } => {
            assert!(matches!(lhs.node, AstNode::Var(ref n) if n == "a"));
            assert!(matches!(rhs.node, AstNode::BinaryOp { op: BinOp::Multiply, .. }));
        }
        other => panic!("expected Plus at the top, got {other:?}"),
    }
}

#[test]
fn left_associativity() {
    match expr("a - b - c") {
        AstNode::BinaryOp { op: BinOp::Minus, lhs, .. } => {
            assert!(matches!(lhs.node, AstNode::BinaryOp { op: BinOp::Minus, .. }));
        }
        other => panic!("expected nested Minus, got {other:?}"),
    }
}

#[rstest]
#[case("a ^ b", BinOp::Power)]
#[case("a mod b", BinOp::Mod)]
#[case("a mod1 b", BinOp::Mod1)]
#[case("a ++ b", BinOp::Concat)]
#[case("a << b", BinOp::LeftShift)]
#[case("a >>> b", BinOp::UnsignedRightShift)]
#[case("a <> b", BinOp::Compare)]
#[case("a == b", BinOp::Equals)]
#[case("a != b", BinOp::NotEquals)]
#[case("a <= b", BinOp::LessThanOrEquals)]
#[case("a and b", BinOp::And)]
#[case("a xor b", BinOp::Xor)]
fn binary_operators(#[case] source: &str, #[case] expected: BinOp) {
    match expr(source) {
        AstNode::BinaryOp { op, .. } => assert_eq!(op, expected, "{source}"),
        other => panic!("expected BinaryOp for {source}, got {other:?}"),
    }
}

#[test]
fn parenthesized_expressions_keep_their_structure() {
    match expr("(a + b) * c") {
        AstNode::BinaryOp { op: BinOp::Multiply, lhs, .. } => {
            assert!(matches!(lhs.node, AstNode::BinaryOp { op: BinOp::Plus, .. }));
        }
        other => panic!("expected Multiply at the top, got {other:?}"),
    }
}

#[test]
fn min_max_with_key_chains() {
    match expr("a _min_ b") {
        AstNode::Min { key, .. } => assert!(key.is_none()),
        other => panic!("expected Min, got {other:?}"),
    }
    match expr("a _max_.field b") {
        AstNode::Max { key: Some(key), .. } => match &key.node {
            AstNode::FieldAccess { fielded, field } => {
                assert_eq!(field, "field");
                assert!(matches!(fielded.node, AstNode::Var(ref n) if n == "$"));
            }
            other => panic!("expected a field-access key, got {other:?}"),
        },
        other => panic!("expected keyed Max, got {other:?}"),
    }
}

#[test]
fn suffix_chains() {
    match expr("table[key]") {
        AstNode::Index { index: Some(_), unchecked: false, .. } => {}
        other => panic!("expected Index, got {other:?}"),
    }
    match expr("xs[i; unchecked]") {
        AstNode::Index { unchecked: true, .. } => {}
        other => panic!("expected unchecked Index, got {other:?}"),
    }
    match expr("a.b.c") {
        AstNode::FieldAccess { fielded, field } => {
            assert_eq!(field, "c");
            assert!(matches!(fielded.node, AstNode::FieldAccess { .. }));
        }
        other => panic!("expected FieldAccess, got {other:?}"),
    }
    assert!(matches!(expr("opt?"), AstNode::Optional(_)));
    assert!(matches!(expr("opt!"), AstNode::NonOptional(_)));
    assert!(matches!(expr("x.$internal"), AstNode::FieldAccess { field, .. } if field == "$internal"));
}

#[test]
fn calls_and_method_calls() {
    match expr("f(1, x=2)") {
        AstNode::FunctionCall { args, .. } => {
            assert_eq!(args.len(), 2);
            assert_eq!(args[0].name, None);
            assert_eq!(args[1].name.as_deref(), Some("x"));
        }
        other => panic!("expected FunctionCall, got {other:?}"),
    }
    match expr("obj.method(arg)") {
        AstNode::MethodCall { name, args, .. } => {
            assert_eq!(name, "method");
            assert_eq!(args.len(), 1);
        }
        other => panic!("expected MethodCall, got {other:?}"),
    }
}

#[test]
fn equality_comparison_as_call_argument() {
    match expr("f(x == y)") {
        AstNode::FunctionCall { args, .. } => {
            assert_eq!(args.len(), 1);
            assert_eq!(args[0].name, None);
            assert!(matches!(
                args[0].value.as_ref().unwrap().node,
                AstNode::BinaryOp { op: BinOp::Equals, .. }
            ));
        }
        other => panic!("expected FunctionCall, got {other:?}"),
    }
}

#[test]
fn heap_and_stack_references() {
    assert!(matches!(expr("@Point(1, 2)"), AstNode::HeapAllocate(_)));
    assert!(matches!(expr("&x"), AstNode::StackReference(_)));
    match expr("@x?") {
        AstNode::Optional(inner) => assert!(matches!(inner.node, AstNode::HeapAllocate(_))),
        other => panic!("expected Optional(HeapAllocate), got {other:?}"),
    }
}

#[test]
fn aggregates() {
    match expr("[1, 2, 3]") {
        AstNode::Array { items, .. } => assert_eq!(items.len(), 3),
        other => panic!("expected Array, got {other:?}"),
    }
    match expr("|1, 2|") {
        AstNode::Set { items, .. } => assert_eq!(items.len(), 2),
        other => panic!("expected Set, got {other:?}"),
    }
    assert!(matches!(expr("||"), AstNode::Set { ref items, .. } if items.is_empty()));
    match expr("{1=2, 3=4}") {
        AstNode::Table { entries, fallback: None, default: None, .. } => assert_eq!(entries.len(), 2),
        other => panic!("expected Table, got {other:?}"),
    }
    match expr("{1=2; default=0}") {
        AstNode::Table { default: Some(_), .. } => {}
        other => panic!("expected Table with default, got {other:?}"),
    }
}

#[test]
fn interpolation_scenario() {
    // "x=$(1+2) done" splits into literal / expression / literal:
    match expr("\"x=$(1+2) done\"") {
        AstNode::TextJoin { lang: None, children } => {
            assert_eq!(children.len(), 3);
            assert!(matches!(children[0].node, AstNode::TextLiteral(ref t) if t == "x="));
            assert!(matches!(children[1].node, AstNode::BinaryOp { op: BinOp::Plus, .. }));
            assert!(matches!(children[2].node, AstNode::TextLiteral(ref t) if t == " done"));
        }
        other => panic!("expected TextJoin, got {other:?}"),
    }
}

#[test]
fn custom_string_scenario() {
    // $shell"echo $name" carries its language tag and interpolates:
    match expr("$shell\"echo $name\"") {
        AstNode::TextJoin { lang: Some(lang), children } => {
            assert_eq!(lang, "shell");
            assert_eq!(children.len(), 2);
            assert!(matches!(children[0].node, AstNode::TextLiteral(ref t) if t == "echo "));
            assert!(matches!(children[1].node, AstNode::Var(ref n) if n == "name"));
        }
        other => panic!("expected TextJoin with lang, got {other:?}"),
    }
}

#[test]
fn double_dollar_disables_interpolation() {
    match expr("$$\"no $interp here\"") {
        AstNode::TextJoin { children, .. } => {
            assert_eq!(children.len(), 1);
            assert!(matches!(children[0].node, AstNode::TextLiteral(ref t) if t == "no $interp here"));
        }
        other => panic!("expected TextJoin, got {other:?}"),
    }
}

#[test]
fn paired_custom_quotes_nest() {
    match expr("$(nested (parens) balance)") {
        AstNode::TextJoin { children, .. } => {
            assert!(matches!(children[0].node, AstNode::TextLiteral(ref t) if t == "nested (parens) balance"));
        }
        other => panic!("expected TextJoin, got {other:?}"),
    }
}

#[test]
fn single_quotes_take_no_escapes() {
    match expr(r"'a\nb'") {
        AstNode::TextJoin { children, .. } => {
            assert!(matches!(children[0].node, AstNode::TextLiteral(ref t) if t == "a\\nb"));
        }
        other => panic!("expected TextJoin, got {other:?}"),
    }
    match expr(r#""a\nb""#) {
        AstNode::TextJoin { children, .. } => {
            assert!(matches!(children[0].node, AstNode::TextLiteral(ref t) if t == "a\nb"));
        }
        other => panic!("expected TextJoin, got {other:?}"),
    }
}

#[rstest]
#[case(r#""\t""#, "\t")]
#[case(r#""\e""#, "\x1b")]
#[case(r#""\_""#, " ")]
#[case(r#""\x41""#, "A")]
#[case(r#""\101""#, "A")]
#[case(r#""\{U48}""#, "H")]
#[case(r#""\{LATIN SMALL LETTER A}""#, "a")]
#[case(r#""\[1]""#, "\x1b[1m")]
#[case(r#""\q""#, "q")]
fn escape_sequences(#[case] source: &str, #[case] expected: &str) {
    match expr(source) {
        AstNode::TextJoin { children, .. } => {
            let mut text = String::new();
            for child in &children {
                match &child.node {
                    AstNode::TextLiteral(t) => text.push_str(t),
                    other => panic!("expected literal chunks, got {other:?}"),
                }
            }
            assert_eq!(text, expected, "{source}");
        }
        other => panic!("expected TextJoin for {source}, got {other:?}"),
    }
}

#[test]
fn path_literals() {
    assert!(matches!(expr("(/usr/bin)"), AstNode::Path(ref p) if p == "/usr/bin"));
    assert!(matches!(expr("(./sibling.tm)"), AstNode::Path(ref p) if p == "./sibling.tm"));
    assert!(matches!(expr("(~/notes.txt)"), AstNode::Path(ref p) if p == "~/notes.txt"));
    assert!(matches!(expr(r"(/spaced\ name)"), AstNode::Path(ref p) if p == "/spaced name"));
}

#[test]
fn comprehension_scenario() {
    // [x*2 for x in xs if x > 0]
    match expr("[x*2 for x in xs if x > 0]") {
        AstNode::Array { items, .. } => {
            assert_eq!(items.len(), 1);
            match &items[0].node {
                AstNode::Comprehension { expr, vars, iter, filter } => {
                    assert!(matches!(expr.node, AstNode::BinaryOp { op: BinOp::Multiply, .. }));
                    assert_eq!(vars.len(), 1);
                    assert!(matches!(vars[0].node, AstNode::Var(ref n) if n == "x"));
                    assert!(matches!(iter.node, AstNode::Var(ref n) if n == "xs"));
                    assert!(matches!(
                        filter.as_ref().unwrap().node,
                        AstNode::BinaryOp { op: BinOp::GreaterThan, .. }
                    ));
                }
                other => panic!("expected Comprehension, got {other:?}"),
            }
        }
        other => panic!("expected Array, got {other:?}"),
    }
}

#[test]
fn unless_filter_is_negated() {
    match expr("[x for x in xs unless x]") {
        AstNode::Array { items, .. } => match &items[0].node {
            AstNode::Comprehension { filter: Some(filter), .. } => {
                assert!(matches!(filter.node, AstNode::Not(_)));
            }
            other => panic!("expected filtered Comprehension, got {other:?}"),
        },
        other => panic!("expected Array, got {other:?}"),
    }
}

#[test]
fn reductions() {
    match expr("(+: xs)") {
        AstNode::Reduction { op: BinOp::Plus, key: None, .. } => {}
        other => panic!("expected Reduction, got {other:?}"),
    }
    match expr("(_max_.size: files)") {
        AstNode::Reduction { op: BinOp::Max, key: Some(key), .. } => {
            assert!(matches!(key.node, AstNode::FieldAccess { .. }));
        }
        other => panic!("expected keyed Reduction, got {other:?}"),
    }
}

#[test]
fn lambda_expressions() {
    match expr("func(x:Int) x") {
        AstNode::Lambda { args, .. } => {
            assert_eq!(args.len(), 1);
            assert_eq!(args[0].name.as_deref(), Some("x"));
        }
        other => panic!("expected Lambda, got {other:?}"),
    }
}

#[test]
fn unfilled_placeholder_is_an_error() {
    assert!(parse_expression("??? + 1").is_err());
}

#[test]
fn type_expressions() {
    use tomo::ast::TypeAstNode;
    let t = parse_type_str("[Int]").unwrap().unwrap();
    assert!(matches!(t.node, TypeAstNode::Array(_)));
    let t = parse_type_str("@Foo?").unwrap().unwrap();
    match t.node {
        TypeAstNode::Optional(inner) => assert!(matches!(inner.node, TypeAstNode::Pointer { is_stack: false, .. })),
        other => panic!("expected Optional(Pointer), got {other:?}"),
    }
    let t = parse_type_str("&Buf").unwrap().unwrap();
    assert!(matches!(t.node, TypeAstNode::Pointer { is_stack: true, .. }));
    let t = parse_type_str("{Text=Int}").unwrap().unwrap();
    assert!(matches!(t.node, TypeAstNode::Table { .. }));
    let t = parse_type_str("|Text|").unwrap().unwrap();
    assert!(matches!(t.node, TypeAstNode::Set(_)));
    let t = parse_type_str("func(x:Int -> Text)").unwrap().unwrap();
    match t.node {
        TypeAstNode::Function { args, ret } => {
            assert_eq!(args.len(), 1);
            assert!(ret.is_some());
        }
        other => panic!("expected Function type, got {other:?}"),
    }
    let t = parse_type_str("foo.Bar").unwrap().unwrap();
    assert!(matches!(t.node, TypeAstNode::Var(ref n) if n == "foo.Bar"));
}
