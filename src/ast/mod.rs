//! The abstract syntax tree produced by the parser.
//!
//! Nodes are a tagged union ([`AstNode`]) wrapped with their source
//! span; the span covers the exact byte range of the source used to
//! build the node, so any node can reproduce its own source text.
//! Type expressions are a disjoint tree ([`TypeAstNode`]) with the same
//! span convention.
//!
//! Child lists are plain `Vec`s; the original implementation's
//! reversed singly-linked lists were an artifact of its allocator, not
//! of the grammar.

pub mod debug;
pub mod visit;

use std::sync::Arc;

use serde::Serialize;

use crate::sourcefile::SourceFile;

/// Byte range in the source file, `start..end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Span {
        Span { start, end }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Ast {
    #[serde(skip)]
    pub file: Arc<SourceFile>,
    pub span: Span,
    pub node: AstNode,
}

impl Ast {
    pub fn new(file: &Arc<SourceFile>, start: usize, end: usize, node: AstNode) -> Ast {
        Ast {
            file: Arc::clone(file),
            span: Span::new(start, end),
            node,
        }
    }

    /// The exact source text this node was parsed from.
    pub fn source_text(&self) -> &str {
        &self.file.text[self.span.start..self.span.end]
    }

    /// A copy of this node re-spanned (used when enclosing parens widen
    /// a node's extent).
    pub fn respanned(&self, start: usize, end: usize) -> Ast {
        Ast {
            file: Arc::clone(&self.file),
            span: Span::new(start, end),
            node: self.node.clone(),
        }
    }
}

/// Structural equality; spans and files are ignored so that re-parsed
/// fragments compare equal to their originals.
impl PartialEq for Ast {
    fn eq(&self, other: &Ast) -> bool {
        self.node == other.node
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TypeAst {
    #[serde(skip)]
    pub file: Arc<SourceFile>,
    pub span: Span,
    pub node: TypeAstNode,
}

impl TypeAst {
    pub fn new(file: &Arc<SourceFile>, start: usize, end: usize, node: TypeAstNode) -> TypeAst {
        TypeAst {
            file: Arc::clone(file),
            span: Span::new(start, end),
            node,
        }
    }
}

impl PartialEq for TypeAst {
    fn eq(&self, other: &TypeAst) -> bool {
        self.node == other.node
    }
}

/// Binary (and update-assignment) operators, tightest-binding first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Power,
    Multiply,
    Divide,
    Mod,
    Mod1,
    Plus,
    Minus,
    Concat,
    LeftShift,
    RightShift,
    UnsignedLeftShift,
    UnsignedRightShift,
    Min,
    Max,
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
    Compare,
    And,
    Or,
    Xor,
}

impl BinOp {
    /// Precedence: larger binds tighter.
    pub fn tightness(self) -> i32 {
        use BinOp::*;
        match self {
            Power => 9,
            Multiply | Divide | Mod | Mod1 => 8,
            Plus | Minus => 7,
            Concat => 6,
            LeftShift | RightShift | UnsignedLeftShift | UnsignedRightShift => 5,
            Min | Max => 4,
            Equals | NotEquals => 3,
            LessThan | LessThanOrEquals | GreaterThan | GreaterThanOrEquals | Compare => 2,
            And | Or | Xor => 1,
        }
    }

    pub fn symbol(self) -> &'static str {
        use BinOp::*;
        match self {
            Power => "^",
            Multiply => "*",
            Divide => "/",
            Mod => "mod",
            Mod1 => "mod1",
            Plus => "+",
            Minus => "-",
            Concat => "++",
            LeftShift => "<<",
            RightShift => ">>",
            UnsignedLeftShift => "<<<",
            UnsignedRightShift => ">>>",
            Min => "_min_",
            Max => "_max_",
            Equals => "==",
            NotEquals => "!=",
            LessThan => "<",
            LessThanOrEquals => "<=",
            GreaterThan => ">",
            GreaterThanOrEquals => ">=",
            Compare => "<>",
            And => "and",
            Or => "or",
            Xor => "xor",
        }
    }
}

/// One argument (or struct/enum field, or call argument). In
/// definitions at least one of `type_ast` and `value` is set; at call
/// sites only `value` is. Name batches sharing a trailing type or
/// default are expanded to one record per name by the parser.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Arg {
    pub name: Option<String>,
    pub type_ast: Option<TypeAst>,
    pub value: Option<Ast>,
}

/// One tag of an `enum` definition.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnumTag {
    pub name: String,
    pub fields: Vec<Arg>,
    pub secret: bool,
}

/// One `is` clause of a `when`: patterns sharing a body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WhenClause {
    pub patterns: Vec<Ast>,
    pub body: Ast,
}

/// How a `use` statement resolves, classified from its path shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum UseKind {
    /// `use ./sibling.tm` - another compile unit, resolved relative to
    /// the importing file.
    Local,
    /// `use modname` - an installed, versioned module directory.
    Module,
    /// `use -lfoo` - a verbatim link flag.
    SharedObject,
    /// `use <stdio.h>` or `use foo.h` - no orchestration effect.
    Header,
    /// `use helper.c` - an extra link input.
    CCode,
    /// `use impl.S` - an extra link input.
    Asm,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum AstNode {
    // Literals:
    Int {
        digits: String,
        bits: u8,
    },
    Num {
        value: f64,
        bits: u8,
    },
    Bool(bool),
    TextLiteral(String),
    TextJoin {
        lang: Option<String>,
        children: Vec<Ast>,
    },
    /// The `none` literal; the type is filled in by the checker.
    Null(Option<TypeAst>),
    Path(String),
    Var(String),

    // Arithmetic/logic:
    BinaryOp {
        op: BinOp,
        lhs: Box<Ast>,
        rhs: Box<Ast>,
    },
    UpdateAssign {
        op: BinOp,
        lhs: Box<Ast>,
        rhs: Box<Ast>,
    },
    Negative(Box<Ast>),
    Not(Box<Ast>),
    Min {
        lhs: Box<Ast>,
        rhs: Box<Ast>,
        key: Option<Box<Ast>>,
    },
    Max {
        lhs: Box<Ast>,
        rhs: Box<Ast>,
        key: Option<Box<Ast>>,
    },

    // Access:
    Index {
        indexed: Box<Ast>,
        index: Option<Box<Ast>>,
        unchecked: bool,
    },
    FieldAccess {
        fielded: Box<Ast>,
        field: String,
    },
    Optional(Box<Ast>),
    NonOptional(Box<Ast>),
    HeapAllocate(Box<Ast>),
    StackReference(Box<Ast>),

    // Aggregates:
    Array {
        item_type: Option<TypeAst>,
        items: Vec<Ast>,
    },
    Set {
        item_type: Option<TypeAst>,
        items: Vec<Ast>,
    },
    Table {
        key_type: Option<TypeAst>,
        value_type: Option<TypeAst>,
        entries: Vec<Ast>,
        fallback: Option<Box<Ast>>,
        default: Option<Box<Ast>>,
    },
    TableEntry {
        key: Box<Ast>,
        value: Box<Ast>,
    },
    Channel {
        item_type: TypeAst,
        max_size: Option<Box<Ast>>,
    },
    Comprehension {
        expr: Box<Ast>,
        vars: Vec<Ast>,
        iter: Box<Ast>,
        filter: Option<Box<Ast>>,
    },
    Reduction {
        iter: Box<Ast>,
        op: BinOp,
        key: Option<Box<Ast>>,
    },

    // Calls:
    FunctionCall {
        function: Box<Ast>,
        args: Vec<Arg>,
    },
    MethodCall {
        target: Box<Ast>,
        name: String,
        args: Vec<Arg>,
    },

    // Binding/flow:
    Declare {
        var: Box<Ast>,
        type_ast: Option<TypeAst>,
        value: Option<Box<Ast>>,
        top_level: bool,
    },
    Assign {
        targets: Vec<Ast>,
        values: Vec<Ast>,
    },
    Block(Vec<Ast>),
    If {
        condition: Box<Ast>,
        body: Box<Ast>,
        else_body: Option<Box<Ast>>,
    },
    When {
        subject: Box<Ast>,
        clauses: Vec<WhenClause>,
        else_body: Option<Box<Ast>>,
    },
    For {
        vars: Vec<Ast>,
        iter: Box<Ast>,
        body: Box<Ast>,
        empty: Option<Box<Ast>>,
    },
    While {
        condition: Option<Box<Ast>>,
        body: Box<Ast>,
    },
    Repeat(Box<Ast>),
    Defer(Box<Ast>),
    Return(Option<Box<Ast>>),
    Skip {
        target: Option<String>,
    },
    Stop {
        target: Option<String>,
    },
    Pass,
    PrintStatement {
        to_print: Vec<Ast>,
    },

    // Definitions:
    FunctionDef {
        name: Box<Ast>,
        args: Vec<Arg>,
        ret_type: Option<TypeAst>,
        body: Box<Ast>,
        cache: Option<Box<Ast>>,
        is_inline: bool,
    },
    ConvertDef {
        args: Vec<Arg>,
        ret_type: Option<TypeAst>,
        body: Box<Ast>,
        cache: Option<Box<Ast>>,
        is_inline: bool,
    },
    Lambda {
        id: i64,
        args: Vec<Arg>,
        ret_type: Option<TypeAst>,
        body: Box<Ast>,
    },
    StructDef {
        name: String,
        fields: Vec<Arg>,
        namespace: Box<Ast>,
        secret: bool,
        external: bool,
        opaque: bool,
    },
    EnumDef {
        name: String,
        tags: Vec<EnumTag>,
        namespace: Box<Ast>,
    },
    LangDef {
        name: String,
        namespace: Box<Ast>,
    },
    Extend {
        name: String,
        body: Box<Ast>,
    },
    Extern {
        name: String,
        type_ast: TypeAst,
    },
    Use {
        var: Option<Box<Ast>>,
        path: String,
        what: UseKind,
    },
    InlineCCode {
        chunks: Vec<Ast>,
        type_ast: Option<TypeAst>,
    },
    DocTest {
        expr: Box<Ast>,
        expected: Option<Box<Ast>>,
    },
    Assert {
        expr: Box<Ast>,
        message: Option<Box<Ast>>,
    },
    Deserialize {
        value: Box<Ast>,
        type_ast: TypeAst,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TypeAstNode {
    Var(String),
    Pointer {
        is_stack: bool,
        pointed: Box<TypeAst>,
    },
    Optional(Box<TypeAst>),
    Array(Box<TypeAst>),
    Set(Box<TypeAst>),
    Table {
        key: Box<TypeAst>,
        value: Box<TypeAst>,
        default: Option<Box<Ast>>,
    },
    Channel(Box<TypeAst>),
    Function {
        args: Vec<Arg>,
        ret: Option<Box<TypeAst>>,
    },
}
