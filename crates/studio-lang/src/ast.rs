//! Syntax tree for component programs

use crate::lexer::Span;
use std::sync::Arc;

/// A parsed component module
#[derive(Debug, Clone)]
pub struct Module {
    /// Top-level statements in source order
    pub items: Vec<Stmt>,
    /// The single default export
    pub default_export: DefaultExport,
}

/// What the module exports as its component
#[derive(Debug, Clone)]
pub enum DefaultExport {
    /// `export default function Name() {}` or `export default Name;`
    Binding {
        /// Top-level binding name
        name: String,
        /// Where the export appears
        span: Span,
    },
    /// `export default <expression>;`
    Expr(Expr),
}

/// Statement
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `const`/`let` declaration
    Let {
        /// One entry per declarator (`const a = 1, b = 2`)
        declarators: Vec<Declarator>,
        /// `let` (true) or `const` (false)
        mutable: bool,
        /// Declaration start
        span: Span,
    },
    /// Named function declaration
    Function(Arc<FunctionDecl>),
    /// `return`
    Return(Option<Expr>),
    /// `if`/`else`
    If {
        /// Condition
        cond: Expr,
        /// Taken when truthy
        then_branch: Vec<Stmt>,
        /// Taken when falsy
        else_branch: Option<Vec<Stmt>>,
    },
    /// `for (const x of xs)`
    ForOf {
        /// Loop binding
        pattern: Pattern,
        /// Iterated value
        iterable: Expr,
        /// Loop body
        body: Vec<Stmt>,
    },
    /// `throw`
    Throw(Expr),
    /// Expression statement
    Expr(Expr),
    /// `{ ... }`
    Block(Vec<Stmt>),
}

/// Single `pattern = init` of a declaration
#[derive(Debug, Clone)]
pub struct Declarator {
    /// Binding pattern
    pub pattern: Pattern,
    /// Initializer
    pub init: Option<Expr>,
}

/// Function declaration or expression (arrow functions included)
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    /// Name, if declared with one
    pub name: Option<String>,
    /// Parameters
    pub params: Vec<PatternElem>,
    /// Body
    pub body: FunctionBody,
    /// Where the function starts
    pub span: Span,
}

/// Function body
#[derive(Debug, Clone)]
pub enum FunctionBody {
    /// Statement block
    Block(Vec<Stmt>),
    /// Concise arrow body
    Expr(Box<Expr>),
}

/// Binding pattern
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Plain identifier
    Ident(String),
    /// `[a, , b]`
    Array(Vec<Option<PatternElem>>),
    /// `{ a, b: c }`
    Object(Vec<(String, PatternElem)>),
}

/// Pattern with an optional default value
#[derive(Debug, Clone)]
pub struct PatternElem {
    /// Pattern
    pub pattern: Pattern,
    /// Default used when the matched value is `undefined`
    pub default: Option<Expr>,
}

impl Pattern {
    /// Names bound by this pattern
    pub fn bound_names(&self, out: &mut Vec<String>) {
        match self {
            Self::Ident(name) => out.push(name.clone()),
            Self::Array(items) => {
                for item in items.iter().flatten() {
                    item.pattern.bound_names(out);
                }
            }
            Self::Object(props) => {
                for (_, elem) in props {
                    elem.pattern.bound_names(out);
                }
            }
        }
    }
}

/// Literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Number
    Num(f64),
    /// String
    Str(String),
    /// Boolean
    Bool(bool),
    /// `null`
    Null,
    /// `undefined`
    Undefined,
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
    /// `+`
    Plus,
    /// `typeof`
    TypeOf,
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Short-circuiting operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `??`
    Nullish,
}

/// Array literal item
#[derive(Debug, Clone)]
pub enum ArrayItem {
    /// Single value
    Item(Expr),
    /// `...spread`
    Spread(Expr),
}

/// Object literal property
#[derive(Debug, Clone)]
pub enum ObjectProp {
    /// `key: value`
    Named(String, Expr),
    /// `...spread`
    Spread(Expr),
}

/// Template literal chunk
#[derive(Debug, Clone)]
pub enum TemplateChunk {
    /// Literal text
    Text(String),
    /// Interpolated expression
    Expr(Expr),
}

/// Expression
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    Template(Vec<TemplateChunk>),
    Ident(String, Span),
    Array(Vec<ArrayItem>),
    Object(Vec<ObjectProp>),
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        optional: bool,
        span: Span,
    },
    Function(Arc<FunctionDecl>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        target: String,
        value: Box<Expr>,
        span: Span,
    },
    Element(Box<JsxElement>),
}

impl Expr {
    /// Short human-readable rendering used in error messages
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(name, _) => name.clone(),
            Self::Member { object, property, .. } => format!("{}.{property}", object.describe()),
            Self::Index { object, .. } => format!("{}[...]", object.describe()),
            Self::Call { callee, .. } => format!("{}(...)", callee.describe()),
            Self::Literal(Literal::Str(s)) => format!("\"{s}\""),
            Self::Literal(Literal::Num(n)) => n.to_string(),
            _ => "expression".to_string(),
        }
    }
}

/// Markup element
#[derive(Debug, Clone)]
pub struct JsxElement {
    /// Tag
    pub tag: JsxTag,
    /// Attributes in source order
    pub attrs: Vec<JsxAttr>,
    /// Children
    pub children: Vec<JsxChild>,
    /// Where the element opens
    pub span: Span,
}

/// Markup tag
#[derive(Debug, Clone)]
pub enum JsxTag {
    /// Lowercase host element (`div`)
    Intrinsic(String),
    /// Capitalized component reference (`Card`, `Chart.Line`)
    Component(Expr),
    /// `<>...</>`
    Fragment,
}

/// Markup attribute
#[derive(Debug, Clone)]
pub enum JsxAttr {
    /// `name="v"` / `name={v}` / bare `name`
    Named(String, Expr),
    /// `{...props}`
    Spread(Expr),
}

/// Markup child
#[derive(Debug, Clone)]
pub enum JsxChild {
    /// Normalized text
    Text(String),
    /// `{expression}`
    Expr(Expr),
    /// Nested element
    Element(JsxElement),
}
