//! Recursive-descent parser producing a [`Module`]
//!
//! Type annotations are recognised and discarded; markup is parsed by
//! switching the lexer into raw mode between `<` and the matching `>`.

use crate::ast::{
    ArrayItem, BinaryOp, Declarator, DefaultExport, Expr, FunctionBody, FunctionDecl, JsxAttr,
    JsxChild, JsxElement, JsxTag, Literal, LogicalOp, Module, ObjectProp, Pattern, PatternElem,
    Stmt, TemplateChunk, UnaryOp,
};
use crate::capability::CAPABILITY_NAMES;
use crate::compile::CompileError;
use crate::lexer::{Lexer, Span, TemplatePart, Token};
use std::sync::Arc;

const MAX_NESTING: usize = 96;

const RESERVED: &[&str] = &[
    "const", "let", "var", "function", "return", "if", "else", "for", "throw", "import", "export",
    "new", "typeof", "true", "false", "null", "while", "do", "switch", "class", "try",
];

const UNSUPPORTED_STATEMENTS: &[&str] = &["while", "do", "switch", "class", "try"];

fn import_message() -> String {
    format!(
        "Module imports are not allowed; only the host capabilities {} are available",
        CAPABILITY_NAMES
            .iter()
            .map(|n| format!("`{n}`"))
            .collect::<Vec<_>>()
            .join(", ")
    )
}

enum BinKind {
    Bin(BinaryOp),
    Logical(LogicalOp),
}

#[derive(Clone)]
pub(crate) struct Parser<'src> {
    lexer: Lexer<'src>,
    peeked: Option<(Token, Span)>,
    depth: usize,
}

type PResult<T> = Result<T, CompileError>;

impl<'src> Parser<'src> {
    pub(crate) fn new(src: &'src str) -> Self {
        Self::with_lexer(Lexer::new(src))
    }

    fn with_lexer(lexer: Lexer<'src>) -> Self {
        Self {
            lexer,
            peeked: None,
            depth: 0,
        }
    }

    // ---- token plumbing ----

    fn peek(&mut self) -> PResult<&Token> {
        let entry = match self.peeked.take() {
            Some(entry) => entry,
            None => self.lexer.next_token()?,
        };
        Ok(&self.peeked.insert(entry).0)
    }

    fn peek_span(&mut self) -> PResult<Span> {
        self.peek()?;
        Ok(self
            .peeked
            .as_ref()
            .map_or_else(|| self.lexer.span(), |(_, span)| *span))
    }

    fn bump(&mut self) -> PResult<(Token, Span)> {
        match self.peeked.take() {
            Some(entry) => Ok(entry),
            None => self.lexer.next_token(),
        }
    }

    /// Give a peeked token back to the lexer before switching to raw mode
    fn unpeek(&mut self) {
        if let Some((_, span)) = self.peeked.take() {
            self.lexer.reset(span);
        }
    }

    fn is_punct(&mut self, p: &str) -> PResult<bool> {
        Ok(matches!(self.peek()?, Token::Punct(q) if *q == p))
    }

    fn is_ident(&mut self, kw: &str) -> PResult<bool> {
        Ok(matches!(self.peek()?, Token::Ident(name) if name == kw))
    }

    fn eat_punct(&mut self, p: &str) -> PResult<bool> {
        if self.is_punct(p)? {
            self.bump()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn eat_ident(&mut self, kw: &str) -> PResult<bool> {
        if self.is_ident(kw)? {
            self.bump()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect_punct(&mut self, p: &str) -> PResult<Span> {
        let (tok, span) = self.bump()?;
        match tok {
            Token::Punct(q) if q == p => Ok(span),
            other => Err(self.error(
                format!("Unexpected {}, expected '{p}'", other.describe()),
                span,
            )),
        }
    }

    fn expect_ident(&mut self) -> PResult<(String, Span)> {
        let (tok, span) = self.bump()?;
        match tok {
            Token::Ident(name) if !RESERVED.contains(&name.as_str()) => Ok((name, span)),
            other => Err(self.unexpected(&other, span)),
        }
    }

    fn expect_property_name(&mut self) -> PResult<String> {
        let (tok, span) = self.bump()?;
        match tok {
            Token::Ident(name) => Ok(name),
            other => Err(self.unexpected(&other, span)),
        }
    }

    fn error(&self, message: impl Into<String>, span: Span) -> CompileError {
        CompileError::syntax(message, span, self.lexer.source())
    }

    fn unexpected(&self, tok: &Token, span: Span) -> CompileError {
        self.error(format!("Unexpected {}", tok.describe()), span)
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_NESTING {
            let span = self.lexer.span();
            return Err(self.error("Expression nested too deeply", span));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // ---- module ----

    pub(crate) fn parse_module(mut self) -> PResult<Module> {
        let mut items = Vec::new();
        let mut default_export = None;

        loop {
            let span = self.peek_span()?;
            if matches!(self.peek()?, Token::Eof) {
                break;
            }
            if self.is_ident("import")? {
                return Err(self.error(import_message(), span));
            }
            if self.eat_ident("export")? {
                if self.eat_ident("default")? {
                    if default_export.is_some() {
                        return Err(self.error(
                            "Only one default export is allowed per component module",
                            span,
                        ));
                    }
                    default_export = Some(self.parse_default_export(&mut items, span)?);
                    continue;
                }
                if self.is_punct("{")? || self.is_punct("*")? {
                    return Err(self.error(
                        "Re-exports are not supported; export the component with `export default`",
                        span,
                    ));
                }
            }
            if self.is_ident("return")? {
                return Err(self.error("Illegal return statement", span));
            }
            if let Some(stmt) = self.parse_item()? {
                items.push(stmt);
            }
        }

        let default_export = default_export.ok_or_else(|| {
            CompileError::module(
                "Component source must declare exactly one `export default` component",
                self.lexer.source(),
            )
        })?;
        Ok(Module {
            items,
            default_export,
        })
    }

    fn parse_default_export(&mut self, items: &mut Vec<Stmt>, span: Span) -> PResult<DefaultExport> {
        if self.is_ident("function")? {
            let decl = self.parse_function(false)?;
            return Ok(match decl.name.clone() {
                Some(name) => {
                    items.push(Stmt::Function(Arc::new(decl)));
                    DefaultExport::Binding { name, span }
                }
                None => DefaultExport::Expr(Expr::Function(Arc::new(decl))),
            });
        }
        let expr = self.parse_expr()?;
        self.eat_punct(";")?;
        Ok(match expr {
            Expr::Ident(name, span) => DefaultExport::Binding { name, span },
            other => DefaultExport::Expr(other),
        })
    }

    /// Top-level item; type declarations parse to `None`
    fn parse_item(&mut self) -> PResult<Option<Stmt>> {
        if self.eat_ident("interface")? {
            self.expect_ident()?;
            if self.is_punct("<")? {
                self.skip_generic_args()?;
            }
            while !self.is_punct("{")? {
                if matches!(self.peek()?, Token::Eof) {
                    let span = self.peek_span()?;
                    return Err(self.error("Unexpected end of input in interface", span));
                }
                self.bump()?;
            }
            self.bump()?;
            self.skip_until_close("{", "}")?;
            return Ok(None);
        }
        if self.is_ident("type")? {
            let snapshot = self.clone();
            self.bump()?;
            if matches!(self.peek()?, Token::Ident(_)) {
                self.bump()?;
                if self.is_punct("<")? {
                    self.skip_generic_args()?;
                }
                self.expect_punct("=")?;
                self.skip_type()?;
                self.eat_punct(";")?;
                return Ok(None);
            }
            *self = snapshot;
        }
        self.parse_statement().map(Some)
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> PResult<Stmt> {
        let span = self.peek_span()?;
        let keyword = match self.peek()?.clone() {
            Token::Ident(name) => Some(name),
            Token::Punct("{") => {
                self.bump()?;
                return Ok(Stmt::Block(self.parse_block_rest()?));
            }
            Token::Punct(";") => {
                self.bump()?;
                return Ok(Stmt::Block(Vec::new()));
            }
            _ => None,
        };

        match keyword.as_deref() {
            Some("const" | "let" | "var") => self.parse_declaration(),
            Some("function") => {
                let decl = self.parse_function(true)?;
                Ok(Stmt::Function(Arc::new(decl)))
            }
            Some("return") => {
                self.bump()?;
                if self.eat_punct(";")? || self.is_punct("}")? || matches!(self.peek()?, Token::Eof) {
                    return Ok(Stmt::Return(None));
                }
                let value = self.parse_expr()?;
                self.eat_punct(";")?;
                Ok(Stmt::Return(Some(value)))
            }
            Some("if") => {
                self.bump()?;
                self.expect_punct("(")?;
                let cond = self.parse_expr()?;
                self.expect_punct(")")?;
                let then_branch = self.parse_branch()?;
                let else_branch = if self.eat_ident("else")? {
                    Some(self.parse_branch()?)
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                })
            }
            Some("for") => {
                self.bump()?;
                self.expect_punct("(")?;
                if !(self.eat_ident("const")? || self.eat_ident("let")?) {
                    return Err(self.error("Only `for (const item of items)` loops are supported", span));
                }
                let pattern = self.parse_binding_pattern()?;
                if !self.eat_ident("of")? {
                    return Err(self.error("Only `for (const item of items)` loops are supported", span));
                }
                let iterable = self.parse_expr()?;
                self.expect_punct(")")?;
                let body = self.parse_branch()?;
                Ok(Stmt::ForOf {
                    pattern,
                    iterable,
                    body,
                })
            }
            Some("throw") => {
                self.bump()?;
                let value = self.parse_expr()?;
                self.eat_punct(";")?;
                Ok(Stmt::Throw(value))
            }
            Some("import") => Err(self.error(import_message(), span)),
            Some("export") => Err(self.error("'export' may only appear at the top level", span)),
            Some(kw) if UNSUPPORTED_STATEMENTS.contains(&kw) => Err(self.error(
                format!("'{kw}' statements are not supported in widget components"),
                span,
            )),
            _ => {
                let expr = self.parse_expr()?;
                self.eat_punct(";")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_branch(&mut self) -> PResult<Vec<Stmt>> {
        if self.eat_punct("{")? {
            return self.parse_block_rest();
        }
        Ok(vec![self.parse_statement()?])
    }

    /// Statements up to the closing `}` (the opening brace is already consumed)
    fn parse_block_rest(&mut self) -> PResult<Vec<Stmt>> {
        self.nested(|p| {
            let mut stmts = Vec::new();
            loop {
                if p.eat_punct("}")? {
                    return Ok(stmts);
                }
                if matches!(p.peek()?, Token::Eof) {
                    let span = p.peek_span()?;
                    return Err(p.error("Unexpected end of input, expected '}'", span));
                }
                stmts.push(p.parse_statement()?);
            }
        })
    }

    fn parse_declaration(&mut self) -> PResult<Stmt> {
        let (tok, span) = self.bump()?;
        let mutable = !matches!(&tok, Token::Ident(kw) if kw == "const");
        let mut declarators = Vec::new();
        loop {
            let pattern = self.parse_binding_pattern()?;
            if self.eat_punct(":")? {
                self.skip_type()?;
            }
            let init = if self.eat_punct("=")? {
                Some(self.parse_expr()?)
            } else {
                None
            };
            if !mutable && init.is_none() {
                return Err(self.error("Missing initializer in const declaration", span));
            }
            declarators.push(Declarator { pattern, init });
            if !self.eat_punct(",")? {
                break;
            }
        }
        self.eat_punct(";")?;
        Ok(Stmt::Let {
            declarators,
            mutable,
            span,
        })
    }

    fn parse_function(&mut self, require_name: bool) -> PResult<FunctionDecl> {
        let (_, span) = self.bump()?;
        let name = if matches!(self.peek()?, Token::Ident(_)) {
            Some(self.expect_ident()?.0)
        } else if require_name {
            let span = self.peek_span()?;
            return Err(self.error("Function statements require a function name", span));
        } else {
            None
        };
        if self.is_punct("<")? {
            self.skip_generic_args()?;
        }
        let params = self.parse_params()?;
        if self.eat_punct(":")? {
            self.skip_type()?;
        }
        self.expect_punct("{")?;
        let body = FunctionBody::Block(self.parse_block_rest()?);
        Ok(FunctionDecl {
            name,
            params,
            body,
            span,
        })
    }

    fn parse_params(&mut self) -> PResult<Vec<PatternElem>> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.eat_punct(")")? {
            if self.is_punct("...")? {
                let span = self.peek_span()?;
                return Err(self.error("Rest parameters are not supported", span));
            }
            params.push(self.parse_pattern_elem(true)?);
            if !self.eat_punct(",")? {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok(params)
    }

    fn parse_pattern_elem(&mut self, typed: bool) -> PResult<PatternElem> {
        let pattern = self.parse_binding_pattern()?;
        if typed {
            self.eat_punct("?")?;
            if self.eat_punct(":")? {
                self.skip_type()?;
            }
        }
        let default = if self.eat_punct("=")? {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(PatternElem { pattern, default })
    }

    fn parse_binding_pattern(&mut self) -> PResult<Pattern> {
        if self.eat_punct("[")? {
            let mut items = Vec::new();
            loop {
                if self.eat_punct("]")? {
                    break;
                }
                if self.eat_punct(",")? {
                    items.push(None);
                    continue;
                }
                items.push(Some(self.parse_pattern_elem(false)?));
                if !self.eat_punct(",")? {
                    self.expect_punct("]")?;
                    break;
                }
            }
            return Ok(Pattern::Array(items));
        }
        if self.eat_punct("{")? {
            let mut props = Vec::new();
            loop {
                if self.eat_punct("}")? {
                    break;
                }
                let (tok, span) = self.bump()?;
                let key = match tok {
                    Token::Ident(name) => name,
                    Token::Str(s) => s,
                    other => return Err(self.unexpected(&other, span)),
                };
                let elem = if self.eat_punct(":")? {
                    self.parse_pattern_elem(false)?
                } else {
                    if RESERVED.contains(&key.as_str()) {
                        return Err(self.error(format!("Unexpected keyword '{key}'"), span));
                    }
                    let default = if self.eat_punct("=")? {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    PatternElem {
                        pattern: Pattern::Ident(key.clone()),
                        default,
                    }
                };
                props.push((key, elem));
                if !self.eat_punct(",")? {
                    self.expect_punct("}")?;
                    break;
                }
            }
            return Ok(Pattern::Object(props));
        }
        let (name, _) = self.expect_ident()?;
        Ok(Pattern::Ident(name))
    }

    // ---- types (skipped) ----

    fn skip_type(&mut self) -> PResult<()> {
        self.eat_punct("|")?;
        loop {
            self.skip_type_primary()?;
            while self.is_punct("[")? {
                self.bump()?;
                self.expect_punct("]")?;
            }
            if self.eat_punct("|")? || self.eat_punct("&")? {
                continue;
            }
            return Ok(());
        }
    }

    fn skip_type_primary(&mut self) -> PResult<()> {
        let (tok, span) = self.bump()?;
        match tok {
            Token::Ident(name) if name == "typeof" || name == "keyof" => self.skip_type_primary(),
            Token::Ident(_) => {
                while self.eat_punct(".")? {
                    self.expect_property_name()?;
                }
                if self.is_punct("<")? {
                    self.skip_generic_args()?;
                }
                Ok(())
            }
            Token::Str(_) | Token::Num(_) => Ok(()),
            Token::Punct("{") => self.skip_until_close("{", "}"),
            Token::Punct("[") => self.skip_until_close("[", "]"),
            Token::Punct("(") => {
                self.skip_until_close("(", ")")?;
                if self.eat_punct("=>")? {
                    self.skip_type()?;
                }
                Ok(())
            }
            other => Err(self.unexpected(&other, span)),
        }
    }

    fn skip_generic_args(&mut self) -> PResult<()> {
        self.expect_punct("<")?;
        self.skip_until_close("<", ">")
    }

    /// Skip tokens until the `close` matching an already-consumed `open`
    fn skip_until_close(&mut self, open: &str, close: &str) -> PResult<()> {
        let mut depth = 1usize;
        loop {
            let (tok, span) = self.bump()?;
            match tok {
                Token::Punct(p) if p == open => depth += 1,
                Token::Punct(p) if p == close => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Token::Eof => {
                    return Err(self.error(format!("Unexpected end of input, expected '{close}'"), span))
                }
                _ => {}
            }
        }
    }

    // ---- expressions ----

    pub(crate) fn parse_expr(&mut self) -> PResult<Expr> {
        self.nested(Self::parse_assignment)
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        if let Some(arrow) = self.try_arrow()? {
            return Ok(arrow);
        }
        let lhs = self.parse_conditional()?;
        let span = self.peek_span()?;
        for (punct, op) in [("=", None), ("+=", Some(BinaryOp::Add)), ("-=", Some(BinaryOp::Sub))] {
            if !self.eat_punct(punct)? {
                continue;
            }
            let Expr::Ident(target, target_span) = lhs else {
                return Err(self.error(
                    "Invalid assignment target; only variables can be reassigned (objects and arrays are immutable)",
                    span,
                ));
            };
            let rhs = self.parse_expr()?;
            let value = match op {
                Some(op) => Expr::Binary {
                    op,
                    lhs: Box::new(Expr::Ident(target.clone(), target_span)),
                    rhs: Box::new(rhs),
                },
                None => rhs,
            };
            return Ok(Expr::Assign {
                target,
                value: Box::new(value),
                span,
            });
        }
        Ok(lhs)
    }

    fn try_arrow(&mut self) -> PResult<Option<Expr>> {
        let span = self.peek_span()?;
        let single = match self.peek()? {
            Token::Ident(name) if !RESERVED.contains(&name.as_str()) => Some(name.clone()),
            Token::Punct("(") => None,
            _ => return Ok(None),
        };

        let snapshot = self.clone();
        let params = match single {
            Some(name) => {
                self.bump()?;
                if self.eat_punct("=>")? {
                    Some(vec![PatternElem {
                        pattern: Pattern::Ident(name),
                        default: None,
                    }])
                } else {
                    None
                }
            }
            None => self.scan_arrow_head().unwrap_or(None),
        };

        let Some(params) = params else {
            *self = snapshot;
            return Ok(None);
        };
        let body = if self.eat_punct("{")? {
            FunctionBody::Block(self.parse_block_rest()?)
        } else {
            FunctionBody::Expr(Box::new(self.parse_expr()?))
        };
        Ok(Some(Expr::Function(Arc::new(FunctionDecl {
            name: None,
            params,
            body,
            span,
        }))))
    }

    fn scan_arrow_head(&mut self) -> PResult<Option<Vec<PatternElem>>> {
        let params = self.parse_params()?;
        if self.eat_punct(":")? {
            self.skip_type()?;
        }
        if self.eat_punct("=>")? {
            return Ok(Some(params));
        }
        Ok(None)
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let test = self.parse_binary(0)?;
        if !self.eat_punct("?")? {
            return Ok(test);
        }
        let consequent = self.parse_expr()?;
        self.expect_punct(":")?;
        let alternate = self.parse_expr()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn binary_op(&mut self) -> PResult<Option<(u8, BinKind)>> {
        let Token::Punct(p) = self.peek()? else {
            return Ok(None);
        };
        Ok(Some(match *p {
            "??" => (1, BinKind::Logical(LogicalOp::Nullish)),
            "||" => (1, BinKind::Logical(LogicalOp::Or)),
            "&&" => (2, BinKind::Logical(LogicalOp::And)),
            "==" => (3, BinKind::Bin(BinaryOp::Eq)),
            "!=" => (3, BinKind::Bin(BinaryOp::NotEq)),
            "===" => (3, BinKind::Bin(BinaryOp::StrictEq)),
            "!==" => (3, BinKind::Bin(BinaryOp::StrictNotEq)),
            "<" => (4, BinKind::Bin(BinaryOp::Lt)),
            "<=" => (4, BinKind::Bin(BinaryOp::LtEq)),
            ">" => (4, BinKind::Bin(BinaryOp::Gt)),
            ">=" => (4, BinKind::Bin(BinaryOp::GtEq)),
            "+" => (5, BinKind::Bin(BinaryOp::Add)),
            "-" => (5, BinKind::Bin(BinaryOp::Sub)),
            "*" => (6, BinKind::Bin(BinaryOp::Mul)),
            "/" => (6, BinKind::Bin(BinaryOp::Div)),
            "%" => (6, BinKind::Bin(BinaryOp::Rem)),
            _ => return Ok(None),
        }))
    }

    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            if self.is_ident("as")? {
                self.bump()?;
                self.skip_type()?;
                continue;
            }
            let Some((prec, kind)) = self.binary_op()? else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.bump()?;
            let rhs = self.parse_binary(prec + 1)?;
            lhs = match kind {
                BinKind::Bin(op) => Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                BinKind::Logical(op) => Expr::Logical {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.peek()? {
            Token::Punct("!") => Some(UnaryOp::Not),
            Token::Punct("-") => Some(UnaryOp::Neg),
            Token::Punct("+") => Some(UnaryOp::Plus),
            Token::Ident(kw) if kw == "typeof" => Some(UnaryOp::TypeOf),
            _ => None,
        };
        let Some(op) = op else {
            return self.parse_postfix();
        };
        self.bump()?;
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let span = self.peek_span()?;
            if self.eat_punct(".")? {
                let property = self.expect_property_name()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional: false,
                    span,
                };
            } else if self.eat_punct("?.")? {
                if self.eat_punct("(")? {
                    let args = self.parse_args_rest()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        optional: true,
                        span,
                    };
                } else if self.eat_punct("[")? {
                    let index = self.parse_expr()?;
                    self.expect_punct("]")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: true,
                        span,
                    };
                } else {
                    let property = self.expect_property_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional: true,
                        span,
                    };
                }
            } else if self.eat_punct("[")? {
                let index = self.parse_expr()?;
                self.expect_punct("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    optional: false,
                    span,
                };
            } else if self.eat_punct("(")? {
                let args = self.parse_args_rest()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    optional: false,
                    span,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_args_rest(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.eat_punct(")")? {
            args.push(self.parse_expr()?);
            if !self.eat_punct(",")? {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let (tok, span) = self.bump()?;
        match tok {
            Token::Num(n) => Ok(Expr::Literal(Literal::Num(n))),
            Token::Str(s) => Ok(Expr::Literal(Literal::Str(s))),
            Token::Template(parts) => self.parse_template(parts),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Literal::Bool(true))),
                "false" => Ok(Expr::Literal(Literal::Bool(false))),
                "null" => Ok(Expr::Literal(Literal::Null)),
                "undefined" => Ok(Expr::Literal(Literal::Undefined)),
                "function" => {
                    self.peeked = Some((Token::Ident("function".to_string()), span));
                    let decl = self.parse_function(false)?;
                    Ok(Expr::Function(Arc::new(decl)))
                }
                "new" => {
                    let target = self.nested(Self::parse_postfix)?;
                    Ok(match target {
                        call @ Expr::Call { .. } => call,
                        other => Expr::Call {
                            callee: Box::new(other),
                            args: Vec::new(),
                            optional: false,
                            span,
                        },
                    })
                }
                kw if RESERVED.contains(&kw) => Err(self.error(format!("Unexpected keyword '{kw}'"), span)),
                _ => Ok(Expr::Ident(name, span)),
            },
            Token::Punct("(") => {
                let inner = self.parse_expr()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            Token::Punct("[") => self.parse_array_rest(),
            Token::Punct("{") => self.parse_object_rest(),
            Token::Punct("<") => {
                let element = self.nested(|p| p.parse_jsx_after_lt(span))?;
                Ok(Expr::Element(Box::new(element)))
            }
            other => Err(self.unexpected(&other, span)),
        }
    }

    fn parse_template(&mut self, parts: Vec<TemplatePart>) -> PResult<Expr> {
        let mut chunks = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                TemplatePart::Text(text) => chunks.push(TemplateChunk::Text(text)),
                TemplatePart::Expr { source, span } => {
                    let outer = self.lexer.source();
                    let mut sub = Parser::with_lexer(Lexer::at(&source, span));
                    sub.depth = self.depth;
                    let expr = sub
                        .parse_template_expr()
                        .map_err(|err| err.relocate(outer))?;
                    chunks.push(TemplateChunk::Expr(expr));
                }
            }
        }
        Ok(Expr::Template(chunks))
    }

    fn parse_template_expr(&mut self) -> PResult<Expr> {
        let expr = self.parse_expr()?;
        let (tok, end) = self.bump()?;
        if tok != Token::Eof {
            return Err(self.unexpected(&tok, end));
        }
        Ok(expr)
    }

    fn parse_array_rest(&mut self) -> PResult<Expr> {
        let mut items = Vec::new();
        loop {
            if self.eat_punct("]")? {
                break;
            }
            if self.eat_punct(",")? {
                items.push(ArrayItem::Item(Expr::Literal(Literal::Undefined)));
                continue;
            }
            if self.eat_punct("...")? {
                items.push(ArrayItem::Spread(self.parse_expr()?));
            } else {
                items.push(ArrayItem::Item(self.parse_expr()?));
            }
            if !self.eat_punct(",")? {
                self.expect_punct("]")?;
                break;
            }
        }
        Ok(Expr::Array(items))
    }

    fn parse_object_rest(&mut self) -> PResult<Expr> {
        let mut props = Vec::new();
        loop {
            if self.eat_punct("}")? {
                break;
            }
            if self.eat_punct("...")? {
                props.push(ObjectProp::Spread(self.parse_expr()?));
            } else {
                let (tok, span) = self.bump()?;
                let (key, shorthand_ok) = match tok {
                    Token::Ident(name) => (name, true),
                    Token::Str(s) => (s, false),
                    Token::Num(n) => (crate::value::format_number(n), false),
                    other => return Err(self.unexpected(&other, span)),
                };
                if self.eat_punct(":")? {
                    let value = self.parse_expr()?;
                    props.push(ObjectProp::Named(key, value));
                } else if self.is_punct("(")? {
                    let params = self.parse_params()?;
                    if self.eat_punct(":")? {
                        self.skip_type()?;
                    }
                    self.expect_punct("{")?;
                    let body = FunctionBody::Block(self.parse_block_rest()?);
                    let decl = FunctionDecl {
                        name: Some(key.clone()),
                        params,
                        body,
                        span,
                    };
                    props.push(ObjectProp::Named(key, Expr::Function(Arc::new(decl))));
                } else if shorthand_ok && !RESERVED.contains(&key.as_str()) {
                    props.push(ObjectProp::Named(key.clone(), Expr::Ident(key, span)));
                } else {
                    return Err(self.error(format!("Expected ':' after property '{key}'"), span));
                }
            }
            if !self.eat_punct(",")? {
                self.expect_punct("}")?;
                break;
            }
        }
        Ok(Expr::Object(props))
    }

    // ---- markup ----

    fn parse_jsx_after_lt(&mut self, span: Span) -> PResult<JsxElement> {
        self.unpeek();
        self.lexer.skip_trivia()?;
        if self.lexer.eat_char('>') {
            let children = self.parse_jsx_children(None)?;
            return Ok(JsxElement {
                tag: JsxTag::Fragment,
                attrs: Vec::new(),
                children,
                span,
            });
        }

        let (name, name_span) = self.lexer.jsx_name()?;
        let tag = jsx_tag(&name, name_span);
        let mut attrs = Vec::new();
        loop {
            self.lexer.skip_trivia()?;
            let here = self.lexer.span();
            match self.lexer.peek_char() {
                Some('/') => {
                    self.lexer.bump_char();
                    if !self.lexer.eat_char('>') {
                        return Err(self.error("Expected '>' after '/' in JSX tag", here));
                    }
                    return Ok(JsxElement {
                        tag,
                        attrs,
                        children: Vec::new(),
                        span,
                    });
                }
                Some('>') => {
                    self.lexer.bump_char();
                    let children = self.parse_jsx_children(Some(&name))?;
                    return Ok(JsxElement {
                        tag,
                        attrs,
                        children,
                        span,
                    });
                }
                Some('{') => {
                    self.lexer.bump_char();
                    self.expect_punct("...")?;
                    let spread = self.parse_expr()?;
                    self.expect_punct("}")?;
                    self.unpeek();
                    attrs.push(JsxAttr::Spread(spread));
                }
                Some(_) => {
                    let (attr, _) = self.lexer.jsx_name()?;
                    self.lexer.skip_trivia()?;
                    let value = if self.lexer.eat_char('=') {
                        self.lexer.skip_trivia()?;
                        let value_span = self.lexer.span();
                        match self.lexer.peek_char() {
                            Some('"' | '\'') => match self.lexer.next_token()? {
                                (Token::Str(s), _) => Expr::Literal(Literal::Str(s)),
                                (other, at) => return Err(self.unexpected(&other, at)),
                            },
                            Some('{') => {
                                self.lexer.bump_char();
                                let value = self.parse_expr()?;
                                self.expect_punct("}")?;
                                self.unpeek();
                                value
                            }
                            _ => {
                                return Err(self.error(
                                    "JSX attribute values must be a string or an {expression}",
                                    value_span,
                                ))
                            }
                        }
                    } else {
                        Expr::Literal(Literal::Bool(true))
                    };
                    attrs.push(JsxAttr::Named(attr, value));
                }
                None => {
                    return Err(self.error(format!("Unterminated JSX element <{name}>"), span));
                }
            }
        }
    }

    /// Children up to the closing tag; `open` is `None` for fragments
    fn parse_jsx_children(&mut self, open: Option<&str>) -> PResult<Vec<JsxChild>> {
        let mut children = Vec::new();
        loop {
            let text = self.lexer.jsx_text();
            if let Some(text) = normalize_jsx_text(&text) {
                children.push(JsxChild::Text(text));
            }
            let span = self.lexer.span();
            match self.lexer.peek_char() {
                Some('{') => {
                    self.lexer.bump_char();
                    self.lexer.skip_trivia()?;
                    if self.lexer.eat_char('}') {
                        continue;
                    }
                    let expr = self.parse_expr()?;
                    self.expect_punct("}")?;
                    self.unpeek();
                    children.push(JsxChild::Expr(expr));
                }
                Some('<') => {
                    self.lexer.bump_char();
                    self.lexer.skip_trivia()?;
                    if self.lexer.eat_char('/') {
                        self.lexer.skip_trivia()?;
                        let closing = if self.lexer.peek_char() == Some('>') {
                            None
                        } else {
                            Some(self.lexer.jsx_name()?.0)
                        };
                        self.lexer.skip_trivia()?;
                        if !self.lexer.eat_char('>') {
                            return Err(self.error("Expected '>' in JSX closing tag", span));
                        }
                        if closing.as_deref() != open {
                            let expected = open.map_or_else(|| "</>".to_string(), |n| format!("</{n}>"));
                            return Err(self.error(
                                format!("Expected corresponding JSX closing tag {expected}"),
                                span,
                            ));
                        }
                        return Ok(children);
                    }
                    let child = self.nested(|p| p.parse_jsx_after_lt(span))?;
                    children.push(JsxChild::Element(child));
                }
                _ => {
                    let what = open.map_or_else(|| "fragment".to_string(), |n| format!("<{n}>"));
                    return Err(self.error(format!("Unterminated JSX contents for {what}"), span));
                }
            }
        }
    }
}

fn jsx_tag(name: &str, span: Span) -> JsxTag {
    let is_component = name.contains('.') || name.chars().next().is_some_and(char::is_uppercase);
    if !is_component {
        return JsxTag::Intrinsic(name.to_string());
    }
    let mut segments = name.split('.');
    let head = segments.next().unwrap_or_default();
    let mut expr = Expr::Ident(head.to_string(), span);
    for segment in segments {
        expr = Expr::Member {
            object: Box::new(expr),
            property: segment.to_string(),
            optional: false,
            span,
        };
    }
    JsxTag::Component(expr)
}

fn normalize_jsx_text(raw: &str) -> Option<String> {
    if !raw.contains('\n') {
        return (!raw.is_empty()).then(|| raw.to_string());
    }
    let lines: Vec<&str> = raw.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    (!lines.is_empty()).then(|| lines.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Module {
        Parser::new(src).parse_module().expect("should parse")
    }

    fn parse_err(src: &str) -> CompileError {
        Parser::new(src).parse_module().expect_err("should fail")
    }

    #[test]
    fn parses_default_function_export() {
        let module = parse("export default function W() { return 1; }");
        assert!(matches!(module.default_export, DefaultExport::Binding { ref name, .. } if name == "W"));
        assert_eq!(module.items.len(), 1);
    }

    #[test]
    fn parses_arrow_default_export() {
        let module = parse("export default (props) => <div>{props.title}</div>;");
        assert!(matches!(module.default_export, DefaultExport::Expr(Expr::Function(_))));
    }

    #[test]
    fn skips_type_annotations_and_declarations() {
        let module = parse(
            "interface Props { title: string; rows: Array<{ v: number }> }\n\
             type Mode = 'a' | 'b';\n\
             const limit: number = 5;\n\
             export default function W({ title }: Props): JSX.Element { return (title as string); }",
        );
        assert_eq!(module.items.len(), 2);
    }

    #[test]
    fn parses_nested_jsx_with_attributes() {
        let module = parse(
            r#"export default function W() {
                return (
                  <div className="kpi" data-id={1} hidden>
                    <span>{"a"} total</span>
                    <>frag</>
                  </div>
                );
            }"#,
        );
        let Stmt::Function(decl) = &module.items[0] else {
            panic!("expected function");
        };
        let FunctionBody::Block(body) = &decl.body else {
            panic!("expected block");
        };
        let Stmt::Return(Some(Expr::Element(el))) = &body[0] else {
            panic!("expected element return");
        };
        assert_eq!(el.attrs.len(), 3);
        assert_eq!(el.children.len(), 2);
    }

    #[test]
    fn jsx_less_than_in_expression_is_comparison() {
        parse("export default function W(p) { return p.a < p.b ? <b/> : <i/>; }");
    }

    #[test]
    fn rejects_imports() {
        let err = parse_err("import React from 'react';\nexport default function W() {}");
        assert!(err.message.contains("imports are not allowed"));
    }

    #[test]
    fn rejects_missing_default_export() {
        let err = parse_err("function W() { return 1; }");
        assert!(err.message.contains("export default"));
    }

    #[test]
    fn rejects_two_default_exports() {
        let err = parse_err("export default function A() {}\nexport default function B() {}");
        assert!(err.message.contains("Only one default export"));
    }

    #[test]
    fn rejects_mismatched_closing_tag() {
        let err = parse_err("export default function W() { return <div></span>; }");
        assert!(err.message.contains("closing tag"));
    }

    #[test]
    fn rejects_unsupported_statement() {
        let err = parse_err("export default function W() { while (true) {} }");
        assert!(err.message.contains("'while' statements are not supported"));
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        let src = format!("export default () => {}1{};", "(".repeat(500), ")".repeat(500));
        let err = parse_err(&src);
        assert!(err.message.contains("nested too deeply"));
    }

    #[test]
    fn destructuring_with_defaults() {
        parse("export default function W({ rows = [], title: t = 'x' }) { const [a, , b] = rows; return a; }");
    }
}
