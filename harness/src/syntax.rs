//! Parse-only validation of generated Python.
//!
//! The RustPython grammar accepts a few constructs that CPython's compiler
//! front end rejects before any code runs: assignment or deletion targets
//! that are not names, attributes, subscripts or (for plain assignment)
//! starred/tuple/list patterns, and an unparenthesized generator expression
//! passed next to other call arguments. After a successful parse the tree is
//! walked and those are reported the way CPython reports them.

use rustpython_parser::ast::{self, Expr, Ranged, Stmt};
use rustpython_parser::{parse, Mode};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

const SOURCE_PATH: &str = "<generated>";

/// Where and why the parser rejected a piece of code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxIssue {
    pub message: String,
    /// 1-based line of the error.
    pub line: usize,
    /// 1-based column (in characters) of the error.
    pub column: usize,
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {}, column {})", self.message, self.line, self.column)
    }
}

impl std::error::Error for SyntaxIssue {}

type SyntaxResult = Result<(), SyntaxIssue>;

fn line_and_column(code: &str, offset: usize) -> (usize, usize) {
    let mut offset = offset.min(code.len());
    while !code.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &code[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map(|tail| tail.chars().count())
        .unwrap_or(0)
        + 1;
    (line, column)
}

fn issue_at(code: &str, offset: usize, message: impl Into<String>) -> SyntaxIssue {
    let (line, column) = line_and_column(code, offset);
    SyntaxIssue {
        message: message.into(),
        line,
        column,
    }
}

/// Parses `code` as a Python module without executing it.
pub fn check_syntax(code: &str) -> SyntaxResult {
    match parse(code, Mode::Module, SOURCE_PATH) {
        Ok(ast::Mod::Module(module)) => TreeChecker { code }.visit_body(&module.body),
        Ok(_) => Ok(()),
        Err(err) => Err(issue_at(
            code,
            u32::from(err.offset) as usize,
            err.error.to_string(),
        )),
    }
}

/// Boolean form of [`check_syntax`]; logs the reason on failure.
pub fn is_valid_python(code: &str) -> bool {
    match check_syntax(code) {
        Ok(()) => true,
        Err(issue) => {
            debug!("Syntax validation failed: {}", issue);
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetContext {
    Assign,
    Augmented,
    Annotated,
    Delete,
}

/// Name CPython uses for an expression in "cannot assign to ..." errors.
fn describe(expr: &Expr) -> &'static str {
    match expr {
        Expr::Call(_) => "function call",
        Expr::Constant(ast::ExprConstant { value, .. }) => match value {
            ast::Constant::Bool(true) => "True",
            ast::Constant::Bool(false) => "False",
            ast::Constant::None => "None",
            ast::Constant::Ellipsis => "ellipsis",
            _ => "literal",
        },
        Expr::Tuple(_) => "tuple",
        Expr::List(_) => "list",
        Expr::Starred(_) => "starred",
        Expr::Compare(_) => "comparison",
        Expr::Lambda(_) => "lambda",
        Expr::IfExp(_) => "conditional expression",
        Expr::NamedExpr(_) => "named expression",
        Expr::Await(_) => "await expression",
        Expr::Yield(_) | Expr::YieldFrom(_) => "yield expression",
        Expr::GeneratorExp(_) => "generator expression",
        Expr::ListComp(_) => "list comprehension",
        Expr::SetComp(_) => "set comprehension",
        Expr::DictComp(_) => "dict comprehension",
        Expr::Dict(_) => "dict literal",
        Expr::Set(_) => "set display",
        Expr::JoinedStr(_) | Expr::FormattedValue(_) => "f-string expression",
        _ => "expression",
    }
}

fn target_message(target: &Expr, context: TargetContext) -> String {
    match context {
        TargetContext::Assign => format!("cannot assign to {}", describe(target)),
        TargetContext::Delete => format!("cannot delete {}", describe(target)),
        TargetContext::Augmented => format!(
            "'{}' is an illegal expression for augmented assignment",
            describe(target)
        ),
        TargetContext::Annotated => match target {
            Expr::Tuple(_) => "only single target (not tuple) can be annotated".to_string(),
            Expr::List(_) => "only single target (not list) can be annotated".to_string(),
            _ => "illegal target for annotation".to_string(),
        },
    }
}

struct TreeChecker<'a> {
    code: &'a str,
}

impl TreeChecker<'_> {
    fn issue(&self, node: &Expr, message: impl Into<String>) -> SyntaxIssue {
        issue_at(self.code, u32::from(node.range().start()) as usize, message)
    }

    /// Whether the source text of `node` starts with its own parenthesis.
    fn parenthesized(&self, node: &Expr) -> bool {
        let start = u32::from(node.range().start()) as usize;
        self.code
            .get(start..)
            .is_some_and(|rest| rest.starts_with('('))
    }

    fn visit_body(&self, body: &[Stmt]) -> SyntaxResult {
        body.iter().try_for_each(|stmt| self.visit_stmt(stmt))
    }

    fn visit_exprs(&self, exprs: &[Expr]) -> SyntaxResult {
        exprs.iter().try_for_each(|expr| self.visit_expr(expr))
    }

    fn visit_optional(&self, expr: Option<&Expr>) -> SyntaxResult {
        expr.map_or(Ok(()), |expr| self.visit_expr(expr))
    }

    fn visit_keywords(&self, keywords: &[ast::Keyword]) -> SyntaxResult {
        keywords.iter().try_for_each(|kw| self.visit_expr(&kw.value))
    }

    fn visit_stmt(&self, stmt: &Stmt) -> SyntaxResult {
        match stmt {
            Stmt::FunctionDef(ast::StmtFunctionDef {
                body,
                decorator_list,
                ..
            })
            | Stmt::AsyncFunctionDef(ast::StmtAsyncFunctionDef {
                body,
                decorator_list,
                ..
            }) => {
                self.visit_exprs(decorator_list)?;
                self.visit_body(body)
            }
            Stmt::ClassDef(ast::StmtClassDef {
                bases,
                keywords,
                body,
                decorator_list,
                ..
            }) => {
                self.visit_exprs(decorator_list)?;
                self.visit_exprs(bases)?;
                self.visit_keywords(keywords)?;
                self.visit_body(body)
            }
            Stmt::Return(ast::StmtReturn { value, .. }) => self.visit_optional(value.as_deref()),
            Stmt::Delete(ast::StmtDelete { targets, .. }) => targets
                .iter()
                .try_for_each(|target| self.check_target(target, TargetContext::Delete)),
            Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                targets
                    .iter()
                    .try_for_each(|target| self.check_target(target, TargetContext::Assign))?;
                self.visit_expr(value)
            }
            Stmt::AugAssign(ast::StmtAugAssign { target, value, .. }) => {
                self.check_target(target, TargetContext::Augmented)?;
                self.visit_expr(value)
            }
            Stmt::AnnAssign(ast::StmtAnnAssign {
                target,
                annotation,
                value,
                ..
            }) => {
                self.check_target(target, TargetContext::Annotated)?;
                self.visit_expr(annotation)?;
                self.visit_optional(value.as_deref())
            }
            Stmt::For(ast::StmtFor {
                target,
                iter,
                body,
                orelse,
                ..
            })
            | Stmt::AsyncFor(ast::StmtAsyncFor {
                target,
                iter,
                body,
                orelse,
                ..
            }) => {
                self.check_target(target, TargetContext::Assign)?;
                self.visit_expr(iter)?;
                self.visit_body(body)?;
                self.visit_body(orelse)
            }
            Stmt::While(ast::StmtWhile {
                test, body, orelse, ..
            })
            | Stmt::If(ast::StmtIf {
                test, body, orelse, ..
            }) => {
                self.visit_expr(test)?;
                self.visit_body(body)?;
                self.visit_body(orelse)
            }
            Stmt::With(ast::StmtWith { items, body, .. })
            | Stmt::AsyncWith(ast::StmtAsyncWith { items, body, .. }) => {
                for item in items {
                    self.visit_expr(&item.context_expr)?;
                    if let Some(vars) = &item.optional_vars {
                        self.check_target(vars, TargetContext::Assign)?;
                    }
                }
                self.visit_body(body)
            }
            Stmt::Match(ast::StmtMatch { subject, cases, .. }) => {
                self.visit_expr(subject)?;
                for case in cases {
                    self.visit_optional(case.guard.as_deref())?;
                    self.visit_body(&case.body)?;
                }
                Ok(())
            }
            Stmt::Raise(ast::StmtRaise { exc, cause, .. }) => {
                self.visit_optional(exc.as_deref())?;
                self.visit_optional(cause.as_deref())
            }
            Stmt::Try(ast::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            })
            | Stmt::TryStar(ast::StmtTryStar {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            }) => {
                self.visit_body(body)?;
                for handler in handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    self.visit_optional(handler.type_.as_deref())?;
                    self.visit_body(&handler.body)?;
                }
                self.visit_body(orelse)?;
                self.visit_body(finalbody)
            }
            Stmt::Assert(ast::StmtAssert { test, msg, .. }) => {
                self.visit_expr(test)?;
                self.visit_optional(msg.as_deref())
            }
            Stmt::Expr(ast::StmtExpr { value, .. }) => self.visit_expr(value),
            _ => Ok(()),
        }
    }

    fn check_target(&self, target: &Expr, context: TargetContext) -> SyntaxResult {
        match target {
            Expr::Name(_) => Ok(()),
            Expr::Attribute(ast::ExprAttribute { value, .. }) => self.visit_expr(value),
            Expr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                self.visit_expr(value)?;
                self.visit_expr(slice)
            }
            Expr::Starred(ast::ExprStarred { value, .. }) if context == TargetContext::Assign => {
                self.check_target(value, context)
            }
            Expr::Tuple(ast::ExprTuple { elts, .. }) | Expr::List(ast::ExprList { elts, .. })
                if matches!(context, TargetContext::Assign | TargetContext::Delete) =>
            {
                elts.iter()
                    .try_for_each(|elt| self.check_target(elt, context))
            }
            other => Err(self.issue(other, target_message(other, context))),
        }
    }

    fn visit_comprehensions(&self, generators: &[ast::Comprehension]) -> SyntaxResult {
        for generator in generators {
            self.check_target(&generator.target, TargetContext::Assign)?;
            self.visit_expr(&generator.iter)?;
            self.visit_exprs(&generator.ifs)?;
        }
        Ok(())
    }

    fn visit_expr(&self, expr: &Expr) -> SyntaxResult {
        match expr {
            Expr::Call(ast::ExprCall {
                func,
                args,
                keywords,
                ..
            }) => {
                if args.len() + keywords.len() > 1 {
                    let bare = args.iter().find(|arg| {
                        matches!(arg, Expr::GeneratorExp(_)) && !self.parenthesized(arg)
                    });
                    if let Some(genexp) = bare {
                        return Err(
                            self.issue(genexp, "Generator expression must be parenthesized")
                        );
                    }
                }
                self.visit_expr(func)?;
                self.visit_exprs(args)?;
                self.visit_keywords(keywords)
            }
            Expr::NamedExpr(ast::ExprNamedExpr { target, value, .. }) => {
                if !matches!(**target, Expr::Name(_)) {
                    return Err(self.issue(
                        target,
                        format!(
                            "cannot use assignment expressions with {}",
                            describe(target)
                        ),
                    ));
                }
                self.visit_expr(value)
            }
            Expr::BoolOp(ast::ExprBoolOp { values, .. })
            | Expr::JoinedStr(ast::ExprJoinedStr { values, .. }) => self.visit_exprs(values),
            Expr::BinOp(ast::ExprBinOp { left, right, .. }) => {
                self.visit_expr(left)?;
                self.visit_expr(right)
            }
            Expr::Compare(ast::ExprCompare {
                left, comparators, ..
            }) => {
                self.visit_expr(left)?;
                self.visit_exprs(comparators)
            }
            Expr::UnaryOp(ast::ExprUnaryOp { operand, .. }) => self.visit_expr(operand),
            Expr::Lambda(ast::ExprLambda { body, .. }) => self.visit_expr(body),
            Expr::IfExp(ast::ExprIfExp {
                test, body, orelse, ..
            }) => {
                self.visit_expr(test)?;
                self.visit_expr(body)?;
                self.visit_expr(orelse)
            }
            Expr::Dict(ast::ExprDict { keys, values, .. }) => {
                keys.iter()
                    .flatten()
                    .try_for_each(|key| self.visit_expr(key))?;
                self.visit_exprs(values)
            }
            Expr::Set(ast::ExprSet { elts, .. })
            | Expr::List(ast::ExprList { elts, .. })
            | Expr::Tuple(ast::ExprTuple { elts, .. }) => self.visit_exprs(elts),
            Expr::ListComp(ast::ExprListComp {
                elt, generators, ..
            })
            | Expr::SetComp(ast::ExprSetComp {
                elt, generators, ..
            })
            | Expr::GeneratorExp(ast::ExprGeneratorExp {
                elt, generators, ..
            }) => {
                self.visit_comprehensions(generators)?;
                self.visit_expr(elt)
            }
            Expr::DictComp(ast::ExprDictComp {
                key,
                value,
                generators,
                ..
            }) => {
                self.visit_comprehensions(generators)?;
                self.visit_expr(key)?;
                self.visit_expr(value)
            }
            Expr::Await(ast::ExprAwait { value, .. })
            | Expr::YieldFrom(ast::ExprYieldFrom { value, .. })
            | Expr::Attribute(ast::ExprAttribute { value, .. })
            | Expr::Starred(ast::ExprStarred { value, .. })
            | Expr::FormattedValue(ast::ExprFormattedValue { value, .. }) => {
                self.visit_expr(value)
            }
            Expr::Yield(ast::ExprYield { value, .. }) => self.visit_optional(value.as_deref()),
            Expr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                self.visit_expr(value)?;
                self.visit_expr(slice)
            }
            Expr::Slice(ast::ExprSlice {
                lower, upper, step, ..
            }) => {
                self.visit_optional(lower.as_deref())?;
                self.visit_optional(upper.as_deref())?;
                self.visit_optional(step.as_deref())
            }
            _ => Ok(()),
        }
    }
}
