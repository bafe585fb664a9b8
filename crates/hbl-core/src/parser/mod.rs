//! Reference parser: preprocessed template text to [`Expr`].
//!
//! The output shapes are the contract the engine's operations rely on:
//!
//! * a body is `cat(parts...)`, or the single part, or `""`;
//! * `{{expr}}` is `escape(expr)` unless escaping is disabled;
//! * `{{#if a}}..{{else if b}}..{{else}}..{{/if}}` is `if(a, t, b, t2, e)`;
//! * other blocks are `name(positional.., hash.., body, else?)`, with block
//!   parameters carried as the hash argument `as`;
//! * `{{>name ctx k=v}}` is `partial("name", ""=ctx, k=v)`;
//! * up-scope paths and block parameters are `rvar("../path")`.

mod lexer;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ir::{Expr, Path};
use crate::span::Span;
use crate::value::Value;

use lexer::{Param, TagKind, Term, Token};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// `{{expr}}` renders raw, like `{{{expr}}}`.
    pub no_escape: bool,
    /// Every bare path resolves through the scope chain, not just the context.
    pub recurse: bool,
}

impl CompileOptions {
    pub fn no_escape() -> Self {
        Self {
            no_escape: true,
            ..Self::default()
        }
    }

    pub fn recurse() -> Self {
        Self {
            recurse: true,
            ..Self::default()
        }
    }
}

pub fn parse(
    source: &str,
    options: &CompileOptions,
    is_operation: &dyn Fn(&str) -> bool,
) -> Result<Expr> {
    let tokens = lexer::tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens: tokens.into_iter(),
        options,
        is_operation,
        block_params: Vec::new(),
    };
    let (body, end) = parser.parse_body()?;
    match end {
        Terminator::Eof => Ok(body),
        Terminator::Else(_, span) => Err(parser.error("Unexpected {{else}} outside of a block", span)),
        Terminator::Close(name, span) => Err(parser.error(
            format!("Unexpected closing tag {{{{/{}}}}}", name),
            span,
        )),
    }
}

enum Terminator {
    Eof,
    Else(Vec<Param>, Span),
    Close(String, Span),
}

struct Parser<'a> {
    source: &'a str,
    tokens: std::vec::IntoIter<Token>,
    options: &'a CompileOptions,
    is_operation: &'a dyn Fn(&str) -> bool,
    block_params: Vec<Vec<String>>,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>, span: Span) -> Error {
        Error::syntax(message, self.source, span)
    }

    fn parse_body(&mut self) -> Result<(Expr, Terminator)> {
        let mut parts = Vec::new();
        while let Some(token) = self.tokens.next() {
            let tag = match token {
                Token::Text(text) => {
                    parts.push(Expr::Literal(Value::from(text)));
                    continue;
                }
                Token::Tag(tag) => tag,
            };
            match tag.kind {
                TagKind::Comment => {}
                TagKind::Mustache { escaped } => {
                    parts.push(self.lower_mustache(tag.params, escaped, tag.span)?)
                }
                TagKind::Partial => parts.push(self.lower_partial(tag.params, tag.span)?),
                TagKind::Open { inverted } => {
                    parts.push(self.parse_block(tag.params, inverted, tag.span, None)?)
                }
                TagKind::Else => return Ok((concat(parts), Terminator::Else(tag.params, tag.span))),
                TagKind::Close(name) => return Ok((concat(parts), Terminator::Close(name, tag.span))),
            }
        }
        Ok((concat(parts), Terminator::Eof))
    }

    /// Parses a block whose open tag has been consumed. `closer` is the name
    /// the closing tag must carry when it differs from the block's own name
    /// (chained `{{else name ...}}` blocks share their parent's closer).
    fn parse_block(
        &mut self,
        params: Vec<Param>,
        inverted: bool,
        span: Span,
        closer: Option<String>,
    ) -> Result<Expr> {
        let mut params = params.into_iter();
        let head = match params.next() {
            Some(Param::Positional(Term::Path(name))) => name,
            _ => return Err(self.error("Block tag needs a name", span)),
        };
        let rest: Vec<Param> = params.collect();
        let closer = closer.unwrap_or_else(|| head.clone());

        let declared = rest
            .iter()
            .find_map(|param| match param {
                Param::BlockParams(names) => Some(names.clone()),
                _ => None,
            })
            .unwrap_or_default();
        self.block_params.push(declared);
        let parsed = self.parse_body();
        self.block_params.pop();
        let (body, end) = parsed?;

        if inverted {
            let selector = self.lower_path(&head);
            let mut args = vec![selector, body];
            args.extend(self.finish_block(&closer, span, end)?);
            return Ok(Expr::op("unless", args));
        }

        match head.as_str() {
            "if" | "unless" => {
                let mut args = Vec::with_capacity(3);
                match rest.into_iter().next() {
                    Some(Param::Positional(term)) => args.push(self.lower_term(term)),
                    _ => return Err(self.error(format!("{{{{#{}}}}} needs a condition", head), span)),
                }
                args.push(body);
                match self.finish_block(&closer, span, end)? {
                    Some(Expr::Op(call)) if head == "if" && call.name == "if" => {
                        args.extend(call.args)
                    }
                    Some(other) => args.push(other),
                    None => {}
                }
                Ok(Expr::op(head.clone(), args))
            }
            "with" | "inline" => {
                if self.finish_block(&closer, span, end)?.is_some() {
                    return Err(self.error(
                        format!("{{{{#{}}}}} does not accept an else block", head),
                        span,
                    ));
                }
                let mut args = self.lower_args(rest);
                args.push(body);
                Ok(Expr::op(head.clone(), args))
            }
            _ if rest.is_empty() && !(self.is_operation)(&head) => {
                let selector = self.lower_path(&head);
                let mut args = vec![selector, body];
                args.extend(self.finish_block(&closer, span, end)?);
                Ok(Expr::op("section", args))
            }
            _ => {
                let mut args = self.lower_args(rest);
                args.push(body);
                args.extend(self.finish_block(&closer, span, end)?);
                Ok(Expr::op(head.clone(), args))
            }
        }
    }

    /// Consumes the rest of a block after its main body and returns the else
    /// branch, if any.
    fn finish_block(&mut self, closer: &str, open: Span, end: Terminator) -> Result<Option<Expr>> {
        match end {
            Terminator::Eof => Err(self.error(format!("Unclosed block {{{{#{}}}}}", closer), open)),
            Terminator::Close(name, span) => {
                self.check_closer(closer, &name, span)?;
                Ok(None)
            }
            Terminator::Else(params, _) if params.is_empty() => {
                let (else_body, end) = self.parse_body()?;
                match end {
                    Terminator::Eof => {
                        Err(self.error(format!("Unclosed block {{{{#{}}}}}", closer), open))
                    }
                    Terminator::Else(_, span) => {
                        Err(self.error("Unexpected {{else}} after the else branch", span))
                    }
                    Terminator::Close(name, span) => {
                        self.check_closer(closer, &name, span)?;
                        Ok(Some(else_body))
                    }
                }
            }
            Terminator::Else(params, span) => self
                .parse_block(params, false, span, Some(closer.to_string()))
                .map(Some),
        }
    }

    fn check_closer(&self, expected: &str, found: &str, span: Span) -> Result<()> {
        if expected == found {
            Ok(())
        } else {
            Err(self.error(
                format!("Expected {{{{/{}}}}} but found {{{{/{}}}}}", expected, found),
                span,
            ))
        }
    }

    fn lower_mustache(&mut self, params: Vec<Param>, escaped: bool, span: Span) -> Result<Expr> {
        if let [Param::Positional(Term::Path(name))] = params.as_slice() {
            if name == "NEWLINE" {
                return Ok(Expr::lit("\n"));
            }
        }
        let value = self.lower_call(params, span)?;
        if escaped && !self.options.no_escape {
            Ok(Expr::op("escape", vec![value]))
        } else {
            Ok(value)
        }
    }

    /// `head` alone is a value; `head args..` is a helper call.
    fn lower_call(&mut self, params: Vec<Param>, span: Span) -> Result<Expr> {
        let mut params = params.into_iter();
        let head = params.next();
        let rest: Vec<Param> = params.collect();
        match head {
            Some(Param::Positional(term)) if rest.is_empty() => Ok(self.lower_term(term)),
            Some(Param::Positional(Term::Path(name))) => Ok(Expr::op(name, self.lower_args(rest))),
            None => Err(self.error("Empty tag", span)),
            Some(_) => Err(self.error("Expected a helper name", span)),
        }
    }

    fn lower_partial(&mut self, params: Vec<Param>, span: Span) -> Result<Expr> {
        let mut params = params.into_iter();
        let name = match params.next() {
            Some(Param::Positional(Term::Path(name))) => Expr::lit(name),
            Some(Param::Positional(Term::Literal(value))) => Expr::Literal(value),
            Some(Param::Positional(Term::Sub(sub))) => self.lower_sub(sub),
            _ => return Err(self.error("Partial tag needs a template name", span)),
        };
        let mut args = vec![name];
        let mut has_context = false;
        for param in params {
            match param {
                Param::Positional(term) if !has_context => {
                    has_context = true;
                    let context = self.lower_term(term);
                    args.push(Expr::hash("", context));
                }
                Param::Hash(key, term) => {
                    let value = self.lower_term(term);
                    args.push(Expr::hash(key, value));
                }
                _ => {
                    return Err(self.error("Partials take one context and named arguments", span))
                }
            }
        }
        Ok(Expr::op("partial", args))
    }

    fn lower_args(&mut self, params: Vec<Param>) -> Vec<Expr> {
        params
            .into_iter()
            .map(|param| match param {
                Param::Positional(term) => self.lower_term(term),
                Param::Hash(key, term) => {
                    let value = self.lower_term(term);
                    Expr::hash(key, value)
                }
                Param::BlockParams(names) => Expr::hash(
                    "as",
                    Expr::Literal(Value::array(names.into_iter().map(Value::from))),
                ),
            })
            .collect()
    }

    fn lower_term(&mut self, term: Term) -> Expr {
        match term {
            Term::Literal(value) => Expr::Literal(value),
            Term::Path(raw) => self.lower_path(&raw),
            Term::Sub(params) => self.lower_sub(params),
        }
    }

    fn lower_sub(&mut self, params: Vec<Param>) -> Expr {
        let mut params = params.into_iter();
        match params.next() {
            Some(Param::Positional(Term::Path(name))) => {
                let rest: Vec<Param> = params.collect();
                Expr::op(name, self.lower_args(rest))
            }
            Some(Param::Positional(term)) => self.lower_term(term),
            _ => Expr::Literal(Value::Null),
        }
    }

    fn is_block_param(&self, name: &str) -> bool {
        self.block_params
            .iter()
            .any(|scope| scope.iter().any(|param| param == name))
    }

    fn lower_path(&self, raw: &str) -> Expr {
        if raw == "this" || raw == "." {
            return Expr::Var(Path::this());
        }
        if raw.starts_with('@') {
            return Expr::op(raw, Vec::new());
        }
        if let Some(rest) = raw.strip_prefix("this.").or_else(|| raw.strip_prefix("this/")) {
            return Expr::Var(Path::parse(rest));
        }
        let up = raw.starts_with("../") || raw.starts_with("./");
        let first = raw.split(['.', '/']).next().unwrap_or(raw);
        let block_param = self.is_block_param(first);
        let base = if up || block_param || self.options.recurse {
            Expr::op("rvar", vec![Expr::lit(raw)])
        } else {
            Expr::Var(Path::parse(raw))
        };
        let single = !raw.contains(['.', '/']);
        if single && !block_param && (self.is_operation)(raw) {
            Expr::op("default", vec![base, Expr::op(raw, Vec::new())])
        } else {
            base
        }
    }
}

/// Joins body parts, merging adjacent text runs.
fn concat(parts: Vec<Expr>) -> Expr {
    let mut merged: Vec<Expr> = Vec::with_capacity(parts.len());
    for part in parts {
        if let (Some(Expr::Literal(Value::String(prev))), Expr::Literal(Value::String(next))) =
            (merged.last_mut(), &part)
        {
            let mut joined = prev.to_string();
            joined.push_str(next);
            *prev = joined.into();
            continue;
        }
        merged.push(part);
    }
    match merged.len() {
        0 => Expr::lit(""),
        1 => merged.pop().unwrap_or_else(|| Expr::lit("")),
        _ => Expr::op("cat", merged),
    }
}
