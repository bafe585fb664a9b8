//! Splits template text into literal runs and `{{ }}` tags, and tokenizes the
//! argument list inside each tag.

use winnow::ascii::multispace0;
use winnow::combinator::{alt, cut_err, delimited, opt, terminated};
use winnow::token::{take_till, take_while};
use winnow::{ModalResult, Parser};

use crate::error::{Error, Result};
use crate::span::Span;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Term {
    Literal(Value),
    Path(String),
    Sub(Vec<Param>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Param {
    Positional(Term),
    Hash(String, Term),
    BlockParams(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TagKind {
    Mustache { escaped: bool },
    Open { inverted: bool },
    Else,
    Close(String),
    Partial,
    Comment,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tag {
    pub kind: TagKind,
    pub params: Vec<Param>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Text(String),
    Tag(Tag),
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    // one line break directly after a block tag belongs to the tag
    let mut eat_newline = false;

    while pos < source.len() {
        let Some(found) = source[pos..].find("{{") else {
            push_text(&mut tokens, &source[pos..], eat_newline);
            break;
        };
        let start = pos + found;
        if start > pos {
            push_text(&mut tokens, &source[pos..start], eat_newline);
            eat_newline = false;
        }
        let (tag, end) = scan_tag(source, start)?;
        match tag.kind {
            TagKind::Comment => {}
            TagKind::Open { .. } | TagKind::Else | TagKind::Close(_) => {
                eat_newline = true;
                tokens.push(Token::Tag(tag));
            }
            _ => {
                eat_newline = false;
                tokens.push(Token::Tag(tag));
            }
        }
        pos = end;
    }
    Ok(tokens)
}

fn push_text(tokens: &mut Vec<Token>, text: &str, eat_newline: bool) {
    let text = if eat_newline {
        text.strip_prefix("\r\n")
            .or_else(|| text.strip_prefix('\n'))
            .unwrap_or(text)
    } else {
        text
    };
    if !text.is_empty() {
        tokens.push(Token::Text(text.to_string()));
    }
}

/// Byte offset of the `}}` closing a tag, skipping quoted strings.
fn find_tag_end(rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'}' && bytes.get(i + 1) == Some(&b'}') => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

fn scan_tag(source: &str, start: usize) -> Result<(Tag, usize)> {
    let after = start + 2;
    let rest = &source[after..];
    let unclosed = |what: &str| {
        Error::syntax(
            format!("Unclosed {} tag", what),
            source,
            Span::new(start, source.len()),
        )
    };
    let trimmed_rest = rest.strip_prefix('~').unwrap_or(rest);

    if let Some(raw) = rest.strip_prefix('{') {
        let close = raw.find("}}}").ok_or_else(|| unclosed("{{{"))?;
        let end = after + 1 + close + 3;
        let inner = trim_markers(&raw[..close]);
        let params = tag_params(source, start, end, inner)?;
        return Ok((
            Tag {
                kind: TagKind::Mustache { escaped: false },
                params,
                span: Span::new(start, end),
            },
            end,
        ));
    }
    if trimmed_rest.starts_with("!--") {
        let close = rest.find("--}}").or_else(|| rest.find("--~}}"));
        let close = close.ok_or_else(|| unclosed("comment"))?;
        let tail = if rest[close..].starts_with("--~}}") { 5 } else { 4 };
        let end = after + close + tail;
        return Ok((comment(start, end), end));
    }

    let close = find_tag_end(rest).ok_or_else(|| unclosed("{{"))?;
    let end = after + close + 2;
    let inner = trim_markers(&rest[..close]);
    let span = Span::new(start, end);
    let tag = |kind, params| Ok((Tag { kind, params, span }, end));

    if inner.starts_with('!') {
        return Ok((comment(start, end), end));
    }
    if let Some(body) = inner.strip_prefix('#') {
        return tag(
            TagKind::Open { inverted: false },
            tag_params(source, start, end, body)?,
        );
    }
    if let Some(body) = inner.strip_prefix('^') {
        if body.trim().is_empty() {
            return tag(TagKind::Else, Vec::new());
        }
        return tag(
            TagKind::Open { inverted: true },
            tag_params(source, start, end, body)?,
        );
    }
    if let Some(body) = inner.strip_prefix('/') {
        return tag(TagKind::Close(body.trim().to_string()), Vec::new());
    }
    if let Some(body) = inner.strip_prefix('>') {
        return tag(TagKind::Partial, tag_params(source, start, end, body)?);
    }
    if let Some(body) = inner.strip_prefix('&') {
        return tag(
            TagKind::Mustache { escaped: false },
            tag_params(source, start, end, body)?,
        );
    }
    if let Some(body) = inner.strip_prefix("else") {
        if body.is_empty() || body.starts_with(char::is_whitespace) {
            return tag(TagKind::Else, tag_params(source, start, end, body)?);
        }
    }
    tag(
        TagKind::Mustache { escaped: true },
        tag_params(source, start, end, inner)?,
    )
}

fn comment(start: usize, end: usize) -> Tag {
    Tag {
        kind: TagKind::Comment,
        params: Vec::new(),
        span: Span::new(start, end),
    }
}

fn trim_markers(inner: &str) -> &str {
    let inner = inner.strip_prefix('~').unwrap_or(inner);
    let inner = inner.strip_suffix('~').unwrap_or(inner);
    inner.trim()
}

fn tag_params(source: &str, start: usize, end: usize, body: &str) -> Result<Vec<Param>> {
    parse_params(body).map_err(|_| {
        Error::syntax(
            format!("Invalid tag contents `{}`", body.trim()),
            source,
            Span::new(start, end),
        )
    })
}

/// Parses a complete argument list; the error carries the offset reached.
pub(crate) fn parse_params(src: &str) -> std::result::Result<Vec<Param>, usize> {
    let mut input = src;
    match params.parse_next(&mut input) {
        Ok(parsed) if input.trim().is_empty() => Ok(parsed),
        _ => Err(src.len() - input.len()),
    }
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '=' | '(' | ')' | '|' | '"' | '\'' | '~' | '{' | '}')
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '$')
}

fn word<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    take_while(1.., is_word_char).parse_next(input)
}

fn quoted<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    alt((
        delimited('"', take_till(0.., '"'), '"'),
        delimited('\'', take_till(0.., '\''), '\''),
    ))
    .parse_next(input)
}

fn sub_expr(input: &mut &str) -> ModalResult<Term> {
    delimited(('(', multispace0), params, (multispace0, ')'))
        .map(Term::Sub)
        .parse_next(input)
}

fn term(input: &mut &str) -> ModalResult<Term> {
    alt((
        sub_expr,
        quoted.map(|s| Term::Literal(Value::from(s))),
        word.map(classify_word),
    ))
    .parse_next(input)
}

fn block_params(input: &mut &str) -> ModalResult<Vec<String>> {
    ("as", multispace0, '|').void().parse_next(input)?;
    let mut names = Vec::new();
    loop {
        multispace0.parse_next(input)?;
        if opt('|').parse_next(input)?.is_some() {
            return Ok(names);
        }
        let name = cut_err(take_while(1.., is_ident_char)).parse_next(input)?;
        names.push(name.to_string());
    }
}

fn params(input: &mut &str) -> ModalResult<Vec<Param>> {
    let mut out = Vec::new();
    loop {
        multispace0.parse_next(input)?;
        if input.is_empty() || input.starts_with(')') {
            return Ok(out);
        }
        let checkpoint = *input;
        if let Ok(names) = block_params(input) {
            out.push(Param::BlockParams(names));
            continue;
        }
        *input = checkpoint;
        if let Ok(key) = terminated(word, '=').parse_next(input) {
            multispace0.parse_next(input)?;
            let value = cut_err(term).parse_next(input)?;
            out.push(Param::Hash(key.to_string(), value));
            continue;
        }
        *input = checkpoint;
        let value = cut_err(term).parse_next(input)?;
        out.push(Param::Positional(value));
    }
}

fn looks_numeric(word: &str) -> bool {
    let digits = word.strip_prefix('-').unwrap_or(word);
    digits.starts_with(|c: char| c.is_ascii_digit())
}

fn classify_word(word: &str) -> Term {
    match word {
        "true" => Term::Literal(Value::Bool(true)),
        "false" => Term::Literal(Value::Bool(false)),
        "null" | "undefined" => Term::Literal(Value::Null),
        _ if looks_numeric(word) => {
            if let Ok(i) = word.parse::<i64>() {
                Term::Literal(Value::Int(i))
            } else if let Ok(f) = word.parse::<f64>() {
                Term::Literal(Value::Float(f))
            } else {
                Term::Path(word.to_string())
            }
        }
        _ => Term::Path(word.to_string()),
    }
}
