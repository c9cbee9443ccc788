//! Recursive-descent parser turning a token stream into an [`Expr`] tree.
//!
//! Within a single nesting level, every boolean operator must be the same
//! kind; a level that mixes `&&` and `||` without parenthesizing the mixed
//! part is a parse error. Parentheses open a fresh level, so
//! `(A && B) || (C && D)` is legal even though `&&` and `||` both appear in
//! the source text.

use simloom_core::{Error, Result};

use crate::lexer::{tokenize, Comparator, Token};

#[derive(Clone, Debug)]
pub enum Expr {
    Leaf(LeafSpec),
    All(Vec<Expr>),
    Any(Vec<Expr>),
}

#[derive(Clone, Debug)]
pub enum LeafSpec {
    Notification { name: String, op: Comparator, value: f64 },
    Tag { tag: String, event: TagEvent },
    Stat { path: String, op: Comparator, value: f64 },
    Counter { path: String, value: f64 },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TagEvent {
    Start,
    Stop,
    Internal,
}

pub fn parse(expr: &str) -> Result<Expr> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(Error::Parse("expression is empty".into()));
    }
    parse_level(&tokens)
}

fn parse_level(tokens: &[Token]) -> Result<Expr> {
    if let Some(inner) = as_single_paren_group(tokens) {
        return parse_level(inner);
    }

    let or_positions = top_level_positions(tokens, &Token::Or);
    let and_positions = top_level_positions(tokens, &Token::And);

    if !or_positions.is_empty() && !and_positions.is_empty() {
        return Err(Error::Parse(
            "mixing && and || at the same nesting level requires parentheses".into(),
        ));
    }

    if !or_positions.is_empty() {
        let parts = split_at(tokens, &or_positions);
        let children: Result<Vec<Expr>> = parts.into_iter().map(parse_atom).collect();
        return Ok(Expr::Any(children?));
    }

    if !and_positions.is_empty() {
        let parts = split_at(tokens, &and_positions);
        let children: Result<Vec<Expr>> = parts.into_iter().map(parse_atom).collect();
        return Ok(Expr::All(children?));
    }

    parse_leaf(tokens)
}

/// An operand between two same-level operators: either a leaf, or a fully
/// parenthesized sub-expression that opens a fresh level.
fn parse_atom(tokens: &[Token]) -> Result<Expr> {
    if let Some(inner) = as_single_paren_group(tokens) {
        return parse_level(inner);
    }
    parse_leaf(tokens)
}

/// If `tokens` is exactly one parenthesized group spanning its full extent,
/// return the tokens inside the parens.
fn as_single_paren_group(tokens: &[Token]) -> Option<&[Token]> {
    if tokens.first() != Some(&Token::LParen) || tokens.last() != Some(&Token::RParen) {
        return None;
    }

    let mut depth = 0i32;
    for (i, tok) in tokens.iter().enumerate() {
        match tok {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 && i != tokens.len() - 1 {
                    // Closes before the end: the outer parens don't span
                    // the whole slice.
                    return None;
                }
            }
            _ => {}
        }
    }

    Some(&tokens[1..tokens.len() - 1])
}

fn top_level_positions(tokens: &[Token], target: &Token) -> Vec<usize> {
    let mut depth = 0i32;
    let mut positions = Vec::new();
    for (i, tok) in tokens.iter().enumerate() {
        match tok {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            t if depth == 0 && t == target => positions.push(i),
            _ => {}
        }
    }
    positions
}

fn split_at<'a>(tokens: &'a [Token], positions: &[usize]) -> Vec<&'a [Token]> {
    let mut parts = Vec::with_capacity(positions.len() + 1);
    let mut start = 0;
    for &pos in positions {
        parts.push(&tokens[start..pos]);
        start = pos + 1;
    }
    parts.push(&tokens[start..]);
    parts
}

fn parse_leaf(tokens: &[Token]) -> Result<Expr> {
    if tokens.is_empty() {
        return Err(Error::Parse("empty operand in expression".into()));
    }

    // notif.NAME OP VALUE
    if let [Token::Path(path), Token::Op(op), Token::Number(value)] = tokens {
        if let Some(name) = path.strip_prefix("notif.") {
            return Ok(Expr::Leaf(LeafSpec::Notification {
                name: name.to_string(),
                op: *op,
                value: *value,
            }));
        }
        if let Some(rest) = path.strip_prefix("stat_def.") {
            return Ok(Expr::Leaf(LeafSpec::Stat {
                path: rest.to_string(),
                op: *op,
                value: *value,
            }));
        }
        if *op == Comparator::Ge {
            return Ok(Expr::Leaf(LeafSpec::Counter { path: path.clone(), value: *value }));
        }
        return Err(Error::Parse(format!(
            "counter leaf '{path}' only supports the '>=' comparator"
        )));
    }

    // TAG.(start|stop|internal)
    if let [Token::Path(path)] = tokens {
        if let Some((tag, event)) = path.rsplit_once('.') {
            let event = match event {
                "start" => Some(TagEvent::Start),
                "stop" => Some(TagEvent::Stop),
                "internal" => Some(TagEvent::Internal),
                _ => None,
            };
            if let Some(event) = event {
                return Ok(Expr::Leaf(LeafSpec::Tag { tag: tag.to_string(), event }));
            }
        }
        return Err(Error::Parse(format!("unrecognized leaf '{path}'")));
    }

    Err(Error::Parse(format!("malformed leaf expression: {tokens:?}")))
}
