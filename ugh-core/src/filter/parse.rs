//! Shell filter expressions
//!
//! Parses the text typed at the shell prompt into a [`Filter`]:
//!
//! ```text
//! state:now and (project:work or @phone) and not due
//! +home "buy milk" || #42
//! ```
//!
//! `not` binds tighter than `and`, which binds tighter than `or`. Adjacent
//! terms without an operator are ANDed.

use crate::error::FilterError;

use super::ast::{BinaryOp, Filter, PredicateKind};

/// Longest expression accepted, in tokens. Bounds the depth of the tree
/// that adjacent terms fold into.
const MAX_TOKENS: usize = 1024;

/// Deepest `(` / `not` nesting accepted.
const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    /// A term; `quoted` terms are never treated as keywords or shorthands
    Word { text: String, quoted: bool },
}

/// Parse an expression. Blank input yields `None` ("no filter").
pub fn parse(input: &str) -> Result<Option<Filter>, FilterError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(None);
    }
    if tokens.len() > MAX_TOKENS {
        return Err(FilterError::Parse(format!(
            "expression too long ({} terms, at most {})",
            tokens.len(),
            MAX_TOKENS
        )));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let filter = parser.parse_or()?;
    if let Some(tok) = parser.peek() {
        return Err(FilterError::Parse(format!("unexpected {}", describe(tok))));
    }
    Ok(Some(filter))
}

fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '&' | '|' => {
                chars.next();
                if chars.next_if_eq(&c).is_none() {
                    return Err(FilterError::Parse(format!("expected '{c}{c}'")));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            '"' => {
                chars.next();
                tokens.push(Token::Word {
                    text: read_quoted(&mut chars)?,
                    quoted: true,
                });
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')') {
                        break;
                    }
                    if c == '"' {
                        // key:"quoted value"
                        chars.next();
                        word.push_str(&read_quoted(&mut chars)?);
                        continue;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Word {
                        text: word,
                        quoted: false,
                    },
                });
            }
        }
    }
    Ok(tokens)
}

fn read_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<String, FilterError> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('"') => return Ok(out),
            Some('\\') => match chars.next() {
                Some(escaped) => out.push(escaped),
                None => break,
            },
            Some(c) => out.push(c),
            None => break,
        }
    }
    Err(FilterError::Parse("unterminated quote".to_string()))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn parse_or(&mut self) -> Result<Filter, FilterError> {
        let mut terms = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.next();
            terms.push(self.parse_and()?);
        }
        fold(BinaryOp::Or, terms)
    }

    fn parse_and(&mut self) -> Result<Filter, FilterError> {
        let mut terms = vec![self.parse_unary()?];
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.next();
                    terms.push(self.parse_unary()?);
                }
                Some(Token::Not) | Some(Token::LParen) | Some(Token::Word { .. }) => {
                    terms.push(self.parse_unary()?);
                }
                _ => break,
            }
        }
        fold(BinaryOp::And, terms)
    }

    fn parse_unary(&mut self) -> Result<Filter, FilterError> {
        match self.next() {
            Some(Token::Not) => Ok(Filter::not(self.nested(Self::parse_unary)?)),
            Some(Token::LParen) => {
                let inner = self.nested(Self::parse_or)?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(FilterError::Parse("missing ')'".to_string())),
                }
            }
            Some(Token::Word { text, quoted }) => term(&text, quoted),
            Some(tok) => Err(FilterError::Parse(format!("unexpected {}", describe(&tok)))),
            None => Err(FilterError::Parse("unexpected end of expression".to_string())),
        }
    }

    fn nested(
        &mut self,
        rule: fn(&mut Self) -> Result<Filter, FilterError>,
    ) -> Result<Filter, FilterError> {
        if self.depth >= MAX_NESTING {
            return Err(FilterError::Parse(format!(
                "expression nested too deeply (at most {} levels)",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        let result = rule(self);
        self.depth -= 1;
        result
    }
}

fn fold(op: BinaryOp, terms: Vec<Filter>) -> Result<Filter, FilterError> {
    Filter::fold(op, terms).ok_or_else(|| FilterError::Parse("empty expression".to_string()))
}

fn term(word: &str, quoted: bool) -> Result<Filter, FilterError> {
    if quoted {
        return Ok(Filter::predicate(PredicateKind::Text, word));
    }

    if let Some((key, value)) = word.split_once(':') {
        if !key.is_empty() {
            let kind: PredicateKind = key.parse()?;
            return Ok(Filter::predicate(kind, value));
        }
    }

    let mut chars = word.chars();
    match (chars.next(), chars.as_str()) {
        (Some('+'), rest) if !rest.is_empty() => {
            return Ok(Filter::predicate(PredicateKind::Project, rest));
        }
        (Some('@'), rest) if !rest.is_empty() => {
            return Ok(Filter::predicate(PredicateKind::Context, rest));
        }
        (Some('#'), rest) if !rest.is_empty() => {
            return Ok(Filter::predicate(PredicateKind::Id, rest));
        }
        _ => {}
    }

    match word.to_ascii_lowercase().as_str() {
        "due" => Ok(Filter::predicate(PredicateKind::Due, "")),
        "recent" => Ok(Filter::predicate(PredicateKind::Recent, "")),
        _ => Ok(Filter::predicate(PredicateKind::Text, word)),
    }
}

fn describe(tok: &Token) -> String {
    match tok {
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::And => "'and'".to_string(),
        Token::Or => "'or'".to_string(),
        Token::Not => "'not'".to_string(),
        Token::Word { text, .. } => format!("{:?}", text),
    }
}
