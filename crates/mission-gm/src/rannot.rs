//! Parser for the textual runtime-annotation algebra.
//!
//! A goal's text may carry a bracketed annotation describing how its
//! children compose, e.g. `"G1: Patrol [G2;G3]"` or
//! `"G4: Recover [FALLBACK(G5,G6)]"`. The grammar is a small algebra over
//! `;`, `#`, `FALLBACK`, `OPT`, and child ids; `;` binds weakest.

use mission_model::{PlanError, Result};

use crate::annot::{AnnotKind, RuntimeAnnot};
use crate::{OP_FALLBACK, OP_OPT, OP_PAR, OP_SEQ};

/// Extract and parse the bracketed runtime annotation of a node text.
/// Returns `None` when the text carries no annotation.
pub fn parse_node_annotation(text: &str, node: &str) -> Result<Option<RuntimeAnnot>> {
    let Some(open) = text.find('[') else {
        return Ok(None);
    };
    let Some(close) = text.rfind(']') else {
        return Err(PlanError::InvalidExpression {
            node: node.to_string(),
            detail: format!("unterminated runtime annotation in [{text}]"),
        });
    };
    let body = text[open + 1..close].trim();
    if body.is_empty() {
        return Ok(None);
    }
    let mut parser = Parser::new(body, node);
    let annot = parser.parse_sequence()?;
    parser.expect_end()?;
    Ok(Some(annot))
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    node: &'a str,
    source: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Seq,
    Par,
    Comma,
    Open,
    Close,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, node: &'a str) -> Self {
        let mut tokens = Vec::new();
        let mut chars = source.char_indices().peekable();
        while let Some(&(start, c)) = chars.peek() {
            match c {
                ';' => {
                    tokens.push(Token::Seq);
                    chars.next();
                }
                '#' => {
                    tokens.push(Token::Par);
                    chars.next();
                }
                ',' => {
                    tokens.push(Token::Comma);
                    chars.next();
                }
                '(' => {
                    tokens.push(Token::Open);
                    chars.next();
                }
                ')' => {
                    tokens.push(Token::Close);
                    chars.next();
                }
                c if c.is_whitespace() => {
                    chars.next();
                }
                _ => {
                    let mut end = start;
                    while let Some(&(i, c)) = chars.peek() {
                        if c.is_alphanumeric() || c == '_' {
                            end = i + c.len_utf8();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if end == start {
                        // Skip a character we cannot tokenize; the parser
                        // reports it as an unexpected token.
                        tokens.push(Token::Ident(c.to_string()));
                        chars.next();
                    } else {
                        tokens.push(Token::Ident(source[start..end].to_string()));
                    }
                }
            }
        }
        Self {
            tokens,
            pos: 0,
            node,
            source,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, detail: String) -> PlanError {
        PlanError::InvalidExpression {
            node: self.node.to_string(),
            detail: format!("{detail} in annotation [{}]", self.source),
        }
    }

    fn expect_end(&self) -> Result<()> {
        if self.pos != self.tokens.len() {
            return Err(self.error("trailing tokens".into()));
        }
        Ok(())
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<()> {
        match self.bump() {
            Some(t) if t == token => Ok(()),
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    /// `seq := par (';' par)*`
    fn parse_sequence(&mut self) -> Result<RuntimeAnnot> {
        let first = self.parse_parallel()?;
        if self.peek() != Some(&Token::Seq) {
            return Ok(first);
        }
        let mut children = vec![first];
        while self.peek() == Some(&Token::Seq) {
            self.bump();
            children.push(self.parse_parallel()?);
        }
        Ok(RuntimeAnnot::operator(OP_SEQ, children))
    }

    /// `par := term ('#' term)*`
    fn parse_parallel(&mut self) -> Result<RuntimeAnnot> {
        let first = self.parse_term()?;
        if self.peek() != Some(&Token::Par) {
            return Ok(first);
        }
        let mut children = vec![first];
        while self.peek() == Some(&Token::Par) {
            self.bump();
            children.push(self.parse_term()?);
        }
        Ok(RuntimeAnnot::operator(OP_PAR, children))
    }

    /// `term := ident | '(' seq ')' | FALLBACK '(' seq (',' seq)* ')'
    ///        | OPT '(' seq ')'`
    fn parse_term(&mut self) -> Result<RuntimeAnnot> {
        match self.bump() {
            Some(Token::Open) => {
                let inner = self.parse_sequence()?;
                self.expect(Token::Close, "closing parenthesis")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) if name == OP_FALLBACK => {
                self.expect(Token::Open, "opening parenthesis after FALLBACK")?;
                let mut children = vec![self.parse_sequence()?];
                while self.peek() == Some(&Token::Comma) {
                    self.bump();
                    children.push(self.parse_sequence()?);
                }
                self.expect(Token::Close, "closing parenthesis after FALLBACK")?;
                Ok(RuntimeAnnot::operator(OP_FALLBACK, children))
            }
            Some(Token::Ident(name)) if name == OP_OPT => {
                self.expect(Token::Open, "opening parenthesis after OPT")?;
                let child = self.parse_sequence()?;
                self.expect(Token::Close, "closing parenthesis after OPT")?;
                Ok(RuntimeAnnot::operator(OP_OPT, vec![child]))
            }
            Some(Token::Ident(name)) => Ok(RuntimeAnnot::leaf(leaf_kind(&name), name)),
            _ => Err(self.error("expected a child id or operator".into())),
        }
    }
}

/// Child ids starting with `G` are goals, anything else is a task.
pub fn leaf_kind(name: &str) -> AnnotKind {
    if name.starts_with('G') {
        AnnotKind::Goal
    } else {
        AnnotKind::Task
    }
}
