//! Parser for the native Cypher subset run by [`crate::graph::PropertyGraph`].
//!
//! ```text
//! MATCH (alias[:Label]* [{prop: expr, ...}])
//! [WHERE alias.prop = expr [AND alias.prop = expr]*]
//! RETURN alias | SET alias.prop = expr [, ...] | [DETACH] DELETE alias
//! ```
//!
//! Keywords are case-insensitive. An `expr` is a named parameter (`{name}`
//! or `$name`) or a string, integer, float, boolean or `null` literal.

use indexmap::IndexMap;

use ogm_core::Value;

use crate::error::GraphError;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Param(String),
    Literal(Value),
}

impl Expr {
    pub fn resolve(&self, params: &IndexMap<String, Value>) -> Result<Value, GraphError> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Param(name) => params
                .get(name)
                .cloned()
                .ok_or_else(|| GraphError::UnboundParameter { name: name.clone() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NativeAction {
    Return,
    Set(Vec<(String, Expr)>),
    Delete,
}

/// A parsed native query over a single node pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeQuery {
    pub alias: String,
    pub labels: Vec<String>,
    pub conditions: Vec<(String, Expr)>,
    pub action: NativeAction,
}

impl NativeQuery {
    pub fn parse(text: &str) -> Result<Self, GraphError> {
        Parser {
            tokens: tokenize(text)?,
            pos: 0,
            end: text.len(),
        }
        .query()
    }

    pub fn is_read(&self) -> bool {
        self.action == NativeAction::Return
    }

    /// Resolves every condition against `params`.
    pub fn bind_conditions(
        &self,
        params: &IndexMap<String, Value>,
    ) -> Result<Vec<(String, Value)>, GraphError> {
        self.conditions
            .iter()
            .map(|(name, expr)| Ok((name.clone(), expr.resolve(params)?)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Param(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Dot,
    Eq,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn punctuation(c: char) -> Option<Token> {
    match c {
        '(' => Some(Token::LParen),
        ')' => Some(Token::RParen),
        '}' => Some(Token::RBrace),
        ':' => Some(Token::Colon),
        ',' => Some(Token::Comma),
        '.' => Some(Token::Dot),
        '=' => Some(Token::Eq),
        _ => None,
    }
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, GraphError> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let at = |i: usize| chars.get(i).map(|&(_, c)| c);
    let offset = |i: usize| chars.get(i).map(|&(o, _)| o).unwrap_or(text.len());
    let error = |i: usize, reason: &str| GraphError::Parse {
        offset: offset(i),
        reason: reason.to_string(),
    };

    let mut tokens = Vec::new();
    let mut i = 0;
    while let Some(c) = at(i) {
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if let Some(token) = punctuation(c) {
            tokens.push((offset(i), token));
            i += 1;
            continue;
        }
        let start = i;
        let token = match c {
            '{' => {
                let mut j = i + 1;
                while at(j).is_some_and(is_ident_char) {
                    j += 1;
                }
                if j > i + 1 && at(j) == Some('}') {
                    let name: String = chars[i + 1..j].iter().map(|&(_, c)| c).collect();
                    i = j + 1;
                    Token::Param(name)
                } else {
                    i += 1;
                    Token::LBrace
                }
            }
            '$' => {
                let mut j = i + 1;
                while at(j).is_some_and(is_ident_char) {
                    j += 1;
                }
                if j == i + 1 {
                    return Err(error(i, "expected parameter name after '$'"));
                }
                let name: String = chars[i + 1..j].iter().map(|&(_, c)| c).collect();
                i = j;
                Token::Param(name)
            }
            '`' => {
                let mut name = String::new();
                let mut j = i + 1;
                loop {
                    match at(j) {
                        Some('`') if at(j + 1) == Some('`') => {
                            name.push('`');
                            j += 2;
                        }
                        Some('`') => break,
                        Some(c) => {
                            name.push(c);
                            j += 1;
                        }
                        None => return Err(error(i, "unterminated quoted identifier")),
                    }
                }
                i = j + 1;
                Token::Quoted(name)
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                let mut j = i + 1;
                loop {
                    match at(j) {
                        Some('\\') => match at(j + 1) {
                            Some(escaped) => {
                                value.push(escaped);
                                j += 2;
                            }
                            None => return Err(error(i, "unterminated string literal")),
                        },
                        Some(c) if c == quote => break,
                        Some(c) => {
                            value.push(c);
                            j += 1;
                        }
                        None => return Err(error(i, "unterminated string literal")),
                    }
                }
                i = j + 1;
                Token::Str(value)
            }
            c if c.is_ascii_digit()
                || (c == '-' && at(i + 1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                let mut j = i + 1;
                while at(j).is_some_and(|d| d.is_ascii_digit()) {
                    j += 1;
                }
                let mut float = false;
                if at(j) == Some('.') && at(j + 1).is_some_and(|d| d.is_ascii_digit()) {
                    float = true;
                    j += 1;
                    while at(j).is_some_and(|d| d.is_ascii_digit()) {
                        j += 1;
                    }
                }
                let literal = &text[offset(i)..offset(j)];
                i = j;
                if float {
                    let value = literal.parse().map_err(|_| error(start, "invalid float literal"))?;
                    Token::Float(value)
                } else {
                    let value = literal
                        .parse()
                        .map_err(|_| error(start, "invalid integer literal"))?;
                    Token::Int(value)
                }
            }
            c if is_ident_start(c) => {
                let mut j = i + 1;
                while at(j).is_some_and(is_ident_char) {
                    j += 1;
                }
                let word = text[offset(i)..offset(j)].to_string();
                i = j;
                Token::Word(word)
            }
            other => return Err(error(i, &format!("unexpected character '{}'", other))),
        };
        tokens.push((offset(start), token));
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn error(&self, reason: impl Into<String>) -> GraphError {
        GraphError::Parse {
            offset: self.offset(),
            reason: reason.into(),
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), GraphError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Word(word)) if word.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), GraphError> {
        if self.keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", keyword)))
        }
    }

    fn identifier(&mut self) -> Result<String, GraphError> {
        match self.peek() {
            Some(Token::Word(_)) | Some(Token::Quoted(_)) => match self.next() {
                Some(Token::Word(name)) | Some(Token::Quoted(name)) => Ok(name),
                _ => Err(self.error("expected identifier")),
            },
            _ => Err(self.error("expected identifier")),
        }
    }

    fn alias(&mut self, alias: &str) -> Result<(), GraphError> {
        let offset = self.offset();
        let name = self.identifier()?;
        if name == alias {
            Ok(())
        } else {
            Err(GraphError::Parse {
                offset,
                reason: format!("unknown variable '{}'", name),
            })
        }
    }

    fn property_ref(&mut self, alias: &str) -> Result<String, GraphError> {
        self.alias(alias)?;
        self.expect(Token::Dot, "'.'")?;
        self.identifier()
    }

    fn expr(&mut self) -> Result<Expr, GraphError> {
        let expr = match self.peek() {
            Some(Token::Param(name)) => Expr::Param(name.clone()),
            Some(Token::Str(s)) => Expr::Literal(Value::Text(s.clone())),
            Some(Token::Int(n)) => Expr::Literal(Value::Int(*n)),
            Some(Token::Float(f)) => Expr::Literal(Value::Float(*f)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("true") => {
                Expr::Literal(Value::Bool(true))
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("false") => {
                Expr::Literal(Value::Bool(false))
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("null") => Expr::Literal(Value::Null),
            _ => return Err(self.error("expected parameter or literal")),
        };
        self.pos += 1;
        Ok(expr)
    }

    fn query(mut self) -> Result<NativeQuery, GraphError> {
        self.expect_keyword("MATCH")?;
        self.expect(Token::LParen, "'('")?;
        let alias = self.identifier()?;

        let mut labels = Vec::new();
        while self.eat(&Token::Colon) {
            labels.push(self.identifier()?);
        }

        let mut conditions = Vec::new();
        if self.eat(&Token::LBrace) {
            while self.peek() != Some(&Token::RBrace) {
                let name = self.identifier()?;
                self.expect(Token::Colon, "':'")?;
                conditions.push((name, self.expr()?));
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RBrace, "'}'")?;
        }
        self.expect(Token::RParen, "')'")?;

        if self.keyword("WHERE") {
            loop {
                let name = self.property_ref(&alias)?;
                self.expect(Token::Eq, "'='")?;
                conditions.push((name, self.expr()?));
                if !self.keyword("AND") {
                    break;
                }
            }
        }

        let action = if self.keyword("RETURN") {
            self.alias(&alias)?;
            NativeAction::Return
        } else if self.keyword("SET") {
            let mut assignments = Vec::new();
            loop {
                let name = self.property_ref(&alias)?;
                self.expect(Token::Eq, "'='")?;
                assignments.push((name, self.expr()?));
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            NativeAction::Set(assignments)
        } else if self.keyword("DETACH") {
            self.expect_keyword("DELETE")?;
            self.alias(&alias)?;
            NativeAction::Delete
        } else if self.keyword("DELETE") {
            self.alias(&alias)?;
            NativeAction::Delete
        } else {
            return Err(self.error("expected RETURN, SET or DELETE"));
        };

        if self.peek().is_some() {
            return Err(self.error("unexpected trailing input"));
        }

        Ok(NativeQuery {
            alias,
            labels,
            conditions,
            action,
        })
    }
}
