//! Recursive-descent parser for policy text.
//!
//! Grammar (informal):
//!
//! ```text
//! policies   := { annotation* effect '(' scope ')' condition* ';' }
//! annotation := '@' IDENT [ '(' STR ')' ]
//! effect     := 'permit' | 'forbid'
//! scope      := principal ',' action ',' resource
//! clause     := SLOT [ '==' UID | 'in' UID | 'in' '[' UID,* ']' | 'is' PATH [ 'in' UID ] ]
//! condition  := ('when' | 'unless') '{' expr '}'
//!
//! expr       := 'if' expr 'then' expr 'else' expr | or
//! or         := and { '||' and }
//! and        := relation { '&&' relation }
//! relation   := add [ relop add | 'has' (IDENT|STR) | 'like' STR | 'is' PATH [ 'in' add ] ]
//! add        := mult { ('+'|'-') mult }
//! mult       := unary { '*' unary }
//! unary      := { '!' | '-' } member
//! member     := primary { '.' IDENT [ '(' args ')' ] | '[' STR ']' }
//! primary    := literal | VAR | UID | PATH '(' args ')' | '(' expr ')' | '[' list ']' | '{' record '}'
//! ```
//!
//! Recursion depth is bounded by `max_depth`; every nested expression and
//! every operator in a chain counts one level, which also bounds the depth of
//! the tree the evaluator walks.

use warden_types::{EntityType, EntityUid, Value};

use crate::ast::{
    Annotations, BinaryOp, Condition, ConditionKind, Effect, Expr, Policy, PolicyId, Scope,
    ScopeConstraint, Var,
};
use crate::error::ParseError;
use crate::lexer::{Token, TokenKind, compile_pattern, tokenize, unescape};

/// Default bound on expression nesting.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 128;

const RESERVED: &[&str] = &[
    "true", "false", "if", "then", "else", "in", "is", "like", "has",
];

/// Parses policy text with the default nesting bound.
///
/// Policies receive ids `policy0`, `policy1`, ... in source order.
pub fn parse_policies(text: &str) -> Result<Vec<Policy>, ParseError> {
    parse_policies_with_depth(text, DEFAULT_MAX_NESTING_DEPTH)
}

/// Parses policy text with an explicit nesting bound.
pub fn parse_policies_with_depth(text: &str, max_depth: usize) -> Result<Vec<Policy>, ParseError> {
    let mut parser = Parser::new(text, max_depth)?;
    let mut policies = Vec::new();
    while !parser.at(&TokenKind::Eof) {
        let policy = parser.policy(policies.len())?;
        policies.push(policy);
    }
    Ok(policies)
}

/// Parses a single standalone expression.
pub fn parse_expression(text: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(text, DEFAULT_MAX_NESTING_DEPTH)?;
    let expr = parser.expr()?;
    parser.expect_eof()?;
    Ok(expr)
}

/// Parses an entity UID written as `Type::"id"` (types may be namespaced).
pub fn parse_entity_uid(text: &str) -> Result<EntityUid, ParseError> {
    let mut parser = Parser::new(text, DEFAULT_MAX_NESTING_DEPTH)?;
    let uid = parser.entity_uid()?;
    parser.expect_eof()?;
    Ok(uid)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn new(text: &str, max_depth: usize) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(text)?,
            pos: 0,
            depth: 0,
            max_depth,
        })
    }

    // ------------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------------

    fn peek(&self) -> &Token {
        // `tokenize` always ends with Eof and `advance` never moves past it.
        &self.tokens[self.pos]
    }

    fn peek_nth(&self, n: usize) -> &TokenKind {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(name) if name == word)
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let token = self.peek();
        ParseError::new(token.line, token.column, message)
    }

    fn expected(&self, what: &str) -> ParseError {
        self.error_here(format!(
            "expected {what}, found {}",
            self.peek().kind.describe()
        ))
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.expected(what))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), ParseError> {
        if self.at_keyword(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.expected(&format!("`{word}`")))
        }
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if self.at(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.expected("end of input"))
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.expected(what)),
        }
    }

    fn string(&mut self, what: &str) -> Result<String, ParseError> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Str(raw) => {
                self.advance();
                unescape(raw).map_err(|msg| ParseError::new(token.line, token.column, msg))
            }
            _ => Err(self.expected(what)),
        }
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.error_here(format!(
                "expression nesting exceeds the maximum depth of {}",
                self.max_depth
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Policies
    // ------------------------------------------------------------------------

    fn policy(&mut self, index: usize) -> Result<Policy, ParseError> {
        let annotations = self.annotations()?;

        let effect = match &self.peek().kind {
            TokenKind::Ident(word) if word == "permit" => Effect::Permit,
            TokenKind::Ident(word) if word == "forbid" => Effect::Forbid,
            _ => return Err(self.expected("`permit` or `forbid`")),
        };
        self.advance();

        self.expect(&TokenKind::LParen, "`(`")?;
        let principal = self.scope_clause("principal", false)?;
        self.expect(&TokenKind::Comma, "`,`")?;
        let action = self.scope_clause("action", true)?;
        self.expect(&TokenKind::Comma, "`,`")?;
        let resource = self.scope_clause("resource", false)?;
        self.expect(&TokenKind::RParen, "`)`")?;

        let mut conditions = Vec::new();
        loop {
            let kind = if self.at_keyword("when") {
                ConditionKind::When
            } else if self.at_keyword("unless") {
                ConditionKind::Unless
            } else {
                break;
            };
            self.advance();
            self.expect(&TokenKind::LBrace, "`{`")?;
            let body = self.expr()?;
            self.expect(&TokenKind::RBrace, "`}`")?;
            conditions.push(Condition { kind, body });
        }

        self.expect(&TokenKind::Semi, "`;`")?;

        Ok(Policy::new(
            PolicyId::from_index(index),
            effect,
            Scope {
                principal,
                action,
                resource,
            },
            conditions,
            annotations,
        ))
    }

    fn annotations(&mut self) -> Result<Annotations, ParseError> {
        let mut annotations = Annotations::new();
        while self.at(&TokenKind::At) {
            self.advance();
            let key = self.ident("annotation name")?;
            let value = if self.at(&TokenKind::LParen) {
                self.advance();
                let value = self.string("annotation value string")?;
                self.expect(&TokenKind::RParen, "`)`")?;
                value
            } else {
                String::new()
            };
            annotations.insert(key, value);
        }
        Ok(annotations)
    }

    fn scope_clause(&mut self, slot: &str, allow_list: bool) -> Result<ScopeConstraint, ParseError> {
        self.expect_keyword(slot)?;

        if self.at(&TokenKind::EqEq) {
            self.advance();
            return Ok(ScopeConstraint::Eq(self.entity_uid()?));
        }

        if self.at_keyword("in") {
            self.advance();
            if allow_list && self.at(&TokenKind::LBracket) {
                self.advance();
                let mut uids = Vec::new();
                while !self.at(&TokenKind::RBracket) {
                    uids.push(self.entity_uid()?);
                    if !self.at(&TokenKind::RBracket) {
                        self.expect(&TokenKind::Comma, "`,` or `]`")?;
                    }
                }
                self.advance();
                return Ok(ScopeConstraint::InAny(uids));
            }
            return Ok(ScopeConstraint::In(self.entity_uid()?));
        }

        if self.at_keyword("is") {
            self.advance();
            let entity_type = EntityType::new(self.path()?);
            if self.at_keyword("in") {
                self.advance();
                return Ok(ScopeConstraint::IsIn(entity_type, self.entity_uid()?));
            }
            return Ok(ScopeConstraint::Is(entity_type));
        }

        Ok(ScopeConstraint::Any)
    }

    /// `IDENT { '::' IDENT }` not followed by a string.
    fn path(&mut self) -> Result<String, ParseError> {
        let mut path = self.ident("type name")?;
        while self.at(&TokenKind::ColonColon) && matches!(self.peek_nth(1), TokenKind::Ident(_)) {
            self.advance();
            let segment = self.ident("type name")?;
            path.push_str("::");
            path.push_str(&segment);
        }
        Ok(path)
    }

    fn entity_uid(&mut self) -> Result<EntityUid, ParseError> {
        if !matches!(self.peek().kind, TokenKind::Ident(_)) {
            return Err(self.expected("entity reference"));
        }
        let path = self.path()?;
        self.expect(&TokenKind::ColonColon, "`::` in entity reference")?;
        let id = self.string("entity id string")?;
        Ok(EntityUid::new(path, id))
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.descend()?;
        let expr = if self.at_keyword("if") {
            self.advance();
            let cond = self.expr()?;
            self.expect_keyword("then")?;
            let then_expr = self.expr()?;
            self.expect_keyword("else")?;
            let else_expr = self.expr()?;
            Expr::If {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            }
        } else {
            self.or()?
        };
        self.depth -= 1;
        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let saved = self.depth;
        let mut lhs = self.and()?;
        while self.at(&TokenKind::OrOr) {
            self.advance();
            self.descend()?;
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.depth = saved;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let saved = self.depth;
        let mut lhs = self.relation()?;
        while self.at(&TokenKind::AndAnd) {
            self.advance();
            self.descend()?;
            let rhs = self.relation()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.depth = saved;
        Ok(lhs)
    }

    fn relation(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.add()?;

        let op = match &self.peek().kind {
            TokenKind::EqEq => Some(BinaryOp::Eq),
            TokenKind::NotEq => Some(BinaryOp::NotEq),
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::Le => Some(BinaryOp::Le),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::Ge => Some(BinaryOp::Ge),
            TokenKind::Ident(word) if word == "in" => Some(BinaryOp::In),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let rhs = self.add()?;
            return Ok(Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }

        if self.at_keyword("has") {
            self.advance();
            let attr = match &self.peek().kind {
                TokenKind::Ident(_) => self.ident("attribute name")?,
                _ => self.string("attribute name")?,
            };
            return Ok(Expr::HasAttr {
                expr: Box::new(lhs),
                attr,
            });
        }

        if self.at_keyword("like") {
            self.advance();
            let token = self.peek().clone();
            let TokenKind::Str(raw) = &token.kind else {
                return Err(self.expected("pattern string"));
            };
            let pattern = compile_pattern(raw)
                .map_err(|msg| ParseError::new(token.line, token.column, msg))?;
            self.advance();
            return Ok(Expr::Like {
                expr: Box::new(lhs),
                pattern,
            });
        }

        if self.at_keyword("is") {
            self.advance();
            let entity_type = EntityType::new(self.path()?);
            let in_expr = if self.at_keyword("in") {
                self.advance();
                Some(Box::new(self.add()?))
            } else {
                None
            };
            return Ok(Expr::Is {
                expr: Box::new(lhs),
                entity_type,
                in_expr,
            });
        }

        Ok(lhs)
    }

    fn add(&mut self) -> Result<Expr, ParseError> {
        let saved = self.depth;
        let mut lhs = self.mult()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let rhs = self.mult()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        self.depth = saved;
        Ok(lhs)
    }

    fn mult(&mut self) -> Result<Expr, ParseError> {
        let saved = self.depth;
        let mut lhs = self.unary()?;
        while self.at(&TokenKind::Star) {
            self.advance();
            self.descend()?;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op: BinaryOp::Mul,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        self.depth = saved;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let saved = self.depth;
        let mut ops = Vec::new();
        while matches!(self.peek().kind, TokenKind::Bang | TokenKind::Minus) {
            ops.push(self.advance().kind);
            self.descend()?;
        }

        // `-` directly before an integer literal folds into a negative literal,
        // which is the only way to write i64::MIN.
        let literal = match (ops.last(), &self.peek().kind) {
            (Some(TokenKind::Minus), TokenKind::Int(n)) => Some(*n),
            _ => None,
        };
        let mut expr = match literal {
            Some(n) => {
                ops.pop();
                let value = i64::try_from(-i128::from(n)).map_err(|_| {
                    self.error_here(format!("integer literal -{n} is out of range"))
                })?;
                self.advance();
                self.member_suffixes(Expr::Literal(Value::Long(value)))?
            }
            None => self.member()?,
        };

        for op in ops.into_iter().rev() {
            expr = match op {
                TokenKind::Bang => Expr::Not(Box::new(expr)),
                _ => Expr::Neg(Box::new(expr)),
            };
        }
        self.depth = saved;
        Ok(expr)
    }

    fn member(&mut self) -> Result<Expr, ParseError> {
        let primary = self.primary()?;
        self.member_suffixes(primary)
    }

    fn member_suffixes(&mut self, mut expr: Expr) -> Result<Expr, ParseError> {
        let saved = self.depth;
        loop {
            if self.at(&TokenKind::Dot) {
                self.advance();
                self.descend()?;
                let name = self.ident("attribute or method name")?;
                expr = if self.at(&TokenKind::LParen) {
                    let args = self.args()?;
                    Expr::MethodCall {
                        receiver: Box::new(expr),
                        method: name,
                        args,
                    }
                } else {
                    Expr::GetAttr {
                        expr: Box::new(expr),
                        attr: name,
                    }
                };
            } else if self.at(&TokenKind::LBracket) {
                self.advance();
                self.descend()?;
                let attr = self.string("attribute name string")?;
                self.expect(&TokenKind::RBracket, "`]`")?;
                expr = Expr::GetAttr {
                    expr: Box::new(expr),
                    attr,
                };
            } else {
                break;
            }
        }
        self.depth = saved;
        Ok(expr)
    }

    fn args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(&TokenKind::LParen, "`(`")?;
        let mut args = Vec::new();
        while !self.at(&TokenKind::RParen) {
            args.push(self.expr()?);
            if !self.at(&TokenKind::RParen) {
                self.expect(&TokenKind::Comma, "`,` or `)`")?;
            }
        }
        self.advance();
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Int(n) => {
                let value = i64::try_from(n).map_err(|_| {
                    self.error_here(format!("integer literal {n} is out of range"))
                })?;
                self.advance();
                Ok(Expr::Literal(Value::Long(value)))
            }
            TokenKind::Str(_) => Ok(Expr::Literal(Value::String(self.string("string")?))),
            TokenKind::LParen => {
                self.advance();
                let expr = self.expr()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.at(&TokenKind::RBracket) {
                    items.push(self.expr()?);
                    if !self.at(&TokenKind::RBracket) {
                        self.expect(&TokenKind::Comma, "`,` or `]`")?;
                    }
                }
                self.advance();
                Ok(Expr::Set(items))
            }
            TokenKind::LBrace => self.record(),
            TokenKind::Ident(ref word) if word == "if" => self.expr(),
            TokenKind::Ident(ref word) if word == "true" || word == "false" => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(word == "true")))
            }
            TokenKind::Ident(ref word) if RESERVED.contains(&word.as_str()) => {
                Err(self.expected("expression"))
            }
            TokenKind::Ident(_) => self.name_or_reference(),
            _ => Err(self.expected("expression")),
        }
    }

    /// A bare name, request variable, entity literal, or function call.
    fn name_or_reference(&mut self) -> Result<Expr, ParseError> {
        let mut path = vec![self.ident("name")?];
        while self.at(&TokenKind::ColonColon) {
            self.advance();
            match &self.peek().kind {
                TokenKind::Str(_) => {
                    let id = self.string("entity id string")?;
                    let uid = EntityUid::new(path.join("::"), id);
                    return Ok(Expr::Literal(Value::EntityRef(uid)));
                }
                TokenKind::Ident(_) => path.push(self.ident("name")?),
                _ => return Err(self.expected("name or entity id string after `::`")),
            }
        }

        if self.at(&TokenKind::LParen) {
            let args = self.args()?;
            return Ok(Expr::Call {
                name: path.join("::"),
                args,
            });
        }

        if path.len() > 1 {
            return Err(self.expected("`::` and entity id string"));
        }
        let name = path.swap_remove(0);
        Ok(match Var::from_keyword(&name) {
            Some(var) => Expr::Var(var),
            None => Expr::Name(name),
        })
    }

    fn record(&mut self) -> Result<Expr, ParseError> {
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut fields: Vec<(String, Expr)> = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let key_token = self.peek().clone();
            let key = match &key_token.kind {
                TokenKind::Ident(_) => self.ident("record key")?,
                _ => self.string("record key")?,
            };
            if fields.iter().any(|(existing, _)| *existing == key) {
                return Err(ParseError::new(
                    key_token.line,
                    key_token.column,
                    format!("duplicate key `{key}` in record literal"),
                ));
            }
            self.expect(&TokenKind::Colon, "`:`")?;
            let value = self.expr()?;
            fields.push((key, value));
            if !self.at(&TokenKind::RBrace) {
                self.expect(&TokenKind::Comma, "`,` or `}`")?;
            }
        }
        self.advance();
        Ok(Expr::Record(fields))
    }
}

// ============================================================================
// Tests
// ============================================================================
