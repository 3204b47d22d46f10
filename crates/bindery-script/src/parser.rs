//! Recursive descent parser producing [`crate::ast`] nodes.
//!
//! Top-level code behaves like the body of an async function: `await` is
//! accepted there and inside async functions, and `return` may end the
//! script early.

use std::rc::Rc;

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::Lexer;
use crate::token::{Keyword, PUNCTUATORS, Punct, Token, TokenKind};

type PResult<T> = Result<T, ParseError>;

/// Deepest nesting of statements, expressions and patterns accepted.
pub const MAX_NESTING: usize = 128;

enum Operator {
  Binary(BinaryOp),
  Logical(LogicalOp),
}

pub struct Parser<'a> {
  source: &'a str,
  base: usize,
  tokens: Vec<Token>,
  pos: usize,
  in_async: bool,
  depth: usize,
}

impl<'a> Parser<'a> {
  pub fn new(source: &'a str) -> PResult<Self> {
    Self::with_base(source, 0)
  }

  /// Parser for a fragment starting `base` bytes into a larger text.
  pub fn with_base(source: &'a str, base: usize) -> PResult<Self> {
    let tokens = Lexer::with_base(source, base).tokenize()?;
    Ok(Self {
      source,
      base,
      tokens,
      pos: 0,
      in_async: true,
      depth: 0,
    })
  }

  pub fn parse_program(&mut self) -> PResult<Program> {
    let mut body = Vec::new();
    while !self.at_eof() {
      body.push(self.parse_statement()?);
    }
    Ok(Program { body })
  }

  /// Parse the whole input as one expression.
  pub fn parse_complete_expression(&mut self) -> PResult<Expr> {
    let expr = self.parse_expression()?;
    if !self.at_eof() {
      return Err(self.unexpected());
    }
    Ok(expr)
  }

  // ---- token helpers ----

  fn peek(&self) -> &Token {
    self.peek_at(0)
  }

  fn peek_at(&self, n: usize) -> &Token {
    let index = (self.pos + n).min(self.tokens.len() - 1);
    &self.tokens[index]
  }

  fn token_at(&self, index: usize) -> &Token {
    &self.tokens[index.min(self.tokens.len() - 1)]
  }

  fn advance(&mut self) -> Token {
    let token = self.peek().clone();
    if token.kind != TokenKind::Eof {
      self.pos += 1;
    }
    token
  }

  fn at_eof(&self) -> bool {
    self.peek().kind == TokenKind::Eof
  }

  fn at(&self, punct: Punct) -> bool {
    self.peek().is_punct(punct)
  }

  fn eat(&mut self, punct: Punct) -> bool {
    if self.at(punct) {
      self.advance();
      true
    } else {
      false
    }
  }

  fn eat_keyword(&mut self, keyword: Keyword) -> bool {
    if self.peek().is_keyword(keyword) {
      self.advance();
      true
    } else {
      false
    }
  }

  fn expect(&mut self, punct: Punct) -> PResult<Token> {
    if self.at(punct) {
      Ok(self.advance())
    } else {
      Err(ParseError::new(
        format!(
          "expected '{}' but found {}",
          punct_text(punct),
          describe(&self.peek().kind)
        ),
        self.peek().start,
      ))
    }
  }

  fn expect_keyword(&mut self, keyword: Keyword) -> PResult<()> {
    if self.eat_keyword(keyword) {
      Ok(())
    } else {
      Err(ParseError::new(
        format!(
          "expected '{}' but found {}",
          keyword.as_str(),
          describe(&self.peek().kind)
        ),
        self.peek().start,
      ))
    }
  }

  fn eat_ident(&mut self) -> Option<Rc<str>> {
    let name: Rc<str> = match &self.peek().kind {
      TokenKind::Ident(name) => name.as_str().into(),
      _ => return None,
    };
    self.advance();
    Some(name)
  }

  fn expect_ident(&mut self) -> PResult<Rc<str>> {
    match self.eat_ident() {
      Some(name) => Ok(name),
      None => Err(ParseError::new(
        format!("expected identifier but found {}", describe(&self.peek().kind)),
        self.peek().start,
      )),
    }
  }

  /// Identifier or keyword used as a property name after `.`.
  fn expect_property_name(&mut self) -> PResult<Rc<str>> {
    let name: Rc<str> = match &self.peek().kind {
      TokenKind::Ident(name) => name.as_str().into(),
      TokenKind::Keyword(keyword) => keyword.as_str().into(),
      _ => {
        return Err(ParseError::new(
          format!("expected property name but found {}", describe(&self.peek().kind)),
          self.peek().start,
        ));
      }
    };
    self.advance();
    Ok(name)
  }

  fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
    if self.depth >= MAX_NESTING {
      return Err(ParseError::new("too much nesting", self.peek().start));
    }
    self.depth += 1;
    let result = parse(self);
    self.depth -= 1;
    result
  }

  fn unexpected(&self) -> ParseError {
    let token = self.peek();
    ParseError::new(format!("unexpected {}", describe(&token.kind)), token.start)
  }

  fn prev_end(&self) -> usize {
    match self.pos {
      0 => self.base,
      pos => self.tokens[pos - 1].end,
    }
  }

  fn slice(&self, start: usize, end: usize) -> &str {
    let (start, end) = (start.saturating_sub(self.base), end.saturating_sub(self.base));
    self.source.get(start..end).unwrap_or_default()
  }

  fn consume_semicolon(&mut self) -> PResult<()> {
    if self.eat(Punct::Semi) {
      return Ok(());
    }
    let token = self.peek();
    if token.is_punct(Punct::RBrace) || token.kind == TokenKind::Eof || token.newline_before {
      return Ok(());
    }
    Err(self.unexpected())
  }

  // ---- statements ----

  fn parse_statement(&mut self) -> PResult<Stmt> {
    self.nested(Self::statement_inner)
  }

  fn statement_inner(&mut self) -> PResult<Stmt> {
    let token = self.peek().clone();
    match &token.kind {
      TokenKind::Punct(Punct::LBrace) => Ok(Stmt::Block(self.parse_block()?)),
      TokenKind::Punct(Punct::Semi) => {
        self.advance();
        Ok(Stmt::Empty)
      }
      TokenKind::Keyword(Keyword::Var | Keyword::Let | Keyword::Const) => {
        let stmt = self.parse_declaration()?;
        self.consume_semicolon()?;
        Ok(stmt)
      }
      TokenKind::Keyword(Keyword::Function) => self.parse_function_declaration(false),
      TokenKind::Ident(name)
        if name == "async"
          && self.peek_at(1).is_keyword(Keyword::Function)
          && !self.peek_at(1).newline_before =>
      {
        self.parse_function_declaration(true)
      }
      TokenKind::Keyword(Keyword::If) => self.parse_if(),
      TokenKind::Keyword(Keyword::For) => self.parse_for(),
      TokenKind::Keyword(Keyword::While) => {
        self.advance();
        self.expect(Punct::LParen)?;
        let test = self.parse_expression()?;
        self.expect(Punct::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While { test, body })
      }
      TokenKind::Keyword(Keyword::Do) => {
        self.advance();
        let body = Box::new(self.parse_statement()?);
        self.expect_keyword(Keyword::While)?;
        self.expect(Punct::LParen)?;
        let test = self.parse_expression()?;
        self.expect(Punct::RParen)?;
        self.eat(Punct::Semi);
        Ok(Stmt::DoWhile { body, test })
      }
      TokenKind::Keyword(Keyword::Break) => {
        self.advance();
        self.consume_semicolon()?;
        Ok(Stmt::Break)
      }
      TokenKind::Keyword(Keyword::Continue) => {
        self.advance();
        self.consume_semicolon()?;
        Ok(Stmt::Continue)
      }
      TokenKind::Keyword(Keyword::Return) => {
        self.advance();
        let next = self.peek();
        let argument = if next.is_punct(Punct::Semi)
          || next.is_punct(Punct::RBrace)
          || next.kind == TokenKind::Eof
          || next.newline_before
        {
          None
        } else {
          Some(self.parse_expression()?)
        };
        self.consume_semicolon()?;
        Ok(Stmt::Return(argument))
      }
      TokenKind::Keyword(Keyword::Throw) => {
        self.advance();
        if self.peek().newline_before {
          return Err(ParseError::new("illegal newline after throw", self.peek().start));
        }
        let argument = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(Stmt::Throw(argument))
      }
      TokenKind::Keyword(Keyword::Try) => self.parse_try(),
      _ => {
        let expr = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(Stmt::Expr(expr))
      }
    }
  }

  fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
    self.expect(Punct::LBrace)?;
    let mut body = Vec::new();
    while !self.at(Punct::RBrace) {
      if self.at_eof() {
        return Err(self.unexpected());
      }
      body.push(self.parse_statement()?);
    }
    self.expect(Punct::RBrace)?;
    Ok(body)
  }

  fn decl_kind(&mut self) -> PResult<DeclKind> {
    let kind = match self.peek().kind {
      TokenKind::Keyword(Keyword::Var) => DeclKind::Var,
      TokenKind::Keyword(Keyword::Let) => DeclKind::Let,
      TokenKind::Keyword(Keyword::Const) => DeclKind::Const,
      _ => return Err(self.unexpected()),
    };
    self.advance();
    Ok(kind)
  }

  fn parse_declaration(&mut self) -> PResult<Stmt> {
    let kind = self.decl_kind()?;
    let first = self.parse_pattern()?;
    self.parse_declarators(kind, first)
  }

  fn parse_declarators(&mut self, kind: DeclKind, first: Pattern) -> PResult<Stmt> {
    let mut declarators = Vec::new();
    let mut pattern = first;
    loop {
      let start = self.peek().start;
      let init = if self.eat(Punct::Eq) {
        Some(self.parse_assignment()?)
      } else {
        None
      };
      if init.is_none() && (kind == DeclKind::Const || !matches!(pattern, Pattern::Ident(_))) {
        return Err(ParseError::new("missing initializer in declaration", start));
      }
      declarators.push(Declarator { pattern, init });
      if !self.eat(Punct::Comma) {
        break;
      }
      pattern = self.parse_pattern()?;
    }
    Ok(Stmt::Declaration { kind, declarators })
  }

  fn parse_function_declaration(&mut self, is_async: bool) -> PResult<Stmt> {
    let start = self.peek().start;
    if is_async {
      self.advance();
    }
    self.expect_keyword(Keyword::Function)?;
    let name = self.expect_ident()?;
    let function = self.parse_function_rest(start, Some(name), is_async)?;
    Ok(Stmt::Function(function))
  }

  fn parse_if(&mut self) -> PResult<Stmt> {
    self.advance();
    self.expect(Punct::LParen)?;
    let test = self.parse_expression()?;
    self.expect(Punct::RParen)?;
    let consequent = Box::new(self.parse_statement()?);
    let alternate = if self.eat_keyword(Keyword::Else) {
      Some(Box::new(self.parse_statement()?))
    } else {
      None
    };
    Ok(Stmt::If {
      test,
      consequent,
      alternate,
    })
  }

  fn parse_for(&mut self) -> PResult<Stmt> {
    self.advance();
    self.expect(Punct::LParen)?;

    let init = match self.peek().kind {
      TokenKind::Punct(Punct::Semi) => None,
      TokenKind::Keyword(Keyword::Var | Keyword::Let | Keyword::Const) => {
        let kind = self.decl_kind()?;
        let pattern = self.parse_pattern()?;
        if self.peek().is_ident("of") {
          self.advance();
          let iterable = self.parse_assignment()?;
          self.expect(Punct::RParen)?;
          let body = Box::new(self.parse_statement()?);
          return Ok(Stmt::ForOf {
            kind,
            pattern,
            iterable,
            body,
          });
        }
        if self.eat_keyword(Keyword::In) {
          let object = self.parse_expression()?;
          self.expect(Punct::RParen)?;
          let body = Box::new(self.parse_statement()?);
          return Ok(Stmt::ForIn {
            kind,
            pattern,
            object,
            body,
          });
        }
        Some(Box::new(self.parse_declarators(kind, pattern)?))
      }
      _ => Some(Box::new(Stmt::Expr(self.parse_expression()?))),
    };
    self.expect(Punct::Semi)?;

    let test = if self.at(Punct::Semi) {
      None
    } else {
      Some(self.parse_expression()?)
    };
    self.expect(Punct::Semi)?;

    let update = if self.at(Punct::RParen) {
      None
    } else {
      Some(self.parse_expression()?)
    };
    self.expect(Punct::RParen)?;

    let body = Box::new(self.parse_statement()?);
    Ok(Stmt::For {
      init,
      test,
      update,
      body,
    })
  }

  fn parse_try(&mut self) -> PResult<Stmt> {
    let start = self.peek().start;
    self.advance();
    let block = self.parse_block()?;

    let handler = if self.eat_keyword(Keyword::Catch) {
      let param = if self.eat(Punct::LParen) {
        let pattern = self.parse_pattern()?;
        self.expect(Punct::RParen)?;
        Some(pattern)
      } else {
        None
      };
      let body = self.parse_block()?;
      Some(CatchClause { param, body })
    } else {
      None
    };

    let finalizer = if self.eat_keyword(Keyword::Finally) {
      Some(self.parse_block()?)
    } else {
      None
    };

    if handler.is_none() && finalizer.is_none() {
      return Err(ParseError::new("missing catch or finally after try", start));
    }
    Ok(Stmt::Try {
      block,
      handler,
      finalizer,
    })
  }

  // ---- patterns ----

  fn parse_pattern(&mut self) -> PResult<Pattern> {
    self.nested(Self::pattern_inner)
  }

  fn pattern_inner(&mut self) -> PResult<Pattern> {
    match self.peek().kind {
      TokenKind::Punct(Punct::LBrace) => self.parse_object_pattern(),
      TokenKind::Punct(Punct::LBracket) => self.parse_array_pattern(),
      _ => Ok(Pattern::Ident(self.expect_ident()?)),
    }
  }

  fn parse_default(&mut self) -> PResult<Option<Expr>> {
    if self.eat(Punct::Eq) {
      Ok(Some(self.parse_assignment()?))
    } else {
      Ok(None)
    }
  }

  fn parse_object_pattern(&mut self) -> PResult<Pattern> {
    self.expect(Punct::LBrace)?;
    let mut properties = Vec::new();
    let mut rest = None;
    while !self.at(Punct::RBrace) {
      if self.eat(Punct::Ellipsis) {
        rest = Some(self.expect_ident()?);
        break;
      }
      let (key, is_ident) = self.parse_property_key()?;
      let value = if self.eat(Punct::Colon) {
        self.parse_pattern()?
      } else if is_ident {
        Pattern::Ident(key.clone())
      } else {
        return Err(self.unexpected());
      };
      let default = self.parse_default()?;
      properties.push(PatternProperty { key, value, default });
      if !self.at(Punct::RBrace) {
        self.expect(Punct::Comma)?;
      }
    }
    self.expect(Punct::RBrace)?;
    Ok(Pattern::Object { properties, rest })
  }

  fn parse_array_pattern(&mut self) -> PResult<Pattern> {
    self.expect(Punct::LBracket)?;
    let mut elements = Vec::new();
    let mut rest = None;
    while !self.at(Punct::RBracket) {
      if self.eat(Punct::Comma) {
        elements.push(None);
        continue;
      }
      if self.eat(Punct::Ellipsis) {
        rest = Some(Box::new(self.parse_pattern()?));
        break;
      }
      let pattern = self.parse_pattern()?;
      let default = self.parse_default()?;
      elements.push(Some(PatternElement { pattern, default }));
      if !self.at(Punct::RBracket) {
        self.expect(Punct::Comma)?;
      }
    }
    self.expect(Punct::RBracket)?;
    Ok(Pattern::Array { elements, rest })
  }

  // ---- functions ----

  fn parse_params(&mut self) -> PResult<Vec<Param>> {
    self.expect(Punct::LParen)?;
    let mut params = Vec::new();
    while !self.at(Punct::RParen) {
      if self.eat(Punct::Ellipsis) {
        let pattern = self.parse_pattern()?;
        params.push(Param {
          pattern,
          default: None,
          rest: true,
        });
        break;
      }
      let pattern = self.parse_pattern()?;
      let default = self.parse_default()?;
      params.push(Param {
        pattern,
        default,
        rest: false,
      });
      if !self.at(Punct::RParen) {
        self.expect(Punct::Comma)?;
      }
    }
    self.expect(Punct::RParen)?;
    Ok(params)
  }

  /// Parameters and block body of a non-arrow function whose text begins at
  /// `start`.
  fn parse_function_rest(
    &mut self,
    start: usize,
    name: Option<Rc<str>>,
    is_async: bool,
  ) -> PResult<Rc<Function>> {
    let params = self.parse_params()?;
    let outer = std::mem::replace(&mut self.in_async, is_async);
    let body = self.parse_block()?;
    self.in_async = outer;
    Ok(Rc::new(Function {
      name,
      params,
      body: FunctionBody::Block(body),
      is_async,
      is_arrow: false,
      source: self.slice(start, self.prev_end()).into(),
    }))
  }

  /// Whether an arrow function starts at the current token. Returns whether
  /// it is async.
  fn arrow_ahead(&self) -> Option<bool> {
    let mut index = self.pos;
    let mut is_async = false;
    let next = self.token_at(index + 1);
    if self.token_at(index).is_ident("async")
      && !next.newline_before
      && (matches!(next.kind, TokenKind::Ident(_)) || next.is_punct(Punct::LParen))
    {
      is_async = true;
      index += 1;
    }

    match self.token_at(index).kind {
      TokenKind::Ident(_) if self.token_at(index + 1).is_punct(Punct::Arrow) => Some(is_async),
      TokenKind::Punct(Punct::LParen) => {
        let mut depth = 0usize;
        let mut cursor = index;
        loop {
          let token = self.token_at(cursor);
          match token.kind {
            TokenKind::Punct(Punct::LParen) => depth += 1,
            TokenKind::Punct(Punct::RParen) => {
              depth -= 1;
              if depth == 0 {
                break;
              }
            }
            TokenKind::Eof => return None,
            _ => {}
          }
          cursor += 1;
        }
        self
          .token_at(cursor + 1)
          .is_punct(Punct::Arrow)
          .then_some(is_async)
      }
      _ => None,
    }
  }

  fn parse_arrow(&mut self, is_async: bool) -> PResult<Rc<Function>> {
    let start = self.peek().start;
    if is_async {
      self.advance();
    }
    let params = match self.eat_ident() {
      Some(name) => vec![Param {
        pattern: Pattern::Ident(name),
        default: None,
        rest: false,
      }],
      None => self.parse_params()?,
    };
    self.expect(Punct::Arrow)?;

    let outer = std::mem::replace(&mut self.in_async, is_async);
    let body = if self.at(Punct::LBrace) {
      FunctionBody::Block(self.parse_block()?)
    } else {
      FunctionBody::Expression(Box::new(self.parse_assignment()?))
    };
    self.in_async = outer;

    Ok(Rc::new(Function {
      name: None,
      params,
      body,
      is_async,
      is_arrow: true,
      source: self.slice(start, self.prev_end()).into(),
    }))
  }

  // ---- expressions ----

  pub fn parse_expression(&mut self) -> PResult<Expr> {
    let first = self.parse_assignment()?;
    if !self.at(Punct::Comma) {
      return Ok(first);
    }
    let mut exprs = vec![first];
    while self.eat(Punct::Comma) {
      exprs.push(self.parse_assignment()?);
    }
    Ok(Expr::Sequence(exprs))
  }

  fn parse_assignment(&mut self) -> PResult<Expr> {
    self.nested(Self::assignment_inner)
  }

  fn assignment_inner(&mut self) -> PResult<Expr> {
    if let Some(is_async) = self.arrow_ahead() {
      return Ok(Expr::Function(self.parse_arrow(is_async)?));
    }

    let start = self.peek().start;
    let target = self.parse_conditional()?;
    let Some(op) = assign_op(&self.peek().kind) else {
      return Ok(target);
    };
    if !is_assignable(&target) {
      return Err(ParseError::new("invalid assignment target", start));
    }
    self.advance();
    let value = self.parse_assignment()?;
    Ok(Expr::Assign {
      op,
      target: Box::new(target),
      value: Box::new(value),
    })
  }

  fn parse_conditional(&mut self) -> PResult<Expr> {
    let test = self.parse_binary(0)?;
    if !self.eat(Punct::Question) {
      return Ok(test);
    }
    let consequent = self.parse_assignment()?;
    self.expect(Punct::Colon)?;
    let alternate = self.parse_assignment()?;
    Ok(Expr::Conditional {
      test: Box::new(test),
      consequent: Box::new(consequent),
      alternate: Box::new(alternate),
    })
  }

  fn peek_operator(&self) -> Option<(Operator, u8)> {
    let operator = match &self.peek().kind {
      TokenKind::Punct(punct) => match punct {
        Punct::QuestionQuestion => (Operator::Logical(LogicalOp::Nullish), 1),
        Punct::PipePipe => (Operator::Logical(LogicalOp::Or), 2),
        Punct::AmpAmp => (Operator::Logical(LogicalOp::And), 3),
        Punct::EqEq => (Operator::Binary(BinaryOp::Eq), 4),
        Punct::NotEq => (Operator::Binary(BinaryOp::NotEq), 4),
        Punct::EqEqEq => (Operator::Binary(BinaryOp::StrictEq), 4),
        Punct::NotEqEq => (Operator::Binary(BinaryOp::StrictNotEq), 4),
        Punct::Lt => (Operator::Binary(BinaryOp::Lt), 5),
        Punct::Gt => (Operator::Binary(BinaryOp::Gt), 5),
        Punct::LtEq => (Operator::Binary(BinaryOp::LtEq), 5),
        Punct::GtEq => (Operator::Binary(BinaryOp::GtEq), 5),
        Punct::Plus => (Operator::Binary(BinaryOp::Add), 6),
        Punct::Minus => (Operator::Binary(BinaryOp::Sub), 6),
        Punct::Star => (Operator::Binary(BinaryOp::Mul), 7),
        Punct::Slash => (Operator::Binary(BinaryOp::Div), 7),
        Punct::Percent => (Operator::Binary(BinaryOp::Rem), 7),
        _ => return None,
      },
      TokenKind::Keyword(Keyword::In) => (Operator::Binary(BinaryOp::In), 5),
      TokenKind::Keyword(Keyword::InstanceOf) => (Operator::Binary(BinaryOp::InstanceOf), 5),
      _ => return None,
    };
    Some(operator)
  }

  fn parse_binary(&mut self, min_precedence: u8) -> PResult<Expr> {
    let mut left = self.parse_exponent()?;
    while let Some((operator, precedence)) = self.peek_operator() {
      if precedence < min_precedence {
        break;
      }
      self.advance();
      let right = Box::new(self.parse_binary(precedence + 1)?);
      let left_box = Box::new(left);
      left = match operator {
        Operator::Binary(op) => Expr::Binary {
          op,
          left: left_box,
          right,
        },
        Operator::Logical(op) => Expr::Logical {
          op,
          left: left_box,
          right,
        },
      };
    }
    Ok(left)
  }

  fn parse_exponent(&mut self) -> PResult<Expr> {
    let base = self.parse_unary()?;
    if !self.eat(Punct::StarStar) {
      return Ok(base);
    }
    let exponent = self.parse_exponent()?;
    Ok(Expr::Binary {
      op: BinaryOp::Exp,
      left: Box::new(base),
      right: Box::new(exponent),
    })
  }

  fn parse_unary(&mut self) -> PResult<Expr> {
    self.nested(Self::unary_inner)
  }

  fn unary_inner(&mut self) -> PResult<Expr> {
    let token = self.peek().clone();
    let op = match token.kind {
      TokenKind::Punct(Punct::Bang) => UnaryOp::Not,
      TokenKind::Punct(Punct::Minus) => UnaryOp::Negate,
      TokenKind::Punct(Punct::Plus) => UnaryOp::Plus,
      TokenKind::Keyword(Keyword::TypeOf) => UnaryOp::TypeOf,
      TokenKind::Keyword(Keyword::Void) => UnaryOp::Void,
      TokenKind::Keyword(Keyword::Delete) => UnaryOp::Delete,
      TokenKind::Punct(punct @ (Punct::PlusPlus | Punct::MinusMinus)) => {
        self.advance();
        let target = self.parse_unary()?;
        if !is_assignable(&target) {
          return Err(ParseError::new("invalid update target", token.start));
        }
        return Ok(Expr::Update {
          op: update_op(punct),
          prefix: true,
          target: Box::new(target),
        });
      }
      TokenKind::Keyword(Keyword::Await) => {
        if !self.in_async {
          return Err(ParseError::new(
            "await is only valid in async functions",
            token.start,
          ));
        }
        self.advance();
        let argument = self.parse_unary()?;
        return Ok(Expr::Await(Box::new(argument)));
      }
      _ => return self.parse_postfix(),
    };
    self.advance();
    let argument = self.parse_unary()?;
    Ok(Expr::Unary {
      op,
      argument: Box::new(argument),
    })
  }

  fn parse_postfix(&mut self) -> PResult<Expr> {
    let start = self.peek().start;
    let expr = self.parse_call_member()?;
    let token = self.peek();
    if token.newline_before {
      return Ok(expr);
    }
    let op = match token.kind {
      TokenKind::Punct(punct @ (Punct::PlusPlus | Punct::MinusMinus)) => update_op(punct),
      _ => return Ok(expr),
    };
    if !is_assignable(&expr) {
      return Err(ParseError::new("invalid update target", start));
    }
    self.advance();
    Ok(Expr::Update {
      op,
      prefix: false,
      target: Box::new(expr),
    })
  }

  fn parse_arguments(&mut self) -> PResult<Vec<Argument>> {
    self.expect(Punct::LParen)?;
    let mut arguments = Vec::new();
    while !self.at(Punct::RParen) {
      if self.eat(Punct::Ellipsis) {
        arguments.push(Argument::Spread(self.parse_assignment()?));
      } else {
        arguments.push(Argument::Expr(self.parse_assignment()?));
      }
      if !self.at(Punct::RParen) {
        self.expect(Punct::Comma)?;
      }
    }
    self.expect(Punct::RParen)?;
    Ok(arguments)
  }

  fn parse_call_member(&mut self) -> PResult<Expr> {
    let mut expr = if self.peek().is_keyword(Keyword::New) {
      self.parse_new()?
    } else {
      self.parse_primary()?
    };

    loop {
      if self.eat(Punct::Dot) {
        let name = self.expect_property_name()?;
        expr = Expr::Member {
          object: Box::new(expr),
          property: MemberKey::Named(name),
          optional: false,
        };
      } else if self.eat(Punct::QuestionDot) {
        expr = match self.peek().kind {
          TokenKind::Punct(Punct::LParen) => Expr::Call {
            callee: Box::new(expr),
            arguments: self.parse_arguments()?,
            optional: true,
          },
          TokenKind::Punct(Punct::LBracket) => {
            self.advance();
            let key = self.parse_expression()?;
            self.expect(Punct::RBracket)?;
            Expr::Member {
              object: Box::new(expr),
              property: MemberKey::Computed(Box::new(key)),
              optional: true,
            }
          }
          _ => Expr::Member {
            object: Box::new(expr),
            property: MemberKey::Named(self.expect_property_name()?),
            optional: true,
          },
        };
      } else if self.eat(Punct::LBracket) {
        let key = self.parse_expression()?;
        self.expect(Punct::RBracket)?;
        expr = Expr::Member {
          object: Box::new(expr),
          property: MemberKey::Computed(Box::new(key)),
          optional: false,
        };
      } else if self.at(Punct::LParen) {
        expr = Expr::Call {
          callee: Box::new(expr),
          arguments: self.parse_arguments()?,
          optional: false,
        };
      } else {
        break;
      }
    }

    Ok(expr)
  }

  fn parse_new(&mut self) -> PResult<Expr> {
    self.nested(Self::new_inner)
  }

  fn new_inner(&mut self) -> PResult<Expr> {
    self.advance();
    let mut callee = if self.peek().is_keyword(Keyword::New) {
      self.parse_new()?
    } else {
      self.parse_primary()?
    };
    loop {
      if self.eat(Punct::Dot) {
        let name = self.expect_property_name()?;
        callee = Expr::Member {
          object: Box::new(callee),
          property: MemberKey::Named(name),
          optional: false,
        };
      } else if self.eat(Punct::LBracket) {
        let key = self.parse_expression()?;
        self.expect(Punct::RBracket)?;
        callee = Expr::Member {
          object: Box::new(callee),
          property: MemberKey::Computed(Box::new(key)),
          optional: false,
        };
      } else {
        break;
      }
    }
    let arguments = if self.at(Punct::LParen) {
      self.parse_arguments()?
    } else {
      Vec::new()
    };
    Ok(Expr::New {
      callee: Box::new(callee),
      arguments,
    })
  }

  fn parse_primary(&mut self) -> PResult<Expr> {
    let token = self.peek().clone();
    match token.kind {
      TokenKind::Number(value) => {
        self.advance();
        Ok(Expr::Number(value))
      }
      TokenKind::String(value) => {
        self.advance();
        Ok(Expr::String(value.into()))
      }
      TokenKind::Template { quasis, holes } => {
        self.advance();
        let mut exprs = Vec::with_capacity(holes.len());
        for hole in &holes {
          let mut parser = Parser::with_base(&hole.source, hole.offset)?;
          parser.in_async = self.in_async;
          parser.depth = self.depth;
          exprs.push(parser.parse_complete_expression()?);
        }
        Ok(Expr::Template {
          quasis: quasis.iter().map(|quasi| Rc::from(quasi.as_str())).collect(),
          exprs,
        })
      }
      TokenKind::Keyword(Keyword::True) => {
        self.advance();
        Ok(Expr::Bool(true))
      }
      TokenKind::Keyword(Keyword::False) => {
        self.advance();
        Ok(Expr::Bool(false))
      }
      TokenKind::Keyword(Keyword::Null) => {
        self.advance();
        Ok(Expr::Null)
      }
      TokenKind::Keyword(Keyword::Function) => {
        self.advance();
        let name = self.eat_ident();
        Ok(Expr::Function(self.parse_function_rest(token.start, name, false)?))
      }
      TokenKind::Ident(ref name)
        if name == "async"
          && self.peek_at(1).is_keyword(Keyword::Function)
          && !self.peek_at(1).newline_before =>
      {
        self.advance();
        self.advance();
        let name = self.eat_ident();
        Ok(Expr::Function(self.parse_function_rest(token.start, name, true)?))
      }
      TokenKind::Ident(name) => {
        self.advance();
        Ok(Expr::Ident(name.into()))
      }
      TokenKind::Punct(Punct::LParen) => {
        self.advance();
        let expr = self.parse_expression()?;
        self.expect(Punct::RParen)?;
        Ok(expr)
      }
      TokenKind::Punct(Punct::LBracket) => self.parse_array(),
      TokenKind::Punct(Punct::LBrace) => self.parse_object(),
      TokenKind::Keyword(
        keyword @ (Keyword::This | Keyword::Class | Keyword::Switch | Keyword::Yield),
      ) => Err(ParseError::new(
        format!("'{}' is not supported", keyword.as_str()),
        token.start,
      )),
      _ => Err(self.unexpected()),
    }
  }

  fn parse_array(&mut self) -> PResult<Expr> {
    self.expect(Punct::LBracket)?;
    let mut items = Vec::new();
    while !self.at(Punct::RBracket) {
      if self.eat(Punct::Comma) {
        items.push(ArrayItem::Hole);
        continue;
      }
      if self.eat(Punct::Ellipsis) {
        items.push(ArrayItem::Spread(self.parse_assignment()?));
      } else {
        items.push(ArrayItem::Expr(self.parse_assignment()?));
      }
      if !self.at(Punct::RBracket) {
        self.expect(Punct::Comma)?;
      }
    }
    self.expect(Punct::RBracket)?;
    Ok(Expr::Array(items))
  }

  fn parse_object(&mut self) -> PResult<Expr> {
    self.expect(Punct::LBrace)?;
    let mut properties = Vec::new();
    while !self.at(Punct::RBrace) {
      if self.eat(Punct::Ellipsis) {
        properties.push(Property::Spread(self.parse_assignment()?));
      } else {
        properties.push(self.parse_property()?);
      }
      if !self.at(Punct::RBrace) {
        self.expect(Punct::Comma)?;
      }
    }
    self.expect(Punct::RBrace)?;
    Ok(Expr::Object(properties))
  }

  /// Property key of an object literal or pattern, and whether it was a
  /// plain identifier.
  fn parse_property_key(&mut self) -> PResult<(Rc<str>, bool)> {
    let key = match &self.peek().kind {
      TokenKind::Ident(name) => (Rc::from(name.as_str()), true),
      TokenKind::Keyword(keyword) => (Rc::from(keyword.as_str()), false),
      TokenKind::String(value) => (Rc::from(value.as_str()), false),
      TokenKind::Number(value) => (Rc::from(number_key(*value).as_str()), false),
      _ => return Err(self.unexpected()),
    };
    self.advance();
    Ok(key)
  }

  fn parse_property(&mut self) -> PResult<Property> {
    let start = self.peek().start;
    let is_async = self.peek().is_ident("async")
      && !matches!(
        self.peek_at(1).kind,
        TokenKind::Punct(Punct::Colon | Punct::LParen | Punct::Comma | Punct::RBrace)
      );
    if is_async {
      self.advance();
    }

    let (key, is_ident) = if self.eat(Punct::LBracket) {
      let key = self.parse_assignment()?;
      self.expect(Punct::RBracket)?;
      (PropertyKey::Computed(key), false)
    } else {
      let (name, is_ident) = self.parse_property_key()?;
      (PropertyKey::Named(name), is_ident)
    };

    if self.at(Punct::LParen) {
      let name = match &key {
        PropertyKey::Named(name) => Some(name.clone()),
        PropertyKey::Computed(_) => None,
      };
      let method = self.parse_function_rest(start, name, is_async)?;
      return Ok(Property::KeyValue {
        key,
        value: Expr::Function(method),
      });
    }
    if is_async {
      return Err(self.unexpected());
    }

    if self.eat(Punct::Colon) {
      let value = self.parse_assignment()?;
      return Ok(Property::KeyValue { key, value });
    }

    match key {
      PropertyKey::Named(name) if is_ident => Ok(Property::KeyValue {
        key: PropertyKey::Named(name.clone()),
        value: Expr::Ident(name),
      }),
      _ => Err(self.unexpected()),
    }
  }
}

fn is_assignable(expr: &Expr) -> bool {
  matches!(
    expr,
    Expr::Ident(_) | Expr::Member { optional: false, .. }
  )
}

fn assign_op(kind: &TokenKind) -> Option<AssignOp> {
  let op = match kind {
    TokenKind::Punct(Punct::Eq) => AssignOp::Assign,
    TokenKind::Punct(Punct::PlusEq) => AssignOp::Add,
    TokenKind::Punct(Punct::MinusEq) => AssignOp::Sub,
    TokenKind::Punct(Punct::StarEq) => AssignOp::Mul,
    TokenKind::Punct(Punct::SlashEq) => AssignOp::Div,
    TokenKind::Punct(Punct::PercentEq) => AssignOp::Rem,
    TokenKind::Punct(Punct::StarStarEq) => AssignOp::Exp,
    TokenKind::Punct(Punct::AmpAmpEq) => AssignOp::And,
    TokenKind::Punct(Punct::PipePipeEq) => AssignOp::Or,
    TokenKind::Punct(Punct::QuestionQuestionEq) => AssignOp::Nullish,
    _ => return None,
  };
  Some(op)
}

fn update_op(punct: Punct) -> UpdateOp {
  match punct {
    Punct::MinusMinus => UpdateOp::Decrement,
    _ => UpdateOp::Increment,
  }
}

fn punct_text(punct: Punct) -> &'static str {
  PUNCTUATORS
    .iter()
    .find(|(_, candidate)| *candidate == punct)
    .map(|(text, _)| *text)
    .unwrap_or("?")
}

fn describe(kind: &TokenKind) -> String {
  match kind {
    TokenKind::Number(_) => "number".to_string(),
    TokenKind::String(_) => "string".to_string(),
    TokenKind::Template { .. } => "template literal".to_string(),
    TokenKind::Ident(name) => format!("identifier '{}'", name),
    TokenKind::Keyword(keyword) => format!("'{}'", keyword.as_str()),
    TokenKind::Punct(punct) => format!("'{}'", punct_text(*punct)),
    TokenKind::Eof => "end of input".to_string(),
  }
}

/// Property name for a numeric key, e.g. `{1: x}` is keyed by `"1"`.
fn number_key(value: f64) -> String {
  if value.fract() == 0.0 && value.abs() < 1e21 {
    format!("{}", value as i64)
  } else {
    value.to_string()
  }
}

pub fn parse_program(source: &str) -> Result<Program, ParseError> {
  Parser::new(source)?.parse_program()
}

pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
  Parser::new(source)?.parse_complete_expression()
}

pub fn parse_script(source: &str) -> Result<Script, ParseError> {
  parse_script_at(source, 0)
}

/// Parse a script that starts `base` bytes into its binding text.
///
/// The source is tried as a single expression first, then as a statement
/// list. When both fail, the error that got further into the source wins.
pub fn parse_script_at(source: &str, base: usize) -> Result<Script, ParseError> {
  let expression_error = match Parser::with_base(source, base)?.parse_complete_expression() {
    Ok(expr) => return Ok(Script::Expression(expr)),
    Err(err) => err,
  };
  match Parser::with_base(source, base)?.parse_program() {
    Ok(program) => Ok(Script::Program(program)),
    Err(program_error) if expression_error.offset > program_error.offset => Err(expression_error),
    Err(program_error) => Err(program_error),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_precedence() {
    let expr = parse_expression("1 + 2 * 3").unwrap();
    match expr {
      Expr::Binary {
        op: BinaryOp::Add,
        right,
        ..
      } => assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. })),
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn test_exponent_is_right_associative() {
    let expr = parse_expression("2 ** 3 ** 2").unwrap();
    match expr {
      Expr::Binary {
        op: BinaryOp::Exp,
        left,
        right,
      } => {
        assert_eq!(*left, Expr::Number(2.0));
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Exp, .. }));
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn test_arrow_detection() {
    assert!(matches!(parse_expression("(a, b) => a + b").unwrap(), Expr::Function(f) if f.is_arrow && f.params.len() == 2));
    assert!(matches!(parse_expression("x => x").unwrap(), Expr::Function(f) if f.is_arrow));
    assert!(matches!(parse_expression("async () => 1").unwrap(), Expr::Function(f) if f.is_async));
    assert!(matches!(parse_expression("(a, b)").unwrap(), Expr::Sequence(items) if items.len() == 2));
  }

  #[test]
  fn test_function_source_is_captured() {
    let expr = parse_expression("setInterval(() => { count++ }, 100)").unwrap();
    let Expr::Call { arguments, .. } = expr else {
      panic!("expected call");
    };
    let Expr::Function(callback) = arguments[0].expr() else {
      panic!("expected function");
    };
    assert_eq!(&*callback.source, "() => { count++ }");
  }

  #[test]
  fn test_await_outside_async_function() {
    assert!(parse_program("await Api1.run()").is_ok());
    assert!(parse_program("async function f() { await g() }").is_ok());
    let err = parse_program("function f() { await g() }").unwrap_err();
    assert!(err.message.contains("await"));
  }

  #[test]
  fn test_asi() {
    let program = parse_program("let a = 1\nlet b = 2\na + b").unwrap();
    assert_eq!(program.body.len(), 3);
    assert!(parse_program("let a = 1 let b = 2").is_err());
  }

  #[test]
  fn test_return_without_value_on_newline() {
    let program = parse_program("return\n1").unwrap();
    assert_eq!(program.body[0], Stmt::Return(None));
  }

  #[test]
  fn test_script_prefers_expression() {
    assert!(matches!(parse_script("{a: 1}").unwrap(), Script::Expression(Expr::Object(_))));
    assert!(matches!(parse_script("a(); b()").unwrap(), Script::Program(p) if p.body.len() == 2));
    assert!(matches!(parse_script("   ").unwrap(), Script::Program(p) if p.body.is_empty()));
  }

  #[test]
  fn test_template_offsets() {
    let err = parse_script_at("`a ${ + }`", 10).unwrap_err();
    assert_eq!(err.offset, 18);
  }

  #[test]
  fn test_invalid_assignment_target() {
    assert!(parse_expression("1 = 2").is_err());
    assert!(parse_expression("a?.b = 2").is_err());
    assert!(parse_expression("a.b = 2").is_ok());
  }

  #[test]
  fn test_nesting_limit() {
    let within = format!("{}1{}", "(".repeat(32), ")".repeat(32));
    assert!(parse_expression(&within).is_ok());

    let parens = format!("{}1{}", "(".repeat(3_000), ")".repeat(3_000));
    let err = parse_expression(&parens).unwrap_err();
    assert_eq!(err.message, "too much nesting");

    let blocks = format!("{}{}", "{".repeat(3_000), "}".repeat(3_000));
    assert!(parse_program(&blocks).is_err());
    assert!(parse_expression(&"!".repeat(3_000)).is_err());
    let templates = format!("{}1{}", "`${".repeat(200), "}`".repeat(200));
    assert!(parse_expression(&templates).is_err());
  }
}
