//! Lexer for the dynamic-script language.
//!
//! `/` is always lexed as division; regular expression literals are not part
//! of the language.

use crate::error::ParseError;
use crate::token::{Keyword, PUNCTUATORS, Punct, TemplateHole, Token, TokenKind};

pub struct Lexer<'a> {
  src: &'a str,
  pos: usize,
  /// Offset of `src` inside the text the caller cares about.
  base: usize,
}

impl<'a> Lexer<'a> {
  pub fn new(src: &'a str) -> Self {
    Self::with_base(src, 0)
  }

  /// Lex a fragment that starts `base` bytes into a larger text, so that
  /// reported offsets stay meaningful.
  pub fn with_base(src: &'a str, base: usize) -> Self {
    Self { src, pos: 0, base }
  }

  /// Lex the whole input. The last token is always [`TokenKind::Eof`].
  pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    loop {
      let newline_before = self.skip_trivia()?;
      let start = self.pos;
      let Some(c) = self.peek() else {
        tokens.push(Token {
          kind: TokenKind::Eof,
          start: self.base + start,
          end: self.base + start,
          newline_before,
        });
        return Ok(tokens);
      };

      let kind = if is_ident_start(c) {
        self.lex_word()
      } else if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
        self.lex_number()?
      } else if c == '"' || c == '\'' {
        self.lex_string(c)?
      } else if c == '`' {
        self.lex_template()?
      } else {
        self.lex_punct()?
      };

      tokens.push(Token {
        kind,
        start: self.base + start,
        end: self.base + self.pos,
        newline_before,
      });
    }
  }

  fn peek(&self) -> Option<char> {
    self.src[self.pos..].chars().next()
  }

  fn peek_at(&self, n: usize) -> Option<char> {
    self.src[self.pos..].chars().nth(n)
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.pos += c.len_utf8();
    Some(c)
  }

  fn error(&self, message: impl Into<String>) -> ParseError {
    ParseError::new(message, self.base + self.pos)
  }

  /// Skip whitespace and comments. Returns whether a line terminator was seen.
  fn skip_trivia(&mut self) -> Result<bool, ParseError> {
    let mut newline = false;
    loop {
      match self.peek() {
        Some(c) if is_line_terminator(c) => {
          newline = true;
          self.bump();
        }
        Some(c) if c.is_whitespace() => {
          self.bump();
        }
        Some('/') if self.peek_at(1) == Some('/') => {
          while let Some(c) = self.peek() {
            if is_line_terminator(c) {
              break;
            }
            self.bump();
          }
        }
        Some('/') if self.peek_at(1) == Some('*') => {
          let start = self.pos;
          self.pos += 2;
          match self.src[self.pos..].find("*/") {
            Some(end) => {
              if self.src[self.pos..self.pos + end].chars().any(is_line_terminator) {
                newline = true;
              }
              self.pos += end + 2;
            }
            None => {
              return Err(ParseError::new("unterminated comment", self.base + start));
            }
          }
        }
        _ => return Ok(newline),
      }
    }
  }

  fn lex_word(&mut self) -> TokenKind {
    let start = self.pos;
    while let Some(c) = self.peek() {
      if !is_ident_part(c) {
        break;
      }
      self.bump();
    }
    let word = &self.src[start..self.pos];
    match Keyword::from_ident(word) {
      Some(keyword) => TokenKind::Keyword(keyword),
      None => TokenKind::Ident(word.to_string()),
    }
  }

  fn lex_number(&mut self) -> Result<TokenKind, ParseError> {
    let start = self.pos;

    if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
      self.pos += 2;
      let digits_start = self.pos;
      while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
        self.bump();
      }
      let digits = &self.src[digits_start..self.pos];
      return u64::from_str_radix(digits, 16)
        .map(|n| TokenKind::Number(n as f64))
        .map_err(|_| ParseError::new("invalid hexadecimal literal", self.base + start));
    }

    while self.peek().is_some_and(|c| c.is_ascii_digit()) {
      self.bump();
    }
    if self.peek() == Some('.') {
      self.bump();
      while self.peek().is_some_and(|c| c.is_ascii_digit()) {
        self.bump();
      }
    }
    if matches!(self.peek(), Some('e' | 'E')) {
      let checkpoint = self.pos;
      self.bump();
      if matches!(self.peek(), Some('+' | '-')) {
        self.bump();
      }
      if self.peek().is_some_and(|c| c.is_ascii_digit()) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
          self.bump();
        }
      } else {
        self.pos = checkpoint;
      }
    }
    if self.peek().is_some_and(is_ident_start) {
      return Err(self.error("identifier starts immediately after numeric literal"));
    }

    self.src[start..self.pos]
      .parse::<f64>()
      .map(TokenKind::Number)
      .map_err(|_| ParseError::new("invalid numeric literal", self.base + start))
  }

  fn lex_string(&mut self, quote: char) -> Result<TokenKind, ParseError> {
    let start = self.pos;
    self.bump();
    let mut value = String::new();
    loop {
      match self.bump() {
        None => return Err(ParseError::new("unterminated string literal", self.base + start)),
        Some(c) if c == quote => return Ok(TokenKind::String(value)),
        Some('\\') => self.lex_escape(&mut value)?,
        Some(c) if is_line_terminator(c) => {
          return Err(ParseError::new("unterminated string literal", self.base + start));
        }
        Some(c) => value.push(c),
      }
    }
  }

  /// Decode one escape sequence; the backslash has already been consumed.
  fn lex_escape(&mut self, out: &mut String) -> Result<(), ParseError> {
    let Some(c) = self.bump() else {
      return Err(self.error("unterminated escape sequence"));
    };
    match c {
      'n' => out.push('\n'),
      'r' => out.push('\r'),
      't' => out.push('\t'),
      'b' => out.push('\u{8}'),
      'f' => out.push('\u{c}'),
      'v' => out.push('\u{b}'),
      '0' => out.push('\0'),
      'x' => {
        let code = self.lex_hex_digits(2)?;
        out.push(char::from_u32(code).ok_or_else(|| self.error("invalid escape"))?);
      }
      'u' => {
        let code = if self.peek() == Some('{') {
          self.bump();
          let start = self.pos;
          while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
            self.bump();
          }
          let code = u32::from_str_radix(&self.src[start..self.pos], 16)
            .map_err(|_| self.error("invalid unicode escape"))?;
          if self.bump() != Some('}') {
            return Err(self.error("invalid unicode escape"));
          }
          code
        } else {
          self.lex_hex_digits(4)?
        };
        out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
      }
      '\r' => {
        if self.peek() == Some('\n') {
          self.bump();
        }
      }
      c if is_line_terminator(c) => {}
      other => out.push(other),
    }
    Ok(())
  }

  fn lex_hex_digits(&mut self, count: usize) -> Result<u32, ParseError> {
    let start = self.pos;
    for _ in 0..count {
      match self.bump() {
        Some(c) if c.is_ascii_hexdigit() => {}
        _ => return Err(ParseError::new("invalid hexadecimal escape", self.base + start)),
      }
    }
    u32::from_str_radix(&self.src[start..self.pos], 16)
      .map_err(|_| ParseError::new("invalid hexadecimal escape", self.base + start))
  }

  fn lex_template(&mut self) -> Result<TokenKind, ParseError> {
    let start = self.pos;
    self.bump();
    let mut quasis = Vec::new();
    let mut holes = Vec::new();
    let mut current = String::new();

    loop {
      match self.bump() {
        None => return Err(ParseError::new("unterminated template literal", self.base + start)),
        Some('`') => {
          quasis.push(current);
          return Ok(TokenKind::Template { quasis, holes });
        }
        Some('\\') => self.lex_escape(&mut current)?,
        Some('$') if self.peek() == Some('{') => {
          self.bump();
          quasis.push(std::mem::take(&mut current));
          let hole_start = self.pos;
          let hole_end = self.scan_template_hole(hole_start)?;
          holes.push(TemplateHole {
            source: self.src[hole_start..hole_end].to_string(),
            offset: self.base + hole_start,
          });
          // skip the closing brace
          self.pos = hole_end + 1;
        }
        Some(c) => current.push(c),
      }
    }
  }

  /// Find the `}` closing a `${` hole, skipping nested braces and quoted text.
  fn scan_template_hole(&self, from: usize) -> Result<usize, ParseError> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in self.src[from..].char_indices() {
      if let Some(q) = quote {
        if escaped {
          escaped = false;
        } else if c == '\\' {
          escaped = true;
        } else if c == q {
          quote = None;
        }
        continue;
      }
      match c {
        '"' | '\'' | '`' => quote = Some(c),
        '{' => depth += 1,
        '}' if depth == 0 => return Ok(from + i),
        '}' => depth -= 1,
        _ => {}
      }
    }

    Err(ParseError::new(
      "unterminated template expression",
      self.base + from,
    ))
  }

  fn lex_punct(&mut self) -> Result<TokenKind, ParseError> {
    let rest = &self.src[self.pos..];
    for (text, punct) in PUNCTUATORS {
      if !rest.starts_with(text) {
        continue;
      }
      // `a?.5:b` is a conditional, not optional chaining
      if *punct == Punct::QuestionDot
        && rest[2..].chars().next().is_some_and(|c| c.is_ascii_digit())
      {
        continue;
      }
      self.pos += text.len();
      return Ok(TokenKind::Punct(*punct));
    }
    let c = self.peek().unwrap_or_default();
    Err(self.error(format!("unexpected character '{}'", c)))
  }
}

fn is_ident_start(c: char) -> bool {
  c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
  c.is_alphanumeric() || c == '_' || c == '$'
}

fn is_line_terminator(c: char) -> bool {
  matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(src: &str) -> Vec<TokenKind> {
    Lexer::new(src)
      .tokenize()
      .unwrap()
      .into_iter()
      .map(|t| t.kind)
      .collect()
  }

  #[test]
  fn test_numbers_and_operators() {
    assert_eq!(
      kinds("1 + 2.5e1 * 0x10"),
      vec![
        TokenKind::Number(1.0),
        TokenKind::Punct(Punct::Plus),
        TokenKind::Number(25.0),
        TokenKind::Punct(Punct::Star),
        TokenKind::Number(16.0),
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn test_string_escapes() {
    assert_eq!(
      kinds(r#"'it\'s' "a\nb" '\u0041'"#),
      vec![
        TokenKind::String("it's".to_string()),
        TokenKind::String("a\nb".to_string()),
        TokenKind::String("A".to_string()),
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn test_optional_chaining_vs_conditional() {
    assert_eq!(
      kinds("a?.b"),
      vec![
        TokenKind::Ident("a".to_string()),
        TokenKind::Punct(Punct::QuestionDot),
        TokenKind::Ident("b".to_string()),
        TokenKind::Eof,
      ]
    );
    assert_eq!(
      kinds("a?.5:1"),
      vec![
        TokenKind::Ident("a".to_string()),
        TokenKind::Punct(Punct::Question),
        TokenKind::Number(0.5),
        TokenKind::Punct(Punct::Colon),
        TokenKind::Number(1.0),
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn test_template_holes() {
    let tokens = Lexer::new("`Winner: ${res.args.name}!`").tokenize().unwrap();
    match &tokens[0].kind {
      TokenKind::Template { quasis, holes } => {
        assert_eq!(quasis, &vec!["Winner: ".to_string(), "!".to_string()]);
        assert_eq!(holes.len(), 1);
        assert_eq!(holes[0].source, "res.args.name");
        assert_eq!(holes[0].offset, 11);
      }
      other => panic!("expected template, got {:?}", other),
    }
  }

  #[test]
  fn test_newline_tracking() {
    let tokens = Lexer::new("a\n// comment\nb /* x */ c").tokenize().unwrap();
    assert!(!tokens[0].newline_before);
    assert!(tokens[1].newline_before);
    assert!(!tokens[2].newline_before);
  }

  #[test]
  fn test_unterminated_string() {
    let err = Lexer::new("'abc").tokenize().unwrap_err();
    assert_eq!(err.offset, 0);
  }

  #[test]
  fn test_unexpected_character() {
    assert!(Lexer::new("a # b").tokenize().is_err());
  }
}
