//! Token types produced by the lexer.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
  Var,
  Let,
  Const,
  Function,
  Return,
  If,
  Else,
  For,
  While,
  Do,
  Break,
  Continue,
  Throw,
  Try,
  Catch,
  Finally,
  New,
  TypeOf,
  Void,
  Delete,
  In,
  InstanceOf,
  True,
  False,
  Null,
  Await,
  This,
  Class,
  Switch,
  Yield,
}

impl Keyword {
  pub fn from_ident(ident: &str) -> Option<Self> {
    let keyword = match ident {
      "var" => Keyword::Var,
      "let" => Keyword::Let,
      "const" => Keyword::Const,
      "function" => Keyword::Function,
      "return" => Keyword::Return,
      "if" => Keyword::If,
      "else" => Keyword::Else,
      "for" => Keyword::For,
      "while" => Keyword::While,
      "do" => Keyword::Do,
      "break" => Keyword::Break,
      "continue" => Keyword::Continue,
      "throw" => Keyword::Throw,
      "try" => Keyword::Try,
      "catch" => Keyword::Catch,
      "finally" => Keyword::Finally,
      "new" => Keyword::New,
      "typeof" => Keyword::TypeOf,
      "void" => Keyword::Void,
      "delete" => Keyword::Delete,
      "in" => Keyword::In,
      "instanceof" => Keyword::InstanceOf,
      "true" => Keyword::True,
      "false" => Keyword::False,
      "null" => Keyword::Null,
      "await" => Keyword::Await,
      "this" => Keyword::This,
      "class" => Keyword::Class,
      "switch" => Keyword::Switch,
      "yield" => Keyword::Yield,
      _ => return None,
    };
    Some(keyword)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Keyword::Var => "var",
      Keyword::Let => "let",
      Keyword::Const => "const",
      Keyword::Function => "function",
      Keyword::Return => "return",
      Keyword::If => "if",
      Keyword::Else => "else",
      Keyword::For => "for",
      Keyword::While => "while",
      Keyword::Do => "do",
      Keyword::Break => "break",
      Keyword::Continue => "continue",
      Keyword::Throw => "throw",
      Keyword::Try => "try",
      Keyword::Catch => "catch",
      Keyword::Finally => "finally",
      Keyword::New => "new",
      Keyword::TypeOf => "typeof",
      Keyword::Void => "void",
      Keyword::Delete => "delete",
      Keyword::In => "in",
      Keyword::InstanceOf => "instanceof",
      Keyword::True => "true",
      Keyword::False => "false",
      Keyword::Null => "null",
      Keyword::Await => "await",
      Keyword::This => "this",
      Keyword::Class => "class",
      Keyword::Switch => "switch",
      Keyword::Yield => "yield",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
  LBrace,
  RBrace,
  LParen,
  RParen,
  LBracket,
  RBracket,
  Semi,
  Comma,
  Dot,
  QuestionDot,
  Ellipsis,
  Lt,
  Gt,
  LtEq,
  GtEq,
  EqEq,
  NotEq,
  EqEqEq,
  NotEqEq,
  Plus,
  Minus,
  Star,
  Slash,
  Percent,
  StarStar,
  PlusPlus,
  MinusMinus,
  Bang,
  AmpAmp,
  PipePipe,
  QuestionQuestion,
  Question,
  Colon,
  Eq,
  PlusEq,
  MinusEq,
  StarEq,
  SlashEq,
  PercentEq,
  StarStarEq,
  AmpAmpEq,
  PipePipeEq,
  QuestionQuestionEq,
  Arrow,
}

/// Punctuators ordered so that longer spellings are tried first.
pub(crate) const PUNCTUATORS: &[(&str, Punct)] = &[
  ("...", Punct::Ellipsis),
  ("===", Punct::EqEqEq),
  ("!==", Punct::NotEqEq),
  ("**=", Punct::StarStarEq),
  ("&&=", Punct::AmpAmpEq),
  ("||=", Punct::PipePipeEq),
  ("??=", Punct::QuestionQuestionEq),
  ("=>", Punct::Arrow),
  ("==", Punct::EqEq),
  ("!=", Punct::NotEq),
  ("<=", Punct::LtEq),
  (">=", Punct::GtEq),
  ("&&", Punct::AmpAmp),
  ("||", Punct::PipePipe),
  ("??", Punct::QuestionQuestion),
  ("?.", Punct::QuestionDot),
  ("++", Punct::PlusPlus),
  ("--", Punct::MinusMinus),
  ("+=", Punct::PlusEq),
  ("-=", Punct::MinusEq),
  ("*=", Punct::StarEq),
  ("/=", Punct::SlashEq),
  ("%=", Punct::PercentEq),
  ("**", Punct::StarStar),
  ("{", Punct::LBrace),
  ("}", Punct::RBrace),
  ("(", Punct::LParen),
  (")", Punct::RParen),
  ("[", Punct::LBracket),
  ("]", Punct::RBracket),
  (";", Punct::Semi),
  (",", Punct::Comma),
  (".", Punct::Dot),
  ("<", Punct::Lt),
  (">", Punct::Gt),
  ("+", Punct::Plus),
  ("-", Punct::Minus),
  ("*", Punct::Star),
  ("/", Punct::Slash),
  ("%", Punct::Percent),
  ("!", Punct::Bang),
  ("?", Punct::Question),
  (":", Punct::Colon),
  ("=", Punct::Eq),
];

/// One raw `${ ... }` hole of a template literal.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateHole {
  pub source: String,
  /// Absolute offset of `source` in the original text.
  pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
  Number(f64),
  String(String),
  Template {
    quasis: Vec<String>,
    holes: Vec<TemplateHole>,
  },
  Ident(String),
  Keyword(Keyword),
  Punct(Punct),
  Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
  pub kind: TokenKind,
  pub start: usize,
  pub end: usize,
  /// Whether a line terminator appeared between the previous token and this one.
  pub newline_before: bool,
}

impl Token {
  pub fn is_punct(&self, punct: Punct) -> bool {
    self.kind == TokenKind::Punct(punct)
  }

  pub fn is_keyword(&self, keyword: Keyword) -> bool {
    self.kind == TokenKind::Keyword(keyword)
  }

  /// Whether this token is the identifier `name` (used for contextual words
  /// such as `async` and `of`).
  pub fn is_ident(&self, name: &str) -> bool {
    matches!(&self.kind, TokenKind::Ident(ident) if ident == name)
  }
}
