//! Syntax tree for the dynamic-script language.
//!
//! Function nodes are reference counted so closures created at runtime can
//! hold on to their body without borrowing the whole program.

use std::rc::Rc;

/// A parsed script: either a single expression or a statement block.
#[derive(Debug, Clone, PartialEq)]
pub enum Script {
  Expression(Expr),
  Program(Program),
}

/// A sequence of top-level statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
  pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
  Var,
  Let,
  Const,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
  Expr(Expr),
  Declaration {
    kind: DeclKind,
    declarators: Vec<Declarator>,
  },
  Function(Rc<Function>),
  Return(Option<Expr>),
  If {
    test: Expr,
    consequent: Box<Stmt>,
    alternate: Option<Box<Stmt>>,
  },
  Block(Vec<Stmt>),
  For {
    init: Option<Box<Stmt>>,
    test: Option<Expr>,
    update: Option<Expr>,
    body: Box<Stmt>,
  },
  ForOf {
    kind: DeclKind,
    pattern: Pattern,
    iterable: Expr,
    body: Box<Stmt>,
  },
  ForIn {
    kind: DeclKind,
    pattern: Pattern,
    object: Expr,
    body: Box<Stmt>,
  },
  While {
    test: Expr,
    body: Box<Stmt>,
  },
  DoWhile {
    body: Box<Stmt>,
    test: Expr,
  },
  Break,
  Continue,
  Throw(Expr),
  Try {
    block: Vec<Stmt>,
    handler: Option<CatchClause>,
    finalizer: Option<Vec<Stmt>>,
  },
  Empty,
}

impl Stmt {
  /// Whether this statement is a loop of any kind.
  pub fn is_loop(&self) -> bool {
    matches!(
      self,
      Stmt::For { .. } | Stmt::ForOf { .. } | Stmt::ForIn { .. } | Stmt::While { .. } | Stmt::DoWhile { .. }
    )
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
  pub pattern: Pattern,
  pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
  pub param: Option<Pattern>,
  pub body: Vec<Stmt>,
}

/// Binding target for declarations, parameters and loop heads.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
  Ident(Rc<str>),
  Object {
    properties: Vec<PatternProperty>,
    rest: Option<Rc<str>>,
  },
  Array {
    elements: Vec<Option<PatternElement>>,
    rest: Option<Box<Pattern>>,
  },
}

impl Pattern {
  /// Every identifier this pattern binds, in source order.
  pub fn bound_names(&self) -> Vec<Rc<str>> {
    let mut names = Vec::new();
    self.collect_names(&mut names);
    names
  }

  fn collect_names(&self, names: &mut Vec<Rc<str>>) {
    match self {
      Pattern::Ident(name) => names.push(name.clone()),
      Pattern::Object { properties, rest } => {
        for property in properties {
          property.value.collect_names(names);
        }
        if let Some(rest) = rest {
          names.push(rest.clone());
        }
      }
      Pattern::Array { elements, rest } => {
        for element in elements.iter().flatten() {
          element.pattern.collect_names(names);
        }
        if let Some(rest) = rest {
          rest.collect_names(names);
        }
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternProperty {
  pub key: Rc<str>,
  pub value: Pattern,
  pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternElement {
  pub pattern: Pattern,
  pub default: Option<Expr>,
}

/// A function, arrow function or method.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
  pub name: Option<Rc<str>>,
  pub params: Vec<Param>,
  pub body: FunctionBody,
  pub is_async: bool,
  pub is_arrow: bool,
  /// Exact source text of the function, used when the function itself has
  /// to cross the channel (interval callbacks).
  pub source: Rc<str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
  pub pattern: Pattern,
  pub default: Option<Expr>,
  pub rest: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
  Expression(Box<Expr>),
  Block(Vec<Stmt>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
  Not,
  Negate,
  Plus,
  TypeOf,
  Void,
  Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
  Increment,
  Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  Exp,
  Eq,
  NotEq,
  StrictEq,
  StrictNotEq,
  Lt,
  Gt,
  LtEq,
  GtEq,
  In,
  InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
  And,
  Or,
  Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
  Assign,
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  Exp,
  And,
  Or,
  Nullish,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberKey {
  Named(Rc<str>),
  Computed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayItem {
  Expr(Expr),
  Spread(Expr),
  Hole,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
  Expr(Expr),
  Spread(Expr),
}

impl Argument {
  pub fn expr(&self) -> &Expr {
    match self {
      Argument::Expr(expr) | Argument::Spread(expr) => expr,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
  Named(Rc<str>),
  Computed(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
  KeyValue { key: PropertyKey, value: Expr },
  Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Number(f64),
  String(Rc<str>),
  Template {
    quasis: Vec<Rc<str>>,
    exprs: Vec<Expr>,
  },
  Bool(bool),
  Null,
  Ident(Rc<str>),
  Array(Vec<ArrayItem>),
  Object(Vec<Property>),
  Function(Rc<Function>),
  Unary {
    op: UnaryOp,
    argument: Box<Expr>,
  },
  Update {
    op: UpdateOp,
    prefix: bool,
    target: Box<Expr>,
  },
  Binary {
    op: BinaryOp,
    left: Box<Expr>,
    right: Box<Expr>,
  },
  Logical {
    op: LogicalOp,
    left: Box<Expr>,
    right: Box<Expr>,
  },
  Conditional {
    test: Box<Expr>,
    consequent: Box<Expr>,
    alternate: Box<Expr>,
  },
  Assign {
    op: AssignOp,
    target: Box<Expr>,
    value: Box<Expr>,
  },
  Member {
    object: Box<Expr>,
    property: MemberKey,
    optional: bool,
  },
  Call {
    callee: Box<Expr>,
    arguments: Vec<Argument>,
    optional: bool,
  },
  New {
    callee: Box<Expr>,
    arguments: Vec<Argument>,
  },
  Await(Box<Expr>),
  Sequence(Vec<Expr>),
}

impl Expr {
  /// Name of the property for `a.b` style member expressions.
  pub fn member_name(&self) -> Option<&str> {
    match self {
      Expr::Member {
        property: MemberKey::Named(name),
        ..
      } => Some(name),
      _ => None,
    }
  }
}
