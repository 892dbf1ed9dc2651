//! Named mesh regions selected by coordinate expressions.
//!
//! Selectors:
//! - `all`
//! - `vertices in <expr>`, a vertex region, e.g. `vertices in (x < 0.001) | (x > 0.999)`
//! - `cells in <expr>`, a cell region of the cells whose centre matches
//!
//! `&` binds tighter than `|`.

use super::{
  mesh::{CellIdx, LineMesh, VertexIdx},
  FemError, FemResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
  /// Carries cells, so fields and terms can live on it.
  Cell,
  /// Vertices only, used for essential boundary conditions.
  Vertex,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Region {
  pub name: String,
  pub kind: RegionKind,
  /// Sorted.
  pub vertices: Vec<VertexIdx>,
  /// Sorted, empty for vertex regions.
  pub cells: Vec<CellIdx>,
}

impl Region {
  pub fn new(name: impl Into<String>, selector: &str, mesh: &LineMesh) -> FemResult<Self> {
    let name = name.into();
    let trimmed = selector.trim();

    let (kind, vertices, cells) = if trimmed == "all" {
      (
        RegionKind::Cell,
        (0..mesh.nvertices()).collect(),
        (0..mesh.ncells()).collect(),
      )
    } else if let Some(expr) = trimmed.strip_prefix("vertices in") {
      let expr = Expr::parse(expr, selector)?;
      let vertices: Vec<_> = (0..mesh.nvertices())
        .filter(|&ivertex| expr.eval(mesh.coor(ivertex)))
        .collect();
      (RegionKind::Vertex, vertices, Vec::new())
    } else if let Some(expr) = trimmed.strip_prefix("cells in") {
      let expr = Expr::parse(expr, selector)?;
      let cells: Vec<_> = (0..mesh.ncells())
        .filter(|&icell| expr.eval(mesh.cell(icell).centre()))
        .collect();
      let mut vertices: Vec<_> = cells.iter().flat_map(|&icell| [icell, icell + 1]).collect();
      vertices.dedup();
      (RegionKind::Cell, vertices, cells)
    } else {
      return Err(FemError::parse(
        selector,
        "expected `all`, `vertices in ...` or `cells in ...`",
      ));
    };

    if vertices.is_empty() {
      return Err(FemError::EmptyRegion(name));
    }
    Ok(Self {
      name,
      kind,
      vertices,
      cells,
    })
  }

  pub fn volume(&self, mesh: &LineMesh) -> f64 {
    self.cells.iter().map(|&icell| mesh.cell(icell).vol()).sum()
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
  Lt,
  Le,
  Gt,
  Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
  Cmp(CmpOp, f64),
  And(Box<Expr>, Box<Expr>),
  Or(Box<Expr>, Box<Expr>),
}

impl Expr {
  fn parse(input: &str, selector: &str) -> FemResult<Self> {
    let tokens = tokenize(input, selector)?;
    let mut parser = Parser {
      tokens: &tokens,
      pos: 0,
      selector,
    };
    let expr = parser.or_expr()?;
    if parser.pos != tokens.len() {
      return Err(FemError::parse(selector, "trailing input"));
    }
    Ok(expr)
  }

  fn eval(&self, x: f64) -> bool {
    match self {
      Self::Cmp(op, value) => match op {
        CmpOp::Lt => x < *value,
        CmpOp::Le => x <= *value,
        CmpOp::Gt => x > *value,
        CmpOp::Ge => x >= *value,
      },
      Self::And(a, b) => a.eval(x) && b.eval(x),
      Self::Or(a, b) => a.eval(x) || b.eval(x),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
  Open,
  Close,
  And,
  Or,
  X,
  Op(CmpOp),
  Number(f64),
}

fn tokenize(input: &str, selector: &str) -> FemResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let mut chars = input.char_indices().peekable();
  while let Some((start, c)) = chars.next() {
    let token = match c {
      c if c.is_whitespace() => continue,
      '(' => Token::Open,
      ')' => Token::Close,
      '&' => Token::And,
      '|' => Token::Or,
      'x' => Token::X,
      '<' | '>' => {
        let or_equal = chars.next_if(|&(_, c)| c == '=').is_some();
        Token::Op(match (c, or_equal) {
          ('<', false) => CmpOp::Lt,
          ('<', true) => CmpOp::Le,
          ('>', false) => CmpOp::Gt,
          _ => CmpOp::Ge,
        })
      }
      c if c.is_ascii_digit() || c == '.' || c == '-' || c == '+' => {
        let mut end = start + c.len_utf8();
        while let Some((i, c)) = chars.next_if(|&(_, c)| c.is_ascii_digit() || "+-.eE".contains(c)) {
          end = i + c.len_utf8();
        }
        let literal = &input[start..end];
        let value = literal
          .parse()
          .map_err(|_| FemError::parse(selector, format!("invalid number `{literal}`")))?;
        Token::Number(value)
      }
      c => return Err(FemError::parse(selector, format!("unexpected `{c}`"))),
    };
    tokens.push(token);
  }
  Ok(tokens)
}

struct Parser<'a> {
  tokens: &'a [Token],
  pos: usize,
  selector: &'a str,
}

impl Parser<'_> {
  fn next(&mut self) -> Option<Token> {
    let token = self.tokens.get(self.pos).copied();
    self.pos += 1;
    token
  }

  fn eat(&mut self, token: Token) -> bool {
    let found = self.tokens.get(self.pos) == Some(&token);
    if found {
      self.pos += 1;
    }
    found
  }

  fn or_expr(&mut self) -> FemResult<Expr> {
    let mut expr = self.and_expr()?;
    while self.eat(Token::Or) {
      expr = Expr::Or(Box::new(expr), Box::new(self.and_expr()?));
    }
    Ok(expr)
  }

  fn and_expr(&mut self) -> FemResult<Expr> {
    let mut expr = self.atom()?;
    while self.eat(Token::And) {
      expr = Expr::And(Box::new(expr), Box::new(self.atom()?));
    }
    Ok(expr)
  }

  fn atom(&mut self) -> FemResult<Expr> {
    match self.next() {
      Some(Token::Open) => {
        let expr = self.or_expr()?;
        if !self.eat(Token::Close) {
          return Err(FemError::parse(self.selector, "missing `)`"));
        }
        Ok(expr)
      }
      Some(Token::X) => match (self.next(), self.next()) {
        (Some(Token::Op(op)), Some(Token::Number(value))) => Ok(Expr::Cmp(op, value)),
        _ => Err(FemError::parse(self.selector, "expected `x <op> <number>`")),
      },
      _ => Err(FemError::parse(self.selector, "expected `(` or `x`")),
    }
  }
}
