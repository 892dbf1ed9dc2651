//! Equation and expression strings.
//!
//! A term reads `name.integral.region(args)`. Terms are joined by `+` or `-`
//! and may carry a numeric factor (`2 * dw_...`). An equation has two sides
//! separated by `=`, either of which may be `0`.

use super::{FemError, FemResult};

use itertools::Itertools;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
  /// `dw_laplace(mat.p, v, u)`: $integral p grad v dot grad u$
  Laplace,
  /// `dw_volume_dot([mat.p,] v, u)`: $integral p v u$
  VolumeDot,
  /// `dw_volume_lvf(mat.p, v)`: $integral p v$
  VolumeLvf,
  /// `ev_volume(u)`: measure of the region
  EvVolume,
  /// `ev_integrate([mat.p,] u)`: $integral p u$
  EvIntegrate,
}

impl TermKind {
  pub fn from_name(name: &str) -> FemResult<Self> {
    Ok(match name {
      "dw_laplace" => Self::Laplace,
      "dw_volume_dot" | "dw_dot" => Self::VolumeDot,
      "dw_volume_lvf" => Self::VolumeLvf,
      "ev_volume" => Self::EvVolume,
      "ev_integrate" | "ev_volume_integrate" => Self::EvIntegrate,
      _ => return Err(FemError::UnsupportedTerm(name.to_string())),
    })
  }

  /// `(material, number of variables)`, `None` for an optional material.
  fn signature(self) -> (Option<bool>, usize) {
    match self {
      Self::Laplace => (Some(true), 2),
      Self::VolumeDot => (None, 2),
      Self::VolumeLvf => (Some(true), 1),
      Self::EvVolume => (Some(false), 1),
      Self::EvIntegrate => (None, 1),
    }
  }

  pub fn is_evaluation_only(self) -> bool {
    matches!(self, Self::EvVolume | Self::EvIntegrate)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialRef {
  pub material: String,
  pub param: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Term {
  pub name: String,
  pub kind: TermKind,
  /// Sign and numeric factor; terms of an equation's right side are negated.
  pub factor: f64,
  pub integral: String,
  pub region: String,
  pub material: Option<MaterialRef>,
  pub vars: Vec<String>,
}

impl Term {
  fn parse(factor: f64, head: &str, args: &str, input: &str) -> FemResult<Self> {
    let Some((name, integral, region)) = head.split('.').map(str::trim).collect_tuple() else {
      return Err(FemError::parse(input, format!("`{head}` is not `name.integral.region`")));
    };
    let kind = TermKind::from_name(name)?;

    let mut args: Vec<&str> = args.split(',').map(str::trim).collect();
    if args.iter().any(|a| a.is_empty()) {
      return Err(FemError::parse(input, format!("empty argument in `{name}`")));
    }

    let material = match args.first().and_then(|a| a.split_once('.')) {
      Some((material, param)) => {
        let material = MaterialRef {
          material: material.to_string(),
          param: param.to_string(),
        };
        args.remove(0);
        Some(material)
      }
      None => None,
    };

    let (needs_material, nvars) = kind.signature();
    let material_ok = match needs_material {
      Some(needed) => needed == material.is_some(),
      None => true,
    };
    if !material_ok || args.len() != nvars {
      let material = match needs_material {
        Some(true) => "a material and ",
        Some(false) => "",
        None => "an optional material and ",
      };
      return Err(FemError::parse(
        input,
        format!("`{name}` takes {material}{nvars} variable(s)"),
      ));
    }

    Ok(Self {
      name: name.to_string(),
      kind,
      factor,
      integral: integral.to_string(),
      region: region.to_string(),
      material,
      vars: args.into_iter().map(String::from).collect(),
    })
  }
}

/// Terms of `lhs = rhs` in residual form `lhs - rhs`.
pub fn parse_equation(input: &str) -> FemResult<Vec<Term>> {
  let Some((lhs, rhs)) = input.split('=').collect_tuple() else {
    return Err(FemError::parse(input, "expected exactly one `=`"));
  };
  let mut terms = parse_side(lhs, 1.0, input)?;
  terms.extend(parse_side(rhs, -1.0, input)?);
  if terms.is_empty() {
    return Err(FemError::parse(input, "no terms"));
  }
  Ok(terms)
}

pub fn parse_expression(input: &str) -> FemResult<Vec<Term>> {
  if input.contains('=') {
    return Err(FemError::parse(input, "an expression has no `=`"));
  }
  let terms = parse_side(input, 1.0, input)?;
  if terms.is_empty() {
    return Err(FemError::parse(input, "no terms"));
  }
  Ok(terms)
}

fn parse_side(side: &str, side_sign: f64, input: &str) -> FemResult<Vec<Term>> {
  let mut rest = side.trim();
  if rest.parse::<f64>().is_ok_and(|v| v == 0.0) {
    return Ok(Vec::new());
  }

  let mut terms = Vec::new();
  loop {
    let mut factor = side_sign;
    loop {
      rest = rest.trim_start();
      if let Some(r) = rest.strip_prefix('-') {
        factor = -factor;
        rest = r;
      } else if let Some(r) = rest.strip_prefix('+') {
        rest = r;
      } else {
        break;
      }
    }
    if let Some((number, r)) = rest.split_once('*') {
      if let Ok(number) = number.trim().parse::<f64>() {
        factor *= number;
        rest = r.trim_start();
      }
    }

    let (Some(open), Some(close)) = (rest.find('('), rest.find(')')) else {
      return Err(FemError::parse(input, "expected `name.integral.region(args)`"));
    };
    if close < open {
      return Err(FemError::parse(input, "unbalanced parentheses"));
    }
    terms.push(Term::parse(factor, rest[..open].trim(), &rest[open + 1..close], input)?);

    rest = rest[close + 1..].trim_start();
    if rest.is_empty() {
      return Ok(terms);
    }
    if !rest.starts_with(['+', '-']) {
      return Err(FemError::parse(input, format!("expected `+` or `-` before `{rest}`")));
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn laplace_equation() {
    let terms = parse_equation("dw_laplace.i.Omega( coef.val, s, t ) = 0").unwrap();
    assert_eq!(terms.len(), 1);
    let term = &terms[0];
    assert_eq!(term.kind, TermKind::Laplace);
    assert_eq!(term.factor, 1.0);
    assert_eq!(term.integral, "i");
    assert_eq!(term.region, "Omega");
    assert_eq!(
      term.material,
      Some(MaterialRef {
        material: "coef".to_string(),
        param: "val".to_string()
      })
    );
    assert_eq!(term.vars, vec!["s", "t"]);
  }

  #[test]
  fn signs_and_factors() {
    let terms = parse_equation(
      "dw_laplace.i.Y(m.k, v, u) - 2 * dw_volume_dot.i.Y(v, u) = - dw_laplace.i.Y(m.k, v, Pi) + dw_volume_lvf.i.Y(m.f, v)",
    )
    .unwrap();
    let factors: Vec<_> = terms.iter().map(|t| t.factor).collect();
    assert_eq!(factors, vec![1.0, -2.0, 1.0, -1.0]);
    assert_eq!(terms[1].material, None);
    assert_eq!(terms[3].kind, TermKind::VolumeLvf);
  }

  #[test]
  fn expressions() {
    let terms = parse_expression("ev_volume.i.Y(u) + 0.5*ev_integrate.i.Y(m.c, u)").unwrap();
    assert_eq!(terms[0].kind, TermKind::EvVolume);
    assert_eq!(terms[1].factor, 0.5);
    assert!(terms[1].kind.is_evaluation_only());
    assert!(parse_expression("dw_laplace.i.Y(m.k, u, u) = 0").is_err());
  }

  #[test]
  fn malformed() {
    assert!(matches!(
      parse_equation("dw_foo.i.Y(v, u) = 0"),
      Err(FemError::UnsupportedTerm(_))
    ));
    for input in [
      "dw_laplace.i.Y(m.k, v, u)",
      "dw_laplace.i.Y(m.k, v, u) = 0 = 0",
      "dw_laplace.i(m.k, v, u) = 0",
      "dw_laplace.i.Y(v, u) = 0",
      "dw_laplace.i.Y(m.k, v, , u) = 0",
      "dw_laplace.i.Y(m.k, v, u) dw_laplace.i.Y(m.k, v, u) = 0",
      "ev_volume.i.Y(m.k, u) = 0",
      "0 = 0",
      "dw_laplace.i.Y)m.k, v, u( = 0",
    ] {
      assert!(
        matches!(parse_equation(input), Err(FemError::Parse { .. })),
        "{input}"
      );
    }
  }
}
