//! Homogenized coefficients evaluated from corrector states.
//!
//! For every entry of the coefficient the substitution kind yields the known
//! fields of the "row" and the "col" slot of the variational form,
//! the problem evaluates the expression with them.

use crate::{
  cancel::CancelToken,
  corrector::unit_field,
  error::{Error, Result},
  index::{IndexPair, TensorIndexSet},
  problem::{Problem, StateVector},
  store::DataView,
  template,
};

use std::fmt;

/// Which side of the bilinear form a substitution is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
  Row,
  Col,
}

impl fmt::Display for Mode {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::Row => write!(f, "row"),
      Self::Col => write!(f, "col"),
    }
  }
}

/// Position in the coefficient's variable list that receives each mode's field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode2Var {
  pub row: usize,
  pub col: usize,
}

impl Default for Mode2Var {
  fn default() -> Self {
    Self { row: 0, col: 1 }
  }
}

impl Mode2Var {
  pub fn new(row: usize, col: usize) -> Self {
    Self { row, col }
  }
  pub fn slot(&self, mode: Mode) -> usize {
    match mode {
      Mode::Row => self.row,
      Mode::Col => self.col,
    }
  }
}

/// How the coefficient's entries are laid out and which of them are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoefShape {
  /// Symmetric tensor of symmetric pairs (e.g. elasticity),
  /// stored as a Voigt matrix; only its upper triangle is evaluated.
  SymSym,
  /// Symmetric `dim x dim` matrix; only `row <= col` is evaluated.
  Sym,
  /// Full `dim x dim` matrix.
  DimDim,
  /// A scalar.
  One,
}

/// Which known fields a coefficient substitutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CoefVariables {
  /// Nothing is substituted.
  #[default]
  Plain,
  /// `pis[row, col] + omega[row, col]` into the mode's variable.
  /// Requires `[pis, corrector]`.
  Elastic { mode2var: Mode2Var },
  /// "col": unit field into variable 0, "row": corrector state into variable 1.
  /// Requires `[corrector]`.
  ElasticBiot,
  /// Unit fields into variables 0 and 1, the corrector's blocks into 2 and 3.
  /// Requires `[corrector]` with a single state.
  IrBiotModulus,
  /// Nodal coordinate plus the corrector of that direction into the mode's variable.
  /// The direction is `row` in "row" mode and `col` in "col" mode.
  /// Requires `[vector corrector]`.
  Diffusion { mode2var: Mode2Var },
}

impl CoefVariables {
  pub fn elastic() -> Self {
    Self::Elastic {
      mode2var: Mode2Var::default(),
    }
  }
  pub fn diffusion() -> Self {
    Self::Diffusion {
      mode2var: Mode2Var::default(),
    }
  }

  /// Checks that `spec` declares what this kind reads.
  pub fn check(&self, spec: &CoefSpec) -> Result<()> {
    let (nvars, nreqs) = match self {
      Self::Plain => (0, 0),
      Self::Elastic { mode2var } | Self::Diffusion { mode2var } => {
        (mode2var.row.max(mode2var.col) + 1, self.nrequires())
      }
      Self::ElasticBiot => (2, 1),
      Self::IrBiotModulus => (4, 1),
    };
    if spec.variables.len() < nvars {
      return Err(Error::config(
        &spec.name,
        format!("{self:?} substitution needs at least {nvars} variables"),
      ));
    }
    if spec.requires.len() < nreqs {
      return Err(Error::config(
        &spec.name,
        format!("{self:?} substitution needs at least {nreqs} requirements"),
      ));
    }
    if *self != Self::Plain && spec.volume.is_none() {
      return Err(Error::config(
        &spec.name,
        format!("{self:?} substitution needs the cell volume"),
      ));
    }
    Ok(())
  }

  fn nrequires(&self) -> usize {
    match self {
      Self::Plain => 0,
      Self::Elastic { .. } => 2,
      Self::ElasticBiot | Self::IrBiotModulus | Self::Diffusion { .. } => 1,
    }
  }

  /// The `(variable, value)` pairs of one mode of one entry.
  ///
  /// Kinds without a notion of index or mode ignore them.
  pub fn variables<P: Problem + ?Sized>(
    &self,
    spec: &CoefSpec,
    problem: &P,
    index: IndexPair,
    mode: Mode,
    data: &DataView,
  ) -> Result<Vec<(String, StateVector)>> {
    let name = spec.name.as_str();
    let primary = |var: &str| -> Result<String> {
      problem
        .variable(var)
        .map(|info| info.primary_var_name)
        .map_err(Error::problem(name, index))
    };

    match *self {
      Self::Plain => Ok(Vec::new()),
      Self::Elastic { mode2var } => {
        let pis = data.shape(&spec.requires[0])?;
        let corrs = data.corrector(&spec.requires[1])?;

        let var_name = &spec.variables[mode2var.slot(mode)];
        let omega = corrs.component_for(name, &primary(var_name)?, index)?;
        let pi = pis.get(index).ok_or_else(|| Error::MissingSlot {
          requirement: name.to_string(),
          name: spec.requires[0].clone(),
          index,
        })?;
        check_len(spec, &spec.requires[0], pi.len(), omega.len())?;
        Ok(vec![(var_name.clone(), pi + omega)])
      }
      Self::ElasticBiot => match mode {
        Mode::Col => {
          let var_name = &spec.variables[0];
          let one = unit_field(name, problem, var_name, index)?;
          Ok(vec![(var_name.clone(), one)])
        }
        Mode::Row => {
          let var_name = &spec.variables[1];
          let corrs = data.corrector(&spec.requires[0])?;
          let omega = corrs.component_for(name, &primary(var_name)?, index)?;
          Ok(vec![(var_name.clone(), omega)])
        }
      },
      Self::IrBiotModulus => {
        let corrs = data.corrector(&spec.requires[0])?;
        let mut pairs = Vec::with_capacity(4);
        for var_name in &spec.variables[..2] {
          pairs.push((var_name.clone(), unit_field(name, problem, var_name, index)?));
        }
        for var_name in &spec.variables[2..4] {
          let val = corrs.component_for(name, &primary(var_name)?, IndexPair::SCALAR)?;
          pairs.push((var_name.clone(), val));
        }
        Ok(pairs)
      }
      Self::Diffusion { mode2var } => {
        let pressure = problem
          .variable(&spec.variables[0])
          .map_err(Error::problem(name, index))?;
        let corrs = data.corrector(&spec.requires[0])?;

        let var_name = &spec.variables[mode2var.slot(mode)];
        let ii = match mode {
          Mode::Row => index.row,
          Mode::Col => index.col,
        };
        if ii >= pressure.coors.ncols() {
          return Err(Error::config(
            name,
            format!("direction {ii} exceeds the coordinate dimension"),
          ));
        }
        let coor = pressure.coors.column(ii).into_owned();
        let chi = corrs.component_for(name, &primary(var_name)?, IndexPair::new(ii, 0))?;
        check_len(spec, &spec.requires[0], coor.len(), chi.len())?;
        Ok(vec![(var_name.clone(), coor + chi)])
      }
    }
  }
}

fn check_len(spec: &CoefSpec, name: &str, expected: usize, found: usize) -> Result<()> {
  if expected == found {
    return Ok(());
  }
  Err(Error::DataShape {
    requirement: spec.name.clone(),
    name: name.to_string(),
    expected: format!("{expected} values"),
    found: format!("{found} values"),
  })
}

/// Configuration of one coefficient.
#[derive(Debug, Clone)]
pub struct CoefSpec {
  pub name: String,
  pub requires: Vec<String>,
  pub shape: CoefShape,
  pub substitutions: CoefVariables,
  pub variables: Vec<String>,
  /// Substituted for the `%s` placeholders of the expression.
  pub regions: Vec<String>,
  pub expression: String,
  /// Scalar coefficient holding the cell volume; every entry is divided by it.
  pub volume: Option<String>,
}

impl CoefSpec {
  pub fn new(name: impl Into<String>, shape: CoefShape, expression: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      requires: Vec::new(),
      shape,
      substitutions: CoefVariables::Plain,
      variables: Vec::new(),
      regions: Vec::new(),
      expression: expression.into(),
      volume: None,
    }
  }

  pub fn substitutions(mut self, substitutions: CoefVariables) -> Self {
    self.substitutions = substitutions;
    self
  }
  pub fn requires<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
    self.requires = names.into_iter().map(Into::into).collect();
    self
  }
  pub fn variables<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
    self.variables = names.into_iter().map(Into::into).collect();
    self
  }
  pub fn regions<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
    self.regions = names.into_iter().map(Into::into).collect();
    self
  }

  pub fn volume(mut self, name: impl Into<String>) -> Self {
    self.volume = Some(name.into());
    self
  }

  /// The declared requirements followed by the volume, if it is not among them.
  pub fn dependencies(&self) -> Vec<String> {
    let mut names = self.requires.clone();
    if let Some(volume) = &self.volume {
      if !names.contains(volume) {
        names.push(volume.clone());
      }
    }
    names
  }

  /// Checks the configuration and returns the expression with regions substituted.
  pub fn validate(&self) -> Result<String> {
    self.substitutions.check(self)?;
    template::substitute(&self.name, &self.expression, &self.regions)
  }
}

/// A homogenized coefficient.
#[derive(Debug, Clone, PartialEq)]
pub enum CoefValue {
  Scalar(f64),
  Matrix(na::DMatrix<f64>),
}

impl CoefValue {
  pub fn scaled(self, factor: f64) -> Self {
    match self {
      Self::Scalar(v) => Self::Scalar(v * factor),
      Self::Matrix(m) => Self::Matrix(m * factor),
    }
  }

  pub fn as_scalar(&self) -> Option<f64> {
    match self {
      Self::Scalar(v) => Some(*v),
      Self::Matrix(_) => None,
    }
  }
  pub fn as_matrix(&self) -> Option<&na::DMatrix<f64>> {
    match self {
      Self::Scalar(_) => None,
      Self::Matrix(m) => Some(m),
    }
  }
}

struct Evaluator<'s, 'd, P: ?Sized> {
  spec: &'s CoefSpec,
  expression: String,
  problem: &'s mut P,
  data: &'s DataView<'d>,
  cancel: &'s CancelToken,
}

impl<P: Problem + ?Sized> Evaluator<'_, '_, P> {
  /// Sets the fields of both modes and evaluates one entry.
  fn entry(&mut self, row: (IndexPair, Mode), col: (IndexPair, Mode)) -> Result<f64> {
    if self.cancel.is_cancelled() {
      return Err(Error::Cancelled {
        requirement: self.spec.name.clone(),
      });
    }
    let kind = self.spec.substitutions;
    let mut pairs = kind.variables(self.spec, &*self.problem, row.0, row.1, self.data)?;
    if kind != CoefVariables::IrBiotModulus {
      pairs.extend(kind.variables(self.spec, &*self.problem, col.0, col.1, self.data)?);
    }

    let name = self.spec.name.as_str();
    for (var, value) in pairs {
      self
        .problem
        .set_variable(&var, value)
        .map_err(Error::problem(name, row.0))?;
    }
    let val = self
      .problem
      .evaluate(&self.expression)
      .map_err(Error::problem(name, row.0))?;
    tracing::debug!("{name} {} x {} = {val}", row.0, col.0);
    Ok(val)
  }
}

/// Evaluates every independent entry of `spec` and fills the rest by symmetry.
pub fn evaluate_coef<P: Problem + ?Sized>(
  spec: &CoefSpec,
  problem: &mut P,
  data: &DataView,
  cancel: &CancelToken,
) -> Result<CoefValue> {
  let expression = spec.validate()?;
  let dim = problem.dim();
  problem
    .select_variables(&spec.variables)
    .map_err(Error::problem(&spec.name, IndexPair::SCALAR))?;

  let mut eval = Evaluator {
    spec,
    expression,
    problem,
    data,
    cancel,
  };

  let value = match spec.shape {
    CoefShape::SymSym => {
      let pairs = TensorIndexSet::symmetric(dim);
      let n = pairs.len();
      let mut coef = na::DMatrix::zeros(n, n);
      for (ii, irc) in pairs.iter().enumerate() {
        for (jj, jrc) in pairs.iter().enumerate().skip(ii) {
          let val = eval.entry((irc, Mode::Row), (jrc, Mode::Col))?;
          coef[(ii, jj)] = val;
          coef[(jj, ii)] = val;
        }
      }
      CoefValue::Matrix(coef)
    }
    CoefShape::Sym => {
      let mut coef = na::DMatrix::zeros(dim, dim);
      for index in TensorIndexSet::symmetric(dim).iter() {
        let val = eval.entry((index, Mode::Row), (index, Mode::Col))?;
        coef[(index.row, index.col)] = val;
        coef[(index.col, index.row)] = val;
      }
      CoefValue::Matrix(coef)
    }
    CoefShape::DimDim => {
      let mut coef = na::DMatrix::zeros(dim, dim);
      for index in TensorIndexSet::full(dim).iter() {
        coef[(index.row, index.col)] = eval.entry((index, Mode::Row), (index, Mode::Col))?;
      }
      CoefValue::Matrix(coef)
    }
    CoefShape::One => {
      let index = IndexPair::SCALAR;
      CoefValue::Scalar(eval.entry((index, Mode::Row), (index, Mode::Col))?)
    }
  };
  match &spec.volume {
    Some(name) => Ok(value.scaled(1.0 / cell_volume(spec, data, name)?)),
    None => Ok(value),
  }
}

fn cell_volume(spec: &CoefSpec, data: &DataView, name: &str) -> Result<f64> {
  let volume = data
    .coefficient(name)?
    .as_scalar()
    .ok_or_else(|| Error::DataShape {
      requirement: spec.name.clone(),
      name: name.to_string(),
      expected: "a scalar volume".to_string(),
      found: "a matrix".to_string(),
    })?;
  if !(volume.is_finite() && volume > 0.0) {
    return Err(Error::config(
      &spec.name,
      format!("cell volume `{name}` is {volume}"),
    ));
  }
  Ok(volume)
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    corrector::CorrectorResult,
    index::{TensorSymmetry, TensorSlots},
    problem::{
      mock::{Call, MockProblem},
      DofInfo,
    },
    store::{DataStore, Datum},
  };

  const N_NOD: usize = 3;

  fn corrector(name: &str, symmetry: TensorSymmetry, dim: usize, blocks: &[&str]) -> CorrectorResult {
    let set = TensorIndexSet::new(dim, symmetry);
    let mut states = set.slots();
    let mut di = DofInfo::new();
    for block in blocks {
      di.push(*block, N_NOD);
    }
    for index in &set {
      let v = (10 * (index.row + 1) + index.col + 1) as f64;
      let state = StateVector::from_fn(di.ndofs(), |i, _| v + (i / N_NOD) as f64 * 0.5);
      states.insert(index, state).unwrap();
    }
    CorrectorResult {
      name: name.to_string(),
      symmetry,
      states,
      di,
    }
  }

  fn pis(dim: usize) -> TensorSlots<StateVector> {
    let set = TensorIndexSet::full(dim);
    let mut pis = set.slots();
    for index in &set {
      pis
        .insert(index, StateVector::from_element(N_NOD, 100.0 * (index.row + 1) as f64))
        .unwrap();
    }
    pis
  }

  fn set_variables(problem: &MockProblem) -> Vec<(String, StateVector)> {
    problem
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        Call::SetVariable(name, value) => Some((name, value)),
        _ => None,
      })
      .collect()
  }

  fn with_volume(volume: f64) -> DataStore {
    let mut store = DataStore::new();
    store
      .insert("volume", Datum::Coefficient(CoefValue::Scalar(volume)))
      .unwrap();
    store
  }

  fn elastic_setup(dim: usize, volume: f64) -> (DataStore, MockProblem) {
    let mut store = with_volume(volume);
    store.insert("pis", Datum::Shape(pis(dim))).unwrap();
    store
      .insert(
        "corrs_rs",
        Datum::Corrector(corrector("corrs_rs", TensorSymmetry::Full, dim, &["u"])),
      )
      .unwrap();
    let problem = MockProblem::new(dim, N_NOD)
      .with_unknown("u")
      .with_parameter("U1", "u")
      .with_parameter("U2", "u");
    (store, problem)
  }

  fn elastic_spec(mode2var: Mode2Var) -> CoefSpec {
    CoefSpec::new("E", CoefShape::SymSym, "dw_lin_elastic.i.%s(m.D, U1, U2)")
      .substitutions(CoefVariables::Elastic { mode2var })
      .requires(["pis", "corrs_rs"])
      .variables(["U1", "U2"])
      .regions(["Y"])
      .volume("volume")
  }

  #[test]
  fn elastic_evaluates_upper_triangle_only() {
    for dim in 1..=3 {
      let (store, mut problem) = elastic_setup(dim, 1.0);
      let spec = elastic_spec(Mode2Var::default());
      let view = store.view("E", &spec.dependencies()).unwrap();
      let value = evaluate_coef(&spec, &mut problem, &view, &CancelToken::new()).unwrap();

      let nsym = dim * (dim + 1) / 2;
      let evaluations = problem
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Evaluate(_)))
        .count();
      assert_eq!(evaluations, nsym * (nsym + 1) / 2);

      let coef = value.as_matrix().unwrap();
      assert_eq!(coef.shape(), (nsym, nsym));
      assert_eq!(coef, &coef.transpose());
    }
  }

  #[test]
  fn elastic_composite_field() {
    let (store, mut problem) = elastic_setup(2, 1.0);
    let spec = elastic_spec(Mode2Var::default());
    let view = store.view("E", &spec.dependencies()).unwrap();
    evaluate_coef(&spec, &mut problem, &view, &CancelToken::new()).unwrap();

    let set = set_variables(&problem);
    // First entry: (0,0) x (0,0).
    assert_eq!(set[0].0, "U1");
    assert_eq!(set[0].1, StateVector::from_element(N_NOD, 100.0 + 11.0));
    assert_eq!(set[1].0, "U2");
    // Second entry: (0,0) x (1,1).
    assert_eq!(set[3].0, "U2");
    assert_eq!(set[3].1, StateVector::from_element(N_NOD, 200.0 + 22.0));
  }

  #[test]
  fn swapped_mode2var_swaps_variables() {
    let (store, mut problem) = elastic_setup(1, 1.0);
    let spec = elastic_spec(Mode2Var::new(1, 0));
    let view = store.view("E", &spec.dependencies()).unwrap();
    evaluate_coef(&spec, &mut problem, &view, &CancelToken::new()).unwrap();
    let names: Vec<_> = set_variables(&problem).into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["U2", "U1"]);
  }

  #[test]
  fn biot_uses_unit_field_for_col() {
    let dim = 2;
    let mut store = with_volume(1.0);
    store
      .insert(
        "corrs_p",
        Datum::Corrector(corrector("corrs_p", TensorSymmetry::Full, dim, &["u"])),
      )
      .unwrap();
    let mut problem = MockProblem::new(dim, N_NOD)
      .with_unknown("u")
      .with_parameter("one", "one")
      .with_parameter("U1", "u");
    let spec = CoefSpec::new("B", CoefShape::Sym, "dw_biot.i.Y(m.alpha, U1, one)")
      .substitutions(CoefVariables::ElasticBiot)
      .requires(["corrs_p"])
      .variables(["one", "U1"])
      .volume("volume");
    let view = store.view("B", &spec.dependencies()).unwrap();
    let value = evaluate_coef(&spec, &mut problem, &view, &CancelToken::new()).unwrap();

    let set = set_variables(&problem);
    assert_eq!(set.len(), 2 * 3);
    assert_eq!(set[0], ("U1".to_string(), StateVector::from_element(N_NOD, 11.0)));
    assert_eq!(set[1], ("one".to_string(), StateVector::from_element(N_NOD, 1.0)));

    let coef = value.as_matrix().unwrap();
    assert_eq!(coef.shape(), (2, 2));
    assert_eq!(coef[(0, 1)], coef[(1, 0)]);
  }

  #[test]
  fn ir_biot_modulus_yields_four_pairs_in_order() {
    let mut store = with_volume(1.0);
    store
      .insert(
        "corrs_pp",
        Datum::Corrector(corrector("corrs_pp", TensorSymmetry::Scalar, 3, &["u", "p"])),
      )
      .unwrap();
    let problem = MockProblem::new(3, N_NOD)
      .with_unknown("u")
      .with_unknown("p")
      .with_parameter("one", "one")
      .with_parameter("one_m", "one_m")
      .with_parameter("U1", "u")
      .with_parameter("P1", "p");
    let spec = CoefSpec::new("M", CoefShape::One, "ev")
      .substitutions(CoefVariables::IrBiotModulus)
      .requires(["corrs_pp"])
      .variables(["one", "one_m", "U1", "P1"])
      .volume("volume");
    let view = store.view("M", &spec.dependencies()).unwrap();

    let pairs = spec
      .substitutions
      .variables(&spec, &problem, IndexPair::SCALAR, Mode::Row, &view)
      .unwrap();
    let names: Vec<_> = pairs.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["one", "one_m", "U1", "P1"]);
    assert_eq!(pairs[0].1, StateVector::from_element(N_NOD, 1.0));
    assert_eq!(pairs[1].1, StateVector::from_element(N_NOD, 1.0));
    assert_eq!(pairs[2].1, StateVector::from_element(N_NOD, 11.0));
    assert_eq!(pairs[3].1, StateVector::from_element(N_NOD, 11.5));

    let mut problem = problem;
    let value = evaluate_coef(&spec, &mut problem, &view, &CancelToken::new()).unwrap();
    assert_eq!(set_variables(&problem).len(), 4);
    assert_eq!(value, CoefValue::Scalar(3.0 * (1.0 + 1.0 + 11.0 + 11.5)));
  }

  #[test]
  fn diffusion_selects_direction_by_mode() {
    let dim = 2;
    let mut store = with_volume(1.0);
    store
      .insert(
        "corrs_k",
        Datum::Corrector(corrector("corrs_k", TensorSymmetry::Vector, dim, &["pc"])),
      )
      .unwrap();
    let problem = MockProblem::new(dim, N_NOD)
      .with_unknown("pc")
      .with_parameter("Pi1", "pc")
      .with_parameter("Pi2", "pc");
    let spec = CoefSpec::new("K", CoefShape::DimDim, "dw_diffusion.i.Y(m.K, Pi1, Pi2)")
      .substitutions(CoefVariables::diffusion())
      .requires(["corrs_k"])
      .variables(["Pi1", "Pi2"])
      .volume("volume");
    let view = store.view("K", &spec.dependencies()).unwrap();

    let index = IndexPair::new(0, 1);
    let kind = spec.substitutions;
    let row = kind.variables(&spec, &problem, index, Mode::Row, &view).unwrap();
    let col = kind.variables(&spec, &problem, index, Mode::Col, &view).unwrap();

    let info = problem.variable("Pi1").unwrap();
    let chi0 = StateVector::from_element(N_NOD, 11.0);
    let chi1 = StateVector::from_element(N_NOD, 21.0);
    assert_eq!(row[0].0, "Pi1");
    assert_eq!(row[0].1, info.coors.column(0).into_owned() + chi0);
    assert_eq!(col[0].0, "Pi2");
    assert_eq!(col[0].1, info.coors.column(1).into_owned() + chi1);

    let mut problem = problem;
    let value = evaluate_coef(&spec, &mut problem, &view, &CancelToken::new()).unwrap();
    assert_eq!(value.as_matrix().unwrap().shape(), (2, 2));
  }

  #[test]
  fn wrong_data_kind_is_reported() {
    let (mut store, mut problem) = elastic_setup(1, 1.0);
    store
      .insert("E0", Datum::Coefficient(CoefValue::Scalar(1.0)))
      .unwrap();
    let spec = elastic_spec(Mode2Var::default()).requires(["E0", "corrs_rs"]);
    let view = store.view("E", &spec.dependencies()).unwrap();
    let err = evaluate_coef(&spec, &mut problem, &view, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, Error::DataShape { .. }));
  }

  #[test]
  fn missing_variables_fail_validation() {
    let spec = CoefSpec::new("M", CoefShape::One, "ev")
      .substitutions(CoefVariables::IrBiotModulus)
      .requires(["c"])
      .variables(["one", "one_m"]);
    assert!(matches!(spec.validate(), Err(Error::Config { .. })));
  }

  #[test]
  fn entries_are_divided_by_the_volume() {
    let spec = elastic_spec(Mode2Var::default());
    let evaluate = |volume: f64| {
      let (store, mut problem) = elastic_setup(2, volume);
      let view = store.view("E", &spec.dependencies()).unwrap();
      evaluate_coef(&spec, &mut problem, &view, &CancelToken::new())
    };
    let unit = evaluate(1.0).unwrap();
    assert_eq!(evaluate(2.0).unwrap(), unit.scaled(0.5));

    for volume in [0.0, -1.0, f64::NAN] {
      assert!(matches!(evaluate(volume), Err(Error::Config { .. })));
    }
  }

  #[test]
  fn volume_must_be_a_scalar() {
    let spec = elastic_spec(Mode2Var::default());
    let (full, mut problem) = elastic_setup(1, 1.0);
    let mut store = DataStore::new();
    store
      .insert("volume", Datum::Coefficient(CoefValue::Matrix(na::DMatrix::zeros(1, 1))))
      .unwrap();
    for name in ["pis", "corrs_rs"] {
      store.insert(name, full.get(name).unwrap().clone()).unwrap();
    }
    let view = store.view("E", &spec.dependencies()).unwrap();
    let err = evaluate_coef(&spec, &mut problem, &view, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, Error::DataShape { .. }), "{err}");
  }

  #[test]
  fn substituting_kinds_need_the_volume() {
    let mut spec = elastic_spec(Mode2Var::default());
    assert_eq!(spec.dependencies(), vec!["pis", "corrs_rs", "volume"]);
    spec.volume = None;
    assert!(matches!(spec.validate(), Err(Error::Config { .. })));

    let plain = CoefSpec::new("V", CoefShape::One, "ev_volume.i.Y(u)");
    assert!(plain.validate().is_ok());
    assert!(plain.dependencies().is_empty());
  }
}
