//! Correctors: solutions of the cell problems, one per tensor index.
//!
//! Every index pair of a corrector runs the same cycle on the problem:
//! select variables, set the templated equations, select boundary conditions,
//! substitute the known variables of that pair, solve and check the essential
//! boundary conditions of the returned state.

use crate::{
  cancel::CancelToken,
  error::{Error, Result},
  index::{IndexPair, TensorIndexSet, TensorSlots, TensorSymmetry},
  problem::{DofInfo, Problem, ProblemError, StateVector},
  save::{SaveHook, SavedSlot},
  store::DataView,
  template,
};

use indexmap::IndexMap;
use rayon::prelude::*;

use std::sync::atomic::{AtomicBool, Ordering};

/// Which known variables a corrector substitutes before each solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorrVariables {
  /// Nothing is substituted, the index is only passed on to the solve.
  #[default]
  Plain,
  /// The last variable receives `pis[row, col]` of the first requirement.
  ElasticRs,
  /// The last two variables receive unit fields.
  Pressure,
}

impl CorrVariables {
  /// Checks that `spec` declares what this kind reads.
  pub fn check(&self, spec: &CorrectorSpec) -> Result<()> {
    let (nvars, nreqs) = match self {
      Self::Plain => (0, 0),
      Self::ElasticRs => (1, 1),
      Self::Pressure => (2, 0),
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
    Ok(())
  }

  /// The `(variable, value)` pairs to set before solving slot `index`.
  pub fn variables<P: Problem + ?Sized>(
    &self,
    spec: &CorrectorSpec,
    problem: &P,
    index: IndexPair,
    data: &DataView,
  ) -> Result<Vec<(String, StateVector)>> {
    self.check(spec)?;
    let nvars = spec.variables.len();
    match self {
      Self::Plain => Ok(Vec::new()),
      Self::ElasticRs => {
        let name = &spec.requires[0];
        let pis = data.shape(name)?;
        let pi = pis.get(index).ok_or_else(|| Error::MissingSlot {
          requirement: spec.name.clone(),
          name: name.clone(),
          index,
        })?;
        Ok(vec![(spec.variables[nvars - 1].clone(), pi.clone())])
      }
      Self::Pressure => spec.variables[nvars - 2..]
        .iter()
        .map(|var| -> Result<(String, StateVector)> {
          Ok((var.clone(), unit_field(&spec.name, problem, var, index)?))
        })
        .collect(),
    }
  }
}

/// A field of ones over all DOFs of `var`.
pub(crate) fn unit_field<P: Problem + ?Sized>(
  requirement: &str,
  problem: &P,
  var: &str,
  index: IndexPair,
) -> Result<StateVector> {
  let info = problem
    .variable(var)
    .map_err(Error::problem(requirement, index))?;
  Ok(StateVector::from_element(info.n_nod * info.n_components, 1.0))
}

/// Configuration of one corrector.
#[derive(Debug, Clone)]
pub struct CorrectorSpec {
  pub name: String,
  pub requires: Vec<String>,
  pub symmetry: TensorSymmetry,
  pub substitutions: CorrVariables,
  pub variables: Vec<String>,
  /// Substituted for the `%s` placeholders of the equations.
  pub regions: Vec<String>,
  pub equations: IndexMap<String, String>,
  pub ebcs: Vec<String>,
  pub epbcs: Vec<String>,
}

fn strings<I, S>(names: I) -> Vec<String>
where
  I: IntoIterator<Item = S>,
  S: Into<String>,
{
  names.into_iter().map(Into::into).collect()
}

impl CorrectorSpec {
  pub fn new(name: impl Into<String>, symmetry: TensorSymmetry) -> Self {
    Self {
      name: name.into(),
      requires: Vec::new(),
      symmetry,
      substitutions: CorrVariables::Plain,
      variables: Vec::new(),
      regions: Vec::new(),
      equations: IndexMap::new(),
      ebcs: Vec::new(),
      epbcs: Vec::new(),
    }
  }

  /// One solve per `(row, col)` pair of the full tensor.
  pub fn dim_dim(name: impl Into<String>) -> Self {
    Self::new(name, TensorSymmetry::Full)
  }
  /// One solve per spatial direction.
  pub fn dim(name: impl Into<String>) -> Self {
    Self::new(name, TensorSymmetry::Vector)
  }
  /// A single solve.
  pub fn one(name: impl Into<String>) -> Self {
    Self::new(name, TensorSymmetry::Scalar)
  }

  /// Solves only the `row <= col` pairs of a tensor corrector.
  pub fn unique_pairs(mut self) -> Self {
    if self.symmetry == TensorSymmetry::Full {
      self.symmetry = TensorSymmetry::Symmetric;
    }
    self
  }

  pub fn substitutions(mut self, substitutions: CorrVariables) -> Self {
    self.substitutions = substitutions;
    self
  }
  pub fn requires<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
    self.requires = strings(names);
    self
  }
  pub fn variables<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
    self.variables = strings(names);
    self
  }
  pub fn regions<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
    self.regions = strings(names);
    self
  }
  pub fn equation(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
    self.equations.insert(name.into(), template.into());
    self
  }
  pub fn ebcs<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
    self.ebcs = strings(names);
    self
  }
  pub fn epbcs<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
    self.epbcs = strings(names);
    self
  }

  pub fn index_set(&self, dim: usize) -> TensorIndexSet {
    TensorIndexSet::new(dim, self.symmetry)
  }

  /// Checks the configuration and returns the equations with regions substituted.
  pub fn validate(&self) -> Result<IndexMap<String, String>> {
    if self.equations.is_empty() {
      return Err(Error::config(&self.name, "no equations"));
    }
    if self.variables.is_empty() {
      return Err(Error::config(&self.name, "no variables"));
    }
    self.substitutions.check(self)?;
    template::substitute_all(&self.name, &self.equations, &self.regions)
  }
}

/// Corrector states keyed by index pair, with the DOF layout they share.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectorResult {
  pub name: String,
  pub symmetry: TensorSymmetry,
  pub states: TensorSlots<StateVector>,
  pub di: DofInfo,
}

impl CorrectorResult {
  /// The state of a single-solve corrector.
  pub fn state(&self) -> Option<&StateVector> {
    self.states.get(IndexPair::SCALAR)
  }
  pub fn state_at(&self, index: IndexPair) -> Option<&StateVector> {
    self.states.get(index)
  }
  /// The state of direction `i` of a vector corrector.
  pub fn state_dim(&self, i: usize) -> Option<&StateVector> {
    self.states.get(IndexPair::new(i, 0))
  }

  /// The block of variable `name` within the state at `index`.
  pub fn component(&self, name: &str, index: IndexPair) -> Option<StateVector> {
    self.di.extract(name, self.states.get(index)?)
  }

  /// Like [`Self::component`], with errors naming `requirement`.
  pub(crate) fn component_for(
    &self,
    requirement: &str,
    name: &str,
    index: IndexPair,
  ) -> Result<StateVector> {
    let state = self.states.get(index).ok_or_else(|| Error::MissingSlot {
      requirement: requirement.to_string(),
      name: self.name.clone(),
      index,
    })?;
    self.di.extract(name, state).ok_or_else(|| Error::DataShape {
      requirement: requirement.to_string(),
      name: self.name.clone(),
      expected: format!("a DOF block for `{name}`"),
      found: format!("blocks {:?}", self.di.names().collect::<Vec<_>>()),
    })
  }
}

fn configure<P: Problem + ?Sized>(
  spec: &CorrectorSpec,
  problem: &mut P,
  equations: &IndexMap<String, String>,
  index: IndexPair,
) -> Result<()> {
  let wrap = |e: ProblemError| Error::problem(&spec.name, index)(e);
  problem.select_variables(&spec.variables).map_err(wrap)?;
  problem.set_equations(equations).map_err(wrap)?;
  problem.select_bcs(&spec.ebcs, &spec.epbcs).map_err(wrap)?;
  Ok(())
}

fn solve_slot<P: Problem + ?Sized>(
  spec: &CorrectorSpec,
  problem: &mut P,
  equations: &IndexMap<String, String>,
  index: IndexPair,
  data: &DataView,
) -> Result<StateVector> {
  configure(spec, problem, equations, index)?;
  for (name, value) in spec.substitutions.variables(spec, &*problem, index, data)? {
    problem
      .set_variable(&name, value)
      .map_err(Error::problem(&spec.name, index))?;
  }

  let state = problem
    .solve(index)
    .map_err(Error::problem(&spec.name, index))?;
  if !problem.has_ebc(&state) {
    return Err(Error::EbcViolated {
      requirement: spec.name.clone(),
      index,
    });
  }
  tracing::debug!("solved {} {index}", spec.name);
  Ok(state)
}

fn save_slot(
  spec: &CorrectorSpec,
  save_hook: &mut dyn SaveHook,
  index: IndexPair,
  state: &StateVector,
  di: &DofInfo,
) -> Result<()> {
  let slot = SavedSlot {
    requirement: &spec.name,
    symmetry: spec.symmetry,
    index,
    state,
    di,
  };
  save_hook.save(slot).map_err(|source| Error::SaveHook {
    requirement: spec.name.clone(),
    index,
    source,
  })
}

fn slot_conflict(spec: &CorrectorSpec, index: IndexPair) -> Error {
  Error::SlotConflict {
    requirement: spec.name.clone(),
    index,
  }
}

fn cancelled(spec: &CorrectorSpec) -> Error {
  Error::Cancelled {
    requirement: spec.name.clone(),
  }
}

/// Solves all index pairs of `spec` one after the other.
pub fn solve_corrector<P: Problem + ?Sized>(
  spec: &CorrectorSpec,
  problem: &mut P,
  data: &DataView,
  save_hook: &mut dyn SaveHook,
  cancel: &CancelToken,
) -> Result<CorrectorResult> {
  let equations = spec.validate()?;
  let pairs = spec.index_set(problem.dim());
  let mut states = pairs.slots();
  let mut di = None;

  for index in &pairs {
    if cancel.is_cancelled() {
      return Err(cancelled(spec));
    }
    let state = solve_slot(spec, problem, &equations, index, data)?;
    let di = di.get_or_insert_with(|| problem.dof_info());
    save_slot(spec, save_hook, index, &state, di)?;
    states
      .insert(index, state)
      .map_err(|_| slot_conflict(spec, index))?;
  }

  let di = match di {
    Some(di) => di,
    None => {
      configure(spec, problem, &equations, IndexPair::SCALAR)?;
      problem.dof_info()
    }
  };
  Ok(CorrectorResult {
    name: spec.name.clone(),
    symmetry: spec.symmetry,
    states,
    di,
  })
}

/// Solves the index pairs of `spec` in parallel, each on its own copy of `problem`.
///
/// The first failing pair in index order determines the error;
/// pairs not started yet are skipped once any pair failed.
/// Save hooks run afterwards, in index order.
pub fn solve_corrector_par<P>(
  spec: &CorrectorSpec,
  problem: &mut P,
  data: &DataView,
  save_hook: &mut dyn SaveHook,
  cancel: &CancelToken,
) -> Result<CorrectorResult>
where
  P: Problem + Clone + Send + Sync,
{
  let equations = spec.validate()?;
  let pairs = spec.index_set(problem.dim());
  let failed = AtomicBool::new(false);

  let prototype: &P = &*problem;
  let outcomes: Vec<(IndexPair, Result<StateVector>)> = pairs
    .pairs()
    .par_iter()
    .map(|&index| {
      if cancel.is_cancelled() || failed.load(Ordering::Acquire) {
        return (index, Err(cancelled(spec)));
      }
      let mut problem = prototype.clone();
      let outcome = solve_slot(spec, &mut problem, &equations, index, data);
      if outcome.is_err() {
        failed.store(true, Ordering::Release);
      }
      (index, outcome)
    })
    .collect();

  let mut solved = Vec::with_capacity(outcomes.len());
  let mut first_cancel = None;
  for (index, outcome) in outcomes {
    match outcome {
      Ok(state) => solved.push((index, state)),
      Err(e) if e.is_cancelled() => {
        first_cancel.get_or_insert(e);
      }
      Err(e) => return Err(e),
    }
  }
  if let Some(e) = first_cancel {
    return Err(e);
  }

  configure(spec, problem, &equations, IndexPair::SCALAR)?;
  let di = problem.dof_info();

  let mut states = pairs.slots();
  for (index, state) in solved {
    save_slot(spec, save_hook, index, &state, &di)?;
    states
      .insert(index, state)
      .map_err(|_| slot_conflict(spec, index))?;
  }
  Ok(CorrectorResult {
    name: spec.name.clone(),
    symmetry: spec.symmetry,
    states,
    di,
  })
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    index::TensorIndexSet,
    problem::mock::{Call, MockProblem},
    save::NoSave,
    store::{DataStore, Datum},
  };

  fn rs_spec() -> CorrectorSpec {
    CorrectorSpec::dim_dim("corrs_rs")
      .substitutions(CorrVariables::ElasticRs)
      .requires(["pis"])
      .variables(["u", "v", "Pi"])
      .regions(["Y", "Y"])
      .equation("eq", "dw_lin_elastic.i.%s(m.D, v, u) = - dw_lin_elastic.i.%s(m.D, v, Pi)")
      .ebcs(["fixed_u"])
  }

  fn pis_store(dim: usize, n_nod: usize) -> DataStore {
    let set = TensorIndexSet::full(dim);
    let mut pis = set.slots();
    for index in &set {
      let v = (index.row * dim + index.col) as f64;
      pis.insert(index, StateVector::from_element(n_nod, v)).unwrap();
    }
    let mut store = DataStore::new();
    store.insert("pis", Datum::Shape(pis)).unwrap();
    store
  }

  fn mock(dim: usize) -> MockProblem {
    MockProblem::new(dim, 3)
      .with_unknown("u")
      .with_parameter("v", "u")
      .with_parameter("Pi", "u")
  }

  #[test]
  fn one_solve_per_pair_with_ebc_check() {
    for dim in 1..=3 {
      let spec = rs_spec();
      let store = pis_store(dim, 3);
      let view = store.view("corrs_rs", &spec.requires).unwrap();
      let mut problem = mock(dim);

      let result =
        solve_corrector(&spec, &mut problem, &view, &mut NoSave, &CancelToken::new()).unwrap();

      let solves = problem.solves();
      assert_eq!(solves, TensorIndexSet::full(dim).pairs());
      assert_eq!(result.states.len(), dim * dim);

      let calls = problem.calls();
      for (i, call) in calls.iter().enumerate() {
        if let Call::Solve(_) = call {
          assert_eq!(calls[i + 1], Call::HasEbc);
        }
      }
      for index in TensorIndexSet::full(dim).iter() {
        assert_eq!(result.state_at(index), Some(&problem.state_for(index)));
      }
    }
  }

  #[test]
  fn unique_pairs_solve_upper_triangle() {
    let spec = rs_spec().unique_pairs();
    let store = pis_store(3, 3);
    let view = store.view("corrs_rs", &spec.requires).unwrap();
    let mut problem = mock(3);
    let result =
      solve_corrector(&spec, &mut problem, &view, &mut NoSave, &CancelToken::new()).unwrap();
    assert_eq!(problem.solves().len(), 6);
    assert_eq!(result.symmetry, TensorSymmetry::Symmetric);
    assert!(result.state_at(IndexPair::new(1, 0)).is_none());
  }

  #[test]
  fn pis_are_substituted_per_pair() {
    let spec = rs_spec();
    let store = pis_store(2, 3);
    let view = store.view("corrs_rs", &spec.requires).unwrap();
    let mut problem = mock(2);
    solve_corrector(&spec, &mut problem, &view, &mut NoSave, &CancelToken::new()).unwrap();

    let substituted: Vec<(String, f64)> = problem
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        Call::SetVariable(name, value) => Some((name, value[0])),
        _ => None,
      })
      .collect();
    let expected: Vec<(String, f64)> = (0..4).map(|v| ("Pi".to_string(), v as f64)).collect();
    assert_eq!(substituted, expected);

    let equations = problem.calls().into_iter().find_map(|c| match c {
      Call::SetEquations(eqs) => Some(eqs),
      _ => None,
    });
    assert_eq!(
      equations.unwrap(),
      vec!["dw_lin_elastic.i.Y(m.D, v, u) = - dw_lin_elastic.i.Y(m.D, v, Pi)"]
    );
  }

  #[test]
  fn pressure_corrector_solves_once_with_unit_fields() {
    let spec = CorrectorSpec::one("corrs_p")
      .substitutions(CorrVariables::Pressure)
      .variables(["u", "v", "one", "one_m"])
      .equation("eq", "dw_stokes.i.Y(v, one) = 0");
    let mut problem = MockProblem::new(3, 4)
      .with_unknown("u")
      .with_parameter("v", "u")
      .with_parameter("one", "one")
      .with_parameter("one_m", "one_m");
    let store = DataStore::new();
    let view = store.view("corrs_p", &spec.requires).unwrap();
    let result =
      solve_corrector(&spec, &mut problem, &view, &mut NoSave, &CancelToken::new()).unwrap();

    assert_eq!(problem.solves(), vec![IndexPair::SCALAR]);
    assert!(result.state().is_some());
    let known: Vec<_> = problem.known.keys().cloned().collect();
    assert_eq!(known, vec!["one", "one_m"]);
    assert!(problem.known.values().all(|v| v.len() == 4 && v.iter().all(|&x| x == 1.0)));
  }

  #[test]
  fn ebc_violation_is_fatal() {
    let spec = rs_spec();
    let store = pis_store(2, 3);
    let view = store.view("corrs_rs", &spec.requires).unwrap();
    let mut problem = mock(2);
    problem.violate_ebc = true;
    let err = solve_corrector(&spec, &mut problem, &view, &mut NoSave, &CancelToken::new())
      .unwrap_err();
    assert!(matches!(err, Error::EbcViolated { index, .. } if index == IndexPair::new(0, 0)));
    assert_eq!(problem.solves().len(), 1);
  }

  #[test]
  fn solve_failure_carries_context() {
    let spec = rs_spec();
    let store = pis_store(2, 3);
    let view = store.view("corrs_rs", &spec.requires).unwrap();
    let mut problem = mock(2);
    problem.fail_at = Some(IndexPair::new(1, 0));
    let err = solve_corrector(&spec, &mut problem, &view, &mut NoSave, &CancelToken::new())
      .unwrap_err();
    assert_eq!(err.to_string(), "`corrs_rs` (1, 0): diverged at (1, 0)");
    assert_eq!(problem.solves().len(), 3);
  }

  #[test]
  fn save_hook_sees_every_slot_and_failures_abort() {
    let spec = rs_spec();
    let store = pis_store(2, 3);
    let view = store.view("corrs_rs", &spec.requires).unwrap();

    let mut seen = Vec::new();
    let mut hook = |slot: SavedSlot| -> std::result::Result<(), ProblemError> {
      seen.push(slot.index);
      Ok(())
    };
    solve_corrector(&spec, &mut mock(2), &view, &mut hook, &CancelToken::new()).unwrap();
    assert_eq!(seen, TensorIndexSet::full(2).pairs());

    let mut failing = |_: SavedSlot| -> std::result::Result<(), ProblemError> {
      Err("disk full".into())
    };
    let mut problem = mock(2);
    let err = solve_corrector(&spec, &mut problem, &view, &mut failing, &CancelToken::new())
      .unwrap_err();
    assert_eq!(err.to_string(), "`corrs_rs` (0, 0): save hook failed: disk full");
    assert_eq!(problem.solves().len(), 1);
  }

  #[test]
  fn missing_pis_are_reported() {
    let spec = rs_spec();
    let mut store = DataStore::new();
    store
      .insert("pis", Datum::Shape(TensorIndexSet::full(1).slots()))
      .unwrap();
    let view = store.view("corrs_rs", &spec.requires).unwrap();
    let err = solve_corrector(&spec, &mut mock(1), &view, &mut NoSave, &CancelToken::new())
      .unwrap_err();
    assert!(matches!(err, Error::MissingSlot { .. }));
  }

  #[test]
  fn parallel_matches_sequential() {
    let spec = rs_spec();
    let store = pis_store(3, 3);
    let view = store.view("corrs_rs", &spec.requires).unwrap();

    let seq = solve_corrector(&spec, &mut mock(3), &view, &mut NoSave, &CancelToken::new()).unwrap();
    let mut seen = Vec::new();
    let mut hook = |slot: SavedSlot| -> std::result::Result<(), ProblemError> {
      seen.push(slot.index);
      Ok(())
    };
    let par =
      solve_corrector_par(&spec, &mut mock(3), &view, &mut hook, &CancelToken::new()).unwrap();
    assert_eq!(seq, par);
    assert_eq!(seen, TensorIndexSet::full(3).pairs());
  }

  #[test]
  fn parallel_failure_propagates() {
    let spec = rs_spec();
    let store = pis_store(3, 3);
    let view = store.view("corrs_rs", &spec.requires).unwrap();
    let mut problem = mock(3);
    problem.fail_at = Some(IndexPair::new(2, 1));
    let err = solve_corrector_par(&spec, &mut problem, &view, &mut NoSave, &CancelToken::new())
      .unwrap_err();
    assert!(matches!(err, Error::Problem { index, .. } if index == IndexPair::new(2, 1)));
  }

  #[test]
  fn parallel_failure_skips_pending_pairs() {
    let spec = rs_spec();
    let store = pis_store(3, 3);
    let view = store.view("corrs_rs", &spec.requires).unwrap();
    let mut problem = mock(3);
    problem.fail_at = Some(IndexPair::new(0, 0));

    // A single worker takes the pairs in order.
    let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
    let err = pool
      .install(|| solve_corrector_par(&spec, &mut problem, &view, &mut NoSave, &CancelToken::new()))
      .unwrap_err();
    assert!(matches!(err, Error::Problem { index, .. } if index == IndexPair::SCALAR));
    assert_eq!(problem.solves(), vec![IndexPair::SCALAR]);
  }

  #[test]
  fn cancelled_before_first_solve() {
    let spec = rs_spec();
    let store = pis_store(2, 3);
    let view = store.view("corrs_rs", &spec.requires).unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut problem = mock(2);
    let err = solve_corrector(&spec, &mut problem, &view, &mut NoSave, &cancel).unwrap_err();
    assert!(err.is_cancelled());
    assert!(problem.solves().is_empty());
  }

  #[test]
  fn misconfigured_substitution() {
    let spec = CorrectorSpec::one("corrs_p")
      .substitutions(CorrVariables::Pressure)
      .variables(["u"])
      .equation("eq", "x = 0");
    assert!(matches!(spec.validate(), Err(Error::Config { .. })));
  }
}
