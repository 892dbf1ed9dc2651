//! Contract with the FEM core that configures, solves and evaluates.

use crate::{index::IndexPair, Dim};

use indexmap::IndexMap;

use std::ops::Range;

pub type StateVector = na::DVector<f64>;
pub type ProblemError = Box<dyn std::error::Error + Send + Sync>;

/// Location of named variable blocks inside a flat state vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DofInfo {
  indx: IndexMap<String, Range<usize>>,
  ndofs: usize,
}

impl DofInfo {
  pub fn new() -> Self {
    Self::default()
  }

  /// Appends a block of `ndofs` DOFs for `name`.
  pub fn push(&mut self, name: impl Into<String>, ndofs: usize) {
    let start = self.ndofs;
    self.ndofs += ndofs;
    self.indx.insert(name.into(), start..self.ndofs);
  }

  pub fn indx(&self, name: &str) -> Option<Range<usize>> {
    self.indx.get(name).cloned()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.indx.keys().map(String::as_str)
  }

  pub fn ndofs(&self) -> usize {
    self.ndofs
  }

  /// The block of `name` copied out of `state`.
  pub fn extract(&self, name: &str, state: &StateVector) -> Option<StateVector> {
    let range = self.indx.get(name)?;
    (range.end <= state.len()).then(|| state.rows_range(range.clone()).into_owned())
  }
}

/// What the orchestration layer needs to know about one problem variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
  pub name: String,
  /// The unknown this variable shares its DOF layout with.
  pub primary_var_name: String,
  pub n_nod: usize,
  pub n_components: usize,
  /// Nodal coordinates of the variable's field, one row per node.
  pub coors: na::DMatrix<f64>,
}

/// A configurable FEM problem.
///
/// Configuration calls mutate the problem in place,
/// so one instance must not be shared between concurrent solves.
pub trait Problem {
  fn dim(&self) -> Dim;

  fn select_variables(&mut self, names: &[String]) -> Result<(), ProblemError>;
  /// Equations by name. Placeholders are already substituted.
  fn set_equations(&mut self, equations: &IndexMap<String, String>) -> Result<(), ProblemError>;
  fn select_bcs(&mut self, ebc_names: &[String], epbc_names: &[String]) -> Result<(), ProblemError>;
  /// Sets the nodal values of a known variable.
  fn set_variable(&mut self, name: &str, value: StateVector) -> Result<(), ProblemError>;

  fn solve(&mut self, index: IndexPair) -> Result<StateVector, ProblemError>;
  /// Whether `state` satisfies the selected essential boundary conditions.
  fn has_ebc(&self, state: &StateVector) -> bool;
  /// DOF layout of the states returned by [`Problem::solve`].
  fn dof_info(&self) -> DofInfo;

  fn variable(&self, name: &str) -> Result<VariableInfo, ProblemError>;
  /// Evaluates a scalar expression using the currently set variables.
  fn evaluate(&mut self, expression: &str) -> Result<f64, ProblemError>;
}
