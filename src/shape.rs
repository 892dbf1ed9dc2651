//! The "pis": affine nodal fields the elastic correctors are built around.

use crate::{
  error::{Error, Result},
  index::{IndexPair, TensorSlots},
  problem::{Problem, StateVector},
  Dim,
};

/// Configuration of a shape requirement.
#[derive(Debug, Clone)]
pub struct ShapeSpec {
  pub name: String,
  /// The variable whose field nodes the pis live on.
  pub variable: String,
}

impl ShapeSpec {
  pub fn new(name: impl Into<String>, variable: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      variable: variable.into(),
    }
  }
}

/// For every pair `(ir, ic)`, the vector field whose component `ir` is the
/// `ic`-th coordinate and whose other components vanish.
///
/// `coors` has one row per node. Fields are flattened node by node.
pub fn create_pis(coors: &na::DMatrix<f64>, dim: Dim) -> TensorSlots<StateVector> {
  let n_nod = coors.nrows();
  TensorSlots::from_fn(dim, dim, |IndexPair { row: ir, col: ic }| {
    let mut pi = StateVector::zeros(n_nod * dim);
    for inod in 0..n_nod {
      pi[inod * dim + ir] = coors[(inod, ic)];
    }
    Some(pi)
  })
}

pub fn evaluate_shape<P: Problem + ?Sized>(spec: &ShapeSpec, problem: &P) -> Result<TensorSlots<StateVector>> {
  let dim = problem.dim();
  let info = problem
    .variable(&spec.variable)
    .map_err(Error::problem(&spec.name, IndexPair::SCALAR))?;
  if info.coors.ncols() < dim {
    return Err(Error::config(
      &spec.name,
      format!(
        "`{}` has {}D coordinates, the problem is {dim}D",
        spec.variable,
        info.coors.ncols()
      ),
    ));
  }
  Ok(create_pis(&info.coors, dim))
}
