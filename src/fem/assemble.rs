use super::{
  conf::MaterialValue,
  field::{DofIdx, Field},
  mesh::{LineCell, LineMesh},
  region::Region,
  FemError, FemResult,
};
use crate::{sparse::SparseMatrix, util};

use rayon::prelude::*;

pub type ElMat = na::DMatrix<f64>;
pub type ElVec = na::DVector<f64>;
pub type GalVec = na::DVector<f64>;

pub trait ElMatProvider: Sync {
  fn eval(&self, cell: &LineCell) -> ElMat;
}
impl<F> ElMatProvider for F
where
  F: Fn(&LineCell) -> ElMat + Sync,
{
  fn eval(&self, cell: &LineCell) -> ElMat {
    self(cell)
  }
}

pub trait ElVecProvider: Sync {
  fn eval(&self, cell: &LineCell) -> ElVec;
}
impl<F> ElVecProvider for F
where
  F: Fn(&LineCell) -> ElVec + Sync,
{
  fn eval(&self, cell: &LineCell) -> ElVec {
    self(cell)
  }
}

/// Material parameter at the cell centre, one if absent.
fn coef_at(coef: Option<&MaterialValue>, cell: &LineCell) -> f64 {
  coef.map_or(1.0, |c| c.eval(cell.centre()))
}

/// Exact Element Matrix Provider for the Laplace operator.
///
/// $A = p/h mat(1, -1; -1, 1)$
pub struct LaplaceElmat<'a> {
  pub coef: Option<&'a MaterialValue>,
}
impl ElMatProvider for LaplaceElmat<'_> {
  fn eval(&self, cell: &LineCell) -> ElMat {
    let v = coef_at(self.coef, cell) / cell.vol();
    na::dmatrix![v, -v; -v, v]
  }
}

/// Exact Element Matrix Provider for the scalar mass bilinear form.
pub struct MassElmat<'a> {
  pub coef: Option<&'a MaterialValue>,
}
impl ElMatProvider for MassElmat<'_> {
  fn eval(&self, cell: &LineCell) -> ElMat {
    let v = coef_at(self.coef, cell) * cell.vol() / 6.0;
    let mut elmat = na::DMatrix::from_element(2, 2, v);
    elmat.fill_diagonal(2.0 * v);
    elmat
  }
}

/// Element Vector Provider for a scalar source.
///
/// Computed using trapezoidal quadrature rule.
/// Exact for constant sources.
pub struct SourceElvec<'a> {
  pub coef: Option<&'a MaterialValue>,
}
impl ElVecProvider for SourceElvec<'_> {
  fn eval(&self, cell: &LineCell) -> ElVec {
    let f = |x: f64| self.coef.map_or(1.0, |c| c.eval(x));
    let h = cell.vol();
    na::dvector![f(cell.coors[0]) * h / 2.0, f(cell.coors[1]) * h / 2.0]
  }
}

fn cell_dofs(mesh: &LineMesh, region: &Region, field: &Field) -> FemResult<Vec<(LineCell, [DofIdx; 2])>> {
  region
    .cells
    .iter()
    .map(|&icell| {
      let cell = mesh.cell(icell);
      let dofs = field.cell_dofs(&cell).ok_or_else(|| FemError::UnsuitableRegion {
        name: field.name.clone(),
        region: region.name.clone(),
      })?;
      Ok((cell, dofs))
    })
    .collect()
}

/// Assembly algorithm for the Galerkin Matrix over the cells of `region`.
///
/// Rows are DOFs of `row_field`, columns DOFs of `col_field`.
pub fn assemble_galmat(
  mesh: &LineMesh,
  region: &Region,
  row_field: &Field,
  col_field: &Field,
  elmat: impl ElMatProvider,
) -> FemResult<SparseMatrix> {
  let rows = cell_dofs(mesh, region, row_field)?;
  let cols = cell_dofs(mesh, region, col_field)?;

  let triplets: Vec<(usize, usize, f64)> = rows
    .par_iter()
    .zip(cols.par_iter())
    .flat_map(|((cell, row_dofs), (_, col_dofs))| {
      let elmat = elmat.eval(cell);

      let mut local_triplets = Vec::new();
      for (ilocal, &iglobal) in row_dofs.iter().enumerate() {
        for (jlocal, &jglobal) in col_dofs.iter().enumerate() {
          let val = elmat[(ilocal, jlocal)];
          if val != 0.0 {
            local_triplets.push((iglobal, jglobal, val));
          }
        }
      }
      local_triplets
    })
    .collect();

  Ok(SparseMatrix::new(row_field.n_nod(), col_field.n_nod(), triplets))
}

/// Assembly algorithm for the Galerkin Vector over the cells of `region`.
pub fn assemble_galvec(
  mesh: &LineMesh,
  region: &Region,
  field: &Field,
  elvec: impl ElVecProvider,
) -> FemResult<GalVec> {
  let cells = cell_dofs(mesh, region, field)?;

  let entries: Vec<(usize, f64)> = cells
    .par_iter()
    .flat_map(|(cell, dofs)| {
      let elvec = elvec.eval(cell);
      dofs
        .iter()
        .enumerate()
        .filter(|&(ilocal, _)| elvec[ilocal] != 0.0)
        .map(|(ilocal, &iglobal)| (iglobal, elvec[ilocal]))
        .collect::<Vec<_>>()
    })
    .collect();

  let mut galvec = na::DVector::zeros(field.n_nod());
  for (irow, val) in entries {
    galvec[irow] += val;
  }
  Ok(galvec)
}

/// Fix DOFs of FE solution.
///
/// Modifies supplied galerkin matrix and galerkin vector,
/// such that the FE solution has the given coefficents on the dofs.
/// $mat(A_0, 0; 0, I) vec(mu_0, mu_diff) = vec(phi - A_(0 diff) gamma, gamma)$
pub fn fix_dofs_coeff(dof_coeffs: &[(DofIdx, f64)], galmat: &mut SparseMatrix, galvec: &mut GalVec) {
  let ndofs = galmat.nrows();

  let dof_coeffs_opt = util::sparse_to_dense_data(dof_coeffs.to_vec(), ndofs);
  let dof_coeffs_zeroed =
    na::DVector::from_iterator(ndofs, dof_coeffs_opt.iter().map(|v| v.unwrap_or(0.0)));

  // Modify galvec.
  *galvec -= galmat.to_nalgebra_csr() * dof_coeffs_zeroed;

  // Set galvec to prescribed coefficents.
  dof_coeffs.iter().for_each(|&(i, v)| galvec[i] = v);

  // Set entires zero that share a (row or column) index with a fixed dof.
  galmat.set_zero(|r, c| dof_coeffs_opt[r].is_some() || dof_coeffs_opt[c].is_some());

  // Set galmat diagonal for dofs to one.
  for &(i, _) in dof_coeffs {
    galmat.push(i, i, 1.0);
  }
}
