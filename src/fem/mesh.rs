use super::{FemError, FemResult};

use itertools::Itertools;

pub type VertexIdx = usize;
pub type CellIdx = usize;

/// Interval mesh: sorted vertex coordinates, cells between consecutive vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct LineMesh {
  coors: Vec<f64>,
}

impl LineMesh {
  pub fn from_coors(coors: Vec<f64>) -> FemResult<Self> {
    if coors.len() < 2 {
      return Err(FemError::Mesh(format!(
        "at least 2 vertices are needed, got {}",
        coors.len()
      )));
    }
    if let Some(x) = coors.iter().find(|x| !x.is_finite()) {
      return Err(FemError::Mesh(format!("non-finite coordinate {x}")));
    }
    if let Some((a, b)) = coors.iter().tuple_windows().find(|(a, b)| a >= b) {
      return Err(FemError::Mesh(format!(
        "coordinates must be strictly increasing, found {a} before {b}"
      )));
    }
    Ok(Self { coors })
  }

  /// `ncells` equally sized cells on `[start, end]`.
  pub fn linspace(start: f64, end: f64, ncells: usize) -> FemResult<Self> {
    if ncells == 0 {
      return Err(FemError::Mesh("at least one cell is needed".to_string()));
    }
    let h = (end - start) / ncells as f64;
    let coors = (0..=ncells)
      .map(|i| if i == ncells { end } else { start + i as f64 * h })
      .collect();
    Self::from_coors(coors)
  }

  pub fn nvertices(&self) -> usize {
    self.coors.len()
  }
  pub fn ncells(&self) -> usize {
    self.coors.len() - 1
  }
  pub fn coors(&self) -> &[f64] {
    &self.coors
  }
  pub fn coor(&self, ivertex: VertexIdx) -> f64 {
    self.coors[ivertex]
  }

  pub fn cell(&self, icell: CellIdx) -> LineCell {
    LineCell {
      vertices: [icell, icell + 1],
      coors: [self.coors[icell], self.coors[icell + 1]],
    }
  }
  pub fn cells(&self) -> impl Iterator<Item = LineCell> + '_ {
    (0..self.ncells()).map(|icell| self.cell(icell))
  }

  pub fn bounds(&self) -> (f64, f64) {
    (self.coors[0], self.coors[self.coors.len() - 1])
  }
  pub fn volume(&self) -> f64 {
    let (a, b) = self.bounds();
    b - a
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineCell {
  pub vertices: [VertexIdx; 2],
  pub coors: [f64; 2],
}

impl LineCell {
  pub fn vol(&self) -> f64 {
    self.coors[1] - self.coors[0]
  }
  pub fn centre(&self) -> f64 {
    0.5 * (self.coors[0] + self.coors[1])
  }
}
