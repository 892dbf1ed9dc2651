use super::{
  conf::FieldDef,
  mesh::{LineCell, LineMesh, VertexIdx},
  region::{Region, RegionKind},
  FemError, FemResult,
};

pub type DofIdx = usize;

/// Scalar P1 field: one DOF per vertex of its region.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
  pub name: String,
  pub region: String,
  vertices: Vec<VertexIdx>,
  dofs: Vec<Option<DofIdx>>,
}

impl Field {
  pub fn new(name: &str, def: &FieldDef, region: &Region, mesh: &LineMesh) -> FemResult<Self> {
    if def.n_components != 1 {
      return Err(FemError::UnsupportedField {
        field: name.to_string(),
        n_components: def.n_components,
      });
    }
    if def.approx_order != 1 {
      return Err(FemError::UnsupportedApproxOrder {
        field: name.to_string(),
        order: def.approx_order,
      });
    }
    if region.kind != RegionKind::Cell {
      return Err(FemError::UnsuitableRegion {
        name: name.to_string(),
        region: region.name.clone(),
      });
    }

    let mut dofs = vec![None; mesh.nvertices()];
    for (idof, &ivertex) in region.vertices.iter().enumerate() {
      dofs[ivertex] = Some(idof);
    }
    Ok(Self {
      name: name.to_string(),
      region: region.name.clone(),
      vertices: region.vertices.clone(),
      dofs,
    })
  }

  pub fn n_nod(&self) -> usize {
    self.vertices.len()
  }

  pub fn dof(&self, ivertex: VertexIdx) -> Option<DofIdx> {
    self.dofs.get(ivertex).copied().flatten()
  }

  pub fn cell_dofs(&self, cell: &LineCell) -> Option<[DofIdx; 2]> {
    Some([self.dof(cell.vertices[0])?, self.dof(cell.vertices[1])?])
  }

  /// Nodal coordinates, one row per DOF.
  pub fn coors(&self, mesh: &LineMesh) -> na::DMatrix<f64> {
    na::DMatrix::from_iterator(
      self.n_nod(),
      1,
      self.vertices.iter().map(|&ivertex| mesh.coor(ivertex)),
    )
  }
}
