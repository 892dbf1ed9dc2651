use super::{
  assemble::{self, GalVec, LaplaceElmat, MassElmat, SourceElvec},
  conf::{MaterialValue, ProblemConf, VarDef, VarKind},
  field::{DofIdx, Field},
  mesh::LineMesh,
  region::{Region, RegionKind},
  terms::{self, Term, TermKind},
  FemError, FemResult,
};
use crate::{
  index::IndexPair,
  linalg::{self, FaerLu},
  problem::{DofInfo, Problem, ProblemError, StateVector, VariableInfo},
  sparse::SparseMatrix,
  util, Dim,
};

use indexmap::IndexMap;

use std::sync::Arc;

/// Immutable part of a problem, shared between clones.
#[derive(Debug)]
struct Setup {
  mesh: LineMesh,
  conf: ProblemConf,
  regions: IndexMap<String, Region>,
  fields: IndexMap<String, Field>,
}

/// Scalar P1 problem on a [`LineMesh`].
///
/// Cloning is cheap: the mesh and configuration are shared, while the
/// selections, equations and known values are owned by each clone.
#[derive(Debug, Clone)]
pub struct LineProblem {
  setup: Arc<Setup>,
  selected: Vec<String>,
  equations: IndexMap<String, Vec<Term>>,
  ebcs: Vec<String>,
  values: IndexMap<String, StateVector>,
}

impl LineProblem {
  /// Checks the whole configuration; nothing is assembled yet.
  pub fn new(mesh: LineMesh, conf: ProblemConf) -> FemResult<Self> {
    if !conf.epbcs.is_empty() {
      return Err(FemError::PeriodicUnsupported(conf.epbcs.keys().cloned().collect()));
    }

    let regions = conf
      .regions
      .iter()
      .map(|(name, selector)| -> FemResult<(String, Region)> {
        Ok((name.clone(), Region::new(name.as_str(), selector, &mesh)?))
      })
      .collect::<FemResult<IndexMap<_, _>>>()?;

    let fields = conf
      .fields
      .iter()
      .map(|(name, def)| -> FemResult<(String, Field)> {
        let region = regions
          .get(&def.region)
          .ok_or_else(|| FemError::UnknownRegion(def.region.clone()))?;
        Ok((name.clone(), Field::new(name, def, region, &mesh)?))
      })
      .collect::<FemResult<IndexMap<_, _>>>()?;

    let setup = Setup {
      mesh,
      conf,
      regions,
      fields,
    };
    setup.check_variables()?;
    for name in setup.conf.ebcs.keys() {
      setup.ebc_dofs(name)?;
    }
    let equations = setup
      .conf
      .equations
      .iter()
      .map(|(name, equation)| -> FemResult<(String, Vec<Term>)> {
        Ok((name.clone(), setup.parse_equation(equation)?))
      })
      .collect::<FemResult<IndexMap<_, _>>>()?;

    Ok(Self {
      selected: setup.conf.variables.keys().cloned().collect(),
      ebcs: setup.conf.ebcs.keys().cloned().collect(),
      equations,
      values: IndexMap::new(),
      setup: Arc::new(setup),
    })
  }

  pub fn mesh(&self) -> &LineMesh {
    &self.setup.mesh
  }
  pub fn conf(&self) -> &ProblemConf {
    &self.setup.conf
  }
  pub fn region(&self, name: &str) -> Option<&Region> {
    self.setup.regions.get(name)
  }
  pub fn field(&self, name: &str) -> Option<&Field> {
    self.setup.fields.get(name)
  }
  /// Value set for a known variable.
  pub fn value(&self, name: &str) -> Option<&StateVector> {
    self.values.get(name)
  }

  /// Selected unknowns in declaration order.
  fn unknowns(&self) -> Vec<&str> {
    self
      .setup
      .conf
      .variables
      .iter()
      .filter(|(name, var)| var.kind == VarKind::Unknown && self.selected.contains(*name))
      .map(|(name, _)| name.as_str())
      .collect()
  }

  fn layout(&self) -> FemResult<DofInfo> {
    let mut di = DofInfo::new();
    for name in self.unknowns() {
      di.push(name, self.setup.var_field(name)?.n_nod());
    }
    Ok(di)
  }

  /// Assembles the selected equations, applies the selected EBCs and solves.
  pub fn solve_state(&self) -> FemResult<StateVector> {
    let di = self.layout()?;
    if di.ndofs() == 0 {
      return Err(FemError::NoUnknowns);
    }

    let mut galmat = SparseMatrix::zeros(di.ndofs(), di.ndofs());
    let mut galvec = GalVec::zeros(di.ndofs());
    for term in self.equations.values().flatten() {
      self.assemble_term(term, &di, &mut galmat, &mut galvec)?;
    }

    let dof_coeffs = self.selected_ebc_dofs(&di)?;
    assemble::fix_dofs_coeff(&dof_coeffs, &mut galmat, &mut galvec);

    let lu = FaerLu::new(galmat.to_nalgebra_csr()).ok_or(FemError::Singular)?;
    let mut state = lu.solve(&galvec);
    if state.iter().any(|v| !v.is_finite()) {
      return Err(FemError::Singular);
    }
    for (idof, value) in dof_coeffs {
      state[idof] = value;
    }
    Ok(state)
  }

  /// Adds the contribution of one residual term to the linear system.
  fn assemble_term(
    &self,
    term: &Term,
    di: &DofInfo,
    galmat: &mut SparseMatrix,
    galvec: &mut GalVec,
  ) -> FemResult<()> {
    let setup = &self.setup;
    let region = setup.term_region(term)?;
    let material = setup.term_material(term)?;

    let test = &term.vars[0];
    let VarKind::Test { of } = &setup.var(test)?.kind else {
      return Err(FemError::parse(
        &term.name,
        format!("`{test}` must be a test variable"),
      ));
    };
    let Some(rows) = di.indx(of) else {
      return Err(FemError::UnknownVariable(of.clone()));
    };
    let test_field = setup.var_field(test)?;

    match term.kind {
      TermKind::Laplace | TermKind::VolumeDot => {
        let var = &term.vars[1];
        let var_field = setup.var_field(var)?;
        let block = match term.kind {
          TermKind::Laplace => {
            assemble::assemble_galmat(&setup.mesh, region, test_field, var_field, LaplaceElmat { coef: material })?
          }
          _ => assemble::assemble_galmat(&setup.mesh, region, test_field, var_field, MassElmat { coef: material })?,
        };
        match di.indx(var) {
          Some(cols) => galmat.add_block(rows.start, cols.start, term.factor, &block),
          None => {
            let value = self.known_value(var, var_field)?;
            let known = block.to_nalgebra_csr() * value;
            galvec.rows_range_mut(rows).axpy(-term.factor, &known, 1.0);
          }
        }
      }
      TermKind::VolumeLvf => {
        let source = assemble::assemble_galvec(&setup.mesh, region, test_field, SourceElvec { coef: material })?;
        galvec.rows_range_mut(rows).axpy(-term.factor, &source, 1.0);
      }
      TermKind::EvVolume | TermKind::EvIntegrate => {
        return Err(FemError::UnsupportedTerm(term.name.clone()));
      }
    }
    Ok(())
  }

  fn known_value(&self, name: &str, field: &Field) -> FemResult<&StateVector> {
    let value = self
      .values
      .get(name)
      .ok_or_else(|| FemError::UnsetVariable(name.to_string()))?;
    if value.len() != field.n_nod() {
      return Err(FemError::Length {
        name: name.to_string(),
        expected: field.n_nod(),
        found: value.len(),
      });
    }
    Ok(value)
  }

  /// Prescribed values of the selected EBCs, by global DOF.
  fn selected_ebc_dofs(&self, di: &DofInfo) -> FemResult<Vec<(DofIdx, f64)>> {
    let mut dof_coeffs = Vec::new();
    for name in &self.ebcs {
      for (var, local_dofs) in self.setup.ebc_dofs(name)? {
        let Some(block) = di.indx(var) else {
          tracing::warn!("ebc `{name}` on unselected variable `{var}` is ignored");
          continue;
        };
        dof_coeffs.extend(local_dofs.into_iter().map(|(idof, v)| (block.start + idof, v)));
      }
    }
    Ok(dof_coeffs)
  }

  /// Value of a scalar expression with the currently known values.
  pub fn evaluate_expression(&self, expression: &str) -> FemResult<f64> {
    let terms = terms::parse_expression(expression)?;
    let mut total = 0.0;
    for term in &terms {
      self.setup.check_term(term)?;
      total += term.factor * self.evaluate_term(term)?;
    }
    Ok(total)
  }

  fn evaluate_term(&self, term: &Term) -> FemResult<f64> {
    let setup = &self.setup;
    let mesh = &setup.mesh;
    let region = setup.term_region(term)?;
    let material = setup.term_material(term)?;
    let fields = term
      .vars
      .iter()
      .map(|var| setup.var_field(var))
      .collect::<FemResult<Vec<_>>>()?;

    let value = match term.kind {
      TermKind::Laplace | TermKind::VolumeDot => {
        let galmat = match term.kind {
          TermKind::Laplace => {
            assemble::assemble_galmat(mesh, region, fields[0], fields[1], LaplaceElmat { coef: material })?
          }
          _ => assemble::assemble_galmat(mesh, region, fields[0], fields[1], MassElmat { coef: material })?,
        };
        let u = self.known_value(&term.vars[0], fields[0])?;
        let v = self.known_value(&term.vars[1], fields[1])?;
        linalg::bilinear_form(&galmat.to_nalgebra_csr(), u, v)
      }
      TermKind::VolumeLvf => {
        let source = assemble::assemble_galvec(mesh, region, fields[0], SourceElvec { coef: material })?;
        source.dot(self.known_value(&term.vars[0], fields[0])?)
      }
      TermKind::EvVolume => region.volume(mesh),
      TermKind::EvIntegrate => {
        let galvec = assemble::assemble_galvec(mesh, region, fields[0], SourceElvec { coef: None })?;
        let u = self.known_value(&term.vars[0], fields[0])?;
        match material {
          None => galvec.dot(u),
          Some(material) => {
            let weighted = StateVector::from_iterator(
              u.len(),
              u.iter().zip(fields[0].coors(mesh).iter()).map(|(u, &x)| u * material.eval(x)),
            );
            galvec.dot(&weighted)
          }
        }
      }
    };
    Ok(value)
  }
}

impl Setup {
  fn var(&self, name: &str) -> FemResult<&VarDef> {
    self
      .conf
      .variables
      .get(name)
      .ok_or_else(|| FemError::UnknownVariable(name.to_string()))
  }

  fn var_field(&self, name: &str) -> FemResult<&Field> {
    let var = self.var(name)?;
    self
      .fields
      .get(&var.field)
      .ok_or_else(|| FemError::UnknownField(var.field.clone()))
  }

  fn primary_var_name<'a>(&'a self, name: &'a str) -> FemResult<&'a str> {
    Ok(match &self.var(name)?.kind {
      VarKind::Unknown | VarKind::Parameter { like: None } => name,
      VarKind::Test { of } => of.as_str(),
      VarKind::Parameter { like: Some(like) } => like.as_str(),
    })
  }

  fn check_variables(&self) -> FemResult<()> {
    for (name, var) in &self.conf.variables {
      let field = self.var_field(name)?;
      let target = match &var.kind {
        VarKind::Unknown | VarKind::Parameter { like: None } => continue,
        VarKind::Test { of } => of,
        VarKind::Parameter { like: Some(like) } => like,
      };
      if self.var(target)?.kind != VarKind::Unknown {
        return Err(FemError::UnknownVariable(format!("{target} (referenced by {name})")));
      }
      let target_field = self.var_field(target)?;
      if target_field.n_nod() != field.n_nod() {
        return Err(FemError::Length {
          name: name.clone(),
          expected: target_field.n_nod(),
          found: field.n_nod(),
        });
      }
    }
    Ok(())
  }

  fn term_region(&self, term: &Term) -> FemResult<&Region> {
    let region = self
      .regions
      .get(&term.region)
      .ok_or_else(|| FemError::UnknownRegion(term.region.clone()))?;
    if region.kind != RegionKind::Cell {
      return Err(FemError::UnsuitableRegion {
        name: term.name.clone(),
        region: region.name.clone(),
      });
    }
    Ok(region)
  }

  fn term_material(&self, term: &Term) -> FemResult<Option<&MaterialValue>> {
    let Some(m) = &term.material else {
      return Ok(None);
    };
    let material = self
      .conf
      .materials
      .get(&m.material)
      .ok_or_else(|| FemError::UnknownMaterial(m.material.clone()))?;
    let value = material
      .get(&m.param)
      .ok_or_else(|| FemError::UnknownMaterial(format!("{}.{}", m.material, m.param)))?;
    Ok(Some(value))
  }

  /// Resolves every name a term refers to.
  fn check_term(&self, term: &Term) -> FemResult<()> {
    if !self.conf.integrals.contains_key(&term.integral) {
      return Err(FemError::UnknownIntegral(term.integral.clone()));
    }
    self.term_region(term)?;
    self.term_material(term)?;
    for var in &term.vars {
      self.var_field(var)?;
    }
    Ok(())
  }

  fn parse_equation(&self, equation: &str) -> FemResult<Vec<Term>> {
    let terms = terms::parse_equation(equation)?;
    for term in &terms {
      self.check_term(term)?;
      if term.kind.is_evaluation_only() {
        return Err(FemError::UnsupportedTerm(term.name.clone()));
      }
    }
    Ok(terms)
  }

  /// Prescribed values of an EBC, by variable and field DOF.
  fn ebc_dofs(&self, name: &str) -> FemResult<Vec<(&str, Vec<(DofIdx, f64)>)>> {
    let ebc = self
      .conf
      .ebcs
      .get(name)
      .ok_or_else(|| FemError::UnknownCondition(name.to_string()))?;
    let region = self
      .regions
      .get(&ebc.region)
      .ok_or_else(|| FemError::UnknownRegion(ebc.region.clone()))?;

    ebc
      .dofs
      .iter()
      .map(|(key, &value)| -> FemResult<(&str, Vec<(DofIdx, f64)>)> {
        let (var, component) = key
          .split_once('.')
          .ok_or_else(|| FemError::parse(key, "expected `<variable>.<component>`"))?;
        if component != "0" && component != "all" {
          return Err(FemError::parse(key, "scalar fields only have component 0"));
        }
        if self.var(var)?.kind != VarKind::Unknown {
          return Err(FemError::UnknownVariable(format!("{var} (in ebc {name})")));
        }
        let field = self.var_field(var)?;
        let dofs = region
          .vertices
          .iter()
          .filter_map(|&ivertex| field.dof(ivertex))
          .map(|idof| (idof, value))
          .collect();
        Ok((var, dofs))
      })
      .collect()
  }
}

impl Problem for LineProblem {
  fn dim(&self) -> Dim {
    1
  }

  fn select_variables(&mut self, names: &[String]) -> Result<(), ProblemError> {
    for name in names {
      self.setup.var(name)?;
    }
    self.selected = names.to_vec();
    Ok(())
  }

  fn set_equations(&mut self, equations: &IndexMap<String, String>) -> Result<(), ProblemError> {
    self.equations = equations
      .iter()
      .map(|(name, equation)| -> FemResult<(String, Vec<Term>)> {
        Ok((name.clone(), self.setup.parse_equation(equation)?))
      })
      .collect::<FemResult<_>>()?;
    Ok(())
  }

  fn select_bcs(&mut self, ebc_names: &[String], epbc_names: &[String]) -> Result<(), ProblemError> {
    if !epbc_names.is_empty() {
      return Err(FemError::PeriodicUnsupported(epbc_names.to_vec()).into());
    }
    for name in ebc_names {
      self.setup.ebc_dofs(name)?;
    }
    self.ebcs = ebc_names.to_vec();
    Ok(())
  }

  fn set_variable(&mut self, name: &str, value: StateVector) -> Result<(), ProblemError> {
    let field = self.setup.var_field(name)?;
    if value.len() != field.n_nod() {
      return Err(
        FemError::Length {
          name: name.to_string(),
          expected: field.n_nod(),
          found: value.len(),
        }
        .into(),
      );
    }
    if !self.selected.iter().any(|s| s == name) {
      tracing::warn!("setting `{name}`, which is not selected");
    }
    self.values.insert(name.to_string(), value);
    Ok(())
  }

  fn solve(&mut self, index: IndexPair) -> Result<StateVector, ProblemError> {
    let state = self.solve_state()?;
    tracing::debug!("solved {index}: {} dofs", state.len());
    Ok(state)
  }

  fn has_ebc(&self, state: &StateVector) -> bool {
    let Ok(di) = self.layout() else {
      return false;
    };
    if state.len() != di.ndofs() {
      return false;
    }
    match self.selected_ebc_dofs(&di) {
      Ok(dof_coeffs) => dof_coeffs
        .iter()
        .all(|&(idof, value)| util::is_close(state[idof], value)),
      Err(_) => false,
    }
  }

  fn dof_info(&self) -> DofInfo {
    self.layout().unwrap_or_default()
  }

  fn variable(&self, name: &str) -> Result<VariableInfo, ProblemError> {
    let field = self.setup.var_field(name)?;
    Ok(VariableInfo {
      name: name.to_string(),
      primary_var_name: self.setup.primary_var_name(name)?.to_string(),
      n_nod: field.n_nod(),
      n_components: 1,
      coors: field.coors(&self.setup.mesh),
    })
  }

  fn evaluate(&mut self, expression: &str) -> Result<f64, ProblemError> {
    Ok(self.evaluate_expression(expression)?)
  }
}
