//! Declarative problem description.
//!
//! Every table is an [`IndexMap`], so declaration order is the order used
//! for DOF layout and default selections.

use indexmap::IndexMap;

use std::{fmt, sync::Arc};

/// Material parameter, constant or a function of the cell centre.
#[derive(Clone)]
pub enum MaterialValue {
  Constant(f64),
  Function(Arc<dyn Fn(f64) -> f64 + Send + Sync>),
}

impl MaterialValue {
  pub fn eval(&self, x: f64) -> f64 {
    match self {
      Self::Constant(v) => *v,
      Self::Function(f) => f(x),
    }
  }
}

impl fmt::Debug for MaterialValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Constant(v) => write!(f, "Constant({v})"),
      Self::Function(_) => write!(f, "Function(..)"),
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct Material {
  values: IndexMap<String, MaterialValue>,
}

impl Material {
  pub fn new() -> Self {
    Self::default()
  }
  pub fn constant(mut self, name: impl Into<String>, value: f64) -> Self {
    self.values.insert(name.into(), MaterialValue::Constant(value));
    self
  }
  pub fn function<F>(mut self, name: impl Into<String>, f: F) -> Self
  where
    F: Fn(f64) -> f64 + Send + Sync + 'static,
  {
    self.values.insert(name.into(), MaterialValue::Function(Arc::new(f)));
    self
  }
  pub fn get(&self, name: &str) -> Option<&MaterialValue> {
    self.values.get(name)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
  pub n_components: usize,
  pub region: String,
  pub approx_order: usize,
}

impl FieldDef {
  pub fn scalar(region: impl Into<String>, approx_order: usize) -> Self {
    Self {
      n_components: 1,
      region: region.into(),
      approx_order,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarKind {
  Unknown,
  /// Test function of the unknown `of`.
  Test { of: String },
  /// Known field, optionally sharing the DOF layout of the unknown `like`.
  Parameter { like: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDef {
  pub kind: VarKind,
  pub field: String,
}

impl VarDef {
  pub fn unknown(field: impl Into<String>) -> Self {
    Self {
      kind: VarKind::Unknown,
      field: field.into(),
    }
  }
  pub fn test(field: impl Into<String>, of: impl Into<String>) -> Self {
    Self {
      kind: VarKind::Test { of: of.into() },
      field: field.into(),
    }
  }
  pub fn parameter(field: impl Into<String>) -> Self {
    Self {
      kind: VarKind::Parameter { like: None },
      field: field.into(),
    }
  }
  pub fn parameter_like(field: impl Into<String>, like: impl Into<String>) -> Self {
    Self {
      kind: VarKind::Parameter {
        like: Some(like.into()),
      },
      field: field.into(),
    }
  }
}

/// Dirichlet values on the vertices of a region.
///
/// Keys are `<variable>.<component>`, e.g. `t.0`, or `<variable>.all`.
#[derive(Debug, Clone, PartialEq)]
pub struct EbcDef {
  pub region: String,
  pub dofs: IndexMap<String, f64>,
}

impl EbcDef {
  pub fn new<I, S>(region: impl Into<String>, dofs: I) -> Self
  where
    I: IntoIterator<Item = (S, f64)>,
    S: Into<String>,
  {
    Self {
      region: region.into(),
      dofs: dofs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
    }
  }
}

/// Periodic condition between two regions. Declared for completeness;
/// problems reject it.
#[derive(Debug, Clone, PartialEq)]
pub struct EpbcDef {
  pub regions: [String; 2],
  pub dofs: IndexMap<String, String>,
  pub match_fn: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProblemConf {
  pub materials: IndexMap<String, Material>,
  /// Region name to selector, see [`super::region`].
  pub regions: IndexMap<String, String>,
  pub fields: IndexMap<String, FieldDef>,
  pub variables: IndexMap<String, VarDef>,
  pub ebcs: IndexMap<String, EbcDef>,
  pub epbcs: IndexMap<String, EpbcDef>,
  /// Integral name to quadrature order.
  pub integrals: IndexMap<String, usize>,
  pub equations: IndexMap<String, String>,
}

impl ProblemConf {
  pub fn new() -> Self {
    Self::default()
  }
  pub fn material(mut self, name: impl Into<String>, material: Material) -> Self {
    self.materials.insert(name.into(), material);
    self
  }
  pub fn region(mut self, name: impl Into<String>, selector: impl Into<String>) -> Self {
    self.regions.insert(name.into(), selector.into());
    self
  }
  pub fn field(mut self, name: impl Into<String>, field: FieldDef) -> Self {
    self.fields.insert(name.into(), field);
    self
  }
  pub fn variable(mut self, name: impl Into<String>, var: VarDef) -> Self {
    self.variables.insert(name.into(), var);
    self
  }
  pub fn ebc(mut self, name: impl Into<String>, ebc: EbcDef) -> Self {
    self.ebcs.insert(name.into(), ebc);
    self
  }
  pub fn epbc(mut self, name: impl Into<String>, epbc: EpbcDef) -> Self {
    self.epbcs.insert(name.into(), epbc);
    self
  }
  pub fn integral(mut self, name: impl Into<String>, order: usize) -> Self {
    self.integrals.insert(name.into(), order);
    self
  }
  pub fn equation(mut self, name: impl Into<String>, equation: impl Into<String>) -> Self {
    self.equations.insert(name.into(), equation.into());
    self
  }
}
