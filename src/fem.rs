//! Reference finite element core: P1 elements on a 1D mesh.
//!
//! It implements [`crate::problem::Problem`] for scalar fields so that
//! homogenization runs can be checked end to end.

pub mod assemble;
pub mod conf;
pub mod field;
pub mod mesh;
pub mod problem;
pub mod region;
pub mod terms;

pub use conf::{EbcDef, FieldDef, Material, MaterialValue, ProblemConf, VarDef, VarKind};
pub use mesh::LineMesh;
pub use problem::LineProblem;

pub type FemResult<T> = std::result::Result<T, FemError>;

#[derive(Debug, thiserror::Error)]
pub enum FemError {
  #[error("field `{field}`: approximation order {order} is not supported, only 1 is")]
  UnsupportedApproxOrder { field: String, order: usize },
  #[error("field `{field}`: {n_components} components are not supported, only scalar fields are")]
  UnsupportedField { field: String, n_components: usize },
  #[error("unsuitable region `{region}` for `{name}`")]
  UnsuitableRegion { name: String, region: String },
  #[error("region `{0}` is empty")]
  EmptyRegion(String),

  #[error("unknown region `{0}`")]
  UnknownRegion(String),
  #[error("unknown field `{0}`")]
  UnknownField(String),
  #[error("unknown variable `{0}`")]
  UnknownVariable(String),
  #[error("unknown material `{0}`")]
  UnknownMaterial(String),
  #[error("unknown integral `{0}`")]
  UnknownIntegral(String),
  #[error("unknown boundary condition `{0}`")]
  UnknownCondition(String),

  #[error("cannot parse `{input}`: {message}")]
  Parse { input: String, message: String },
  #[error("unsupported term `{0}`")]
  UnsupportedTerm(String),
  #[error("variable `{0}` has no value")]
  UnsetVariable(String),
  #[error("no unknown variable is selected")]
  NoUnknowns,
  #[error("periodic boundary conditions are not supported: {}", .0.join(", "))]
  PeriodicUnsupported(Vec<String>),

  #[error("invalid mesh: {0}")]
  Mesh(String),
  #[error("`{name}` needs {expected} values, got {found}")]
  Length {
    name: String,
    expected: usize,
    found: usize,
  },
  #[error("system matrix is singular")]
  Singular,
}

impl FemError {
  pub(crate) fn parse(input: &str, message: impl Into<String>) -> Self {
    Self::Parse {
      input: input.to_string(),
      message: message.into(),
    }
  }
}
