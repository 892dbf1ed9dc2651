extern crate nalgebra as na;
extern crate nalgebra_sparse as nas;

pub mod cancel;
pub mod coefficient;
pub mod corrector;
pub mod engine;
pub mod error;
pub mod fem;
pub mod graph;
pub mod index;
pub mod linalg;
pub mod problem;
pub mod save;
pub mod shape;
pub mod sparse;
pub mod store;
pub mod template;
pub mod util;

pub use engine::{HomogenizationEngine, Requirement, RequirementKind};
pub use error::{Error, Result};

pub type Dim = usize;
