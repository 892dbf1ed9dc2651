use crate::{index::IndexPair, problem::ProblemError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("cyclic dependency: {}", cycle.join(" -> "))]
  CyclicDependency { cycle: Vec<String> },
  #[error("`{required_by}` requires `{name}`, which is not defined")]
  UnknownRequirement { name: String, required_by: String },
  #[error("requirement `{0}` is defined more than once")]
  DuplicateRequirement(String),
  #[error("`{0}` was already computed in this run")]
  AlreadyComputed(String),

  #[error("`{requirement}` needs `{name}`, which is not in the data store")]
  MissingData { requirement: String, name: String },
  #[error("`{requirement}`: slot {index} of `{name}` was not computed")]
  MissingSlot {
    requirement: String,
    name: String,
    index: IndexPair,
  },
  #[error("`{requirement}`: slot {index} is out of range or already filled")]
  SlotConflict {
    requirement: String,
    index: IndexPair,
  },
  #[error("`{requirement}`: `{name}` has the wrong shape (expected {expected}, found {found})")]
  DataShape {
    requirement: String,
    name: String,
    expected: String,
    found: String,
  },
  #[error("`{requirement}`: {message}")]
  Config {
    requirement: String,
    message: String,
  },
  #[error("`{requirement}`: template `{template}` has {expected} placeholders but {found} regions were given")]
  Template {
    requirement: String,
    template: String,
    expected: usize,
    found: usize,
  },

  #[error("`{requirement}` {index}: solved state violates its essential boundary conditions")]
  EbcViolated {
    requirement: String,
    index: IndexPair,
  },
  #[error("`{requirement}` {index}: {source}")]
  Problem {
    requirement: String,
    index: IndexPair,
    #[source]
    source: ProblemError,
  },
  #[error("`{requirement}` {index}: save hook failed: {source}")]
  SaveHook {
    requirement: String,
    index: IndexPair,
    #[source]
    source: ProblemError,
  },
  #[error("`{requirement}`: run cancelled")]
  Cancelled { requirement: String },
}

impl Error {
  pub fn config(requirement: &str, message: impl Into<String>) -> Self {
    Self::Config {
      requirement: requirement.to_string(),
      message: message.into(),
    }
  }

  pub(crate) fn problem(requirement: &str, index: IndexPair) -> impl FnOnce(ProblemError) -> Self + '_ {
    move |source| Self::Problem {
      requirement: requirement.to_string(),
      index,
      source,
    }
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::Cancelled { .. })
  }
}
