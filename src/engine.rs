//! Runs a set of requirements in dependency order and collects their results.

use crate::{
  cancel::CancelToken,
  coefficient::{self, CoefSpec},
  corrector::{self, CorrectorResult, CorrectorSpec},
  error::{Error, Result},
  graph::DependencyGraph,
  problem::Problem,
  save::{NoSave, SaveHook},
  shape::{self, ShapeSpec},
  store::{DataStore, DataView, Datum},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementKind {
  Corrector,
  Coefficient,
}

#[derive(Debug, Clone)]
pub enum Requirement {
  Shape(ShapeSpec),
  Corrector(CorrectorSpec),
  Coefficient(CoefSpec),
}

impl Requirement {
  pub fn kind(&self) -> RequirementKind {
    match self {
      Self::Shape(_) | Self::Corrector(_) => RequirementKind::Corrector,
      Self::Coefficient(_) => RequirementKind::Coefficient,
    }
  }

  pub fn name(&self) -> &str {
    match self {
      Self::Shape(s) => &s.name,
      Self::Corrector(c) => &c.name,
      Self::Coefficient(c) => &c.name,
    }
  }

  /// Names of the requirements whose results this one reads.
  pub fn requires(&self) -> Vec<String> {
    match self {
      Self::Shape(_) => Vec::new(),
      Self::Corrector(c) => c.requires.clone(),
      Self::Coefficient(c) => c.dependencies(),
    }
  }

  /// Problem variables this requirement selects or substitutes.
  pub fn variables(&self) -> Vec<&str> {
    match self {
      Self::Shape(s) => vec![s.variable.as_str()],
      Self::Corrector(c) => c.variables.iter().map(String::as_str).collect(),
      Self::Coefficient(c) => c.variables.iter().map(String::as_str).collect(),
    }
  }

  fn validate(&self) -> Result<()> {
    match self {
      Self::Shape(_) => Ok(()),
      Self::Corrector(c) => c.validate().map(|_| ()),
      Self::Coefficient(c) => c.validate().map(|_| ()),
    }
  }
}

impl From<ShapeSpec> for Requirement {
  fn from(spec: ShapeSpec) -> Self {
    Self::Shape(spec)
  }
}
impl From<CorrectorSpec> for Requirement {
  fn from(spec: CorrectorSpec) -> Self {
    Self::Corrector(spec)
  }
}
impl From<CoefSpec> for Requirement {
  fn from(spec: CoefSpec) -> Self {
    Self::Coefficient(spec)
  }
}

type CorrectorSolver<P> =
  fn(&CorrectorSpec, &mut P, &DataView, &mut dyn SaveHook, &CancelToken) -> Result<CorrectorResult>;

/// Homogenization driver.
///
/// The engine holds configuration only; every run starts from an empty
/// [`DataStore`], so repeated runs on the same problem give identical results.
#[derive(Debug, Default)]
pub struct HomogenizationEngine {
  graph: DependencyGraph<Requirement>,
  targets: Option<Vec<String>>,
  cancel: CancelToken,
}

/// A clone gets its own, uncancelled token.
impl Clone for HomogenizationEngine {
  fn clone(&self) -> Self {
    Self {
      graph: self.graph.clone(),
      targets: self.targets.clone(),
      cancel: CancelToken::new(),
    }
  }
}

impl HomogenizationEngine {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&mut self, requirement: impl Into<Requirement>) -> Result<&mut Self> {
    let requirement = requirement.into();
    let name = requirement.name().to_string();
    let requires = requirement.requires();
    self.graph.insert(name, requires, requirement)?;
    Ok(self)
  }

  /// Restricts runs to `targets` and what they transitively require.
  pub fn compute_only<I: IntoIterator<Item = S>, S: Into<String>>(&mut self, targets: I) -> &mut Self {
    self.targets = Some(targets.into_iter().map(Into::into).collect());
    self
  }

  pub fn requirement(&self, name: &str) -> Option<&Requirement> {
    self.graph.get(name)
  }

  /// Token that stops running and future runs before their next solve,
  /// until it is reset.
  pub fn cancel_token(&self) -> CancelToken {
    self.cancel.clone()
  }

  /// Names in execution order.
  ///
  /// Fails on cycles and unknown requirements, and on any requirement whose
  /// configuration is invalid.
  pub fn plan(&self) -> Result<Vec<&str>> {
    let order = match &self.targets {
      Some(targets) => self.graph.order_for(targets)?,
      None => self.graph.order()?,
    };
    for name in &order {
      if let Some(requirement) = self.graph.get(name) {
        requirement.validate()?;
      }
    }
    Ok(order)
  }

  /// Runs every planned requirement, correctors solving one pair after the other.
  pub fn run<P: Problem>(&self, problem: &mut P, save_hook: Option<&mut dyn SaveHook>) -> Result<DataStore> {
    self.execute(problem, save_hook, corrector::solve_corrector::<P>)
  }

  /// Like [`Self::run`], with the index pairs of each corrector solved in parallel.
  pub fn run_par<P>(&self, problem: &mut P, save_hook: Option<&mut dyn SaveHook>) -> Result<DataStore>
  where
    P: Problem + Clone + Send + Sync,
  {
    self.execute(problem, save_hook, corrector::solve_corrector_par::<P>)
  }

  /// Every variable named by a planned requirement must exist in `problem`.
  fn check_variables<P: Problem>(&self, order: &[&str], problem: &P) -> Result<()> {
    for &name in order {
      let Some(requirement) = self.graph.get(name) else {
        continue;
      };
      for var in requirement.variables() {
        if let Err(e) = problem.variable(var) {
          return Err(Error::config(name, format!("variable `{var}`: {e}")));
        }
      }
    }
    Ok(())
  }

  fn execute<P: Problem>(
    &self,
    problem: &mut P,
    save_hook: Option<&mut dyn SaveHook>,
    solve: CorrectorSolver<P>,
  ) -> Result<DataStore> {
    let order = self.plan()?;
    self.check_variables(&order, &*problem)?;
    tracing::info!("homogenization plan: {}", order.join(", "));

    let mut no_save = NoSave;
    let save_hook: &mut dyn SaveHook = match save_hook {
      Some(hook) => hook,
      None => &mut no_save,
    };

    let mut store = DataStore::new();
    for name in order {
      if self.cancel.is_cancelled() {
        return Err(Error::Cancelled {
          requirement: name.to_string(),
        });
      }
      let Some(requirement) = self.graph.get(name) else {
        continue;
      };
      let _span = tracing::info_span!("requirement", name).entered();
      tracing::info!("computing {name} ({:?})", requirement.kind());

      let datum = {
        let data = store.view(name, &requirement.requires())?;
        match requirement {
          Requirement::Shape(spec) => Datum::Shape(shape::evaluate_shape(spec, &*problem)?),
          Requirement::Corrector(spec) => {
            Datum::Corrector(solve(spec, problem, &data, &mut *save_hook, &self.cancel)?)
          }
          Requirement::Coefficient(spec) => {
            let value = coefficient::evaluate_coef(spec, problem, &data, &self.cancel)?;
            tracing::info!("{name} = {value:?}");
            Datum::Coefficient(value)
          }
        }
      };
      store.insert(name, datum)?;
    }
    Ok(store)
  }
}
