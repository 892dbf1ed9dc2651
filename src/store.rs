//! Results of one homogenization run, keyed by requirement name.

use crate::{
  coefficient::CoefValue,
  corrector::CorrectorResult,
  error::{Error, Result},
  index::TensorSlots,
  problem::StateVector,
};

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
  /// Known nodal fields per index pair, e.g. the "pis".
  Shape(TensorSlots<StateVector>),
  Corrector(CorrectorResult),
  Coefficient(CoefValue),
}

impl Datum {
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Shape(_) => "shape",
      Self::Corrector(_) => "corrector",
      Self::Coefficient(_) => "coefficient",
    }
  }
}

/// Single-assignment map from requirement name to result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataStore {
  data: IndexMap<String, Datum>,
}

impl DataStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, name: impl Into<String>, datum: Datum) -> Result<()> {
    let name = name.into();
    if self.data.contains_key(&name) {
      return Err(Error::AlreadyComputed(name));
    }
    self.data.insert(name, datum);
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<&Datum> {
    self.data.get(name)
  }
  pub fn contains(&self, name: &str) -> bool {
    self.data.contains_key(name)
  }
  pub fn len(&self) -> usize {
    self.data.len()
  }
  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
  /// Names in the order they were computed.
  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.data.keys().map(String::as_str)
  }

  pub fn corrector(&self, name: &str) -> Option<&CorrectorResult> {
    match self.data.get(name)? {
      Datum::Corrector(c) => Some(c),
      _ => None,
    }
  }
  pub fn coefficient(&self, name: &str) -> Option<&CoefValue> {
    match self.data.get(name)? {
      Datum::Coefficient(c) => Some(c),
      _ => None,
    }
  }
  pub fn shape(&self, name: &str) -> Option<&TensorSlots<StateVector>> {
    match self.data.get(name)? {
      Datum::Shape(s) => Some(s),
      _ => None,
    }
  }

  /// Read-only view on the declared requirements of `requirement`.
  pub fn view<'a>(&'a self, requirement: &'a str, requires: &[String]) -> Result<DataView<'a>> {
    let entries = requires
      .iter()
      .map(|name| {
        self
          .data
          .get_key_value(name)
          .map(|(k, v)| (k.as_str(), v))
          .ok_or_else(|| Error::MissingData {
            requirement: requirement.to_string(),
            name: name.clone(),
          })
      })
      .collect::<Result<_>>()?;
    Ok(DataView {
      requirement,
      entries,
    })
  }
}

/// The subset of the store a requirement declared.
#[derive(Debug, Clone)]
pub struct DataView<'a> {
  requirement: &'a str,
  entries: IndexMap<&'a str, &'a Datum>,
}

impl<'a> DataView<'a> {
  pub fn empty(requirement: &'a str) -> Self {
    Self {
      requirement,
      entries: IndexMap::new(),
    }
  }

  pub fn requirement(&self) -> &'a str {
    self.requirement
  }

  pub fn get(&self, name: &str) -> Result<&'a Datum> {
    self
      .entries
      .get(name)
      .copied()
      .ok_or_else(|| Error::MissingData {
        requirement: self.requirement.to_string(),
        name: name.to_string(),
      })
  }

  fn shape_error(&self, name: &str, expected: &str, datum: &Datum) -> Error {
    Error::DataShape {
      requirement: self.requirement.to_string(),
      name: name.to_string(),
      expected: expected.to_string(),
      found: datum.kind().to_string(),
    }
  }

  pub fn shape(&self, name: &str) -> Result<&'a TensorSlots<StateVector>> {
    match self.get(name)? {
      Datum::Shape(s) => Ok(s),
      other => Err(self.shape_error(name, "shape", other)),
    }
  }
  pub fn corrector(&self, name: &str) -> Result<&'a CorrectorResult> {
    match self.get(name)? {
      Datum::Corrector(c) => Ok(c),
      other => Err(self.shape_error(name, "corrector", other)),
    }
  }
  pub fn coefficient(&self, name: &str) -> Result<&'a CoefValue> {
    match self.get(name)? {
      Datum::Coefficient(c) => Ok(c),
      other => Err(self.shape_error(name, "coefficient", other)),
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn single_assignment() {
    let mut store = DataStore::new();
    store
      .insert("E", Datum::Coefficient(CoefValue::Scalar(1.0)))
      .unwrap();
    let err = store
      .insert("E", Datum::Coefficient(CoefValue::Scalar(2.0)))
      .unwrap_err();
    assert!(matches!(err, Error::AlreadyComputed(name) if name == "E"));
    assert_eq!(store.coefficient("E"), Some(&CoefValue::Scalar(1.0)));
  }

  #[test]
  fn view_checks_presence_and_kind() {
    let mut store = DataStore::new();
    store
      .insert("E", Datum::Coefficient(CoefValue::Scalar(1.0)))
      .unwrap();

    let err = store.view("B", &["pis".to_string()]).unwrap_err();
    assert!(matches!(err, Error::MissingData { ref name, .. } if name == "pis"));

    let view = store.view("B", &["E".to_string()]).unwrap();
    assert!(view.coefficient("E").is_ok());
    let err = view.corrector("E").unwrap_err();
    assert!(matches!(err, Error::DataShape { ref found, .. } if found == "coefficient"));
    assert!(matches!(view.get("X"), Err(Error::MissingData { .. })));
  }
}
