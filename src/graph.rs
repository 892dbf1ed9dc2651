//! Named tasks ordered by their declared requirements.

use crate::error::{Error, Result};

use indexmap::IndexMap;

#[derive(Debug, Clone)]
struct Node<T> {
  requires: Vec<String>,
  payload: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
  Unvisited,
  InProgress,
  Done,
}

/// Dependency graph over named payloads.
///
/// Orders are deterministic: roots are visited in insertion order
/// and requirements in declaration order.
#[derive(Debug, Clone)]
pub struct DependencyGraph<T> {
  nodes: IndexMap<String, Node<T>>,
}

impl<T> Default for DependencyGraph<T> {
  fn default() -> Self {
    Self {
      nodes: IndexMap::new(),
    }
  }
}

impl<T> DependencyGraph<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, name: impl Into<String>, requires: Vec<String>, payload: T) -> Result<()> {
    let name = name.into();
    if self.nodes.contains_key(&name) {
      return Err(Error::DuplicateRequirement(name));
    }
    self.nodes.insert(name, Node { requires, payload });
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<&T> {
    self.nodes.get(name).map(|n| &n.payload)
  }
  pub fn requires(&self, name: &str) -> Option<&[String]> {
    self.nodes.get(name).map(|n| n.requires.as_slice())
  }
  pub fn len(&self) -> usize {
    self.nodes.len()
  }
  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.nodes.keys().map(String::as_str)
  }

  /// Execution order of every node.
  pub fn order(&self) -> Result<Vec<&str>> {
    let roots: Vec<&str> = self.names().collect();
    self.order_for(&roots)
  }

  /// Execution order of `targets` and everything they transitively require.
  ///
  /// Each node appears once, after all of its requirements.
  pub fn order_for<S: AsRef<str>>(&self, targets: &[S]) -> Result<Vec<&str>> {
    let mut colors = vec![Color::Unvisited; self.nodes.len()];
    let mut path = Vec::new();
    let mut order = Vec::with_capacity(self.nodes.len());

    for target in targets {
      let target = target.as_ref();
      let inode = self
        .nodes
        .get_index_of(target)
        .ok_or_else(|| Error::UnknownRequirement {
          name: target.to_string(),
          required_by: "<targets>".to_string(),
        })?;
      self.visit(inode, &mut colors, &mut path, &mut order)?;
    }
    Ok(order)
  }

  fn visit<'a>(
    &'a self,
    inode: usize,
    colors: &mut [Color],
    path: &mut Vec<usize>,
    order: &mut Vec<&'a str>,
  ) -> Result<()> {
    match colors[inode] {
      Color::Done => return Ok(()),
      Color::InProgress => {
        let start = path.iter().position(|&i| i == inode).unwrap_or(0);
        let cycle = path[start..]
          .iter()
          .chain(std::iter::once(&inode))
          .map(|&i| self.name_at(i).to_string())
          .collect();
        return Err(Error::CyclicDependency { cycle });
      }
      Color::Unvisited => {}
    }

    let Some((name, node)) = self.nodes.get_index(inode) else {
      return Ok(());
    };
    colors[inode] = Color::InProgress;
    path.push(inode);

    for required in &node.requires {
      let ireq = self
        .nodes
        .get_index_of(required.as_str())
        .ok_or_else(|| Error::UnknownRequirement {
          name: required.clone(),
          required_by: name.to_string(),
        })?;
      self.visit(ireq, colors, path, order)?;
    }

    path.pop();
    colors[inode] = Color::Done;
    order.push(name.as_str());
    Ok(())
  }

  fn name_at(&self, inode: usize) -> &str {
    self.nodes.get_index(inode).map_or("", |(k, _)| k.as_str())
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph<()> {
    let mut graph = DependencyGraph::new();
    for (name, requires) in edges {
      let requires = requires.iter().map(|s| s.to_string()).collect();
      graph.insert(*name, requires, ()).unwrap();
    }
    graph
  }

  #[test]
  fn requirements_come_first() {
    let g = graph(&[
      ("E", &["pis", "corrs_rs"]),
      ("corrs_rs", &["pis"]),
      ("pis", &[]),
      ("B", &["corrs_rs"]),
    ]);
    let order = g.order().unwrap();
    assert_eq!(order, vec!["pis", "corrs_rs", "E", "B"]);
  }

  #[test]
  fn targets_restrict_the_order() {
    let g = graph(&[
      ("E", &["pis", "corrs_rs"]),
      ("corrs_rs", &["pis"]),
      ("pis", &[]),
      ("corrs_p", &[]),
      ("M", &["corrs_p"]),
    ]);
    assert_eq!(g.order_for(&["M"]).unwrap(), vec!["corrs_p", "M"]);
    assert_eq!(
      g.order_for(&["corrs_rs", "E"]).unwrap(),
      vec!["pis", "corrs_rs", "E"]
    );
  }

  #[test]
  fn two_node_cycle() {
    let g = graph(&[("A", &["B"]), ("B", &["A"])]);
    let err = g.order().unwrap_err();
    match err {
      Error::CyclicDependency { cycle } => assert_eq!(cycle, vec!["A", "B", "A"]),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn self_cycle_and_long_cycle() {
    let g = graph(&[("A", &["A"])]);
    assert!(matches!(g.order(), Err(Error::CyclicDependency { .. })));

    let g = graph(&[("X", &[]), ("A", &["X", "B"]), ("B", &["C"]), ("C", &["A"])]);
    match g.order().unwrap_err() {
      Error::CyclicDependency { cycle } => assert_eq!(cycle, vec!["A", "B", "C", "A"]),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn unknown_and_duplicate_requirements() {
    let g = graph(&[("A", &["missing"])]);
    assert!(matches!(
      g.order(),
      Err(Error::UnknownRequirement { ref name, ref required_by }) if name == "missing" && required_by == "A"
    ));

    let mut g = graph(&[("A", &[])]);
    assert!(matches!(
      g.insert("A", Vec::new(), ()),
      Err(Error::DuplicateRequirement(_))
    ));
    assert!(matches!(g.order_for(&["Z"]), Err(Error::UnknownRequirement { .. })));
  }
}
