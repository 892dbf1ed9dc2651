//! Tensor index sets and the storage they address.
//!
//! Symmetric pairs use the Voigt-like ordering: the diagonal first,
//! then the strict upper triangle row by row.
//! For `dim = 3` this is `(0,0),(1,1),(2,2),(0,1),(0,2),(1,2)`.

use crate::Dim;

use num_integer::binomial;

use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexPair {
  pub row: usize,
  pub col: usize,
}

impl IndexPair {
  pub const SCALAR: Self = Self::new(0, 0);

  pub const fn new(row: usize, col: usize) -> Self {
    Self { row, col }
  }
  pub fn transposed(self) -> Self {
    Self::new(self.col, self.row)
  }
  pub fn is_diagonal(self) -> bool {
    self.row == self.col
  }
  /// The same pair with `row <= col`.
  pub fn upper(self) -> Self {
    if self.row <= self.col {
      self
    } else {
      self.transposed()
    }
  }
}

impl From<(usize, usize)> for IndexPair {
  fn from((row, col): (usize, usize)) -> Self {
    Self::new(row, col)
  }
}

impl fmt::Display for IndexPair {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "({}, {})", self.row, self.col)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorSymmetry {
  /// All `dim * dim` ordered pairs.
  Full,
  /// The `dim (dim + 1) / 2` pairs with `row <= col`.
  Symmetric,
  /// One pair `(i, 0)` per spatial direction.
  Vector,
  /// The single pair `(0, 0)`.
  Scalar,
}

impl TensorSymmetry {
  pub fn npairs(self, dim: Dim) -> usize {
    match self {
      Self::Full => dim * dim,
      Self::Symmetric => nsym(dim),
      Self::Vector => dim,
      Self::Scalar => 1,
    }
  }

  /// `(nrows, ncols)` of the arena holding one entry per pair.
  pub fn storage_shape(self, dim: Dim) -> (usize, usize) {
    match self {
      Self::Full | Self::Symmetric => (dim, dim),
      Self::Vector => (dim, 1),
      Self::Scalar => (1, 1),
    }
  }

  /// File name suffix of a slot, e.g. `_01` for tensors and `_1` for vectors.
  pub fn slot_suffix(self, index: IndexPair) -> String {
    match self {
      Self::Full | Self::Symmetric => format!("_{}{}", index.row, index.col),
      Self::Vector => format!("_{}", index.row),
      Self::Scalar => String::new(),
    }
  }
}

/// Number of independent entries of a symmetric `dim x dim` tensor.
pub fn nsym(dim: Dim) -> usize {
  binomial(dim + 1, 2)
}

/// Symmetric pairs in Voigt order.
pub fn iter_sym(dim: Dim) -> impl Iterator<Item = IndexPair> {
  let diagonal = (0..dim).map(|i| IndexPair::new(i, i));
  let upper = (0..dim).flat_map(move |ir| (ir + 1..dim).map(move |ic| IndexPair::new(ir, ic)));
  diagonal.chain(upper)
}

/// Flat Voigt index of a pair. Either triangle is accepted.
pub fn voigt_index(dim: Dim, pair: IndexPair) -> Option<usize> {
  let IndexPair { row, col } = pair.upper();
  if col >= dim {
    return None;
  }
  if row == col {
    return Some(row);
  }
  Some(dim + row * dim - row * (row + 1) / 2 + (col - row - 1))
}

pub fn voigt_pair(dim: Dim, k: usize) -> Option<IndexPair> {
  iter_sym(dim).nth(k)
}

/// Ordered, deterministic set of index pairs for one tensor class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorIndexSet {
  dim: Dim,
  symmetry: TensorSymmetry,
  pairs: Vec<IndexPair>,
}

impl TensorIndexSet {
  pub fn new(dim: Dim, symmetry: TensorSymmetry) -> Self {
    let pairs = match symmetry {
      TensorSymmetry::Full => (0..dim)
        .flat_map(|ir| (0..dim).map(move |ic| IndexPair::new(ir, ic)))
        .collect(),
      TensorSymmetry::Symmetric => iter_sym(dim).collect(),
      TensorSymmetry::Vector => (0..dim).map(|ir| IndexPair::new(ir, 0)).collect(),
      TensorSymmetry::Scalar => vec![IndexPair::SCALAR],
    };
    Self {
      dim,
      symmetry,
      pairs,
    }
  }
  pub fn full(dim: Dim) -> Self {
    Self::new(dim, TensorSymmetry::Full)
  }
  pub fn symmetric(dim: Dim) -> Self {
    Self::new(dim, TensorSymmetry::Symmetric)
  }
  pub fn vector(dim: Dim) -> Self {
    Self::new(dim, TensorSymmetry::Vector)
  }
  pub fn scalar() -> Self {
    Self::new(1, TensorSymmetry::Scalar)
  }

  pub fn dim(&self) -> Dim {
    self.dim
  }
  pub fn symmetry(&self) -> TensorSymmetry {
    self.symmetry
  }
  pub fn len(&self) -> usize {
    self.pairs.len()
  }
  pub fn is_empty(&self) -> bool {
    self.pairs.is_empty()
  }
  pub fn pairs(&self) -> &[IndexPair] {
    &self.pairs
  }
  pub fn iter(&self) -> impl Iterator<Item = IndexPair> + '_ {
    self.pairs.iter().copied()
  }
  /// Flat position of a pair in this set.
  pub fn position(&self, pair: IndexPair) -> Option<usize> {
    self.pairs.iter().position(|&p| p == pair)
  }

  /// Arena with one empty slot per pair of this set.
  pub fn slots<T>(&self) -> TensorSlots<T> {
    let (nrows, ncols) = self.symmetry.storage_shape(self.dim);
    TensorSlots::new(nrows, ncols)
  }
}

impl<'a> IntoIterator for &'a TensorIndexSet {
  type Item = IndexPair;
  type IntoIter = std::iter::Copied<std::slice::Iter<'a, IndexPair>>;
  fn into_iter(self) -> Self::IntoIter {
    self.pairs.iter().copied()
  }
}

/// Dense arena keyed by `(row, col)`. Every slot is written at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSlots<T> {
  nrows: usize,
  ncols: usize,
  slots: Vec<Option<T>>,
}

impl<T> TensorSlots<T> {
  pub fn new(nrows: usize, ncols: usize) -> Self {
    let slots = (0..nrows * ncols).map(|_| None).collect();
    Self {
      nrows,
      ncols,
      slots,
    }
  }

  /// Fills every slot for which `f` yields a value, in row-major order.
  pub fn from_fn<F>(nrows: usize, ncols: usize, mut f: F) -> Self
  where
    F: FnMut(IndexPair) -> Option<T>,
  {
    let slots = (0..nrows * ncols)
      .map(|i| f(IndexPair::new(i / ncols, i % ncols)))
      .collect();
    Self {
      nrows,
      ncols,
      slots,
    }
  }

  pub fn shape(&self) -> (usize, usize) {
    (self.nrows, self.ncols)
  }

  fn flat(&self, index: IndexPair) -> Option<usize> {
    (index.row < self.nrows && index.col < self.ncols).then(|| index.row * self.ncols + index.col)
  }

  /// Stores `value` at `index`.
  ///
  /// Hands the value back if the index is out of bounds or already occupied.
  pub fn insert(&mut self, index: IndexPair, value: T) -> Result<(), T> {
    match self.flat(index) {
      Some(i) if self.slots[i].is_none() => {
        self.slots[i] = Some(value);
        Ok(())
      }
      _ => Err(value),
    }
  }

  pub fn get(&self, index: IndexPair) -> Option<&T> {
    self.flat(index).and_then(|i| self.slots[i].as_ref())
  }

  pub fn contains(&self, index: IndexPair) -> bool {
    self.get(index).is_some()
  }

  /// Number of occupied slots.
  pub fn len(&self) -> usize {
    self.slots.iter().filter(|s| s.is_some()).count()
  }
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Occupied slots in row-major order.
  pub fn iter(&self) -> impl Iterator<Item = (IndexPair, &T)> {
    let ncols = self.ncols;
    self
      .slots
      .iter()
      .enumerate()
      .filter_map(move |(i, s)| s.as_ref().map(|v| (IndexPair::new(i / ncols, i % ncols), v)))
  }
}

/// # Panics
///
/// Panics if the slot at `index` is out of bounds or empty.
/// Use [`TensorSlots::get`] where a slot may be missing.
impl<T> std::ops::Index<IndexPair> for TensorSlots<T> {
  type Output = T;
  fn index(&self, index: IndexPair) -> &T {
    match self.get(index) {
      Some(v) => v,
      None => panic!("slot {index} is empty"),
    }
  }
}
