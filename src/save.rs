//! Side-channel persistence of corrector states.

use crate::{
  index::{IndexPair, TensorSymmetry},
  problem::{DofInfo, ProblemError, StateVector},
};

use std::{
  io::Write,
  path::{Path, PathBuf},
};

/// One freshly solved corrector slot.
#[derive(Debug, Clone, Copy)]
pub struct SavedSlot<'a> {
  pub requirement: &'a str,
  pub symmetry: TensorSymmetry,
  pub index: IndexPair,
  pub state: &'a StateVector,
  pub di: &'a DofInfo,
}

/// Called once per solved corrector slot.
///
/// A failing hook aborts the run; it is never retried.
pub trait SaveHook {
  fn save(&mut self, slot: SavedSlot) -> Result<(), ProblemError>;
}

impl<F> SaveHook for F
where
  F: FnMut(SavedSlot) -> Result<(), ProblemError>,
{
  fn save(&mut self, slot: SavedSlot) -> Result<(), ProblemError> {
    self(slot)
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoSave;
impl SaveHook for NoSave {
  fn save(&mut self, _slot: SavedSlot) -> Result<(), ProblemError> {
    Ok(())
  }
}

/// Writes every slot to `<dir>/<base>_<requirement><suffix>.txt`.
///
/// The file starts with one `# <variable> <start>..<end>` line per DOF block,
/// followed by one value per line.
#[derive(Debug, Clone)]
pub struct FileSaveHook {
  dir: PathBuf,
  base_name: String,
  written: Vec<PathBuf>,
}

impl FileSaveHook {
  pub fn new(dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
    Self {
      dir: dir.into(),
      base_name: base_name.into(),
      written: Vec::new(),
    }
  }

  pub fn path_for(&self, slot: &SavedSlot) -> PathBuf {
    let suffix = slot.symmetry.slot_suffix(slot.index);
    self
      .dir
      .join(format!("{}_{}{suffix}.txt", self.base_name, slot.requirement))
  }

  pub fn written(&self) -> &[PathBuf] {
    &self.written
  }
}

impl SaveHook for FileSaveHook {
  fn save(&mut self, slot: SavedSlot) -> Result<(), ProblemError> {
    let path = self.path_for(&slot);
    save_state(slot.state, slot.di, &path)?;
    tracing::debug!("saved {} {} to {}", slot.requirement, slot.index, path.display());
    self.written.push(path);
    Ok(())
  }
}

pub fn save_state(state: &StateVector, di: &DofInfo, path: impl AsRef<Path>) -> std::io::Result<()> {
  let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
  for name in di.names() {
    if let Some(range) = di.indx(name) {
      writeln!(file, "# {name} {}..{}", range.start, range.end)?;
    }
  }
  for v in state.iter() {
    writeln!(file, "{v}")?;
  }
  file.flush()
}
