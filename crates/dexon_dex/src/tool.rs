//! The writing-tool abstraction and the file sequence every tool drives.
//!
//! A [`DexWritingTool`] decides which types go into which output file. All
//! tools share [`DexSequence`], which owns the merger of the file being
//! filled, seals files strictly in order and names them `classes.dex`,
//! `classes2.dex`, `classes3.dex` and so on.

use crate::encoder::EncodedType;
use crate::error::{DexError, DexResult};
use crate::limits::IdCounts;
use crate::merger::{DexMerger, Overflow};
use crate::multidex::{MinimalMultiDexTool, SingleDexTool};
use crate::DexOptions;
use dexon_common::{Container, FileKind, InternalError};
use dexon_config::MultiDexMode;
use dexon_ir::CompiledType;
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;

/// The types to write and the main dex selection.
#[derive(Clone, Debug, Default)]
pub struct DexInput {
    /// Compiled types, in the order they were produced.
    pub types: Vec<Arc<CompiledType>>,
    /// Descriptors that must land in the primary dex file.
    pub main_dex: BTreeSet<String>,
}

impl DexInput {
    /// Creates an input without a main dex selection.
    pub fn new(types: Vec<Arc<CompiledType>>) -> Self {
        Self {
            types,
            main_dex: BTreeSet::new(),
        }
    }

    /// Sets the main dex selection.
    pub fn with_main_dex(mut self, main_dex: BTreeSet<String>) -> Self {
        self.main_dex = main_dex;
        self
    }
}

/// What was written to one output file.
#[derive(Clone, Debug, PartialEq)]
pub struct DexFileSummary {
    /// File name inside the container, e.g. `classes2.dex`.
    pub name: String,
    /// Descriptors of the types in the file, in append order.
    pub types: Vec<String>,
    /// Id table sizes.
    pub counts: IdCounts,
    /// Image size in bytes.
    pub bytes: usize,
}

/// Writes compiled types into one or more dex files.
pub trait DexWritingTool: Send + Sync {
    /// The tool's name.
    fn name(&self) -> &'static str;

    /// Writes every type of `input` into `container` and returns the files
    /// in order.
    fn write(
        &self,
        input: &DexInput,
        options: &DexOptions,
        container: &dyn Container,
    ) -> DexResult<Vec<DexFileSummary>>;
}

/// Creates the writing tool for a multidex mode.
pub fn create_writing_tool(mode: MultiDexMode) -> Box<dyn DexWritingTool> {
    match mode {
        MultiDexMode::None => Box::new(SingleDexTool),
        MultiDexMode::LegacyMinimal => Box::new(MinimalMultiDexTool::new(false)),
        MultiDexMode::LegacyMinimalDeterministic => Box::new(MinimalMultiDexTool::new(true)),
    }
}

/// Returns the name of the output file at `index`: `classes.dex` first,
/// then `classes2.dex` and upwards.
pub fn dex_file_name(index: usize) -> String {
    if index == 0 {
        "classes.dex".to_string()
    } else {
        format!("classes{}.dex", index + 1)
    }
}

/// Inverse of [`dex_file_name`].
fn dex_file_index(name: &str) -> Option<usize> {
    let number = name.strip_prefix("classes")?.strip_suffix(".dex")?;
    if number.is_empty() {
        return Some(0);
    }
    if number.starts_with('0') {
        return None;
    }
    match number.parse::<usize>() {
        Ok(n) if n >= 2 => Some(n - 1),
        _ => None,
    }
}

/// The output files of one write, filled and sealed in order.
pub(crate) struct DexSequence<'a> {
    options: &'a DexOptions,
    container: &'a dyn Container,
    current: DexMerger,
    written: Vec<DexFileSummary>,
}

impl<'a> DexSequence<'a> {
    pub(crate) fn new(options: &'a DexOptions, container: &'a dyn Container) -> Self {
        Self {
            options,
            container,
            current: DexMerger::new(options.clone()),
            written: Vec::new(),
        }
    }

    /// Appends to the single output file; any overflow is fatal.
    pub(crate) fn append_single(&mut self, item: EncodedType) -> DexResult<()> {
        match self.current.try_append(item) {
            Ok(()) => Ok(()),
            Err(rejected) => {
                let o = rejected.into_overflow()?;
                Err(DexError::SingleDexOverflow {
                    table: o.table,
                    required: o.required,
                    limit: o.limit,
                })
            }
        }
    }

    /// Appends to the primary file, which must hold the whole main dex.
    pub(crate) fn append_main(&mut self, item: EncodedType) -> DexResult<()> {
        match self.current.try_append(item) {
            Ok(()) => Ok(()),
            Err(rejected) => {
                let o = rejected.into_overflow()?;
                Err(DexError::MainDexOverflow {
                    table: o.table,
                    required: o.required,
                    limit: o.limit,
                })
            }
        }
    }

    /// Appends to the current file, moving on to a fresh file when it is
    /// full.
    pub(crate) fn append(&mut self, item: EncodedType) -> DexResult<()> {
        let overflow = match self.current.try_append(item) {
            Ok(()) => return Ok(()),
            Err(rejected) => rejected.into_overflow()?,
        };
        if self.current.is_empty() {
            return Err(fits_no_file(&overflow));
        }
        tracing::debug!(
            file = %dex_file_name(self.written.len()),
            table = %overflow.table,
            "dex file full"
        );
        self.seal()?;
        match self.current.try_append(overflow.into_item()) {
            Ok(()) => Ok(()),
            Err(retry) => Err(fits_no_file(&retry.into_overflow()?)),
        }
    }

    /// Writes the current file if it holds anything.
    pub(crate) fn seal(&mut self) -> DexResult<()> {
        if self.current.is_empty() {
            return Ok(());
        }
        self.seal_current()
    }

    /// Writes `classes.dex` with the main dex set, even an empty one, so
    /// later appends start in `classes2.dex`.
    pub(crate) fn seal_primary(&mut self) -> DexResult<()> {
        debug_assert!(self.written.is_empty());
        self.seal_current()
    }

    fn seal_current(&mut self) -> DexResult<()> {
        let merger = std::mem::replace(&mut self.current, DexMerger::new(self.options.clone()));
        self.write_file(merger)
    }

    /// Seals the last file and removes `classesN.dex` files left over from
    /// an earlier, larger output. At least `classes.dex` is always written.
    pub(crate) fn finish(mut self) -> DexResult<Vec<DexFileSummary>> {
        if self.written.is_empty() || !self.current.is_empty() {
            self.seal_current()?;
        }
        self.delete_stale()?;
        tracing::info!(files = self.written.len(), "dex output written");
        Ok(self.written)
    }

    fn write_file(&mut self, merger: DexMerger) -> DexResult<()> {
        let name = dex_file_name(self.written.len());
        let _span = tracing::debug_span!("dex_file", file = %name).entered();
        let types: Vec<String> = merger.type_names().map(str::to_string).collect();
        let counts = merger.counts();
        let image = merger.finish()?;

        let io_err = |source| DexError::Io {
            path: self.container.location(FileKind::Dex, &name),
            source,
        };
        let mut file = self
            .container
            .create_file(FileKind::Dex, &name)
            .map_err(io_err)?;
        file.write_all(&image).map_err(io_err)?;
        file.commit().map_err(io_err)?;

        tracing::info!(
            file = %name,
            classes = types.len(),
            methods = counts.methods,
            fields = counts.fields,
            types = counts.types,
            "sealed dex file"
        );
        self.written.push(DexFileSummary {
            name,
            types,
            counts,
            bytes: image.len(),
        });
        Ok(())
    }

    fn delete_stale(&self) -> DexResult<()> {
        let existing = self
            .container
            .list(FileKind::Dex)
            .map_err(|source| DexError::Io {
                path: self.container.location(FileKind::Dex, ""),
                source,
            })?;
        for name in existing {
            if dex_file_index(&name).is_some_and(|i| i >= self.written.len()) {
                tracing::debug!(file = %name, "removing stale dex file");
                self.container
                    .delete_file(FileKind::Dex, &name)
                    .map_err(|source| DexError::Io {
                        path: self.container.location(FileKind::Dex, &name),
                        source,
                    })?;
            }
        }
        Ok(())
    }
}

fn fits_no_file(overflow: &Overflow) -> DexError {
    DexError::Internal(InternalError::new(format!(
        "type {} does not fit an empty dex file ({} ids: {} > {})",
        overflow.descriptor(),
        overflow.table,
        overflow.required,
        overflow.limit
    )))
}
