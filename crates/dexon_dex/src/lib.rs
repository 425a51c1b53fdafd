//! Dex item encoding, transactional merging and multi-dex writing.
//!
//! This crate turns [`CompiledType`](dexon_ir::CompiledType) values into
//! Dalvik executable files. [`encode_type`] validates one type and collects
//! its constant-pool entries; [`DexMerger`] appends encoded types into one
//! growing image and refuses, without side effects, any append that would
//! push an id table past its limit; the [`DexWritingTool`] implementations
//! drive mergers across one or more output files according to the
//! configured multidex mode.
//!
//! The main entry point is [`write_dex_files()`], which selects the writing
//! tool for a [`MultiDexMode`], writes `classes*.dex` into a container and
//! reports failures to the diagnostic sink.

#![warn(missing_docs)]

pub mod encoder;
pub mod error;
pub mod limits;
pub mod main_dex;
pub mod merger;
pub mod multidex;
pub mod pipeline;
pub mod pool;
pub mod tool;
mod writer;

pub use encoder::{encode_type, EncodedType};
pub use error::{DexError, DexResult};
pub use limits::{DexLimits, IdCounts, IdTable, MAX_IDS};
pub use main_dex::{trace_main_dex, MainDexSeeds};
pub use merger::{dex_fragment, AppendError, DexMerger, Overflow};
pub use multidex::{MinimalMultiDexTool, SingleDexTool};
pub use pool::{ConstantPool, SortedPool};
pub use tool::{create_writing_tool, dex_file_name, DexFileSummary, DexInput, DexWritingTool};

use dexon_common::Container;
use dexon_config::{DexConfig, MultiDexMode};
use dexon_diagnostics::DiagnosticSink;

/// Options that shape every dex image a writer produces.
#[derive(Clone, Debug)]
pub struct DexOptions {
    /// Emit `const-string/jumbo` for every string constant.
    pub force_jumbo: bool,
    /// Minimum API level, used to pick the format version.
    pub min_api: u32,
    /// Per-file id limits.
    pub limits: DexLimits,
}

impl Default for DexOptions {
    fn default() -> Self {
        Self {
            force_jumbo: false,
            min_api: 21,
            limits: DexLimits::default(),
        }
    }
}

impl DexOptions {
    /// Builds options from the `[dex]` section of `dexon.toml`.
    pub fn from_config(config: &DexConfig) -> Self {
        Self {
            force_jumbo: config.force_jumbo,
            min_api: config.min_api,
            limits: DexLimits::default(),
        }
    }
}

/// Writes `classes*.dex` for `input` in one call.
///
/// Creates the writing tool for `mode` and runs it. Any failure is also
/// emitted to `sink` as a diagnostic before it is returned.
pub fn write_dex_files(
    mode: MultiDexMode,
    input: &DexInput,
    options: &DexOptions,
    container: &dyn Container,
    sink: &DiagnosticSink,
) -> DexResult<Vec<DexFileSummary>> {
    let tool = create_writing_tool(mode);
    tracing::debug!(tool = tool.name(), types = input.types.len(), "writing dex files");
    tool.write(input, options, container).map_err(|err| {
        sink.emit(err.to_diagnostic());
        err
    })
}
