//! The single-dex and minimal multidex writing tools.

use crate::error::DexResult;
use crate::pipeline::encode_ordered;
use crate::tool::{DexFileSummary, DexInput, DexSequence, DexWritingTool};
use crate::DexOptions;
use dexon_common::Container;
use dexon_ir::CompiledType;
use std::sync::Arc;

/// Writes everything into `classes.dex`. Any overflow is fatal.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleDexTool;

impl DexWritingTool for SingleDexTool {
    fn name(&self) -> &'static str {
        "single-dex"
    }

    #[tracing::instrument(level = "debug", skip_all, fields(types = input.types.len()))]
    fn write(
        &self,
        input: &DexInput,
        options: &DexOptions,
        container: &dyn Container,
    ) -> DexResult<Vec<DexFileSummary>> {
        let mut sequence = DexSequence::new(options, container);
        encode_ordered(&input.types, 0, |item| sequence.append_single(item))?;
        sequence.finish()
    }
}

/// Fills the primary dex with exactly the main dex set, then packs the
/// remaining types into as few further files as the limits allow. The
/// primary file is sealed before any remaining type is appended, so with an
/// empty main dex set `classes.dex` holds no types.
///
/// Without `deterministic` both sets keep their input order, and callers
/// must not rely on it. With `deterministic` both sets are sorted by type
/// name first, so identical inputs give byte-identical files whatever
/// order they arrive in.
#[derive(Clone, Copy, Debug)]
pub struct MinimalMultiDexTool {
    deterministic: bool,
}

impl MinimalMultiDexTool {
    /// Creates the tool.
    pub fn new(deterministic: bool) -> Self {
        Self { deterministic }
    }

    /// Returns `true` for the deterministic variant.
    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    fn partition(&self, input: &DexInput) -> (Vec<Arc<CompiledType>>, Vec<Arc<CompiledType>>) {
        let (mut main, mut remainder): (Vec<_>, Vec<_>) = input
            .types
            .iter()
            .cloned()
            .partition(|ty| input.main_dex.contains(&ty.descriptor));
        if self.deterministic {
            main.sort_by(|a, b| a.descriptor.cmp(&b.descriptor));
            remainder.sort_by(|a, b| a.descriptor.cmp(&b.descriptor));
        }
        (main, remainder)
    }
}

impl DexWritingTool for MinimalMultiDexTool {
    fn name(&self) -> &'static str {
        if self.deterministic {
            "deter-minimal-multidex"
        } else {
            "minimal-multidex"
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(tool = self.name(), types = input.types.len()))]
    fn write(
        &self,
        input: &DexInput,
        options: &DexOptions,
        container: &dyn Container,
    ) -> DexResult<Vec<DexFileSummary>> {
        let (main, remainder) = self.partition(input);
        tracing::debug!(main = main.len(), remainder = remainder.len(), "partitioned types");

        let mut sequence = DexSequence::new(options, container);
        encode_ordered(&main, 0, |item| sequence.append_main(item))?;
        sequence.seal_primary()?;
        encode_ordered(&remainder, main.len() as u32, |item| sequence.append(item))?;
        sequence.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(names: &[&str], main: &[&str]) -> DexInput {
        DexInput::new(
            names
                .iter()
                .map(|n| Arc::new(CompiledType::new(*n)))
                .collect(),
        )
        .with_main_dex(main.iter().map(|s| s.to_string()).collect())
    }

    fn descriptors(types: &[Arc<CompiledType>]) -> Vec<&str> {
        types.iter().map(|t| t.descriptor.as_str()).collect()
    }

    #[test]
    fn partition_keeps_input_order() {
        let tool = MinimalMultiDexTool::new(false);
        let (main, rest) = tool.partition(&input(&["LC;", "LA;", "LB;", "LD;"], &["LB;", "LC;"]));
        assert_eq!(descriptors(&main), vec!["LC;", "LB;"]);
        assert_eq!(descriptors(&rest), vec!["LA;", "LD;"]);
    }

    #[test]
    fn deterministic_partition_sorts() {
        let tool = MinimalMultiDexTool::new(true);
        assert!(tool.is_deterministic());
        let (main, rest) = tool.partition(&input(&["LC;", "LA;", "LB;", "LD;"], &["LB;", "LC;"]));
        assert_eq!(descriptors(&main), vec!["LB;", "LC;"]);
        assert_eq!(descriptors(&rest), vec!["LA;", "LD;"]);
    }
}
