//! Per-type artifacts kept between incremental builds.
//!
//! Each compiled type is stored twice: as a serialized [`CompiledType`]
//! under `compiled/` and as a single-type dex fragment under `dex/`. A type
//! named `Lcom/example/Foo;` is stored as `com/example/Foo.cty` and
//! `com/example/Foo.dex`.
//!
//! Compiled artifacts carry a binary header with magic bytes, format
//! version and a payload checksum. Unlike a cache, a build cannot treat a
//! bad artifact as a miss: the type would silently vanish from the output.
//! Validation failures are reported as
//! [`IncrementalError::Artifact`] so the caller can rebuild from scratch.

use crate::error::IncrementalError;
use dexon_common::{Container, ContentHash, FileKind};
use dexon_ir::CompiledType;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::time::SystemTime;

const ARTIFACT_MAGIC: [u8; 4] = *b"DXON";

/// Bumped on breaking changes to the header or the payload encoding.
const ARTIFACT_FORMAT_VERSION: u32 = 1;

const COMPILED_EXT: &str = "cty";
const FRAGMENT_EXT: &str = "dex";

/// Header prepended to every compiled artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Magic bytes: must be `b"DXON"`.
    pub magic: [u8; 4],
    /// Artifact format version.
    pub format_version: u32,
    /// Version of the tool that wrote the artifact.
    pub tool_version: String,
    /// Hash of the payload.
    pub checksum: ContentHash,
}

/// Reads and writes per-type artifacts in a container.
pub struct ArtifactStore<'a> {
    container: &'a dyn Container,
}

impl<'a> ArtifactStore<'a> {
    /// Creates a store over `container`.
    pub fn new(container: &'a dyn Container) -> Self {
        Self { container }
    }

    /// Stores `ty` as a compiled artifact.
    pub fn write_compiled(&self, ty: &CompiledType) -> Result<(), IncrementalError> {
        let name = artifact_name(&ty.descriptor, COMPILED_EXT)?;
        let payload = bincode::serde::encode_to_vec(ty, bincode::config::standard()).map_err(
            |e| IncrementalError::Serialization {
                reason: e.to_string(),
            },
        )?;
        let header = ArtifactHeader {
            magic: ARTIFACT_MAGIC,
            format_version: ARTIFACT_FORMAT_VERSION,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            checksum: ContentHash::from_bytes(&payload),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| IncrementalError::Serialization {
                reason: e.to_string(),
            })?;

        // 4-byte header length (little-endian), header, payload
        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&payload);
        self.write(FileKind::Compiled, &name, &output)
    }

    /// Loads the compiled artifact of `descriptor`.
    pub fn read_compiled(&self, descriptor: &str) -> Result<CompiledType, IncrementalError> {
        let name = artifact_name(descriptor, COMPILED_EXT)?;
        let path = self.container.location(FileKind::Compiled, &name);
        let invalid = |reason: &str| IncrementalError::Artifact {
            path: path.clone(),
            reason: reason.to_string(),
        };

        let mut raw = Vec::new();
        self.container
            .get_file(FileKind::Compiled, &name)
            .and_then(|mut file| file.read_to_end(&mut raw))
            .map_err(|e| invalid(&e.to_string()))?;

        if raw.len() < 4 {
            return Err(invalid("truncated header"));
        }
        let header_len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        if raw.len() < 4 + header_len {
            return Err(invalid("truncated header"));
        }
        let (header, _): (ArtifactHeader, usize) = bincode::serde::decode_from_slice(
            &raw[4..4 + header_len],
            bincode::config::standard(),
        )
        .map_err(|e| invalid(&e.to_string()))?;
        if header.magic != ARTIFACT_MAGIC {
            return Err(invalid("bad magic"));
        }
        if header.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(invalid(&format!(
                "format version {} (expected {ARTIFACT_FORMAT_VERSION})",
                header.format_version
            )));
        }

        let payload = &raw[4 + header_len..];
        if ContentHash::from_bytes(payload) != header.checksum {
            return Err(invalid("checksum mismatch"));
        }
        let (ty, _): (CompiledType, usize) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard())
                .map_err(|e| invalid(&e.to_string()))?;
        if ty.descriptor != descriptor {
            return Err(invalid(&format!("holds {} instead", ty.descriptor)));
        }
        Ok(ty)
    }

    /// Stores the dex fragment of `descriptor`.
    pub fn write_fragment(&self, descriptor: &str, image: &[u8]) -> Result<(), IncrementalError> {
        let name = artifact_name(descriptor, FRAGMENT_EXT)?;
        self.write(FileKind::DexFragment, &name, image)
    }

    /// Modification time of the dex fragment of `descriptor`, if present.
    pub fn fragment_modified(&self, descriptor: &str) -> Option<SystemTime> {
        let name = artifact_name(descriptor, FRAGMENT_EXT).ok()?;
        self.container.modified(FileKind::DexFragment, &name)
    }

    /// Deletes both artifacts of `descriptor`. Missing files are fine; any
    /// other failure is returned.
    pub fn delete(&self, descriptor: &str) -> Result<(), IncrementalError> {
        for (kind, ext) in [
            (FileKind::Compiled, COMPILED_EXT),
            (FileKind::DexFragment, FRAGMENT_EXT),
        ] {
            let name = artifact_name(descriptor, ext)?;
            self.delete_file(kind, &name)?;
        }
        Ok(())
    }

    /// Deletes every stored artifact and returns how many files were
    /// removed.
    pub fn clear(&self) -> Result<usize, IncrementalError> {
        let mut removed = 0;
        for kind in [FileKind::Compiled, FileKind::DexFragment] {
            let names = self.container.list(kind).map_err(|source| IncrementalError::Io {
                path: self.container.location(kind, ""),
                op: "list",
                source,
            })?;
            for name in names {
                if self.delete_file(kind, &name)? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Descriptors of every stored compiled artifact, sorted.
    pub fn compiled_types(&self) -> Result<Vec<String>, IncrementalError> {
        let names = self
            .container
            .list(FileKind::Compiled)
            .map_err(|source| IncrementalError::Io {
                path: self.container.location(FileKind::Compiled, ""),
                op: "list",
                source,
            })?;
        let mut types: Vec<String> = names
            .iter()
            .filter_map(|name| name.strip_suffix(".cty"))
            .map(|stem| format!("L{stem};"))
            .collect();
        types.sort();
        Ok(types)
    }

    fn write(&self, kind: FileKind, name: &str, bytes: &[u8]) -> Result<(), IncrementalError> {
        let io_err = |source| IncrementalError::Io {
            path: self.container.location(kind, name),
            op: "write",
            source,
        };
        let mut file = self.container.create_file(kind, name).map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;
        file.commit().map_err(io_err)
    }

    fn delete_file(&self, kind: FileKind, name: &str) -> Result<bool, IncrementalError> {
        self.container
            .delete_file(kind, name)
            .map_err(|source| IncrementalError::Io {
                path: self.container.location(kind, name),
                op: "delete",
                source,
            })
    }
}

/// The storage name of a class descriptor with the given extension.
fn artifact_name(descriptor: &str, ext: &str) -> Result<String, IncrementalError> {
    let binary_name = descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .filter(|name| {
            !name.is_empty()
                && name
                    .split('/')
                    .all(|part| !part.is_empty() && part != "." && part != "..")
        })
        .ok_or_else(|| IncrementalError::Serialization {
            reason: format!("{descriptor} is not a class descriptor"),
        })?;
    Ok(format!("{binary_name}.{ext}"))
}
