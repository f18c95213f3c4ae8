use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use log::{debug, info};
use sha2::{Digest, Sha256};

use super::manifest::{ArtifactFormat, ArtifactManifest, WeightSpec, MANIFEST_FILE};
use crate::error::PipelineError;

/// A fully assembled model: topology plus every weight in one contiguous buffer.
///
/// Built once by [`load_artifact`] and never mutated afterwards.
#[derive(Debug)]
pub struct ModelArtifact {
    pub format: ArtifactFormat,
    pub topology: serde_json::Value,
    pub weight_specs: Vec<WeightSpec>,
    pub weight_buffer: Vec<u8>,
    /// Hex SHA-256 of `weight_buffer`
    pub fingerprint: String,
}

impl ModelArtifact {
    /// Iterates weights in manifest order together with their byte ranges in the buffer.
    pub fn weights(&self) -> Result<Vec<(&WeightSpec, &[u8])>, PipelineError> {
        let mut offset = 0usize;
        let mut out = Vec::with_capacity(self.weight_specs.len());
        for spec in &self.weight_specs {
            let len = spec.byte_len()?;
            let end = offset.checked_add(len).ok_or_else(|| {
                PipelineError::ArtifactCorrupt(format!("weight '{}' offset overflows", spec.name))
            })?;
            let bytes = self.weight_buffer.get(offset..end).ok_or_else(|| {
                PipelineError::ArtifactCorrupt(format!(
                    "weight '{}' extends past the end of the buffer",
                    spec.name
                ))
            })?;
            out.push((spec, bytes));
            offset = end;
        }
        Ok(out)
    }

    pub fn total_bytes(&self) -> usize {
        self.weight_buffer.len()
    }
}

fn io_error(path: &Path, e: io::Error) -> PipelineError {
    match e.kind() {
        io::ErrorKind::NotFound => PipelineError::ArtifactNotFound(path.display().to_string()),
        _ => PipelineError::ArtifactCorrupt(format!("failed to read {}: {}", path.display(), e)),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, PipelineError> {
    fs::read(path).map_err(|e| io_error(path, e))
}

fn file_len(path: &Path) -> Result<u64, PipelineError> {
    fs::metadata(path).map(|m| m.len()).map_err(|e| io_error(path, e))
}

/// Resolves a shard path against the model directory, refusing to leave it.
fn shard_path(model_dir: &Path, relative: &str) -> Result<PathBuf, PipelineError> {
    let rel = Path::new(relative);
    let escapes = rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.is_empty() || escapes {
        return Err(PipelineError::ArtifactCorrupt(format!(
            "shard path '{}' must be relative to the model directory",
            relative
        )));
    }
    Ok(model_dir.join(rel))
}

/// Reads the manifest in `model_dir` and reassembles all weight shards.
///
/// The total size is computed from the declared weight specs first, the
/// buffer is allocated once, and each shard is copied at its running offset
/// in manifest order. Any size disagreement between shards and specs fails
/// the load with `ArtifactCorrupt`.
pub fn load_artifact(model_dir: &Path) -> Result<ModelArtifact, PipelineError> {
    let manifest_path = model_dir.join(MANIFEST_FILE);
    info!("Loading model manifest from {:?}", manifest_path);
    let raw = read_file(&manifest_path)?;
    let manifest: ArtifactManifest = serde_json::from_slice(&raw).map_err(|e| {
        PipelineError::ArtifactCorrupt(format!("invalid manifest {}: {}", manifest_path.display(), e))
    })?;
    let format = ArtifactFormat::parse(&manifest.format)?;

    let mut group_sizes = Vec::with_capacity(manifest.weights_manifest.len());
    for group in &manifest.weights_manifest {
        group_sizes.push(group.byte_len()?);
    }
    let declared_total = group_sizes.iter().try_fold(0usize, |acc, &len| {
        acc.checked_add(len)
            .ok_or_else(|| PipelineError::ArtifactCorrupt("declared weight size overflows".into()))
    })?;
    info!(
        "Manifest declares {} weight groups, {} bytes total",
        manifest.weights_manifest.len(),
        declared_total
    );

    // Shard sizes on disk must match the manifest before anything is allocated.
    for (index, (group, &declared)) in manifest.weights_manifest.iter().zip(&group_sizes).enumerate() {
        let mut on_disk = 0u64;
        for relative in &group.paths {
            on_disk = on_disk.saturating_add(file_len(&shard_path(model_dir, relative)?)?);
        }
        if on_disk != declared as u64 {
            return Err(PipelineError::ArtifactCorrupt(format!(
                "weight group {} has {} bytes on disk but its specs declare {}",
                index, on_disk, declared
            )));
        }
    }

    let mut arena = Vec::new();
    arena.try_reserve_exact(declared_total).map_err(|e| {
        PipelineError::ArtifactCorrupt(format!("cannot allocate {} weight bytes: {}", declared_total, e))
    })?;
    arena.resize(declared_total, 0u8);
    let mut offset = 0usize;

    for (index, (group, &declared)) in manifest.weights_manifest.iter().zip(&group_sizes).enumerate() {
        let group_start = offset;
        for relative in &group.paths {
            let path = shard_path(model_dir, relative)?;
            let bytes = read_file(&path)?;
            let end = offset.saturating_add(bytes.len());
            if end > declared_total {
                return Err(PipelineError::ArtifactCorrupt(format!(
                    "shard {} overruns the declared weight size ({} > {})",
                    path.display(),
                    end,
                    declared_total
                )));
            }
            arena[offset..end].copy_from_slice(&bytes);
            debug!("Copied shard {:?} ({} bytes) at offset {}", path, bytes.len(), offset);
            offset = end;
        }

        let copied = offset - group_start;
        if copied != declared {
            return Err(PipelineError::ArtifactCorrupt(format!(
                "weight group {} holds {} bytes but its specs declare {}",
                index, copied, declared
            )));
        }
    }

    if offset != declared_total {
        return Err(PipelineError::ArtifactCorrupt(format!(
            "reassembled {} bytes, manifest declares {}",
            offset, declared_total
        )));
    }

    let fingerprint = format!("{:x}", Sha256::digest(&arena));
    info!("Model artifact assembled: {} bytes, sha256 {}", arena.len(), fingerprint);

    Ok(ModelArtifact {
        format,
        topology: manifest.model_topology,
        weight_specs: manifest
            .weights_manifest
            .into_iter()
            .flat_map(|group| group.weights)
            .collect(),
        weight_buffer: arena,
        fingerprint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_path_rejects_escapes() {
        let dir = Path::new("/models/leaf");
        assert!(shard_path(dir, "group1-shard1of1.bin").is_ok());
        assert!(shard_path(dir, "../secrets.bin").is_err());
        assert!(shard_path(dir, "/etc/passwd").is_err());
        assert!(shard_path(dir, "").is_err());
    }

    #[test]
    fn test_missing_manifest_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_artifact(dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactNotFound(_)));
    }

    #[test]
    fn test_garbage_manifest_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), b"{ not json").unwrap();
        let err = load_artifact(dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactCorrupt(_)));
    }
}
