use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveResult {
    Renamed,
    Copied,
    /// Destination already held identical bytes; the source was dropped.
    Deduplicated,
}

pub fn file_hash(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn same_content(a: &Path, b: &Path) -> Result<bool> {
    let len = |p: &Path| {
        fs::metadata(p)
            .map(|m| m.len())
            .with_context(|| format!("failed to stat {}", p.display()))
    };
    if len(a)? != len(b)? {
        return Ok(false);
    }
    Ok(file_hash(a)? == file_hash(b)?)
}

#[cfg(unix)]
fn copy_ownership(template: &Path, target: &Path) -> Result<()> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt, chown};

    let meta = fs::metadata(template)
        .with_context(|| format!("failed to stat {}", template.display()))?;
    chown(target, Some(meta.uid()), Some(meta.gid()))
        .with_context(|| format!("failed to chown {}", target.display()))?;
    fs::set_permissions(target, fs::Permissions::from_mode(meta.mode() & 0o7777))
        .with_context(|| format!("failed to chmod {}", target.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_ownership(_template: &Path, _target: &Path) -> Result<()> {
    Ok(())
}

/// Make sure `target_dir` exists. A directory created here takes the owner,
/// group and mode of `template_dir`. Returns whether it was created.
pub fn prep_directory(target_dir: &Path, template_dir: &Path) -> Result<bool> {
    if target_dir.is_dir() {
        return Ok(false);
    }
    fs::create_dir_all(target_dir)
        .with_context(|| format!("failed to create {}", target_dir.display()))?;
    if let Err(err) = copy_ownership(template_dir, target_dir) {
        // Later items for the same owner must not reuse a half-prepared directory.
        if let Err(cleanup) = fs::remove_dir(target_dir) {
            tracing::debug!("could not remove {}: {cleanup}", target_dir.display());
        }
        return Err(err);
    }
    Ok(true)
}

pub fn move_file(from: &Path, to: &Path) -> Result<MoveResult> {
    if to.exists() {
        if same_content(from, to)? {
            fs::remove_file(from)
                .with_context(|| format!("failed to remove {}", from.display()))?;
            return Ok(MoveResult::Deduplicated);
        }
        bail!(
            "destination {} already exists with different content",
            to.display()
        );
    }

    match fs::rename(from, to) {
        Ok(_) => Ok(MoveResult::Renamed),
        Err(rename_err) if rename_err.kind() == ErrorKind::CrossesDevices => {
            fs::copy(from, to).with_context(|| {
                format!("failed to copy {} to {}", from.display(), to.display())
            })?;
            fs::remove_file(from)
                .with_context(|| format!("failed to remove {}", from.display()))?;
            Ok(MoveResult::Copied)
        }
        Err(rename_err) => Err(rename_err)
            .with_context(|| format!("failed to move {} to {}", from.display(), to.display())),
    }
}
