use crate::config::Config;
use crate::download::VerifiedArtifact;
use crate::error::{Result, ToolshedError};
use crate::models::{ArtifactKind, Installation, Version};
use crate::registry::RegistryEntry;
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::Archive;

/// Digest marker written into every finished installation directory; drives
/// idempotent re-installs of the same content.
const DIGEST_MARKER: &str = ".sha256";

/// On-disk convention for one tool: `<tools>/<name>/<version>/` immutable
/// installation directories next to a `<tools>/<name>/<name>` symlink that
/// selects the active version.
#[derive(Debug, Clone)]
pub struct ToolLayout {
    tool: String,
    dir: PathBuf,
    kind: ArtifactKind,
    binary_rel: PathBuf,
}

impl ToolLayout {
    pub fn new(tool: &str, dir: PathBuf, kind: ArtifactKind, binary_rel: &str) -> Self {
        Self {
            tool: tool.to_string(),
            dir,
            kind,
            binary_rel: PathBuf::from(binary_rel),
        }
    }

    pub fn for_entry(config: &Config, entry: &RegistryEntry) -> Self {
        Self::new(
            entry.name,
            config.tool_dir(entry.name),
            entry.artifact.kind,
            entry.artifact.binary_rel,
        )
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn binary_rel(&self) -> &Path {
        &self.binary_rel
    }

    pub fn version_dir(&self, version: &Version) -> PathBuf {
        self.dir.join(version.as_str())
    }

    /// Path of the active symlink, named for the tool itself.
    pub fn active_link(&self) -> PathBuf {
        self.dir.join(&self.tool)
    }

    fn placement_error(&self, version: &Version, message: String) -> ToolshedError {
        ToolshedError::PlacementError {
            tool: self.tool.clone(),
            version: version.to_string(),
            message,
        }
    }

    /// Unpack a verified artifact into this version's installation
    /// directory.
    ///
    /// The artifact is unpacked into a temporary sibling first and renamed
    /// into place, so a partially-written installation never appears under
    /// a version name. Re-placing a version whose digest marker matches the
    /// artifact is a no-op; a version directory with different content is a
    /// conflict.
    pub fn place(&self, verified: &VerifiedArtifact, version: &Version) -> Result<Installation> {
        let version_dir = self.version_dir(version);

        if version_dir.exists() {
            let marker = std::fs::read_to_string(version_dir.join(DIGEST_MARKER))
                .ok()
                .map(|s| s.trim().to_string());

            return match marker {
                Some(digest) if digest.eq_ignore_ascii_case(&verified.digest) => {
                    tracing::debug!(tool = %self.tool, %version, "already placed, content matches");
                    self.installation_for(version)
                }
                _ => Err(self.placement_error(
                    version,
                    format!(
                        "{} already exists with different content",
                        version_dir.display()
                    ),
                )),
            };
        }

        std::fs::create_dir_all(&self.dir)?;

        let partial = tempfile::Builder::new()
            .prefix(".partial-")
            .tempdir_in(&self.dir)?;

        let unpacked = match self.kind {
            ArtifactKind::Binary => self.copy_binary(verified.path(), partial.path()),
            ArtifactKind::TarGz => self.extract_tar_gz(verified.path(), partial.path()),
            ArtifactKind::Zip => self.extract_zip(verified.path(), partial.path()),
        };
        if let Err(e) = unpacked {
            return Err(self.placement_error(version, e.to_string()));
        }

        let binary = partial.path().join(&self.binary_rel);
        if !binary.is_file() {
            return Err(self.placement_error(
                version,
                format!("artifact does not contain '{}'", self.binary_rel.display()),
            ));
        }

        std::fs::write(partial.path().join(DIGEST_MARKER), &verified.digest)?;

        let staged = partial.into_path();
        if let Err(e) = std::fs::rename(&staged, &version_dir) {
            let _ = std::fs::remove_dir_all(&staged);
            return Err(self.placement_error(version, e.to_string()));
        }

        self.installation_for(version)
    }

    fn copy_binary(&self, artifact_path: &Path, dest_dir: &Path) -> std::io::Result<()> {
        let dest = dest_dir.join(&self.binary_rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(artifact_path, &dest)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }

    fn extract_tar_gz(&self, archive_path: &Path, dest_dir: &Path) -> std::io::Result<()> {
        let tar_gz = File::open(archive_path)?;
        let tar = GzDecoder::new(tar_gz);
        let mut archive = Archive::new(tar);
        archive.unpack(dest_dir)?;
        Ok(())
    }

    fn extract_zip(&self, archive_path: &Path, dest_dir: &Path) -> std::io::Result<()> {
        let file = File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(std::io::Error::other)?;

        for i in 0..archive.len() {
            let mut file = archive.by_index(i).map_err(std::io::Error::other)?;

            let outpath = match file.enclosed_name() {
                Some(path) => dest_dir.join(path),
                None => continue,
            };

            if file.name().ends_with('/') {
                std::fs::create_dir_all(&outpath)?;
            } else {
                if let Some(p) = outpath.parent() {
                    if !p.exists() {
                        std::fs::create_dir_all(p)?;
                    }
                }
                let mut outfile = File::create(&outpath)?;
                std::io::copy(&mut file, &mut outfile)?;
            }

            // Set permissions on Unix
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = file.unix_mode() {
                    std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
                }
            }
        }

        Ok(())
    }

    /// Describe an installation that already exists on disk.
    pub fn installation_for(&self, version: &Version) -> Result<Installation> {
        let install_path = self.version_dir(version);

        if !install_path.is_dir() {
            return Err(ToolshedError::NotInstalled(format!(
                "{} {}",
                self.tool, version
            )));
        }

        let metadata = std::fs::metadata(&install_path)?;
        let installed_at = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map(chrono::DateTime::<chrono::Utc>::from)
            .unwrap_or_else(|_| chrono::Utc::now());

        Ok(Installation {
            tool: self.tool.clone(),
            version: version.clone(),
            binary_path: install_path.join(&self.binary_rel),
            install_path,
            installed_at,
        })
    }

    /// Every version installed for this tool, newest first. The active
    /// symlink and in-flight partial directories are not installations.
    pub fn installed_versions(&self) -> Result<Vec<Installation>> {
        let mut installed = Vec::new();

        if !self.dir.exists() {
            return Ok(installed);
        }

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_symlink() || !path.is_dir() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) if !name.starts_with('.') => name,
                _ => continue,
            };

            installed.push(self.installation_for(&Version::new(name))?);
        }

        installed.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(installed)
    }

    /// Delete one installed version.
    ///
    /// Deleting the version the active link points at is refused unless
    /// `deactivate` is set, in which case the link is cleared first.
    pub fn remove_version(&self, version: &Version, deactivate: bool) -> Result<()> {
        let version_dir = self.version_dir(version);

        if !version_dir.is_dir() {
            return Err(ToolshedError::NotInstalled(format!(
                "{} {}",
                self.tool, version
            )));
        }

        if crate::activation::active_version(self)?.as_ref() == Some(version) {
            if !deactivate {
                return Err(ToolshedError::ActiveVersionInUse {
                    tool: self.tool.clone(),
                    version: version.to_string(),
                });
            }
            crate::activation::deactivate(self)?;
        }

        std::fs::remove_dir_all(&version_dir)?;
        Ok(())
    }

    /// Delete the active link and every installed version. Returns how many
    /// versions were removed.
    pub fn remove_all(&self) -> Result<usize> {
        let installed = self.installed_versions()?;

        if installed.is_empty() {
            return Err(ToolshedError::NotInstalled(self.tool.clone()));
        }

        crate::activation::deactivate(self)?;
        for installation in &installed {
            self.remove_version(&installation.version, true)?;
        }

        // Drop the now-empty tool directory too; leftover temp files keep it
        // alive, which is fine.
        let _ = std::fs::remove_dir(&self.dir);

        Ok(installed.len())
    }
}
