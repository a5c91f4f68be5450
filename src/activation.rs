use crate::error::{Result, ToolshedError};
use crate::layout::ToolLayout;
use crate::models::{Installation, Version};
use std::path::{Component, PathBuf};

/// Point the tool's active link at an installation.
///
/// The swap is atomic: the new symlink is created under a temporary name in
/// the same directory and renamed over the final link in one step, so the
/// link always resolves to either the previous version or the new one. On
/// failure the previous link is left untouched.
pub fn activate(layout: &ToolLayout, installation: &Installation) -> Result<()> {
    let activation_error = |message: String| ToolshedError::ActivationError {
        tool: layout.tool().to_string(),
        version: installation.version.to_string(),
        message,
    };

    if !installation.binary_path.is_file() {
        return Err(activation_error(format!(
            "{} does not exist; place the version before activating it",
            installation.binary_path.display()
        )));
    }

    // Relative target keeps the link valid if the tools root ever moves
    let target = PathBuf::from(installation.version.as_str()).join(layout.binary_rel());
    let link = layout.active_link();
    let temp_link = link.with_file_name(format!(".{}.tmp-{}", layout.tool(), std::process::id()));

    // A temp link from a crashed earlier run is stale by definition
    let _ = std::fs::remove_file(&temp_link);

    #[cfg(unix)]
    std::os::unix::fs::symlink(&target, &temp_link).map_err(|e| activation_error(e.to_string()))?;

    #[cfg(windows)]
    std::os::windows::fs::symlink_file(&target, &temp_link)
        .map_err(|e| activation_error(e.to_string()))?;

    if let Err(e) = std::fs::rename(&temp_link, &link) {
        let _ = std::fs::remove_file(&temp_link);
        return Err(activation_error(e.to_string()));
    }

    tracing::info!(tool = %layout.tool(), version = %installation.version, "activated");
    Ok(())
}

/// Remove the active link. Returns whether a link existed.
pub fn deactivate(layout: &ToolLayout) -> Result<bool> {
    let link = layout.active_link();

    if link.is_symlink() {
        std::fs::remove_file(&link)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// The version the active link currently points at, read back from the
/// link target's first path component.
pub fn active_version(layout: &ToolLayout) -> Result<Option<Version>> {
    let link = layout.active_link();

    if !link.is_symlink() {
        return Ok(None);
    }

    let target = std::fs::read_link(&link)?;
    let version = target.components().find_map(|component| match component {
        Component::Normal(name) => name.to_str().map(Version::new),
        _ => None,
    });

    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArtifactKind;
    use tempfile::TempDir;

    fn layout(root: &std::path::Path) -> ToolLayout {
        ToolLayout::new("demo", root.join("demo"), ArtifactKind::Binary, "demo")
    }

    fn fake_installation(layout: &ToolLayout, version: &str) -> Installation {
        let version = Version::new(version);
        let install_path = layout.version_dir(&version);
        std::fs::create_dir_all(&install_path).unwrap();
        let binary_path = install_path.join("demo");
        std::fs::write(&binary_path, b"binary").unwrap();

        Installation {
            tool: "demo".to_string(),
            version,
            install_path,
            binary_path,
            installed_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_activate_then_read_back() {
        let root = TempDir::new().unwrap();
        let layout = layout(root.path());
        let installation = fake_installation(&layout, "1.2.3");

        activate(&layout, &installation).unwrap();

        assert_eq!(
            active_version(&layout).unwrap(),
            Some(Version::new("1.2.3"))
        );
        // The link resolves to the binary inside the installation
        assert_eq!(
            std::fs::canonicalize(layout.active_link()).unwrap(),
            std::fs::canonicalize(&installation.binary_path).unwrap()
        );
    }

    #[test]
    fn test_activate_swaps_versions() {
        let root = TempDir::new().unwrap();
        let layout = layout(root.path());
        let v1 = fake_installation(&layout, "1.0.0");
        let v2 = fake_installation(&layout, "2.0.0");

        activate(&layout, &v1).unwrap();
        activate(&layout, &v2).unwrap();

        assert_eq!(
            active_version(&layout).unwrap(),
            Some(Version::new("2.0.0"))
        );
    }

    #[test]
    fn test_activate_missing_installation_leaves_link_alone() {
        let root = TempDir::new().unwrap();
        let layout = layout(root.path());
        let v1 = fake_installation(&layout, "1.0.0");
        activate(&layout, &v1).unwrap();

        let ghost = Installation {
            tool: "demo".to_string(),
            version: Version::new("9.9.9"),
            install_path: layout.version_dir(&Version::new("9.9.9")),
            binary_path: layout.version_dir(&Version::new("9.9.9")).join("demo"),
            installed_at: chrono::Utc::now(),
        };

        let err = activate(&layout, &ghost).unwrap_err();
        assert!(matches!(err, ToolshedError::ActivationError { .. }));
        assert_eq!(
            active_version(&layout).unwrap(),
            Some(Version::new("1.0.0"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_rename_leaves_prior_state_and_no_temp_link() {
        let root = TempDir::new().unwrap();
        let layout = layout(root.path());
        let installation = fake_installation(&layout, "1.0.0");

        // Occupy the link path with a non-empty directory so the rename
        // step itself fails
        let link = layout.active_link();
        std::fs::create_dir_all(link.join("occupied")).unwrap();

        let err = activate(&layout, &installation).unwrap_err();
        assert!(matches!(err, ToolshedError::ActivationError { .. }));

        // Prior state intact, temp link cleaned up
        assert!(link.join("occupied").is_dir());
        let temp_links: Vec<_> = std::fs::read_dir(root.path().join("demo"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(temp_links.is_empty());
    }

    #[test]
    fn test_stale_temp_link_from_crashed_run_is_replaced() {
        let root = TempDir::new().unwrap();
        let layout = layout(root.path());
        let installation = fake_installation(&layout, "1.0.0");

        // Simulate a crash between temp-link creation and rename
        let stale = layout
            .active_link()
            .with_file_name(format!(".demo.tmp-{}", std::process::id()));
        #[cfg(unix)]
        std::os::unix::fs::symlink("nowhere", &stale).unwrap();

        // Prior active link (absent) is intact despite the stale temp
        assert_eq!(active_version(&layout).unwrap(), None);

        activate(&layout, &installation).unwrap();
        assert_eq!(
            active_version(&layout).unwrap(),
            Some(Version::new("1.0.0"))
        );
    }

    #[test]
    fn test_deactivate() {
        let root = TempDir::new().unwrap();
        let layout = layout(root.path());
        let installation = fake_installation(&layout, "1.0.0");

        assert!(!deactivate(&layout).unwrap());
        activate(&layout, &installation).unwrap();
        assert!(deactivate(&layout).unwrap());
        assert_eq!(active_version(&layout).unwrap(), None);
    }
}
