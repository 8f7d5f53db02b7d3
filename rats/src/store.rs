//! File access for both ends of a transfer.
//!
//! The server only hands out files below its root directory: requested paths
//! are interpreted relative to the root, and absolute paths or `..`
//! components are refused.  Every refusal looks the same to the client as a
//! file that does not exist.

use std::path::{Component, Path, PathBuf};

use tokio::fs::File;

/// Map a requested path onto `root`, or `None` if it would escape it.
pub fn resolve(root: &Path, requested: &str) -> Option<PathBuf> {
    let requested = Path::new(requested);
    let mut resolved = root.to_path_buf();
    let mut any = false;
    for component in requested.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                any = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    any.then_some(resolved)
}

/// Open a regular file for reading and report its size.
///
/// Missing files, directories and permission problems all yield `None`; the
/// reason is logged.
pub async fn open_for_read(path: &Path) -> Option<(File, u64)> {
    let file = match File::open(path).await {
        Ok(f) => f,
        Err(e) => {
            log::info!("[store] cannot open {}: {e}", path.display());
            return None;
        }
    };
    match file.metadata().await {
        Ok(meta) if meta.is_file() => Some((file, meta.len())),
        Ok(_) => {
            log::info!("[store] {} is not a regular file", path.display());
            None
        }
        Err(e) => {
            log::info!("[store] cannot stat {}: {e}", path.display());
            None
        }
    }
}

/// Create (or truncate) the local output file.
pub async fn create_output(path: &Path) -> std::io::Result<File> {
    File::create(path).await
}

/// Local file name to use when the user gives no `--output`.
pub fn default_output(requested: &str) -> PathBuf {
    Path::new(requested)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download"))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_under_root() {
        let root = Path::new("/srv/files");
        assert_eq!(
            resolve(root, "a/b.txt"),
            Some(PathBuf::from("/srv/files/a/b.txt"))
        );
        assert_eq!(
            resolve(root, "./c.bin"),
            Some(PathBuf::from("/srv/files/c.bin"))
        );
    }

    #[test]
    fn escapes_are_refused() {
        let root = Path::new("/srv/files");
        assert_eq!(resolve(root, "../etc/passwd"), None);
        assert_eq!(resolve(root, "a/../../b"), None);
        assert_eq!(resolve(root, "/etc/passwd"), None);
        assert_eq!(resolve(root, ""), None);
        assert_eq!(resolve(root, "."), None);
    }

    #[test]
    fn default_output_uses_file_name() {
        assert_eq!(default_output("dir/report.pdf"), PathBuf::from("report.pdf"));
        assert_eq!(default_output("plain"), PathBuf::from("plain"));
        assert_eq!(default_output(".."), PathBuf::from("download"));
    }

    #[tokio::test]
    async fn open_reports_size_and_rejects_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        tokio::fs::write(&path, vec![1u8; 123]).await.unwrap();

        let (_, size) = open_for_read(&path).await.unwrap();
        assert_eq!(size, 123);
        assert!(open_for_read(dir.path()).await.is_none());
        assert!(open_for_read(&dir.path().join("missing")).await.is_none());
    }
}
