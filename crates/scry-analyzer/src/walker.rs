use std::path::Path;

use scry_core::ScryError;

use crate::language::{is_dependency_path, Language};
use crate::SourceFile;

/// Maximum file size to analyze (1 MB).
const MAX_FILE_SIZE: u64 = 1_048_576;

/// Number of bytes to check for binary detection.
const BINARY_CHECK_SIZE: usize = 8192;

/// Walk a project, respecting `.gitignore`, returning analyzable source files.
///
/// Skips binary files, files larger than 1 MB, files with unsupported
/// extensions, and anything under a dependency tree. Returned paths are
/// relative to `root` and `/`-separated, sorted for deterministic output.
///
/// # Errors
///
/// Returns [`ScryError::FileNotFound`] if `root` does not exist.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use scry_analyzer::walker::walk_project;
///
/// let files = walk_project(Path::new(".")).unwrap();
/// for f in &files {
///     println!("{}", f.path);
/// }
/// ```
pub fn walk_project(root: &Path) -> Result<Vec<SourceFile>, ScryError> {
    if !root.exists() {
        return Err(ScryError::FileNotFound(root.to_path_buf()));
    }

    let walker = ignore::WalkBuilder::new(root).build();
    let mut files = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable walk entry");
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();

        let relative = match path.strip_prefix(root) {
            Ok(r) => r,
            Err(_) => path,
        };
        let relative = crate::normalize_path(&relative.to_string_lossy());
        if is_dependency_path(&relative) || Language::from_path(&relative) == Language::Unknown {
            continue;
        }

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if metadata.len() > MAX_FILE_SIZE {
            tracing::debug!(file = %relative, size = metadata.len(), "skipping large file");
            continue;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => continue,
        };

        // Null bytes in the first 8KB mean binary content.
        let check_len = content.len().min(BINARY_CHECK_SIZE);
        if content.as_bytes()[..check_len].contains(&0) {
            continue;
        }

        files.push(SourceFile {
            path: relative,
            content,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_finds_sources_and_skips_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/ui")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/react")).unwrap();
        std::fs::write(root.join("src/ui/toast.tsx"), "export const A = 1;").unwrap();
        std::fs::write(root.join("src/app.py"), "def main():\n    pass\n").unwrap();
        std::fs::write(root.join("node_modules/react/index.js"), "function x() {}").unwrap();
        std::fs::write(root.join("README.md"), "# hi").unwrap();

        let files = walk_project(root).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/app.py", "src/ui/toast.tsx"]);
    }

    #[test]
    fn walk_skips_binary_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blob.js"), b"function a() {}\0\0").unwrap();
        let files = walk_project(dir.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let result = walk_project(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(ScryError::FileNotFound(_))));
    }
}
