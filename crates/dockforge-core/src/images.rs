//! イメージの列挙
//!
//! `templates/` 直下のディレクトリ1つが1イメージに対応します。

use crate::error::{ForgeError, Result};
use std::path::Path;
use tracing::{debug, warn};

/// テンプレートルート直下のディレクトリ名を辞書順で返す
///
/// ビルド順序を実行間で再現可能にするためソートする。
/// 直下の通常ファイルは無視し、空の結果も正常とする。
/// ディレクトリへのシンボリックリンクは辿る。
#[tracing::instrument(fields(root = %templates_root.display()))]
pub fn list_images(templates_root: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(templates_root)
        .map_err(|e| ForgeError::file_access(templates_root, e))?;

    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ForgeError::file_access(templates_root, e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| ForgeError::file_access(entry.path(), e))?;

        // ディレクトリへのシンボリックリンクもイメージとして扱う
        let is_dir = if file_type.is_symlink() {
            let followed = entry.path().is_dir();
            if !followed {
                warn!(path = %entry.path().display(), "Skipping symlink that does not point to a directory");
            }
            followed
        } else {
            file_type.is_dir()
        };
        if !is_dir {
            continue;
        }

        match entry.file_name().into_string() {
            Ok(name) => images.push(name),
            Err(raw) => {
                warn!(name = ?raw, "Skipping image directory with non UTF-8 name");
            }
        }
    }

    images.sort();
    debug!(images = ?images, "Enumerated images");
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_list_images_sorted() {
        let temp_dir = tempdir().unwrap();
        for name in ["php", "nginx", "mysql"] {
            fs::create_dir(temp_dir.path().join(name)).unwrap();
        }

        let images = list_images(temp_dir.path()).unwrap();
        assert_eq!(images, vec!["mysql", "nginx", "php"]);
    }

    #[test]
    fn test_list_images_stable() {
        let temp_dir = tempdir().unwrap();
        for name in ["b", "a", "c"] {
            fs::create_dir(temp_dir.path().join(name)).unwrap();
        }

        let first = list_images(temp_dir.path()).unwrap();
        let second = list_images(temp_dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_list_images_ignores_files() {
        let temp_dir = tempdir().unwrap();
        fs::create_dir(temp_dir.path().join("app")).unwrap();
        fs::write(temp_dir.path().join("README.md"), "notes").unwrap();

        let images = list_images(temp_dir.path()).unwrap();
        assert_eq!(images, vec!["app"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_list_images_follows_directory_symlinks() {
        let temp_dir = tempdir().unwrap();
        let shared = temp_dir.path().join("shared/php");
        fs::create_dir_all(&shared).unwrap();
        let root = temp_dir.path().join("templates");
        fs::create_dir_all(root.join("nginx")).unwrap();
        fs::write(root.join("notes.txt"), "notes").unwrap();
        std::os::unix::fs::symlink(&shared, root.join("php")).unwrap();
        std::os::unix::fs::symlink(root.join("notes.txt"), root.join("notes")).unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("gone"), root.join("dangling")).unwrap();

        let images = list_images(&root).unwrap();
        assert_eq!(images, vec!["nginx", "php"]);
    }

    #[test]
    fn test_list_images_empty() {
        let temp_dir = tempdir().unwrap();
        let images = list_images(temp_dir.path()).unwrap();
        assert!(images.is_empty());
    }

    #[test]
    fn test_list_images_missing_root() {
        let temp_dir = tempdir().unwrap();
        let result = list_images(&temp_dir.path().join("templates"));
        assert!(matches!(result, Err(ForgeError::FileAccess { .. })));
    }
}
