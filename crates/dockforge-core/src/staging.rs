//! ビルドステージング
//!
//! テンプレートディレクトリをビルドディレクトリへ丸ごとコピーし、
//! コピー先の Dockerfile を展開結果で上書きします。

use crate::error::{ForgeError, Result};
use crate::partials::Partials;
use crate::template::Renderer;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// テンプレートディレクトリ内の Dockerfile のファイル名
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// ステージング済みのイメージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    /// イメージ名（テンプレートディレクトリ名）
    pub name: String,
    /// ビルドコンテキスト（コピー先ディレクトリ）
    pub context_dir: PathBuf,
    /// 展開済み Dockerfile
    pub dockerfile: PathBuf,
    /// コピーした通常ファイルの数
    pub file_count: usize,
}

/// イメージをステージング
///
/// `destination` は存在してはならない。ビルドルートを空にするのは
/// 呼び出し側の責務。
#[tracing::instrument(skip(partials), fields(source = %source.display(), destination = %destination.display()))]
pub fn stage_image(source: &Path, destination: &Path, partials: &Partials) -> Result<StagedImage> {
    if !source.is_dir() {
        return Err(ForgeError::staging(
            source,
            "template directory does not exist",
        ));
    }

    if destination.symlink_metadata().is_ok() {
        return Err(ForgeError::staging(
            destination,
            "destination already exists (build directory was not cleaned)",
        ));
    }

    let file_count = copy_tree(source, destination)?;
    debug!(file_count, "Copied template directory");

    let dockerfile = destination.join(DOCKERFILE_NAME);
    match dockerfile.symlink_metadata() {
        Ok(meta) if meta.file_type().is_file() => {}
        Ok(_) => {
            return Err(ForgeError::staging(
                &dockerfile,
                "Dockerfile is not a regular file",
            ));
        }
        Err(_) => {
            return Err(ForgeError::staging(
                source,
                "Dockerfile not found in template directory",
            ));
        }
    }

    let rendered = Renderer::new(partials).render_file(&dockerfile)?;
    fs::write(&dockerfile, rendered).map_err(|e| ForgeError::staging(&dockerfile, e.to_string()))?;

    info!(dockerfile = %dockerfile.display(), "Rendered Dockerfile");

    Ok(StagedImage {
        name: source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        context_dir: destination.to_path_buf(),
        dockerfile,
        file_count,
    })
}

/// ビルドルートを削除して空の状態で作り直す
///
/// `protected` に含まれるディレクトリ（プロジェクトルート・テンプレート・
/// パーシャル）自身やその祖先を指している場合は削除せずにエラーにする。
/// 比較は `..` やシンボリックリンクを解決したパスで行う。
pub fn reset_build_root(build_root: &Path, protected: &[&Path]) -> Result<()> {
    let resolved_root = resolve_path(build_root);
    for keep in protected {
        if resolve_path(keep).starts_with(&resolved_root) {
            return Err(ForgeError::staging(
                build_root,
                format!("refusing to remove a directory containing {}", keep.display()),
            ));
        }
    }

    match build_root.symlink_metadata() {
        Ok(meta) if meta.is_dir() => {
            debug!(build_root = %build_root.display(), "Removing previous build directory");
            fs::remove_dir_all(build_root).map_err(|e| ForgeError::file_access(build_root, e))?;
        }
        Ok(_) => {
            fs::remove_file(build_root).map_err(|e| ForgeError::file_access(build_root, e))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(ForgeError::file_access(build_root, e)),
    }

    fs::create_dir_all(build_root).map_err(|e| ForgeError::file_access(build_root, e))
}

/// 比較用にパスを解決する
///
/// 存在する最長の祖先を `canonicalize` し、残りを字句的に連結する。
fn resolve_path(path: &Path) -> PathBuf {
    let lexical = normalize_lexically(path);

    let mut existing = lexical.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            return rest
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, name| acc.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return lexical,
        }
    }
}

/// `.` と `..` を字句的に取り除く
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// ディレクトリツリーを再帰的にコピー（シンボリックリンクはリンクのまま）
fn copy_tree(source: &Path, destination: &Path) -> Result<usize> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| ForgeError::staging(parent, e.to_string()))?;
    }
    fs::create_dir(destination).map_err(|e| ForgeError::staging(destination, e.to_string()))?;

    let mut file_count = 0;
    for entry in WalkDir::new(source)
        .follow_links(false)
        .follow_root_links(true)
        .min_depth(1) {
        let entry = entry.map_err(|e| ForgeError::staging(source, e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| ForgeError::staging(entry.path(), e.to_string()))?;
        let target = destination.join(relative);
        let file_type = entry.file_type();

        let copied = if file_type.is_dir() {
            fs::create_dir(&target)
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)
        } else {
            file_count += 1;
            fs::copy(entry.path(), &target).map(|_| ())
        };

        copied.map_err(|e| ForgeError::staging(&target, e.to_string()))?;
    }

    Ok(file_count)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> std::io::Result<()> {
    let points_to = fs::read_link(link)?;
    std::os::unix::fs::symlink(points_to, target)
}

#[cfg(windows)]
fn copy_symlink(link: &Path, target: &Path) -> std::io::Result<()> {
    let points_to = fs::read_link(link)?;
    if fs::metadata(link).map(|m| m.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(points_to, target)
    } else {
        std::os::windows::fs::symlink_file(points_to, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use tempfile::tempdir;

    fn partials() -> Partials {
        [("base", "FROM alpine:3.18\n")].into_iter().collect()
    }

    fn write_template(root: &Path, dockerfile: &str) -> PathBuf {
        let source = root.join("templates/app");
        fs::create_dir_all(source.join("etc/conf.d")).unwrap();
        fs::write(source.join("Dockerfile"), dockerfile).unwrap();
        fs::write(source.join("entrypoint.sh"), "#!/bin/sh\nexec \"$@\"\n").unwrap();
        fs::write(source.join("etc/conf.d/app.conf"), "listen 80;\n").unwrap();
        source
    }

    #[test]
    fn test_stage_image_renders_dockerfile() {
        let temp_dir = tempdir().unwrap();
        let source = write_template(temp_dir.path(), "$base\nCOPY . /app\n");
        let destination = temp_dir.path().join("build/app");

        let staged = stage_image(&source, &destination, &partials()).unwrap();

        assert_eq!(staged.name, "app");
        assert_eq!(staged.context_dir, destination);
        assert_eq!(staged.dockerfile, destination.join("Dockerfile"));
        assert_eq!(staged.file_count, 3);
        assert_eq!(
            fs::read_to_string(destination.join("Dockerfile")).unwrap(),
            "FROM alpine:3.18\n\nCOPY . /app\n"
        );
        assert_eq!(
            fs::read_to_string(destination.join("etc/conf.d/app.conf")).unwrap(),
            "listen 80;\n"
        );
    }

    #[test]
    fn test_stage_image_leaves_source_untouched() {
        let temp_dir = tempdir().unwrap();
        let source = write_template(temp_dir.path(), "$base\n");
        let dockerfile = source.join("Dockerfile");
        let before_content = fs::read_to_string(&dockerfile).unwrap();
        let before_mtime: SystemTime = fs::metadata(&dockerfile).unwrap().modified().unwrap();

        stage_image(&source, &temp_dir.path().join("build/app"), &partials()).unwrap();

        assert_eq!(fs::read_to_string(&dockerfile).unwrap(), before_content);
        assert_eq!(
            fs::metadata(&dockerfile).unwrap().modified().unwrap(),
            before_mtime
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_stage_image_preserves_symlinks() {
        let temp_dir = tempdir().unwrap();
        let source = write_template(temp_dir.path(), "$base\n");
        std::os::unix::fs::symlink("entrypoint.sh", source.join("start.sh")).unwrap();

        let destination = temp_dir.path().join("build/app");
        stage_image(&source, &destination, &partials()).unwrap();

        let link = destination.join("start.sh");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("entrypoint.sh"));
    }

    #[cfg(unix)]
    #[test]
    fn test_stage_image_from_symlinked_template_dir() {
        let temp_dir = tempdir().unwrap();
        let real = write_template(temp_dir.path(), "$base\n");
        let linked = temp_dir.path().join("templates/alias");
        std::os::unix::fs::symlink(&real, &linked).unwrap();

        let destination = temp_dir.path().join("build/alias");
        let staged = stage_image(&linked, &destination, &partials()).unwrap();

        assert_eq!(staged.name, "alias");
        assert!(destination.symlink_metadata().unwrap().is_dir());
        assert_eq!(
            fs::read_to_string(destination.join("Dockerfile")).unwrap(),
            "FROM alpine:3.18\n"
        );
        assert_eq!(fs::read_to_string(real.join("Dockerfile")).unwrap(), "$base\n");
    }

    #[test]
    fn test_stage_image_missing_dockerfile() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("templates/app");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("README.md"), "no dockerfile here").unwrap();

        let result = stage_image(&source, &temp_dir.path().join("build/app"), &partials());
        assert!(matches!(result, Err(ForgeError::Staging { .. })));
    }

    #[test]
    fn test_stage_image_missing_source() {
        let temp_dir = tempdir().unwrap();
        let result = stage_image(
            &temp_dir.path().join("templates/ghost"),
            &temp_dir.path().join("build/ghost"),
            &partials(),
        );
        assert!(matches!(result, Err(ForgeError::Staging { .. })));
    }

    #[test]
    fn test_stage_image_existing_destination() {
        let temp_dir = tempdir().unwrap();
        let source = write_template(temp_dir.path(), "$base\n");
        let destination = temp_dir.path().join("build/app");
        fs::create_dir_all(&destination).unwrap();

        let result = stage_image(&source, &destination, &partials());
        assert!(matches!(result, Err(ForgeError::Staging { .. })));
    }

    #[test]
    fn test_stage_image_missing_partial() {
        let temp_dir = tempdir().unwrap();
        let source = write_template(temp_dir.path(), "$missing\n");

        let err = stage_image(&source, &temp_dir.path().join("build/app"), &partials())
            .unwrap_err();

        assert!(matches!(err.root_cause(), ForgeError::MissingPartial(n) if n == "missing"));
    }

    #[test]
    fn test_reset_build_root_recreates_empty() {
        let temp_dir = tempdir().unwrap();
        let build_root = temp_dir.path().join("build");
        fs::create_dir_all(build_root.join("stale/nested")).unwrap();
        fs::write(build_root.join("stale/Dockerfile"), "FROM old").unwrap();

        reset_build_root(&build_root, &[]).unwrap();

        assert!(build_root.is_dir());
        assert_eq!(fs::read_dir(&build_root).unwrap().count(), 0);
    }

    #[test]
    fn test_reset_build_root_creates_missing() {
        let temp_dir = tempdir().unwrap();
        let build_root = temp_dir.path().join("out/build");

        reset_build_root(&build_root, &[]).unwrap();
        assert!(build_root.is_dir());
    }

    #[test]
    fn test_reset_build_root_refuses_parent_dir_ancestor() {
        let temp_dir = tempdir().unwrap();
        let project = temp_dir.path().join("project");
        let templates = project.join("templates");
        fs::create_dir_all(templates.join("app")).unwrap();
        fs::create_dir_all(project.join("sub")).unwrap();

        let result = reset_build_root(&project.join("sub/.."), &[&templates]);
        assert!(matches!(result, Err(ForgeError::Staging { .. })));

        let result = reset_build_root(&project.join("build/../.."), &[&project]);
        assert!(matches!(result, Err(ForgeError::Staging { .. })));

        assert!(templates.join("app").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_reset_build_root_refuses_symlinked_ancestor() {
        let temp_dir = tempdir().unwrap();
        let project = temp_dir.path().join("project");
        let templates = project.join("templates");
        fs::create_dir_all(&templates).unwrap();
        let alias = temp_dir.path().join("alias");
        std::os::unix::fs::symlink(&project, &alias).unwrap();

        let result = reset_build_root(&alias, &[&templates]);

        assert!(matches!(result, Err(ForgeError::Staging { .. })));
        assert!(templates.is_dir());
    }

    #[test]
    fn test_reset_build_root_allows_sibling_with_dots() {
        let temp_dir = tempdir().unwrap();
        let project = temp_dir.path().join("project");
        let templates = project.join("templates");
        fs::create_dir_all(&templates).unwrap();

        let build_root = project.join("templates/../build");
        reset_build_root(&build_root, &[&templates, &project.join("partials")]).unwrap();

        assert!(project.join("build").is_dir());
        assert!(templates.is_dir());
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/srv/project/sub/../build/./x")),
            PathBuf::from("/srv/project/build/x")
        );
        assert_eq!(normalize_lexically(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize_lexically(Path::new("../a")), PathBuf::from("../a"));
    }

    #[test]
    fn test_reset_build_root_refuses_template_ancestor() {
        let temp_dir = tempdir().unwrap();
        let templates = temp_dir.path().join("templates");
        fs::create_dir_all(templates.join("app")).unwrap();

        let result = reset_build_root(temp_dir.path(), &[&templates]);

        assert!(matches!(result, Err(ForgeError::Staging { .. })));
        assert!(templates.join("app").is_dir());
    }
}
