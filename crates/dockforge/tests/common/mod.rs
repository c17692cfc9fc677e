#![allow(deprecated)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ENV_VARS: [&str; 9] = [
    "DOCKFORGE_ROOT",
    "DOCKFORGE_PARTIALS",
    "DOCKFORGE_TEMPLATES",
    "DOCKFORGE_BUILD_DIR",
    "DOCKFORGE_PARTIAL_EXT",
    "DOCKFORGE_NAMESPACE",
    "DOCKFORGE_ENGINE",
    "DOCKFORGE_CONFIG",
    "RUST_LOG",
];

pub struct TestProject {
    pub root: TempDir,
    config_home: TempDir,
}

impl TestProject {
    /// partials/ と templates/ を持つ空のプロジェクト
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("partials")).unwrap();
        fs::create_dir_all(root.path().join("templates")).unwrap();
        Self {
            root,
            config_home: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn write_partial(&self, name: &str, content: &str) -> &Self {
        let path = self.root.path().join("partials").join(format!("{}.docker", name));
        fs::write(path, content).unwrap();
        self
    }

    pub fn write_image(&self, name: &str, dockerfile: &str) -> &Self {
        let dir = self.root.path().join("templates").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Dockerfile"), dockerfile).unwrap();
        self
    }

    #[allow(dead_code)]
    pub fn write_file(&self, relative: &str, content: &str) {
        let path = self.root.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[allow(dead_code)]
    pub fn read(&self, relative: impl AsRef<Path>) -> String {
        fs::read_to_string(self.root.path().join(relative)).unwrap()
    }

    /// プロジェクトルートで実行する dockforge コマンド
    ///
    /// 呼び出し元の環境変数やグローバル設定の影響を受けない。
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("dockforge").unwrap();
        cmd.current_dir(self.root.path())
            .env("XDG_CONFIG_HOME", self.config_home.path())
            .env("NO_COLOR", "1");
        for var in ENV_VARS {
            cmd.env_remove(var);
        }
        cmd
    }

    /// `sh -c <script>` をビルドエンジンとして使うコマンド
    ///
    /// スクリプトからは `$1`=build, `$2`=--no-cache, `$3`=-t, `$4`=タグ,
    /// `$5`=ビルドコンテキスト として見える。
    #[allow(dead_code)]
    pub fn cmd_with_engine(&self, script: &str) -> Command {
        let mut cmd = self.cmd();
        cmd.arg("--engine")
            .arg("sh")
            .arg("--engine-arg=-c")
            .arg(format!("--engine-arg={}", script))
            .arg("--engine-arg=engine");
        cmd
    }
}
