pub mod error;

pub use error::*;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// プロジェクト設定ファイルの候補（優先順）
pub const SETTINGS_FILE_NAMES: [&str; 2] = ["dockforge.yaml", ".dockforge.yaml"];

pub const DEFAULT_PARTIALS_DIR: &str = "partials";
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";
pub const DEFAULT_BUILD_DIR: &str = "build";
pub const DEFAULT_PARTIAL_EXTENSION: &str = "docker";
pub const DEFAULT_NAMESPACE: &str = "maxbucknell";
pub const DEFAULT_ENGINE: &str = "docker";

/// 設定の1レイヤー（設定ファイル、または CLI/環境変数）
///
/// 未指定の項目は下位レイヤーか既定値で補われる。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsLayer {
    pub partials: Option<PathBuf>,
    pub templates: Option<PathBuf>,
    pub build_dir: Option<PathBuf>,
    pub partial_extension: Option<String>,
    pub namespace: Option<String>,
    pub engine: Option<String>,
    pub engine_args: Option<Vec<String>>,
    pub build_args: Option<Vec<String>>,
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub fail_fast: Option<bool>,
    pub no_cache: Option<bool>,
}

impl SettingsLayer {
    /// `self` を優先し、未指定項目を `lower` で補う
    pub fn over(self, lower: SettingsLayer) -> SettingsLayer {
        SettingsLayer {
            partials: self.partials.or(lower.partials),
            templates: self.templates.or(lower.templates),
            build_dir: self.build_dir.or(lower.build_dir),
            partial_extension: self.partial_extension.or(lower.partial_extension),
            namespace: self.namespace.or(lower.namespace),
            engine: self.engine.or(lower.engine),
            engine_args: self.engine_args.or(lower.engine_args),
            build_args: self.build_args.or(lower.build_args),
            jobs: self.jobs.or(lower.jobs),
            timeout_secs: self.timeout_secs.or(lower.timeout_secs),
            fail_fast: self.fail_fast.or(lower.fail_fast),
            no_cache: self.no_cache.or(lower.no_cache),
        }
    }
}

/// 解決済みの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub root: PathBuf,
    pub partials_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub build_dir: PathBuf,
    pub partial_extension: String,
    pub namespace: String,
    pub engine: String,
    pub engine_args: Vec<String>,
    pub build_args: Vec<String>,
    pub jobs: usize,
    pub timeout: Option<Duration>,
    pub fail_fast: bool,
    pub no_cache: bool,
}

impl Settings {
    /// レイヤーを既定値で補って解決する
    ///
    /// 相対パスは `root` 基準で解決される。
    pub fn resolve(root: &Path, layer: SettingsLayer) -> Result<Settings> {
        let jobs = layer.jobs.unwrap_or(1);
        if jobs == 0 {
            return Err(ConfigError::Invalid(
                "jobs は 1 以上を指定してください".to_string(),
            ));
        }

        let timeout = match layer.timeout_secs {
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "timeout_secs は 1 以上を指定してください".to_string(),
                ));
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        let extension = layer
            .partial_extension
            .unwrap_or_else(|| DEFAULT_PARTIAL_EXTENSION.to_string());
        let extension = extension.trim_start_matches('.').to_string();
        if extension.is_empty() {
            return Err(ConfigError::Invalid(
                "partial_extension が空です".to_string(),
            ));
        }

        let engine = layer.engine.unwrap_or_else(|| DEFAULT_ENGINE.to_string());
        if engine.trim().is_empty() {
            return Err(ConfigError::Invalid("engine が空です".to_string()));
        }

        let dir = |value: Option<PathBuf>, default: &str| {
            root.join(value.unwrap_or_else(|| PathBuf::from(default)))
        };

        Ok(Settings {
            root: root.to_path_buf(),
            partials_dir: dir(layer.partials, DEFAULT_PARTIALS_DIR),
            templates_dir: dir(layer.templates, DEFAULT_TEMPLATES_DIR),
            build_dir: dir(layer.build_dir, DEFAULT_BUILD_DIR),
            partial_extension: extension,
            namespace: layer
                .namespace
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            engine,
            engine_args: layer.engine_args.unwrap_or_default(),
            build_args: layer.build_args.unwrap_or_default(),
            jobs,
            timeout,
            fail_fast: layer.fail_fast.unwrap_or(false),
            no_cache: layer.no_cache.unwrap_or(true),
        })
    }
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 明示的な指定（--config / DOCKFORGE_CONFIG）。存在しなければエラー
/// 2. プロジェクトルート: dockforge.yaml, .dockforge.yaml
/// 3. ~/.config/dockforge/config.yaml (グローバル設定)
pub fn find_settings_file(root: &Path, explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    for filename in SETTINGS_FILE_NAMES {
        let path = root.join(filename);
        if path.is_file() {
            return Ok(Some(path));
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("dockforge").join("config.yaml");
        if global.is_file() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}

/// 設定ファイルを読み込む
pub fn load_settings_file(path: &Path) -> Result<SettingsLayer> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    // 空ファイルは全項目未指定として扱う
    if content.trim().is_empty() {
        return Ok(SettingsLayer::default());
    }

    serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// 設定ファイルを探して読み込む（見つからなければ空のレイヤー）
pub fn discover(root: &Path, explicit: Option<&Path>) -> Result<(SettingsLayer, Option<PathBuf>)> {
    match find_settings_file(root, explicit)? {
        Some(path) => {
            let layer = load_settings_file(&path)?;
            tracing::debug!(settings_file = %path.display(), "Loaded settings file");
            Ok((layer, Some(path)))
        }
        None => Ok((SettingsLayer::default(), None)),
    }
}
