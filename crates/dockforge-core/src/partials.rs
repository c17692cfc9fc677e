//! パーシャル（Dockerfile 断片）の読み込み
//!
//! `partials/` 直下の `*.docker` ファイルを読み込み、
//! ファイル名（拡張子なし）をキーとするマップを作成します。

use crate::error::{ForgeError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// パーシャルファイルの既定の拡張子
pub const DEFAULT_PARTIAL_EXTENSION: &str = "docker";

/// 読み込み済みのパーシャル集合
///
/// 1回の実行中は変更されない。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partials {
    entries: BTreeMap<String, String>,
}

impl Partials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 名前順に列挙
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.entries.insert(name.into(), body.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Partials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// ファイルパスからパーシャル名を取得
pub fn partial_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}

/// パーシャルディレクトリを読み込む（非再帰）
///
/// `extension` に一致する通常ファイルのみが対象。サブディレクトリや
/// 他の拡張子のファイルは無視されます。
#[tracing::instrument(fields(dir = %dir.display()))]
pub fn load_partials(dir: &Path, extension: &str) -> Result<Partials> {
    let entries = std::fs::read_dir(dir).map_err(|e| ForgeError::file_access(dir, e))?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ForgeError::file_access(dir, e))?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
            continue;
        }
        files.push(path);
    }
    files.sort();

    let mut partials = Partials::new();
    for path in files {
        let Some(name) = partial_name(&path) else {
            debug!(file = %path.display(), "Skipping partial with non UTF-8 name");
            continue;
        };

        let body = std::fs::read_to_string(&path).map_err(|e| ForgeError::PartialRead {
            path: path.clone(),
            source: e,
        })?;

        debug!(partial = %name, bytes = body.len(), "Loaded partial");
        partials.insert(name, body);
    }

    info!(partial_count = partials.len(), "Loaded partials");
    Ok(partials)
}
