use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ファイルが見つかりません: {0}")]
    NotFound(PathBuf),

    #[error("設定ファイルを読み込めません: {path}\n理由: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("設定ファイルの形式が不正です: {path}\n理由: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("無効な設定: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
