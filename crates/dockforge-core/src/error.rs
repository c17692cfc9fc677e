use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("cannot access {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read partial {path}: {source}")]
    PartialRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing partial: {0}")]
    MissingPartial(String),

    #[error("malformed placeholder at line {line}, column {column}")]
    MalformedPlaceholder { line: usize, column: usize },

    #[error("template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: Box<ForgeError>,
    },

    #[error("staging failed for {path}: {message}")]
    Staging { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForgeError {
    pub(crate) fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ForgeError::FileAccess {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn staging(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ForgeError::Staging {
            path: path.into(),
            message: message.into(),
        }
    }

    /// `Template` でラップされている場合は内側のレンダリングエラーを返す
    pub fn root_cause(&self) -> &ForgeError {
        match self {
            ForgeError::Template { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// レンダリング（プレースホルダー解決）起因のエラーか
    pub fn is_render_error(&self) -> bool {
        matches!(
            self.root_cause(),
            ForgeError::MissingPartial(_) | ForgeError::MalformedPlaceholder { .. }
        )
    }

    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self.root_cause() {
            ForgeError::MissingPartial(name) => {
                format!(
                    "{}\n\
                     \n\
                     解決方法:\n\
                     1. partials/{}.docker を作成してください\n\
                     2. 文字どおりの `$` を書く場合は `$$` とエスケープしてください",
                    self, name
                )
            }
            ForgeError::MalformedPlaceholder { .. } => {
                format!(
                    "{}\n\
                     \n\
                     プレースホルダーは `$name` または `${{name}}` の形式で記述してください。\n\
                     文字どおりの `$` は `$$` と書きます。",
                    self
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ForgeError>;
