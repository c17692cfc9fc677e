use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to start build engine '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Build failed for {image}: {}", describe_exit(.code))]
    BuildFailed {
        image: String,
        code: Option<i32>,
        stderr_tail: Vec<String>,
    },

    #[error("Build for {image} timed out after {}s", .timeout.as_secs_f64())]
    BuildTimeout { image: String, timeout: Duration },

    #[error("Build for {image} was cancelled")]
    Cancelled { image: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl BuildError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BuildError::BuildTimeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BuildError::Cancelled { .. })
    }

    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::Spawn { program, .. } => {
                format!(
                    "{}\n\
                     \n\
                     解決方法:\n\
                     1. {} がインストールされ PATH に含まれているか確認してください\n\
                     2. --engine で別のビルドエンジン（podman 等）を指定できます",
                    self, program
                )
            }
            BuildError::BuildFailed { stderr_tail, .. } if !stderr_tail.is_empty() => {
                format!(
                    "{}\n\
                     \n\
                     ビルド出力（末尾）:\n{}",
                    self,
                    stderr_tail
                        .iter()
                        .map(|line| format!("  {}", line))
                        .collect::<Vec<_>>()
                        .join("\n")
                )
            }
            BuildError::BuildTimeout { .. } => {
                format!(
                    "{}\n\
                     \n\
                     --timeout でタイムアウトを延長できます。",
                    self
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
