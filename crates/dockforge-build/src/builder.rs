use crate::error::{BuildError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 失敗時に保持する stderr の行数
const STDERR_TAIL_LINES: usize = 20;

/// ビルド出力1行ごとに呼ばれるコールバック（イメージ名, 行）
pub type LineSink = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// 1イメージ分のビルド要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub image: String,
    pub tag: String,
    pub context_dir: PathBuf,
    pub no_cache: bool,
}

/// ビルド結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOutcome {
    pub elapsed: Duration,
}

/// コンテナイメージのビルドエンジン
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// エンジン名（表示用）
    fn name(&self) -> &str;

    /// ビルドを実行し、終了ステータスを結果として返す
    async fn build(
        &self,
        request: &BuildRequest,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome>;
}

/// `<namespace>/<image>` 形式のタグを生成
///
/// namespace が空の場合はイメージ名のみ。
pub fn image_tag(namespace: &str, image: &str) -> String {
    let namespace = namespace.trim_end_matches('/');
    if namespace.is_empty() {
        image.to_string()
    } else {
        format!("{}/{}", namespace, image)
    }
}

/// 外部コマンド（docker / podman 等）でイメージをビルドする
pub struct ImageBuilder {
    program: String,
    /// サブコマンドより前に渡す引数（例: `--context remote`）
    global_args: Vec<String>,
    /// `build` サブコマンドに追加する引数
    build_args: Vec<String>,
    timeout: Option<Duration>,
    line_sink: Option<LineSink>,
}

impl ImageBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            global_args: Vec::new(),
            build_args: Vec::new(),
            timeout: None,
            line_sink: None,
        }
    }

    pub fn with_global_args(mut self, args: Vec<String>) -> Self {
        self.global_args = args;
        self
    }

    pub fn with_build_args(mut self, args: Vec<String>) -> Self {
        self.build_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_line_sink(mut self, sink: LineSink) -> Self {
        self.line_sink = Some(sink);
        self
    }

    /// エンジンに渡す引数リスト
    ///
    /// `<global args> build [--no-cache] -t <tag> <build args> <context>`
    pub fn command_args(&self, request: &BuildRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.global_args.iter().map(OsString::from).collect();
        args.push("build".into());
        if request.no_cache {
            args.push("--no-cache".into());
        }
        args.push("-t".into());
        args.push(request.tag.clone().into());
        args.extend(self.build_args.iter().map(OsString::from));
        args.push(request.context_dir.clone().into_os_string());
        args
    }
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut(Duration),
    Cancelled,
}

async fn wait_with_timeout(child: &mut Child, timeout: Option<Duration>) -> Waited {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Waited::Exited(status),
            Err(_) => Waited::TimedOut(limit),
        },
        None => Waited::Exited(child.wait().await),
    }
}

async fn kill_child(child: &mut Child, image: &str) {
    if let Err(e) = child.kill().await {
        tracing::warn!(image = %image, error = %e, "Failed to kill build process");
    }
}

/// 出力を1行ずつ読み、末尾 `keep` 行を返す
///
/// UTF-8 でない行は置換文字で読み替える。パイプは EOF まで読み切る
/// （途中で閉じるとエンジンが SIGPIPE で終了する）。
fn forward_lines<R>(
    reader: Option<R>,
    image: String,
    sink: Option<LineSink>,
    keep: usize,
) -> JoinHandle<VecDeque<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut tail = VecDeque::with_capacity(keep);
        let Some(reader) = reader else {
            return tail;
        };

        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(image = %image, error = %e, "Failed to read build output");
                    // 残りは読み捨てる
                    let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                    break;
                }
            }

            let line = String::from_utf8_lossy(trim_line_end(&buf)).into_owned();
            tracing::trace!(target: "dockforge::engine", image = %image, "{}", line);
            if let Some(sink) = &sink {
                sink(&image, &line);
            }
            if keep > 0 {
                if tail.len() == keep {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
        tail
    })
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[async_trait]
impl BuildEngine for ImageBuilder {
    fn name(&self) -> &str {
        &self.program
    }

    async fn build(
        &self,
        request: &BuildRequest,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome> {
        tracing::info!("Building image: {}", request.tag);

        let args = self.command_args(request);
        tracing::debug!(program = %self.program, args = ?args, "Spawning build engine");

        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BuildError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        let stdout_task = forward_lines(
            child.stdout.take(),
            request.image.clone(),
            self.line_sink.clone(),
            0,
        );
        let stderr_task = forward_lines(
            child.stderr.take(),
            request.image.clone(),
            self.line_sink.clone(),
            STDERR_TAIL_LINES,
        );

        let waited = tokio::select! {
            waited = wait_with_timeout(&mut child, self.timeout) => waited,
            _ = cancel.cancelled() => Waited::Cancelled,
        };

        let status = match waited {
            Waited::Exited(status) => status?,
            Waited::TimedOut(timeout) => {
                kill_child(&mut child, &request.image).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(BuildError::BuildTimeout {
                    image: request.image.clone(),
                    timeout,
                });
            }
            Waited::Cancelled => {
                kill_child(&mut child, &request.image).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(BuildError::Cancelled {
                    image: request.image.clone(),
                });
            }
        };

        let _ = stdout_task.await;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(BuildError::BuildFailed {
                image: request.image.clone(),
                code: status.code(),
                stderr_tail: stderr_tail.into_iter().collect(),
            });
        }

        let elapsed = started.elapsed();
        tracing::info!("Successfully built: {} ({:.1}s)", request.tag, elapsed.as_secs_f64());
        Ok(BuildOutcome { elapsed })
    }
}
