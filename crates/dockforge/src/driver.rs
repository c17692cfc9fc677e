//! ビルドパイプライン
//!
//! ビルドルートの初期化 → パーシャル読み込み → イメージ列挙 →
//! イメージごとにステージング・ビルド。

use crate::report::{ImageFailure, ImageOutcome, Reporter, RunReport};
use dockforge_build::{BuildEngine, BuildRequest, image_tag};
use dockforge_config::Settings;
use dockforge_core::{
    ForgeError, Partials, list_images, load_partials, reset_build_root, stage_image,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// `build` 実行時のオプション
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// 対象イメージの絞り込み（空なら全イメージ）
    pub only: Vec<String>,
    /// ステージングのみ行い、ビルドエンジンを呼ばない
    pub stage_only: bool,
}

pub struct Driver {
    settings: Arc<Settings>,
    engine: Arc<dyn BuildEngine>,
    reporter: Arc<Reporter>,
    options: RunOptions,
}

impl Driver {
    pub fn new(
        settings: Settings,
        engine: Arc<dyn BuildEngine>,
        reporter: Arc<Reporter>,
        options: RunOptions,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            engine,
            reporter,
            options,
        }
    }

    /// 全イメージを処理する
    ///
    /// ビルドルート・パーシャル・イメージ列挙の失敗は `Err`（致命的）。
    /// イメージ単位の失敗は `RunReport` に記録され、他のイメージの処理は続く。
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunReport, ForgeError> {
        let settings = &self.settings;

        reset_build_root(
            &settings.build_dir,
            &[
                &settings.root,
                &settings.templates_dir,
                &settings.partials_dir,
            ],
        )?;

        let partials = Arc::new(load_partials(
            &settings.partials_dir,
            &settings.partial_extension,
        )?);
        let images = select_images(
            list_images(&settings.templates_dir)?,
            &self.options.only,
            settings,
        )?;

        info!(
            image_count = images.len(),
            partial_count = partials.len(),
            jobs = settings.jobs,
            "Starting build run"
        );
        self.reporter.begin(images.len());

        // --fail-fast 時に新規イメージの着手を止める
        let halt = CancellationToken::new();
        let semaphore = Arc::new(Semaphore::new(settings.jobs));
        let mut tasks = JoinSet::new();

        for (index, image) in images.iter().enumerate() {
            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = cancel.cancelled() => break,
            };
            if cancel.is_cancelled() || halt.is_cancelled() {
                break;
            }

            let job = ImageJob {
                index,
                image: image.clone(),
                settings: self.settings.clone(),
                partials: partials.clone(),
                engine: self.engine.clone(),
                reporter: self.reporter.clone(),
                stage_only: self.options.stage_only,
                halt: halt.clone(),
                cancel: cancel.clone(),
            };
            tasks.spawn(async move {
                job.run().await;
                drop(permit);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Image task aborted");
            }
        }

        let cancelled = cancel.is_cancelled();
        Ok(self.reporter.finish(&images, || {
            if cancelled {
                ImageOutcome::Cancelled
            } else {
                ImageOutcome::Skipped
            }
        }))
    }
}

/// `--only` で絞り込む（列挙順を維持）
fn select_images(
    all: Vec<String>,
    only: &[String],
    settings: &Settings,
) -> Result<Vec<String>, ForgeError> {
    if only.is_empty() {
        return Ok(all);
    }

    if let Some(unknown) = only.iter().find(|name| !all.contains(name)) {
        return Err(ForgeError::FileAccess {
            path: settings.templates_dir.join(unknown),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such image template"),
        });
    }

    Ok(all.into_iter().filter(|image| only.contains(image)).collect())
}

/// 1イメージ分の処理
struct ImageJob {
    index: usize,
    image: String,
    settings: Arc<Settings>,
    partials: Arc<Partials>,
    engine: Arc<dyn BuildEngine>,
    reporter: Arc<Reporter>,
    stage_only: bool,
    halt: CancellationToken,
    cancel: CancellationToken,
}

impl ImageJob {
    async fn run(self) {
        let outcome = self.process().await;
        let failed = matches!(outcome, ImageOutcome::Failed(_));

        self.reporter.record(self.index, &self.image, outcome);

        if failed && self.settings.fail_fast {
            info!(image = %self.image, "Stopping after first failure (--fail-fast)");
            self.halt.cancel();
        }
    }

    async fn process(&self) -> ImageOutcome {
        self.reporter.image_started(&self.image);

        let source = self.settings.templates_dir.join(&self.image);
        let destination = self.settings.build_dir.join(&self.image);
        let partials = self.partials.clone();
        let staging_path = destination.clone();

        // ファイルコピーはブロッキング I/O
        let staged =
            tokio::task::spawn_blocking(move || stage_image(&source, &destination, &partials))
                .await;

        let staged = match staged {
            Ok(Ok(staged)) => staged,
            Ok(Err(e)) => return ImageOutcome::Failed(ImageFailure::Staging(e)),
            Err(e) => {
                return ImageOutcome::Failed(ImageFailure::Staging(ForgeError::Staging {
                    path: staging_path,
                    message: format!("staging task failed: {}", e),
                }));
            }
        };
        self.reporter.staged(&staged);

        if self.stage_only {
            return ImageOutcome::Staged;
        }
        if self.cancel.is_cancelled() {
            return ImageOutcome::Cancelled;
        }

        let request = BuildRequest {
            image: self.image.clone(),
            tag: image_tag(&self.settings.namespace, &self.image),
            context_dir: staged.context_dir,
            no_cache: self.settings.no_cache,
        };

        let progress = self.reporter.build_progress(&self.image);
        progress.set_message(&format!(
            "{} build -t {}...",
            self.engine.name(),
            request.tag
        ));
        let result = self.engine.build(&request, &self.cancel).await;
        progress.clear();

        match result {
            Ok(outcome) => ImageOutcome::Built {
                elapsed: outcome.elapsed,
            },
            Err(e) if e.is_cancelled() => ImageOutcome::Cancelled,
            Err(e) => ImageOutcome::Failed(ImageFailure::Build(e)),
        }
    }
}
