//! 実行結果の集計と表示

use colored::Colorize;
use dockforge_build::{BuildError, BuildProgress};
use dockforge_core::{ForgeError, StagedImage};
use indicatif::MultiProgress;
use std::sync::Mutex;
use std::time::Duration;

pub const EXIT_OK: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_SETUP: u8 = 2;
pub const EXIT_STAGING: u8 = 3;
pub const EXIT_BUILD: u8 = 4;
pub const EXIT_TIMEOUT: u8 = 5;
pub const EXIT_CANCELLED: u8 = 130;

/// イメージ単位の失敗
#[derive(Debug)]
pub enum ImageFailure {
    Staging(ForgeError),
    Build(BuildError),
}

impl ImageFailure {
    pub fn exit_code(&self) -> u8 {
        match self {
            ImageFailure::Staging(_) => EXIT_STAGING,
            ImageFailure::Build(e) if e.is_timeout() => EXIT_TIMEOUT,
            ImageFailure::Build(_) => EXIT_BUILD,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ImageFailure::Staging(e) => e.user_message(),
            ImageFailure::Build(e) => e.user_message(),
        }
    }
}

/// イメージ単位の結果
#[derive(Debug)]
pub enum ImageOutcome {
    Built { elapsed: Duration },
    /// --stage-only でビルドを省略
    Staged,
    Failed(ImageFailure),
    /// --fail-fast により未着手
    Skipped,
    /// キャンセルにより未完了
    Cancelled,
}

impl ImageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ImageOutcome::Built { .. } | ImageOutcome::Staged)
    }
}

/// 1回の実行全体の結果（列挙順）
#[derive(Debug, Default)]
pub struct RunReport {
    pub entries: Vec<(String, ImageOutcome)>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|(_, outcome)| outcome.is_success())
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, o)| o.is_success())
            .map(|(name, _)| name.as_str())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ImageFailure)> {
        self.entries.iter().filter_map(|(name, outcome)| match outcome {
            ImageOutcome::Failed(failure) => Some((name.as_str(), failure)),
            _ => None,
        })
    }

    pub fn not_completed(&self) -> impl Iterator<Item = (&str, &ImageOutcome)> {
        self.entries
            .iter()
            .filter(|(_, o)| matches!(o, ImageOutcome::Skipped | ImageOutcome::Cancelled))
            .map(|(name, outcome)| (name.as_str(), outcome))
    }

    /// 終了コード（最も重い失敗の種類を採用）
    pub fn exit_code(&self) -> u8 {
        self.entries
            .iter()
            .map(|(_, outcome)| match outcome {
                ImageOutcome::Built { .. } | ImageOutcome::Staged | ImageOutcome::Skipped => {
                    EXIT_OK
                }
                ImageOutcome::Failed(failure) => failure.exit_code(),
                ImageOutcome::Cancelled => EXIT_CANCELLED,
            })
            .max()
            .unwrap_or(EXIT_OK)
    }
}

/// 進捗表示と結果の収集
///
/// 並列ビルド時も出力が混ざらないよう、表示は `MultiProgress` 経由、
/// 結果は排他的に記録する。
pub struct Reporter {
    multi: MultiProgress,
    verbose: bool,
    outcomes: Mutex<Vec<Option<ImageOutcome>>>,
}

impl Reporter {
    pub fn new(multi: MultiProgress, verbose: bool) -> Self {
        Self {
            multi,
            verbose,
            outcomes: Mutex::new(Vec::new()),
        }
    }

    /// 結果スロットを初期化
    pub fn begin(&self, image_count: usize) {
        let mut outcomes = self.lock_outcomes();
        outcomes.clear();
        outcomes.resize_with(image_count, || None);
    }

    pub fn println(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        self.multi.suspend(|| println!("{}", line));
    }

    pub fn eprintln(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        self.multi.suspend(|| eprintln!("{}", line));
    }

    pub fn image_started(&self, image: &str) {
        self.println(format!("{}", format!("🔨 Building image: {}", image).green().bold()));
    }

    pub fn staged(&self, staged: &StagedImage) {
        self.println(format!(
            "  → Staged {} at {} ({} files)",
            staged.name,
            staged.context_dir.display().to_string().cyan(),
            staged.file_count
        ));
    }

    pub fn build_progress(&self, image: &str) -> BuildProgress {
        BuildProgress::new(&self.multi, image)
    }

    /// ビルドエンジンの出力行（--verbose 時のみ表示）
    pub fn engine_line(&self, image: &str, line: &str) {
        if self.verbose {
            self.println(format!("  {} {}", format!("[{}]", image).dimmed(), line));
        }
    }

    /// 結果を記録して表示
    pub fn record(&self, index: usize, image: &str, outcome: ImageOutcome) {
        match &outcome {
            ImageOutcome::Built { elapsed } => {
                self.println(format!(
                    "  {} {} ({:.1}s)",
                    "✓".green(),
                    image,
                    elapsed.as_secs_f64()
                ));
            }
            ImageOutcome::Staged => {
                self.println(format!("  {} {} (staged only)", "✓".green(), image));
            }
            ImageOutcome::Failed(failure) => {
                self.eprintln(format!(
                    "  {} {}: {}",
                    "✗".red().bold(),
                    image,
                    failure.user_message()
                ));
            }
            ImageOutcome::Skipped => {
                self.println(format!("  {} {} skipped", "-".yellow(), image));
            }
            ImageOutcome::Cancelled => {
                self.eprintln(format!("  {} {} cancelled", "✗".yellow(), image));
            }
        }

        let mut outcomes = self.lock_outcomes();
        if let Some(slot) = outcomes.get_mut(index) {
            *slot = Some(outcome);
        }
    }

    /// 記録済みの結果から RunReport を作成
    ///
    /// 結果のないイメージは `missing` で埋める。
    pub fn finish(&self, images: &[String], missing: impl Fn() -> ImageOutcome) -> RunReport {
        let mut outcomes = self.lock_outcomes();
        let entries = images
            .iter()
            .enumerate()
            .map(|(index, image)| {
                let outcome = outcomes
                    .get_mut(index)
                    .and_then(Option::take)
                    .unwrap_or_else(&missing);
                (image.clone(), outcome)
            })
            .collect();

        RunReport { entries }
    }

    fn lock_outcomes(&self) -> std::sync::MutexGuard<'_, Vec<Option<ImageOutcome>>> {
        // ポイズン時も記録済みの結果は有効
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 結果サマリーを表示
pub fn print_summary(report: &RunReport) {
    println!();
    println!("{}", "結果サマリー:".bold());

    if report.entries.is_empty() {
        println!("  ビルド対象のイメージがありません");
        return;
    }

    for name in report.succeeded() {
        println!("  {} {}", "✓".green(), name);
    }
    for (name, failure) in report.failures() {
        let reason = match failure {
            ImageFailure::Staging(e) => e.to_string(),
            ImageFailure::Build(e) => e.to_string(),
        };
        println!("  {} {}: {}", "✗".red(), name, reason);
    }
    for (name, outcome) in report.not_completed() {
        let label = match outcome {
            ImageOutcome::Skipped => "skipped",
            _ => "not completed",
        };
        println!("  {} {}: {}", "-".yellow(), name, label);
    }

    println!();
    if report.is_success() {
        println!("{}", "✓ すべてのイメージがビルドされました！".green().bold());
    } else {
        let failed = report.failures().count();
        let pending = report.not_completed().count();
        println!(
            "{}",
            format!(
                "✗ {} 個のイメージが失敗、{} 個が未完了です",
                failed, pending
            )
            .red()
            .bold()
        );
    }
}
