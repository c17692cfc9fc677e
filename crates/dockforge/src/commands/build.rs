use crate::driver::{Driver, RunOptions};
use crate::report::{Reporter, print_summary};
use crate::{BuildArgs, GlobalArgs};
use colored::Colorize;
use dockforge_build::{BuildEngine, ImageBuilder};
use indicatif::MultiProgress;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn handle(global: &GlobalArgs, args: &BuildArgs) -> anyhow::Result<u8> {
    let settings = global.settings(args.layer())?;

    println!("{}", "イメージをビルド中...".blue());
    println!(
        "プロジェクトルート: {}",
        settings.root.display().to_string().cyan()
    );

    let reporter = Arc::new(Reporter::new(MultiProgress::new(), global.verbose));
    let sink_reporter = reporter.clone();
    let engine: Arc<dyn BuildEngine> = Arc::new(
        ImageBuilder::new(settings.engine.clone())
            .with_global_args(settings.engine_args.clone())
            .with_build_args(settings.build_args.clone())
            .with_timeout(settings.timeout)
            .with_line_sink(Arc::new(move |image: &str, line: &str| {
                sink_reporter.engine_line(image, line)
            })),
    );

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    let signal_reporter = reporter.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_reporter.eprintln(format!(
                "{}",
                "中断しています（実行中のビルドを停止します）...".yellow()
            ));
            signal_token.cancel();
        }
    });

    let options = RunOptions {
        only: args.only.clone(),
        stage_only: args.stage_only,
    };
    let driver = Driver::new(settings, engine, reporter, options);
    let report = driver.run(cancel).await?;

    print_summary(&report);
    Ok(report.exit_code())
}
