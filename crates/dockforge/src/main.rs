mod commands;
mod driver;
mod report;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use dockforge_config::{ConfigError, Settings, SettingsLayer};
use dockforge_core::ForgeError;
use report::{EXIT_ERROR, EXIT_SETUP};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dockforge")]
#[command(version, about = "Dockerfile のパーシャルを展開して、イメージをまとめてビルド", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// すべてのイメージを展開・ステージング・ビルド（既定）
    Build(BuildArgs),
    /// 1つのイメージの Dockerfile を展開して標準出力へ
    Render {
        /// イメージ名（templates/ 配下のディレクトリ名）
        image: String,
    },
    /// イメージとパーシャルの一覧を表示
    List,
    /// 全テンプレートをパーシャルに対して検証（ファイルは書き込まない）
    Check,
    /// バージョン情報を表示
    Version,
}

/// すべてのサブコマンドで使えるオプション
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// プロジェクトルート
    #[arg(long, env = "DOCKFORGE_ROOT", global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// パーシャルのディレクトリ
    #[arg(long, env = "DOCKFORGE_PARTIALS", global = true, value_name = "DIR")]
    pub partials: Option<PathBuf>,

    /// イメージテンプレートのディレクトリ
    #[arg(long, env = "DOCKFORGE_TEMPLATES", global = true, value_name = "DIR")]
    pub templates: Option<PathBuf>,

    /// ビルドディレクトリ（実行のたびに作り直される）
    #[arg(long, env = "DOCKFORGE_BUILD_DIR", global = true, value_name = "DIR")]
    pub build_dir: Option<PathBuf>,

    /// パーシャルファイルの拡張子
    #[arg(long = "partial-ext", env = "DOCKFORGE_PARTIAL_EXT", global = true, value_name = "EXT")]
    pub partial_extension: Option<String>,

    /// イメージタグの名前空間
    #[arg(long, env = "DOCKFORGE_NAMESPACE", global = true)]
    pub namespace: Option<String>,

    /// ビルドエンジン（docker, podman など）
    #[arg(long, env = "DOCKFORGE_ENGINE", global = true, value_name = "PROGRAM")]
    pub engine: Option<String>,

    /// エンジンの build サブコマンドより前に渡す引数（複数指定可）
    #[arg(long = "engine-arg", global = true, allow_hyphen_values = true, value_name = "ARG")]
    pub engine_args: Vec<String>,

    /// 設定ファイル
    #[arg(long, env = "DOCKFORGE_CONFIG", global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// 詳細なログとエンジン出力を表示
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    fn layer(&self) -> SettingsLayer {
        SettingsLayer {
            partials: self.partials.clone(),
            templates: self.templates.clone(),
            build_dir: self.build_dir.clone(),
            partial_extension: self.partial_extension.clone(),
            namespace: self.namespace.clone(),
            engine: self.engine.clone(),
            engine_args: (!self.engine_args.is_empty()).then(|| self.engine_args.clone()),
            ..Default::default()
        }
    }

    /// 絶対パスのプロジェクトルート
    pub fn project_root(&self) -> anyhow::Result<PathBuf> {
        let cwd = std::env::current_dir()?;
        Ok(match &self.root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => cwd.join(root),
            None => cwd,
        })
    }

    /// CLI/環境変数 > 設定ファイル > 既定値 の順で設定を解決
    ///
    /// `command_layer` はサブコマンド固有のオプション。
    pub fn settings(&self, command_layer: SettingsLayer) -> anyhow::Result<Settings> {
        let root = self.project_root()?;
        let (file_layer, settings_file) = dockforge_config::discover(&root, self.config.as_deref())?;
        if let Some(path) = &settings_file {
            tracing::info!(settings_file = %path.display(), "Using settings file");
        }

        let layer = command_layer.over(self.layer()).over(file_layer);
        Ok(Settings::resolve(&root, layer)?)
    }
}

/// `build` のオプション
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// 最初の失敗で残りのイメージを中止
    #[arg(long, conflicts_with = "keep_going")]
    pub fail_fast: bool,

    /// 失敗しても残りのイメージを続行（既定）
    #[arg(long)]
    pub keep_going: bool,

    /// 同時にビルドするイメージ数
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// 1回のビルドのタイムアウト（秒）
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// ビルドキャッシュを使う（既定は --no-cache）
    #[arg(long)]
    pub use_cache: bool,

    /// 展開とステージングのみ行い、ビルドしない
    #[arg(long)]
    pub stage_only: bool,

    /// 指定したイメージのみ処理（複数指定可）
    #[arg(long, value_name = "IMAGE")]
    pub only: Vec<String>,

    /// エンジンの build に追加で渡す引数（複数指定可）
    #[arg(long = "build-arg", allow_hyphen_values = true, value_name = "ARG")]
    pub build_args: Vec<String>,
}

impl BuildArgs {
    fn layer(&self) -> SettingsLayer {
        let fail_fast = if self.fail_fast {
            Some(true)
        } else if self.keep_going {
            Some(false)
        } else {
            None
        };

        SettingsLayer {
            jobs: self.jobs,
            timeout_secs: self.timeout,
            fail_fast,
            no_cache: self.use_cache.then_some(false),
            build_args: (!self.build_args.is_empty()).then(|| self.build_args.clone()),
            ..Default::default()
        }
    }
}

fn init_tracing(verbose: bool) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if verbose {
        for target in [
            "dockforge",
            "dockforge_core",
            "dockforge_build",
            "dockforge_config",
        ] {
            if let Ok(directive) = format!("{}=debug", target).parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let result = match cli.command.unwrap_or(Commands::Build(BuildArgs::default())) {
        Commands::Build(args) => commands::build::handle(&cli.global, &args).await,
        Commands::Render { image } => commands::render::handle(&cli.global, &image),
        Commands::List => commands::list::handle(&cli.global),
        Commands::Check => commands::check::handle(&cli.global),
        Commands::Version => {
            println!("dockforge {}", env!("CARGO_PKG_VERSION"));
            Ok(report::EXIT_OK)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let (message, code) = classify_fatal(&e);
            eprintln!();
            eprintln!("{}", "✗ エラー".red().bold());
            eprintln!("{}", message);
            ExitCode::from(code)
        }
    }
}

/// 致命的エラーの表示内容と終了コード
fn classify_fatal(error: &anyhow::Error) -> (String, u8) {
    if let Some(e) = error.downcast_ref::<ForgeError>() {
        return (e.user_message(), EXIT_SETUP);
    }
    if let Some(e) = error.downcast_ref::<ConfigError>() {
        return (e.to_string(), EXIT_SETUP);
    }
    (format!("{:#}", error), EXIT_ERROR)
}
