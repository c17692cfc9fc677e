use crate::GlobalArgs;
use crate::report::{EXIT_OK, EXIT_STAGING};
use colored::Colorize;
use dockforge_config::SettingsLayer;
use dockforge_core::{DOCKERFILE_NAME, Renderer, load_partials};

/// 1イメージの Dockerfile を展開して標準出力へ（ファイルは書き込まない）
pub fn handle(global: &GlobalArgs, image: &str) -> anyhow::Result<u8> {
    let settings = global.settings(SettingsLayer::default())?;
    let partials = load_partials(&settings.partials_dir, &settings.partial_extension)?;
    let dockerfile = settings.templates_dir.join(image).join(DOCKERFILE_NAME);

    match Renderer::new(&partials).render_file(&dockerfile) {
        Ok(rendered) => {
            print!("{}", rendered);
            Ok(EXIT_OK)
        }
        Err(e) if e.is_render_error() => {
            eprintln!("{} {}: {}", "✗".red().bold(), image, e.user_message());
            Ok(EXIT_STAGING)
        }
        Err(e) => Err(e.into()),
    }
}
