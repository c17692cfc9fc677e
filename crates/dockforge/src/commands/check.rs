use crate::GlobalArgs;
use crate::report::{EXIT_OK, EXIT_STAGING};
use colored::Colorize;
use dockforge_config::SettingsLayer;
use dockforge_core::{DOCKERFILE_NAME, ForgeError, list_images, load_partials, missing_partials};

/// 全テンプレートを検証する
///
/// 未定義のパーシャル参照と不正なプレースホルダーをイメージごとに報告する。
pub fn handle(global: &GlobalArgs) -> anyhow::Result<u8> {
    let settings = global.settings(SettingsLayer::default())?;

    println!("{}", "テンプレートを検証中...".blue());

    let partials = load_partials(&settings.partials_dir, &settings.partial_extension)?;
    let images = list_images(&settings.templates_dir)?;

    let mut invalid = 0;
    for image in &images {
        let dockerfile = settings.templates_dir.join(image).join(DOCKERFILE_NAME);
        let problem = match std::fs::read_to_string(&dockerfile) {
            Ok(template) => match missing_partials(&template, &partials) {
                Ok(missing) if missing.is_empty() => None,
                Ok(missing) => Some(format!("未定義のパーシャル: {}", missing.join(", "))),
                Err(e) => Some(e.user_message()),
            },
            Err(e) => Some(
                ForgeError::FileAccess {
                    path: dockerfile.clone(),
                    source: e,
                }
                .to_string(),
            ),
        };

        match problem {
            None => println!("  {} {}", "✓".green(), image),
            Some(message) => {
                invalid += 1;
                println!("  {} {}: {}", "✗".red().bold(), image, message);
            }
        }
    }

    println!();
    if invalid == 0 {
        println!(
            "{}",
            format!("✓ {}個のテンプレートはすべて正常です！", images.len())
                .green()
                .bold()
        );
        Ok(EXIT_OK)
    } else {
        println!(
            "{}",
            format!("✗ {}個のテンプレートに問題があります", invalid)
                .red()
                .bold()
        );
        Ok(EXIT_STAGING)
    }
}
