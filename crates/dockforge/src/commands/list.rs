use crate::GlobalArgs;
use crate::report::EXIT_OK;
use colored::Colorize;
use dockforge_build::image_tag;
use dockforge_config::SettingsLayer;
use dockforge_core::{list_images, load_partials};

pub fn handle(global: &GlobalArgs) -> anyhow::Result<u8> {
    let settings = global.settings(SettingsLayer::default())?;
    let partials = load_partials(&settings.partials_dir, &settings.partial_extension)?;
    let images = list_images(&settings.templates_dir)?;

    println!("イメージ: {}個", images.len());
    for image in &images {
        println!(
            "  - {} ({})",
            image.cyan(),
            image_tag(&settings.namespace, image).dimmed()
        );
    }

    println!("パーシャル: {}個", partials.len());
    for name in partials.names() {
        println!("  - {}", name.cyan());
    }

    Ok(EXIT_OK)
}
