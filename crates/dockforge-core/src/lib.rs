//! Dockforge core
//!
//! パーシャルの読み込み、イメージの列挙、Dockerfile テンプレートの展開、
//! ビルドディレクトリへのステージングを提供します。

pub mod error;
pub mod images;
pub mod partials;
pub mod staging;
pub mod template;

pub use error::{ForgeError, Result};
pub use images::list_images;
pub use partials::{DEFAULT_PARTIAL_EXTENSION, Partials, load_partials};
pub use staging::{DOCKERFILE_NAME, StagedImage, reset_build_root, stage_image};
pub use template::{Renderer, missing_partials, placeholders, render};
