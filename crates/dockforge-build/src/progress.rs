use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// イメージ1つ分のビルド進捗スピナー
pub struct BuildProgress {
    progress_bar: ProgressBar,
}

impl BuildProgress {
    pub fn new(multi: &MultiProgress, image: &str) -> Self {
        let pb = multi.add(ProgressBar::new_spinner());
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(format!("Building {}...", image));
        pb.enable_steady_tick(Duration::from_millis(120));

        Self { progress_bar: pb }
    }

    pub fn set_message(&self, msg: &str) {
        self.progress_bar.set_message(msg.to_string());
    }

    /// スピナーを消去（結果は別途表示する場合）
    pub fn clear(&self) {
        self.progress_bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::ProgressDrawTarget;

    #[test]
    fn test_progress_lifecycle_hidden() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let progress = BuildProgress::new(&multi, "php");
        progress.set_message("docker build -t maxbucknell/php...");
        progress.clear();
        assert!(progress.progress_bar.is_finished());
    }
}
