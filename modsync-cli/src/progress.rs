//! Terminal progress bars for package downloads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use modsync::download::{DownloadProgress, PackageProgressCallback};

const BYTES_TEMPLATE: &str =
    "{spinner:.green} {prefix:<24} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {prefix:<24} {bytes} {msg}";

/// One bar per package, created on its first progress update.
pub struct DownloadBars {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl DownloadBars {
    /// Bars drawn to stderr; hidden when `quiet` is set.
    pub fn new(quiet: bool) -> Arc<Self> {
        let target = if quiet {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        };
        Arc::new(Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
        })
    }

    /// Callback to hand to the installer.
    pub fn callback(self: &Arc<Self>) -> PackageProgressCallback {
        let bars = Arc::clone(self);
        Arc::new(move |name: &str, progress: &DownloadProgress| bars.update(name, progress))
    }

    fn update(&self, name: &str, progress: &DownloadProgress) {
        let mut bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        let bar = bars
            .entry(name.to_string())
            .or_insert_with(|| self.add_bar(name, progress.total_bytes));

        bar.set_position(progress.bytes_done);
        if progress.total_chunks > 0 {
            bar.set_message(format!(
                "chunks {}/{} (wave {}, {} retries)",
                progress.chunks_done, progress.total_chunks, progress.waves, progress.failures
            ));
        }
        if progress.total_bytes == Some(progress.bytes_done) {
            bar.finish();
        }
    }

    fn add_bar(&self, name: &str, total: Option<u64>) -> ProgressBar {
        let bar = match total {
            Some(len) => ProgressBar::new(len).with_style(style(BYTES_TEMPLATE)),
            None => ProgressBar::new_spinner().with_style(style(SPINNER_TEMPLATE)),
        };
        let bar = self.multi.add(bar);
        bar.set_prefix(name.to_string());
        bar
    }

    /// Stop every bar that is still running.
    pub fn finish(&self) {
        let bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        for bar in bars.values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }

    #[cfg(test)]
    fn position(&self, name: &str) -> Option<u64> {
        let bars = self.bars.lock().unwrap();
        bars.get(name).map(|bar| bar.position())
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}
