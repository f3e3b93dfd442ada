// Progress bar management using indicatif.
// All bars hang off one MultiProgress so phases render on separate lines.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;

#[derive(Clone)]
pub struct ProgressManager {
    multi: Option<Arc<MultiProgress>>,
}

impl ProgressManager {
    // Create a new manager. If enabled=false, no bars are created; every
    // constructor below then returns None and callers fall back to logging.
    pub fn new(enabled: bool) -> Self {
        let multi = if enabled {
            Some(Arc::new(MultiProgress::new()))
        } else {
            None
        };
        Self { multi }
    }

    // Create a bar over a known item count (records, downloads, files).
    pub fn new_count_bar(&self, total: u64, label: &str) -> Option<ProgressBar> {
        let mp = self.multi.as_ref()?;
        let bar = mp.add(ProgressBar::new(total));
        bar.set_style(count_style());
        bar.set_prefix(label.to_string());
        Some(bar)
    }
}

fn count_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:20} {pos:>5}/{len:<5} [{bar:67}] {percent:>3}%",
    )
    .unwrap()
    .progress_chars("█ ")
}
