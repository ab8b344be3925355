use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use ureq::{Agent, AgentBuilder};

pub fn agent(timeout: Duration) -> Agent {
    AgentBuilder::new()
        .user_agent("rates-map (+https://github.com/portsmouth-data/rates-map)")
        .timeout(timeout)
        .build()
}

pub fn progress_bar(len: u64) -> ProgressBar {
    ProgressBar::new(len).with_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {human_pos}/{human_len} ({per_sec})")
            .expect("hardcoded"),
    )
}

/// Coordinates are kept to six decimal places, the resolution the lookup
/// service answers with and the jitter operates at.
pub fn round6(x: f64) -> f64 {
    (x * 1_000_000.0).round() / 1_000_000.0
}
