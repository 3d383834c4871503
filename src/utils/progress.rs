//! Spinner for long index service calls (`rescan`, `bookmark add`).
//! Every method is a no-op when the `progress` feature is disabled.

use std::borrow::Cow;

pub struct Spinner {
    #[cfg(feature = "progress")]
    bar: indicatif::ProgressBar,
}

impl Spinner {
    #[cfg(feature = "progress")]
    pub fn start(message: impl Into<Cow<'static, str>>) -> Self {
        use indicatif::{ProgressBar, ProgressStyle};

        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg} ({elapsed})") {
            bar.set_style(style);
        }
        bar.set_message(message);
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        Self { bar }
    }

    #[cfg(not(feature = "progress"))]
    pub fn start(_message: impl Into<Cow<'static, str>>) -> Self {
        Self {}
    }

    /// Show the spinner while `f` runs
    pub fn run<T>(message: impl Into<Cow<'static, str>>, f: impl FnOnce() -> T) -> T {
        let spinner = Self::start(message);
        let out = f();
        spinner.finish();
        out
    }

    pub fn finish(self) {
        #[cfg(feature = "progress")]
        self.bar.finish_and_clear();
    }
}
