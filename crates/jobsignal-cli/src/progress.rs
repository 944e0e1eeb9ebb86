//! Terminal spinners for the slow parts of a run (model download,
//! embedding). Nothing is drawn under `--quiet` or when output is JSON.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const FRAMES: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// A spinner on stderr, or nothing when progress is suppressed.
pub struct Spinner(Option<ProgressBar>);

/// How a spinner ends.
#[derive(Clone, Copy)]
enum Outcome {
    Done,
    Warn,
    Fail,
}

impl Outcome {
    fn mark(self) -> &'static str {
        match self {
            Outcome::Done => "✓",
            Outcome::Warn => "!",
            Outcome::Fail => "✗",
        }
    }

    fn template(self) -> &'static str {
        match self {
            Outcome::Done => "{prefix:.green} {msg}",
            Outcome::Warn => "{prefix:.yellow} {msg}",
            Outcome::Fail => "{prefix:.red} {msg}",
        }
    }
}

impl Spinner {
    pub fn start(message: impl Into<String>, quiet: bool) -> Self {
        if quiet {
            return Self::hidden();
        }

        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars(FRAMES)
            .template("{spinner:.cyan} {msg}")
        {
            bar.set_style(style);
        }
        bar.set_message(message.into());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self(Some(bar))
    }

    pub fn hidden() -> Self {
        Self(None)
    }

    pub fn done(self, message: impl Into<String>) {
        self.finish(Outcome::Done, message.into());
    }

    pub fn warn(self, message: impl Into<String>) {
        self.finish(Outcome::Warn, message.into());
    }

    pub fn fail(self, message: impl Into<String>) {
        self.finish(Outcome::Fail, message.into());
    }

    fn finish(self, outcome: Outcome, message: String) {
        let Some(bar) = self.0 else { return };
        if let Ok(style) = ProgressStyle::default_spinner().template(outcome.template()) {
            bar.set_style(style);
        }
        bar.set_prefix(outcome.mark());
        bar.finish_with_message(message);
    }
}
