use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::controls::FilterControls;
use crate::frame::Frame;
use crate::present::Presenter;

#[derive(Clone, Copy, Debug)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    fn spinner(&self, message: String) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_draw_target(ProgressDrawTarget::stderr());
        spinner.enable_steady_tick(Duration::from_millis(120));
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message);
        spinner
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = self.spinner(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Wrap a presenter so the live frame count and filter show on the terminal.
    pub fn live<P: Presenter>(&self, inner: P, controls: Arc<FilterControls>) -> LivePresenter<P> {
        let spinner = if self.use_pretty() {
            Some(self.spinner("waiting for camera…".to_string()))
        } else {
            eprintln!("==> live capture (mode={})", controls.mode());
            None
        };
        LivePresenter {
            inner,
            controls,
            spinner,
            frames: 0,
            start: Instant::now(),
            done: false,
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

// ----------------------------------------------------------------------------
// LivePresenter: terminal status around another presenter
// ----------------------------------------------------------------------------

/// The status line is closed exactly once: by the terminal state the loop reports, or on
/// drop when the run ended without one (frame limit, dispatch error).
pub struct LivePresenter<P> {
    inner: P,
    controls: Arc<FilterControls>,
    spinner: Option<ProgressBar>,
    frames: u64,
    start: Instant,
    done: bool,
}

impl<P> LivePresenter<P> {
    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn finish(&mut self, message: String) {
        self.done = true;
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

impl<P> Drop for LivePresenter<P> {
    fn drop(&mut self) {
        if !self.done {
            let message = format!(
                "■ stopped after {} frame(s) ({})",
                self.frames,
                format_duration(self.start.elapsed())
            );
            self.finish(message);
        }
    }
}

impl<P: Presenter> Presenter for LivePresenter<P> {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        self.inner.show(frame)?;
        self.frames += 1;
        if let Some(spinner) = &self.spinner {
            let thresholds = self.controls.thresholds();
            spinner.set_message(format!(
                "live {}x{} | frames {} | mode {} | t1={} t2={}",
                frame.width(),
                frame.height(),
                self.frames,
                self.controls.mode(),
                thresholds.threshold1,
                thresholds.threshold2
            ));
        }
        Ok(())
    }

    /// The inner presenter reports the error; the status line is only cleared.
    fn error(&mut self, message: &str) {
        self.inner.error(message);
        self.done = true;
        if let Some(spinner) = &self.spinner {
            spinner.finish_and_clear();
        }
    }

    fn snapshot(&mut self, frame: &Frame) -> Result<()> {
        self.inner.snapshot(frame)?;
        self.finish(format!(
            "✔ snapshot captured after {} frame(s) ({})",
            self.frames,
            format_duration(self.start.elapsed())
        ));
        Ok(())
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::present::NullPresenter;
    use image::RgbImage;

    #[derive(Default)]
    struct ErrorLog {
        errors: Vec<String>,
    }

    impl Presenter for ErrorLog {
        fn show(&mut self, _frame: &Frame) -> Result<()> {
            Ok(())
        }

        fn error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }

        fn snapshot(&mut self, _frame: &Frame) -> Result<()> {
            Ok(())
        }
    }

    fn with_hidden_spinner<P: Presenter>(inner: P) -> (LivePresenter<P>, ProgressBar) {
        let spinner = ProgressBar::hidden();
        let live = LivePresenter {
            inner,
            controls: Arc::new(FilterControls::default()),
            spinner: Some(spinner.clone()),
            frames: 0,
            start: Instant::now(),
            done: false,
        };
        (live, spinner)
    }

    #[test]
    fn live_presenter_forwards_to_inner() -> Result<()> {
        let ui = Ui::from_args(Some("plain"), false, false);
        let controls = Arc::new(FilterControls::default());
        let mut live = ui.live(NullPresenter::new(), controls);

        let frame = Frame::from_image(RgbImage::new(2, 2));
        live.show(&frame)?;
        live.show(&frame)?;
        live.snapshot(&frame)?;
        assert_eq!(live.inner().frames_shown, 2);
        Ok(())
    }

    #[test]
    fn status_line_finishes_when_dropped_mid_run() -> Result<()> {
        let (mut live, spinner) = with_hidden_spinner(NullPresenter::new());
        live.show(&Frame::from_image(RgbImage::new(2, 2)))?;
        assert!(!spinner.is_finished());

        drop(live);
        assert!(spinner.is_finished());
        Ok(())
    }

    #[test]
    fn error_is_reported_by_the_inner_presenter_only() {
        let (mut live, spinner) = with_hidden_spinner(ErrorLog::default());
        live.error("unable to access camera: device unplugged");

        assert_eq!(
            live.inner().errors,
            vec!["unable to access camera: device unplugged".to_string()]
        );
        assert!(spinner.is_finished());
        assert!(live.done);
    }

    #[test]
    fn durations_format_by_magnitude() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
