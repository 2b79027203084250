//! Progress renderers for the task tree.
//!
//! The plain renderer emits one log line per state change and is used for
//! non-interactive output (CI logs, `basic` and `json` log types). The fancy
//! renderer draws one spinner per task with `indicatif`; its redraw ticker
//! runs on a background thread and only ever reads task labels.

use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info};

use crate::config::LogType;
use crate::error::{Error, Phase, Result};

/// Display information about one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub name: String,
    pub label: String,
}

/// Receives task lifecycle events from the runner.
pub trait Render: Send + Sync {
    fn begin(&self, _tasks: &[TaskInfo]) {}
    fn started(&self, index: usize, task: &TaskInfo);
    fn finished(&self, index: usize, task: &TaskInfo, elapsed: Duration);
    fn failed(&self, index: usize, task: &TaskInfo, error: &Error);
    fn end(&self, _success: bool) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    Plain,
    Fancy,
}

impl RendererKind {
    /// Only the `fancy` log type gets the interactive view.
    pub fn from_log_type(log_type: LogType) -> Self {
        match log_type {
            LogType::Fancy => RendererKind::Fancy,
            LogType::Basic | LogType::Json => RendererKind::Plain,
        }
    }

    pub fn build(self) -> Result<Box<dyn Render>> {
        match self {
            RendererKind::Plain => Ok(Box::new(PlainRenderer)),
            RendererKind::Fancy => Ok(Box::new(FancyRenderer::new()?)),
        }
    }
}

/// Line-oriented renderer writing through the `log` facade.
#[derive(Debug, Default)]
pub struct PlainRenderer;

impl Render for PlainRenderer {
    fn started(&self, _index: usize, task: &TaskInfo) {
        info!("{} [{}]", task.name, task.label);
    }

    fn finished(&self, _index: usize, task: &TaskInfo, elapsed: Duration) {
        info!(
            "{} [{}] done in {:.2}s",
            task.name,
            task.label,
            elapsed.as_secs_f64()
        );
    }

    fn failed(&self, _index: usize, task: &TaskInfo, error: &Error) {
        error!("{} [{}] failed: {}", task.name, task.label, error);
    }
}

/// The terminal area every spinner draws into. Log records are printed
/// through it as well.
pub fn progress() -> &'static MultiProgress {
    static PROGRESS: OnceLock<MultiProgress> = OnceLock::new();
    PROGRESS.get_or_init(MultiProgress::new)
}

/// Interactive spinner renderer.
pub struct FancyRenderer {
    multi: MultiProgress,
    bars: Mutex<Vec<ProgressBar>>,
    pending: ProgressStyle,
    running: ProgressStyle,
    done: ProgressStyle,
}

impl FancyRenderer {
    pub fn new() -> Result<Self> {
        let style = |template: &str| {
            ProgressStyle::with_template(template).map_err(|e| Error::Orchestration {
                phase: Phase::Construct,
                message: format!("invalid progress template: {}", e),
            })
        };

        Ok(Self {
            multi: progress().clone(),
            bars: Mutex::new(Vec::new()),
            pending: style("  {prefix:.dim} {msg:.dim}")?,
            running: style("{spinner:.cyan} {prefix:.bold} {msg} {elapsed:.dim}")?
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
            done: style("{prefix:.bold} {msg}")?,
        })
    }

    fn bar(&self, index: usize) -> Option<ProgressBar> {
        self.bars.lock().ok()?.get(index).cloned()
    }
}

impl Render for FancyRenderer {
    fn begin(&self, tasks: &[TaskInfo]) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        for task in tasks {
            let bar = self.multi.add(ProgressBar::new_spinner());
            bar.set_style(self.pending.clone());
            bar.set_prefix(format!("[{}]", task.label));
            bar.set_message(task.name.clone());
            bars.push(bar);
        }
    }

    fn started(&self, index: usize, _task: &TaskInfo) {
        if let Some(bar) = self.bar(index) {
            bar.set_style(self.running.clone());
            bar.enable_steady_tick(Duration::from_millis(100));
        }
    }

    fn finished(&self, index: usize, task: &TaskInfo, elapsed: Duration) {
        if let Some(bar) = self.bar(index) {
            bar.set_style(self.done.clone());
            bar.finish_with_message(format!(
                "✓ {} ({:.2}s)",
                task.name,
                elapsed.as_secs_f64()
            ));
        }
    }

    fn failed(&self, index: usize, task: &TaskInfo, error: &Error) {
        if let Some(bar) = self.bar(index) {
            bar.set_style(self.done.clone());
            bar.abandon_with_message(format!("✗ {}: {}", task.name, error));
        }
    }

    fn end(&self, _success: bool) {
        // Tasks that never ran are dropped from the display.
        if let Ok(bars) = self.bars.lock() {
            for bar in bars.iter().filter(|bar| !bar.is_finished()) {
                bar.finish_and_clear();
            }
        }
    }
}
