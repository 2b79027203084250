//! # Task Tree Runner
//!
//! A small task executor paired with a progress renderer. Each item has a
//! display name, a label (the architecture, for rootfs builds) and a unit of
//! work. [`TaskTree::start`] runs the items and returns their outputs in
//! list order, or the first error.
//!
//! ## Lifecycle
//!
//! `Idle → Running → {Completed | Failed}`. The first failing item moves the
//! tree to `Failed` and no further item is started. Cancellation is checked
//! before each item starts and is otherwise left to the work itself.
//!
//! ## Parallelism
//!
//! Items run one at a time unless [`TaskTreeOptions::parallel`] is set, in
//! which case they are spread over the rayon pool. Output order is list
//! order either way.

pub mod render;

pub use render::{FancyRenderer, PlainRenderer, Render, RendererKind, TaskInfo};

use std::time::Instant;

use log::debug;
use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::error::{Error, Phase, Result};

type Work<T> = Box<dyn FnOnce(&CancelToken) -> Result<T> + Send>;

/// One named unit of work.
pub struct TaskItem<T> {
    info: TaskInfo,
    work: Work<T>,
}

impl<T> TaskItem<T> {
    pub fn new<F>(name: impl Into<String>, label: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(&CancelToken) -> Result<T> + Send + 'static,
    {
        Self {
            info: TaskInfo {
                name: name.into(),
                label: label.into(),
            },
            work: Box::new(work),
        }
    }

    pub fn info(&self) -> &TaskInfo {
        &self.info
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeState {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskTreeOptions {
    pub parallel: bool,
    pub renderer: RendererKind,
}

impl Default for TaskTreeOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            renderer: RendererKind::Plain,
        }
    }
}

pub struct TaskTree<T> {
    options: TaskTreeOptions,
    renderer: Box<dyn Render>,
    items: Vec<TaskItem<T>>,
    state: TreeState,
}

impl<T: Send> TaskTree<T> {
    /// Build a tree with the renderer selected in `options`.
    pub fn new(options: TaskTreeOptions, items: Vec<TaskItem<T>>) -> Result<Self> {
        let renderer = options.renderer.build()?;
        Self::with_renderer(options, renderer, items)
    }

    /// Build a tree with a caller-provided renderer.
    pub fn with_renderer(
        options: TaskTreeOptions,
        renderer: Box<dyn Render>,
        items: Vec<TaskItem<T>>,
    ) -> Result<Self> {
        if items.is_empty() {
            return Err(Error::Orchestration {
                phase: Phase::Construct,
                message: "no tasks to run".to_string(),
            });
        }

        Ok(Self {
            options,
            renderer,
            items,
            state: TreeState::Idle,
        })
    }

    pub fn state(&self) -> TreeState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Run every item and return their outputs in list order.
    pub fn start(&mut self, cancel: &CancelToken) -> Result<Vec<T>> {
        if self.state != TreeState::Idle {
            return Err(Error::Orchestration {
                phase: Phase::Execute,
                message: "task tree has already been started".to_string(),
            });
        }

        let items = std::mem::take(&mut self.items);
        let infos: Vec<TaskInfo> = items.iter().map(|item| item.info.clone()).collect();
        debug!(
            "Starting {} task(s), parallel: {}",
            items.len(),
            self.options.parallel
        );

        self.state = TreeState::Running;
        self.renderer.begin(&infos);

        let renderer = self.renderer.as_ref();
        let result = if self.options.parallel {
            items
                .into_par_iter()
                .enumerate()
                .map(|(index, item)| run_item(renderer, index, item, cancel))
                .collect::<Result<Vec<T>>>()
        } else {
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| run_item(renderer, index, item, cancel))
                .collect::<Result<Vec<T>>>()
        };

        self.state = if result.is_ok() {
            TreeState::Completed
        } else {
            TreeState::Failed
        };
        self.renderer.end(result.is_ok());

        result
    }
}

fn run_item<T>(
    renderer: &dyn Render,
    index: usize,
    item: TaskItem<T>,
    cancel: &CancelToken,
) -> Result<T> {
    let TaskItem { info, work } = item;

    if let Err(e) = cancel.check(&info.label) {
        renderer.failed(index, &info, &e);
        return Err(e);
    }

    renderer.started(index, &info);
    let started = Instant::now();

    match work(cancel) {
        Ok(output) => {
            renderer.finished(index, &info, started.elapsed());
            Ok(output)
        }
        Err(e) => {
            renderer.failed(index, &info, &e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    // ========================================================================
    // Recording renderer for assertions on lifecycle events
    // ========================================================================

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Render for Recorder {
        fn begin(&self, tasks: &[TaskInfo]) {
            self.push(format!("begin:{}", tasks.len()));
        }
        fn started(&self, _index: usize, task: &TaskInfo) {
            self.push(format!("start:{}", task.label));
        }
        fn finished(&self, _index: usize, task: &TaskInfo, _elapsed: Duration) {
            self.push(format!("done:{}", task.label));
        }
        fn failed(&self, _index: usize, task: &TaskInfo, _error: &Error) {
            self.push(format!("fail:{}", task.label));
        }
        fn end(&self, success: bool) {
            self.push(format!("end:{}", success));
        }
    }

    fn tree<T: Send>(recorder: &Recorder, items: Vec<TaskItem<T>>) -> TaskTree<T> {
        TaskTree::with_renderer(
            TaskTreeOptions::default(),
            Box::new(recorder.clone()),
            items,
        )
        .unwrap()
    }

    #[test]
    fn test_runs_sequentially_in_order() {
        let recorder = Recorder::default();
        let items = ["x86_64", "arm64", "arm"]
            .iter()
            .map(|arch| {
                let arch = arch.to_string();
                TaskItem::new("building rootfs", arch.clone(), move |_| Ok(arch))
            })
            .collect();

        let mut tree = tree(&recorder, items);
        assert_eq!(tree.state(), TreeState::Idle);

        let outputs = tree.start(&CancelToken::new()).unwrap();
        assert_eq!(outputs, vec!["x86_64", "arm64", "arm"]);
        assert_eq!(tree.state(), TreeState::Completed);
        assert_eq!(
            recorder.events(),
            vec![
                "begin:3",
                "start:x86_64",
                "done:x86_64",
                "start:arm64",
                "done:arm64",
                "start:arm",
                "done:arm",
                "end:true"
            ]
        );
    }

    #[test]
    fn test_first_failure_stops_remaining_tasks() {
        let recorder = Recorder::default();
        let ran = Arc::new(AtomicUsize::new(0));

        let mut items = Vec::new();
        for (arch, fail) in [("x86_64", false), ("arm64", true), ("arm", false)] {
            let ran = ran.clone();
            items.push(TaskItem::new("building rootfs", arch, move |_| {
                ran.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err(Error::config("broken"))
                } else {
                    Ok(())
                }
            }));
        }

        let mut tree = tree(&recorder, items);
        let err = tree.start(&CancelToken::new()).unwrap_err();

        assert!(err.to_string().contains("broken"));
        assert_eq!(ran.load(Ordering::SeqCst), 2);
        assert_eq!(tree.state(), TreeState::Failed);
        assert!(!recorder.events().contains(&"start:arm".to_string()));
        assert_eq!(recorder.events().last().unwrap(), "end:false");
    }

    #[test]
    fn test_cancellation_stops_before_next_task() {
        let recorder = Recorder::default();
        let cancel = CancelToken::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let first_ran = ran.clone();
        let second_ran = ran.clone();
        let items = vec![
            TaskItem::new("building rootfs", "x86_64", move |cancel: &CancelToken| {
                first_ran.fetch_add(1, Ordering::SeqCst);
                // Simulates an interrupt arriving mid-build.
                cancel.cancel();
                Ok(())
            }),
            TaskItem::new("building rootfs", "arm64", move |_: &CancelToken| {
                second_ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ];

        let mut tree = tree(&recorder, items);
        let err = tree.start(&cancel).unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(tree.state(), TreeState::Failed);
    }

    #[test]
    fn test_start_twice_is_an_orchestration_error() {
        let recorder = Recorder::default();
        let mut tree = tree(&recorder, vec![TaskItem::new("t", "x86_64", |_| Ok(1))]);
        tree.start(&CancelToken::new()).unwrap();

        let err = tree.start(&CancelToken::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Orchestration {
                phase: Phase::Execute,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_tree_is_rejected() {
        let result = TaskTree::<()>::new(TaskTreeOptions::default(), Vec::new());
        assert!(matches!(
            result,
            Err(Error::Orchestration {
                phase: Phase::Construct,
                ..
            })
        ));
    }

    #[test]
    fn test_parallel_keeps_list_order() {
        let recorder = Recorder::default();
        let items = (0..16)
            .map(|i| TaskItem::new("square", i.to_string(), move |_| Ok(i * i)))
            .collect();

        let mut tree = TaskTree::with_renderer(
            TaskTreeOptions {
                parallel: true,
                renderer: RendererKind::Plain,
            },
            Box::new(recorder),
            items,
        )
        .unwrap();

        let outputs = tree.start(&CancelToken::new()).unwrap();
        assert_eq!(outputs, (0..16).map(|i| i * i).collect::<Vec<_>>());
    }
}
