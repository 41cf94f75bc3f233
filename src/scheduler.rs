/// Single-flight action scheduler.
///
/// Triggers and the protection poller enqueue `Action`s; one drain worker
/// (an OS thread, since every action body blocks on input and precise
/// sleeps) pops them in FIFO order and runs each under the action lock.
/// Errors and panics from an action are logged at the boundary and never
/// take the worker down.
use crate::{items::ProtectionKind, stop::StopSignal, tables::Hotkey};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Action {
    /// A hotkey sequence; cancellable through `stop`.
    Hotkey { hotkey: Hotkey, stop: StopSignal },
    /// A standalone protection switch from the poller.
    Protection { kind: ProtectionKind },
}

impl Action {
    pub fn label(&self) -> String {
        match self {
            Self::Hotkey { hotkey, .. } => format!("hotkey {}", hotkey),
            Self::Protection { kind } => format!("protection {}", kind),
        }
    }

    pub fn stop_signal(&self) -> Option<&StopSignal> {
        match self {
            Self::Hotkey { stop, .. } => Some(stop),
            Self::Protection { .. } => None,
        }
    }

    pub fn hotkey(&self) -> Option<Hotkey> {
        match self {
            Self::Hotkey { hotkey, .. } => Some(*hotkey),
            Self::Protection { .. } => None,
        }
    }
}

/// Executes action bodies on the drain worker.
pub trait ActionRunner: Send {
    fn run(&mut self, action: &Action) -> anyhow::Result<()>;
}

/// What the worker is executing right now.
#[derive(Debug, Clone)]
pub struct Running {
    pub label:   String,
    pub hotkey:  Option<Hotkey>,
    pub started: Instant,
}

impl Running {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

// ---------------------------------------------------------------------------
// ActionQueue
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ActionQueue {
    queue:       Mutex<VecDeque<Action>>,
    ready:       Condvar,
    shutdown:    AtomicBool,
    in_progress: AtomicBool,
    /// Queued plus executing.
    outstanding: AtomicUsize,
    running:     Mutex<Option<Running>>,
    action_lock: Mutex<()>,
}

fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, action: Action) {
        tracing::debug!("Queued {}", action.label());
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        relock(&self.queue).push_back(action);
        self.ready.notify_one();
    }

    pub fn is_action_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Nothing queued and nothing executing.
    pub fn is_idle(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) == 0
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        relock(&self.queue).len()
    }

    pub fn running(&self) -> Option<Running> {
        relock(&self.running).clone()
    }

    /// Let workers exit once the queue is empty.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.ready.notify_all();
    }

    pub fn spawn_worker(
        self: &Arc<Self>,
        mut runner: impl ActionRunner + 'static,
    ) -> std::io::Result<JoinHandle<()>> {
        let queue = Arc::clone(self);
        std::thread::Builder::new()
            .name("action-drain".into())
            .spawn(move || queue.drain(&mut runner))
    }

    fn next(&self) -> Option<Action> {
        let mut q = relock(&self.queue);
        loop {
            if let Some(action) = q.pop_front() {
                return Some(action);
            }
            if self.shutdown.load(Ordering::SeqCst) {
                return None;
            }
            q = self.ready.wait(q).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn drain(&self, runner: &mut dyn ActionRunner) {
        tracing::info!("Action drain worker started");
        while let Some(action) = self.next() {
            self.execute(runner, action);
        }
        tracing::info!("Action drain worker stopped");
    }

    fn execute(&self, runner: &mut dyn ActionRunner, action: Action) {
        let _held = relock(&self.action_lock);
        let label = action.label();
        let started = Instant::now();
        self.in_progress.store(true, Ordering::SeqCst);
        *relock(&self.running) = Some(Running {
            label:   label.clone(),
            hotkey:  action.hotkey(),
            started,
        });

        match catch_unwind(AssertUnwindSafe(|| runner.run(&action))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Action {} failed: {:#}", label, e),
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_owned());
                tracing::error!("Action {} panicked: {}", label, msg);
            }
        }

        if let Some(stop) = action.stop_signal() {
            stop.mark_finished();
        }
        *relock(&self.running) = None;
        self.in_progress.store(false, Ordering::SeqCst);
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!("Action {} took {:?}", label, started.elapsed());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Recorder {
        log:     Arc<Mutex<Vec<String>>>,
        active:  Arc<AtomicUsize>,
        peak:    Arc<AtomicUsize>,
        hold:    Duration,
    }

    impl ActionRunner for Recorder {
        fn run(&mut self, action: &Action) -> anyhow::Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.hold);
            self.active.fetch_sub(1, Ordering::SeqCst);

            let label = action.label();
            self.log.lock().unwrap().push(label.clone());
            if label.contains("F12") {
                panic!("runner blew up");
            }
            if label.contains("F7") {
                anyhow::bail!("device unplugged");
            }
            Ok(())
        }
    }

    fn hotkey(key: Hotkey) -> Action {
        Action::Hotkey { hotkey: key, stop: StopSignal::new() }
    }

    #[test]
    fn runs_actions_in_fifo_order() {
        let queue = Arc::new(ActionQueue::new());
        let recorder = Recorder::default();
        assert!(queue.is_idle());
        queue.enqueue(hotkey(Hotkey::F8));
        queue.enqueue(Action::Protection { kind: ProtectionKind::Magic });
        queue.enqueue(hotkey(Hotkey::F6));
        queue.shutdown();
        queue.spawn_worker(recorder.clone()).unwrap().join().unwrap();

        assert_eq!(
            *recorder.log.lock().unwrap(),
            vec!["hotkey F8", "protection protect_from_magic", "hotkey F6"]
        );
        assert_eq!(queue.pending(), 0);
        assert!(queue.is_idle());
    }

    #[test]
    fn at_most_one_action_in_flight_even_with_two_workers() {
        let queue = Arc::new(ActionQueue::new());
        let recorder = Recorder { hold: Duration::from_millis(5), ..Recorder::default() };
        let a = queue.spawn_worker(recorder.clone()).unwrap();
        let b = queue.spawn_worker(recorder.clone()).unwrap();
        for _ in 0..6 {
            queue.enqueue(Action::Protection { kind: ProtectionKind::Melee });
        }
        queue.shutdown();
        a.join().unwrap();
        b.join().unwrap();

        assert_eq!(recorder.log.lock().unwrap().len(), 6);
        assert_eq!(recorder.peak.load(Ordering::SeqCst), 1);
        assert!(!queue.is_action_in_progress());
    }

    #[test]
    fn worker_survives_errors_and_panics() {
        let queue = Arc::new(ActionQueue::new());
        let recorder = Recorder::default();
        let panicking = hotkey(Hotkey::F12);
        let stop = panicking.stop_signal().cloned().unwrap();

        queue.enqueue(panicking);
        queue.enqueue(hotkey(Hotkey::F7));
        queue.enqueue(hotkey(Hotkey::F9));
        queue.shutdown();
        queue.spawn_worker(recorder.clone()).unwrap().join().unwrap();

        assert_eq!(recorder.log.lock().unwrap().len(), 3);
        assert!(stop.is_finished(), "a panicking action still marks its signal finished");
        assert!(queue.running().is_none());
        assert!(!queue.is_action_in_progress());
    }

    #[test]
    fn reports_the_running_action() {
        let queue = Arc::new(ActionQueue::new());
        let recorder = Recorder { hold: Duration::from_millis(80), ..Recorder::default() };
        let worker = queue.spawn_worker(recorder).unwrap();
        let action = hotkey(Hotkey::F10);
        let stop = action.stop_signal().cloned().unwrap();
        queue.enqueue(action);

        std::thread::sleep(Duration::from_millis(30));
        let running = queue.running().expect("F10 should be running");
        assert_eq!(running.hotkey, Some(Hotkey::F10));
        assert!(queue.is_action_in_progress());

        assert!(stop.wait_finished(Duration::from_secs(2)));
        queue.shutdown();
        worker.join().unwrap();
    }
}
