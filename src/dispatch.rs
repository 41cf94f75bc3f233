/// Trigger dispatch, the protection poller and the hang monitor.
///
/// Hotkeys preempt each other: a new hotkey raises the running hotkey
/// action's stop signal and waits (bounded) for it to unwind before its own
/// action is queued. Protection switches from the poller are a different
/// class and are never cancelled by a hotkey.
use crate::{
    engine::ProtectionEngine,
    items::ProtectionKind,
    scheduler::{Action, ActionQueue},
    state::GameState,
    stop::StopSignal,
    suppression::InputGuard,
    tables::{Hotkey, HotkeyTable},
};
use std::io::BufRead;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Hotkey(Hotkey),
    ToggleAutoProtect,
    /// Forget the locked bracket after a gear change between fights.
    ResetBracket,
    Quit,
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("x") {
            return Ok(Self::ToggleAutoProtect);
        }
        if s.eq_ignore_ascii_case("b") {
            return Ok(Self::ResetBracket);
        }
        if s.eq_ignore_ascii_case("esc") || s.eq_ignore_ascii_case("escape") {
            return Ok(Self::Quit);
        }
        s.parse::<Hotkey>().map(Self::Hotkey)
    }
}

/// What `Dispatcher::handle` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Queued(Hotkey),
    /// Not bound in the hotkey table.
    Unbound(Hotkey),
    AutoProtect(bool),
    BracketReset,
    Quit,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    queue:        Arc<ActionQueue>,
    engine:       Arc<ProtectionEngine>,
    hotkeys:      HotkeyTable,
    preempt_wait: Duration,
    current:      Mutex<Option<StopSignal>>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<ActionQueue>,
        engine: Arc<ProtectionEngine>,
        hotkeys: HotkeyTable,
        preempt_wait: Duration,
    ) -> Self {
        Self { queue, engine, hotkeys, preempt_wait, current: Mutex::new(None) }
    }

    pub fn handle(&self, trigger: Trigger) -> Dispatch {
        match trigger {
            Trigger::Hotkey(hotkey) if !self.hotkeys.contains(hotkey) => {
                tracing::debug!("{} is not bound", hotkey);
                Dispatch::Unbound(hotkey)
            }
            Trigger::Hotkey(hotkey) => {
                self.preempt_and_queue(hotkey);
                Dispatch::Queued(hotkey)
            }
            Trigger::ToggleAutoProtect => Dispatch::AutoProtect(self.engine.toggle_enabled()),
            Trigger::ResetBracket => {
                self.engine.store().reset_bracket();
                Dispatch::BracketReset
            }
            Trigger::Quit => {
                tracing::info!("Quit requested");
                Dispatch::Quit
            }
        }
    }

    fn preempt_and_queue(&self, hotkey: Hotkey) {
        // Held across the wait so two hotkeys cannot interleave their preemption.
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = current.take() {
            if !prev.is_finished() {
                prev.raise();
                if !prev.wait_finished(self.preempt_wait) {
                    tracing::warn!(
                        "Previous hotkey action did not unwind within {:?}; queuing {} anyway",
                        self.preempt_wait,
                        hotkey
                    );
                }
            }
        }
        let stop = StopSignal::new();
        *current = Some(stop.clone());
        self.queue.enqueue(Action::Hotkey { hotkey, stop });
    }
}

// ---------------------------------------------------------------------------
// Protection poller
// ---------------------------------------------------------------------------

pub struct ProtectionPoller {
    engine:      Arc<ProtectionEngine>,
    guard:       Arc<InputGuard>,
    queue:       Arc<ActionQueue>,
    last_tick:   Option<u64>,
    last_queued: Option<ProtectionKind>,
}

impl ProtectionPoller {
    pub fn new(engine: Arc<ProtectionEngine>, guard: Arc<InputGuard>, queue: Arc<ActionQueue>) -> Self {
        Self { engine, guard, queue, last_tick: None, last_queued: None }
    }

    /// One poll. Returns the kind queued, if any.
    pub fn poll_once(&mut self) -> Option<ProtectionKind> {
        if self.guard.is_sequence_active() {
            return None;
        }
        let recommended = self.engine.recommend_protection();
        let state = self.engine.store().read();
        self.forget_settled(&state);
        let kind = recommended?;
        if state.current_protection() == Some(kind) || self.last_queued == Some(kind) {
            return None;
        }
        if self.last_tick == Some(state.tick) {
            return None;
        }
        self.last_tick = Some(state.tick);
        if !self.engine.may_switch(kind) {
            return None;
        }
        tracing::info!("Queuing protection {:?} → {} at tick {}", state.current_protection(), kind, state.tick);
        self.queue.enqueue(Action::Protection { kind });
        self.last_queued = Some(kind);
        Some(kind)
    }

    /// The repeat guard holds only while its switch can still land. It is
    /// dropped when the fight ends, or when the queue has drained and the
    /// kind is not live (failed verification, prayer drained or toggled off).
    fn forget_settled(&mut self, state: &GameState) {
        let Some(queued) = self.last_queued else {
            return;
        };
        if state.opponent.is_none() {
            tracing::debug!("Opponent gone; forgetting queued {}", queued);
            self.last_queued = None;
        } else if self.queue.is_idle() && state.current_protection() != Some(queued) {
            tracing::debug!("{} not live after the queue drained; may queue it again", queued);
            self.last_queued = None;
        }
    }

    pub async fn run(mut self, interval: Duration) {
        tracing::info!("Protection poller started ({:?} interval)", interval);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.poll_once();
        }
    }
}

// ---------------------------------------------------------------------------
// Hang monitor
// ---------------------------------------------------------------------------

/// Warn while a hotkey action has been running longer than `threshold`.
pub async fn run_hang_monitor(queue: Arc<ActionQueue>, threshold: Duration) {
    let mut ticker = tokio::time::interval(threshold);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Some(hung) = hung_action(&queue, threshold) {
            tracing::warn!("[hang] {} has been running for {:?}", hung.0, hung.1);
        }
    }
}

fn hung_action(queue: &ActionQueue, threshold: Duration) -> Option<(String, Duration)> {
    let running = queue.running()?;
    running.hotkey?;
    let elapsed = running.elapsed();
    (elapsed > threshold).then_some((running.label, elapsed))
}

// ---------------------------------------------------------------------------
// Line trigger reader
// ---------------------------------------------------------------------------

/// Read one trigger per line until `Quit` or end of input.
pub fn read_triggers(input: impl BufRead, dispatcher: &Dispatcher) -> anyhow::Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Trigger>() {
            Ok(trigger) => {
                if let Dispatch::AutoProtect(on) = dispatcher.handle(trigger) {
                    tracing::info!("Auto-protect toggled {}", if on { "ON" } else { "OFF" });
                } else if trigger == Trigger::Quit {
                    return Ok(());
                }
            }
            Err(e) => tracing::warn!("Ignoring trigger: {}", e),
        }
    }
    tracing::info!("Trigger input closed");
    Ok(())
}
