/// Input suppression while automated sequences run.
///
/// Two transient flags, both handed out as RAII leases so every exit path
/// (return, `?`, cancellation, panic unwinding through the action boundary)
/// drops them:
///   surface lease  → a prayer switch is clicking on the prayer panel
///   sequence lease → a hotkey sequence is running; the protection poller
///                    stays out of its way
///
/// Leases count rather than toggle, so nested holders cannot clear each
/// other's flag early.
///
/// The watcher thread polls the physical left button and forcibly releases
/// it while the prayer panel is open and suppression is in force.
use crate::{
    engine::ProtectionEngine,
    events::Tab,
    input::{InputError, MouseButton, SharedDevice},
    state::StateStore,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const RELEASE_BACKOFF: Duration = Duration::from_millis(50);
pub const ERROR_BACKOFF: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// InputGuard
// ---------------------------------------------------------------------------

pub struct InputGuard {
    engine:   Arc<ProtectionEngine>,
    surface:  AtomicUsize,
    sequence: AtomicUsize,
}

/// Held while a prayer switch is touching the prayer panel.
#[must_use = "the surface is released when the lease is dropped"]
pub struct SurfaceLease<'a>(&'a InputGuard);

/// Held for the duration of a hotkey sequence.
#[must_use = "the sequence flag is cleared when the lease is dropped"]
pub struct SequenceLease<'a>(&'a InputGuard);

impl Drop for SurfaceLease<'_> {
    fn drop(&mut self) {
        self.0.surface.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for SequenceLease<'_> {
    fn drop(&mut self) {
        self.0.sequence.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InputGuard {
    pub fn new(engine: Arc<ProtectionEngine>) -> Self {
        Self {
            engine,
            surface:  AtomicUsize::new(0),
            sequence: AtomicUsize::new(0),
        }
    }

    pub fn lease_surface(&self) -> SurfaceLease<'_> {
        self.surface.fetch_add(1, Ordering::SeqCst);
        SurfaceLease(self)
    }

    pub fn lease_sequence(&self) -> SequenceLease<'_> {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        SequenceLease(self)
    }

    pub fn is_surface_leased(&self) -> bool {
        self.surface.load(Ordering::SeqCst) > 0
    }

    pub fn is_sequence_active(&self) -> bool {
        self.sequence.load(Ordering::SeqCst) > 0
    }

    /// User clicks on the prayer panel are unwelcome while auto-protect owns
    /// it or a switch is in the middle of clicking it.
    pub fn should_block_surface(&self) -> bool {
        self.engine.is_enabled() || self.is_surface_leased()
    }

    /// Should a left press on `tab` be dropped? The prayer and inventory
    /// panels are protected while the surface is blocked or an action runs.
    pub fn should_discard_press(&self, tab: Option<&Tab>, action_in_progress: bool) -> bool {
        match tab {
            Some(Tab::Prayer | Tab::Inventory) => self.should_block_surface() || action_in_progress,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

/// One watcher pass. Returns true if a held button was released.
pub fn watch_once(
    guard: &InputGuard,
    store: &StateStore,
    device: &SharedDevice,
    action_in_progress: bool,
) -> Result<bool, InputError> {
    let state = store.read();
    // Only the prayer panel is watched.
    if !state.tab_is(&Tab::Prayer) || !guard.should_discard_press(state.tab.as_ref(), action_in_progress) {
        return Ok(false);
    }
    let mut d = device.lock();
    if d.is_button_down(MouseButton::Left)? {
        d.button_up(MouseButton::Left)?;
        tracing::info!("[block] forced left release on prayer tab");
        return Ok(true);
    }
    Ok(false)
}

/// Poll until `shutdown` is set. Runs on its own OS thread.
pub fn run_watcher(
    guard: Arc<InputGuard>,
    store: Arc<StateStore>,
    device: SharedDevice,
    in_progress: impl Fn() -> bool,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) {
    tracing::info!("Suppression watcher started ({:?} interval)", interval);
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(interval);
        match watch_once(&guard, &store, &device, in_progress()) {
            Ok(true) => std::thread::sleep(RELEASE_BACKOFF),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Suppression watcher error: {}", e);
                std::thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    tracing::info!("Suppression watcher stopped");
}
