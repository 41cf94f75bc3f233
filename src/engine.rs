/// Protection decision engine.
///
/// Reads the live snapshot and decides which protection prayer, if any,
/// should be switched to right now. Three layered windows keep it from
/// reacting twice to the same evidence:
///   animation   → `cadence` ticks per animation id (4 when unknown)
///   remote hint → 2 ticks
///   emergency   → 600 ms wall time (nothing active, hint present)
///
/// A separate debounce (`may_switch`) rejects the same kind twice within
/// 660 ms; the poller applies it as the final gate before enqueuing.
use crate::{
    items::ProtectionKind,
    state::{GameState, StateStore},
    tables::AnimationTable,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_CADENCE_TICKS: u64 = 4;
pub const HINT_COOLDOWN_TICKS: u64 = 2;
pub const EMERGENCY_INTERVAL: Duration = Duration::from_millis(600);
pub const SWITCH_DEBOUNCE: Duration = Duration::from_millis(660);

// ---------------------------------------------------------------------------
// Cooldown memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CooldownMemory {
    last_animation:           Option<i32>,
    animation_cooldown_until: u64,
    hint_cooldown_until:      u64,
    last_emergency:           Option<Instant>,
}

impl CooldownMemory {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn recommend(
        &mut self,
        state: &GameState,
        animations: &AnimationTable,
        now: Instant,
    ) -> Option<ProtectionKind> {
        let Some(opponent) = state.opponent.as_ref() else {
            self.reset();
            return None;
        };
        let tick = state.tick;
        let active = state.current_protection();

        // Animation evidence outranks the remote hint.
        if let Some(anim) = opponent.animation {
            if let Some(kind) = animations.protection_for(anim) {
                if self.last_animation != Some(anim) || tick >= self.animation_cooldown_until {
                    let cadence = animations.cadence(anim).unwrap_or(DEFAULT_CADENCE_TICKS);
                    self.last_animation = Some(anim);
                    self.animation_cooldown_until = tick + cadence;
                    if active == Some(kind) {
                        return None;
                    }
                    tracing::info!("[anim] {} → {} (cooldown {} ticks)", anim, kind, cadence);
                    return Some(kind);
                }
            }
        }

        let hint = state
            .recommended_protection
            .as_deref()
            .and_then(ProtectionKind::from_prayer_name)?;

        if tick >= self.hint_cooldown_until && active != Some(hint) {
            self.hint_cooldown_until = tick + HINT_COOLDOWN_TICKS;
            tracing::info!("[hint] → {} ({}-tick cooldown)", hint, HINT_COOLDOWN_TICKS);
            return Some(hint);
        }

        if active.is_none() {
            if let Some(last) = self.last_emergency {
                if now.saturating_duration_since(last) < EMERGENCY_INTERVAL {
                    return None;
                }
            }
            self.last_emergency = Some(now);
            tracing::info!("[emergency] nothing active, enabling {}", hint);
            return Some(hint);
        }

        None
    }
}

// ---------------------------------------------------------------------------
// ProtectionEngine
// ---------------------------------------------------------------------------

pub struct ProtectionEngine {
    store:       Arc<StateStore>,
    animations:  Arc<AnimationTable>,
    enabled:     AtomicBool,
    memory:      Mutex<CooldownMemory>,
    last_switch: Mutex<Option<(ProtectionKind, Instant)>>,
}

fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProtectionEngine {
    pub fn new(store: Arc<StateStore>, animations: Arc<AnimationTable>) -> Self {
        Self {
            store,
            animations,
            enabled:     AtomicBool::new(false),
            memory:      Mutex::new(CooldownMemory::default()),
            last_switch: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, on: bool) {
        let was = self.enabled.swap(on, Ordering::SeqCst);
        if was != on {
            tracing::info!("Auto-protect {}", if on { "ENABLED" } else { "DISABLED" });
        }
        if !on {
            relock(&self.memory).reset();
        }
    }

    /// Flip auto-protect. Returns the new value.
    pub fn toggle_enabled(&self) -> bool {
        let on = !self.is_enabled();
        self.set_enabled(on);
        on
    }

    pub fn recommend_protection(&self) -> Option<ProtectionKind> {
        self.recommend_protection_at(Instant::now())
    }

    /// Snapshot read and memory update happen under the memory lock, so two
    /// concurrent callers can never both consume the same window.
    pub fn recommend_protection_at(&self, now: Instant) -> Option<ProtectionKind> {
        let mut memory = relock(&self.memory);
        if !self.is_enabled() {
            memory.reset();
            return None;
        }
        let state = self.store.read();
        memory.recommend(&state, &self.animations, now)
    }

    pub fn may_switch(&self, kind: ProtectionKind) -> bool {
        self.may_switch_at(kind, Instant::now())
    }

    /// Debounce: the same kind is rejected within `SWITCH_DEBOUNCE` of the
    /// last accepted switch. Accepting records the switch.
    pub fn may_switch_at(&self, kind: ProtectionKind, now: Instant) -> bool {
        let mut last = relock(&self.last_switch);
        if let Some((prev, at)) = *last {
            if prev == kind && now.saturating_duration_since(at) < SWITCH_DEBOUNCE {
                tracing::debug!("Debounced {} ({:?} since last)", kind, now - at);
                return false;
            }
        }
        *last = Some((kind, now));
        true
    }
}
