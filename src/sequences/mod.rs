//! Action bodies run by the drain worker.
//!
//!   steps       tab switch, inventory click, spell cast, spec bar, pointer restore
//!   gear        equip the missing part of a loadout, weapon last
//!   prayers     offensive prayers plus a verified protection click
//!   hotkeys     per-hotkey policies
//!   protection  standalone protection switch from the poller
//!
//! Every step checks the action's `StopSignal` before doing anything and
//! returns as soon as it is raised; leases taken on the `InputGuard` are
//! dropped on the way out.
pub mod gear;
pub mod hotkeys;
pub mod prayers;
pub mod protection;
pub mod steps;

use crate::{
    config::TabKeys,
    engine::ProtectionEngine,
    input::SharedDevice,
    motion::MotionProfile,
    scheduler::{Action, ActionRunner},
    state::StateStore,
    suppression::InputGuard,
    tables::Tables,
};
use std::sync::Arc;

/// Shared handles every sequence needs.
#[derive(Clone)]
pub struct SequenceContext {
    pub store:    Arc<StateStore>,
    pub engine:   Arc<ProtectionEngine>,
    pub guard:    Arc<InputGuard>,
    pub tables:   Arc<Tables>,
    pub device:   SharedDevice,
    pub tab_keys: TabKeys,
}

/// The drain worker's `ActionRunner`: sequence context plus the motion
/// profile (and RNG) that only this thread uses.
pub struct Switcher {
    ctx:    SequenceContext,
    motion: MotionProfile,
}

impl Switcher {
    pub fn new(ctx: SequenceContext, motion: MotionProfile) -> Self {
        Self { ctx, motion }
    }
}

impl ActionRunner for Switcher {
    fn run(&mut self, action: &Action) -> anyhow::Result<()> {
        match action {
            Action::Hotkey { hotkey, stop } => self.run_hotkey(*hotkey, stop),
            Action::Protection { kind } => self.protection_switch(*kind),
        }
    }
}
