/// Prayer switching.
///
/// Offensive prayers are clicked blind. The protection prayer is clicked at
/// most `PROTECTION_ATTEMPTS` times, re-reading the live state after each
/// click; the client sometimes drops a click while the panel is animating.
use super::Switcher;
use crate::{
    events::Tab,
    items::ProtectionKind,
    motion::{GEAR_SETTLE, PRAYER_CLICK, PRAYER_VERIFY},
    stop::StopSignal,
};
use anyhow::Result;
use std::sync::Arc;

pub const PROTECTION_ATTEMPTS: usize = 3;

impl Switcher {
    pub fn switch_prayers(
        &mut self,
        names: &[&str],
        protection: Option<ProtectionKind>,
        stop: &StopSignal,
    ) -> Result<()> {
        let state = self.ctx.store.read();
        let to_activate: Vec<&str> = names
            .iter()
            .copied()
            .filter(|n| !state.prayer_active(n))
            .collect();
        let live = state.current_protection();
        let protection = protection.filter(|k| live != Some(*k));

        if to_activate.is_empty() && protection.is_none() {
            tracing::debug!("Prayers already correct");
            return Ok(());
        }

        let guard = Arc::clone(&self.ctx.guard);
        let _surface = guard.lease_surface();

        self.switch_tab(&Tab::Prayer, stop)?;

        if let Some(kind) = protection {
            tracing::info!("Protection {:?} → {}", live, kind);
            self.click_protection(kind, stop)?;
        }

        for name in to_activate {
            if stop.is_raised() {
                tracing::debug!("switch_prayers interrupted");
                return Ok(());
            }
            let Some(at) = self.ctx.tables.coords.prayer(name) else {
                tracing::warn!("No coordinates for prayer '{}'", name);
                continue;
            };
            if !self.motion.pause(GEAR_SETTLE, stop) {
                return Ok(());
            }
            self.motion.click_at(&self.ctx.device, at, PRAYER_CLICK, stop)?;
            tracing::debug!("Activated {}", name);
        }

        self.switch_tab(&Tab::Inventory, stop)
    }

    /// Returns true once the live state shows `kind` active.
    fn click_protection(&mut self, kind: ProtectionKind, stop: &StopSignal) -> Result<bool> {
        let Some(at) = self.ctx.tables.coords.prayer(kind.prayer_name()) else {
            tracing::warn!("No coordinates for {}", kind);
            return Ok(false);
        };
        for attempt in 1..=PROTECTION_ATTEMPTS {
            if !self.motion.pause(GEAR_SETTLE, stop) {
                return Ok(false);
            }
            self.motion.click_at(&self.ctx.device, at, PRAYER_CLICK, stop)?;
            if !self.motion.pause(PRAYER_VERIFY, stop) {
                return Ok(false);
            }
            if self.ctx.store.read().prayer_active(kind.prayer_name()) {
                tracing::debug!("{} confirmed after {} click(s)", kind, attempt);
                return Ok(true);
            }
            tracing::debug!("{} not active after attempt {}", kind, attempt);
        }
        tracing::warn!("{} failed to enable after {} tries", kind, PROTECTION_ATTEMPTS);
        Ok(false)
    }
}
