/// Gear switching: equip whatever part of a loadout is not already worn.
use super::Switcher;
use crate::{events::Tab, items::DEFENDERS, stop::StopSignal, tables::WantedItem};
use anyhow::Result;
use std::collections::HashSet;

/// Items still to click, in click order. The explicit weapon (slot 3) goes
/// last; without one, the last wanted item does.
pub fn plan(wanted: &[WantedItem], equipped: &HashSet<i32>, skip_defender: bool) -> Vec<WantedItem> {
    let mut to_equip: Vec<WantedItem> = wanted
        .iter()
        .filter(|w| !(skip_defender && DEFENDERS.contains(&w.id)))
        .filter(|w| !equipped.contains(&w.id))
        .copied()
        .collect();

    if let Some(pos) = to_equip.iter().rposition(WantedItem::is_weapon) {
        let weapon = to_equip.remove(pos);
        to_equip.push(weapon);
    }
    to_equip
}

impl Switcher {
    /// Returns the number of items clicked.
    pub fn switch_gear(&mut self, wanted: &[WantedItem], skip_defender: bool, stop: &StopSignal) -> Result<usize> {
        let state = self.ctx.store.read();
        let to_equip = plan(wanted, &state.equipped_ids(), skip_defender);
        if to_equip.is_empty() {
            tracing::debug!("All wanted gear already equipped");
            return Ok(0);
        }

        self.switch_tab(&Tab::Inventory, stop)?;
        let inventory_open = self.ctx.store.read().tab_is(&Tab::Inventory);

        let mut clicked = 0;
        for item in &to_equip {
            if stop.is_raised() {
                tracing::debug!("switch_gear interrupted after {} item(s)", clicked);
                return Ok(clicked);
            }
            let Some(slot) = state.inventory_slot_of(item.id) else {
                tracing::debug!("Item {} not in inventory", item.id);
                continue;
            };
            let Some(at) = self.ctx.tables.coords.inventory_slot(slot) else {
                tracing::warn!("No coordinates for inventory slot {}", slot);
                continue;
            };
            self.click_inventory_slot(at, inventory_open, stop)?;
            clicked += 1;
        }
        tracing::debug!("Equipped {} item(s)", clicked);
        Ok(clicked)
    }
}
