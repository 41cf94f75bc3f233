/// Live mirror of the game client's state.
///
/// The feed task is the only writer; the protection poller, the dispatcher
/// and every running switch sequence read copies. All fields sit behind a
/// single mutex so an event is applied atomically and a reader never sees a
/// half-merged snapshot.
use crate::{
    events::{parse_event, ActivePrayer, FeedEvent, Item, Opponent, Tab, WorldPoint},
    items::{Bracket, ProtectionKind, BRACKET_SLOT, EMPTY_ITEM, WEAPON_SLOT},
};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

// ---------------------------------------------------------------------------
// GameState snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub tick:                   u64,
    pub tick_timestamp:         i64,
    pub inventory:              HashMap<String, Item>,
    pub equipment:              HashMap<String, Item>,
    pub tab:                    Option<Tab>,
    /// Active prayers, by name.
    pub prayers:                Vec<ActivePrayer>,
    pub opponent:               Option<Opponent>,
    /// Protection prayer suggested by the game-side plugin, if any.
    pub recommended_protection: Option<String>,
    pub spec_bar:               serde_json::Value,
    pub spells:                 serde_json::Value,
    pub player_position:        Option<WorldPoint>,
    pub canvas_width:           u32,
    pub canvas_height:          u32,
    /// Sticky tier locked from the first item seen in equipment slot 0.
    pub bracket:                Option<Bracket>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            tick:                   0,
            tick_timestamp:         0,
            inventory:              HashMap::new(),
            equipment:              HashMap::new(),
            tab:                    None,
            prayers:                Vec::new(),
            opponent:               None,
            recommended_protection: None,
            spec_bar:               serde_json::Value::Null,
            spells:                 serde_json::Value::Null,
            player_position:        None,
            canvas_width:           765,
            canvas_height:          503,
            bracket:                None,
        }
    }
}

impl GameState {
    pub fn prayer_active(&self, name: &str) -> bool {
        let query = name.trim().to_ascii_lowercase();
        self.prayers
            .iter()
            .any(|p| p.name.trim().to_ascii_lowercase() == query)
    }

    /// First active protection prayer in scan order. The three are mutually
    /// exclusive in game, so the first hit is the only one.
    pub fn current_protection(&self) -> Option<ProtectionKind> {
        ProtectionKind::SCAN_ORDER
            .into_iter()
            .find(|k| self.prayer_active(k.prayer_name()))
    }

    pub fn tab_is(&self, tab: &Tab) -> bool {
        self.tab.as_ref() == Some(tab)
    }

    pub fn equipped_weapon_id(&self) -> i32 {
        self.equipment.get(WEAPON_SLOT).map(|i| i.item_id).unwrap_or(EMPTY_ITEM)
    }

    pub fn equipped_ids(&self) -> HashSet<i32> {
        self.equipment.values().map(|i| i.item_id).collect()
    }

    pub fn inventory_has(&self, item_id: i32) -> bool {
        self.inventory.values().any(|i| i.item_id == item_id)
    }

    pub fn equipment_has(&self, item_id: i32) -> bool {
        self.equipment.values().any(|i| i.item_id == item_id)
    }

    /// Lowest inventory slot holding `item_id`.
    pub fn inventory_slot_of(&self, item_id: i32) -> Option<&str> {
        self.inventory
            .iter()
            .filter(|(_, item)| item.item_id == item_id)
            .min_by_key(|(slot, _)| slot.parse::<u32>().unwrap_or(u32::MAX))
            .map(|(slot, _)| slot.as_str())
    }

    /// Merge one event. Returns true when equipment may have changed.
    fn apply(&mut self, event: FeedEvent) -> bool {
        match event {
            FeedEvent::Tick(t) => {
                if let Some(tick) = t.tick {
                    if tick < self.tick {
                        tracing::debug!("Ignoring stale tick {} (current {})", tick, self.tick);
                        return false;
                    }
                    self.tick = tick;
                }
                if let Some(ts) = t.tick_timestamp {
                    self.tick_timestamp = ts;
                }
                false
            }

            FeedEvent::FullSync(sync) => {
                let sync = *sync;
                if let Some(v) = sync.tick           { self.tick = v; }
                if let Some(v) = sync.tick_timestamp { self.tick_timestamp = v; }
                if let Some(v) = sync.inventory_slots { self.inventory = v; }
                if let Some(v) = sync.equipment_slots { self.equipment = v; }
                if let Some(v) = sync.tab            { self.tab = Some(v); }
                if let Some(v) = sync.prayers        { self.prayers = v; }
                if let Some(v) = sync.opponent       { self.opponent = v; }
                if let Some(v) = sync.spec_bar       { self.spec_bar = v; }
                if let Some(v) = sync.spells         { self.spells = v; }
                if let Some(v) = sync.canvas_width   { self.canvas_width = v; }
                if let Some(v) = sync.canvas_height  { self.canvas_height = v; }
                if let Some(v) = sync.player_world_position { self.player_position = v; }
                self.recommended_protection = sync.recommended_protection_prayer;
                true
            }

            FeedEvent::InventoryChanged(slots) => {
                if let Some(items) = slots.items {
                    self.inventory = items;
                }
                false
            }

            FeedEvent::EquipmentChanged(slots) => {
                if let Some(items) = slots.items {
                    self.equipment = items;
                }
                true
            }

            FeedEvent::TabChanged(t) => {
                if let Some(tab) = t.tab {
                    self.tab = Some(tab);
                }
                false
            }

            FeedEvent::TogglesChanged(prayers) => {
                self.prayers = prayers;
                false
            }

            FeedEvent::OpponentChanged(opponent) => {
                self.opponent = opponent;
                false
            }

            FeedEvent::ProtectionHint(hint) => {
                self.recommended_protection = hint.into_inner();
                false
            }

            FeedEvent::SpecBar(bar) => {
                self.spec_bar = bar;
                false
            }
        }
    }

    /// Lock the bracket the first time slot 0 is seen occupied.
    fn refresh_bracket(&mut self) {
        if self.bracket.is_some() {
            return;
        }
        let slot0 = self.equipment.get(BRACKET_SLOT).map(|i| i.item_id).unwrap_or(EMPTY_ITEM);
        if slot0 != EMPTY_ITEM {
            let bracket = Bracket::from_item(slot0);
            tracing::info!("Bracket locked to {:?} (slot 0 item {})", bracket, slot0);
            self.bracket = Some(bracket);
        }
    }
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct StateStore {
    inner: Mutex<GameState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GameState> {
        // A panic while holding the lock cannot leave a half-merged event
        // behind (apply only assigns whole fields), so recover the guard.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update(&self, event: FeedEvent) {
        let kind = event.kind();
        let mut state = self.lock();
        if state.apply(event) {
            state.refresh_bracket();
        }
        tracing::trace!("Applied {} at tick {}", kind, state.tick);
    }

    /// Decode and merge one raw feed message. Returns false if it was skipped.
    pub fn apply_raw(&self, raw: &str) -> bool {
        match parse_event(raw) {
            Some(event) => {
                self.update(event);
                true
            }
            None => false,
        }
    }

    /// Independent copy of the current snapshot.
    pub fn read(&self) -> GameState {
        self.lock().clone()
    }

    /// Forget the locked bracket; the next equipment update re-derives it.
    pub fn reset_bracket(&self) {
        let mut state = self.lock();
        state.bracket = None;
        tracing::info!("Bracket reset");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn equip_slot0(store: &StateStore, item_id: i32) {
        let raw = json!({"type": "equipment_changed", "data": {"items": {"0": {"item_id": item_id}}}});
        assert!(store.apply_raw(&raw.to_string()));
    }

    #[test]
    fn narrow_events_leave_other_fields_alone() {
        let store = StateStore::new();
        store.apply_raw(&json!({"type": "full_sync", "data": {
            "tick": 10,
            "tab": "inventory",
            "inventory_slots": {"4": {"item_id": 4151}},
            "prayers": [{"name": "piety"}]
        }}).to_string());
        store.apply_raw(&json!({"type": "tab_changed", "data": {"tab": "prayer"}}).to_string());

        let s = store.read();
        assert_eq!(s.tab, Some(Tab::Prayer));
        assert_eq!(s.tick, 10);
        assert!(s.inventory_has(4151));
        assert!(s.prayer_active("Piety"));
    }

    #[test]
    fn full_sync_without_hint_clears_it() {
        let store = StateStore::new();
        store.apply_raw(&json!({"type": "protection_hint", "data": "protect_from_magic"}).to_string());
        assert_eq!(store.read().recommended_protection.as_deref(), Some("protect_from_magic"));

        store.apply_raw(&json!({"type": "full_sync", "data": {"tick": 3}}).to_string());
        assert!(store.read().recommended_protection.is_none());
    }

    #[test]
    fn stale_ticks_are_ignored() {
        let store = StateStore::new();
        store.apply_raw(&json!({"type": "tick", "data": {"tick": 100}}).to_string());
        store.apply_raw(&json!({"type": "tick", "data": {"tick": 99}}).to_string());
        assert_eq!(store.read().tick, 100);
        store.apply_raw(&json!({"type": "tick", "data": {"tick": 101}}).to_string());
        assert_eq!(store.read().tick, 101);
    }

    #[test]
    fn read_is_a_detached_copy() {
        let store = StateStore::new();
        let before = store.read();
        store.apply_raw(&json!({"type": "opponent_changed", "data": {"animation": 5061}}).to_string());
        assert!(before.opponent.is_none());
        assert_eq!(store.read().opponent.and_then(|o| o.animation), Some(5061));
    }

    #[test]
    fn bracket_sticks_to_first_item_seen() {
        let store = StateStore::new();

        store.apply_raw(&json!({"type": "equipment_changed", "data": {"items": {}}}).to_string());
        assert_eq!(store.read().bracket, None);

        equip_slot0(&store, 27166); // pure
        assert_eq!(store.read().bracket, Some(Bracket::Pure));

        equip_slot0(&store, 27169); // zerker
        assert_eq!(store.read().bracket, Some(Bracket::Pure), "bracket must not follow slot 0");

        store.reset_bracket();
        assert_eq!(store.read().bracket, None);
        equip_slot0(&store, 27169);
        assert_eq!(store.read().bracket, Some(Bracket::Zerker));
    }

    #[test]
    fn empty_slot_marker_does_not_lock_bracket() {
        let store = StateStore::new();
        equip_slot0(&store, EMPTY_ITEM);
        assert_eq!(store.read().bracket, None);
    }

    #[test]
    fn current_protection_scans_active_prayers() {
        let mut state = GameState::default();
        assert_eq!(state.current_protection(), None);
        state.prayers = vec![
            ActivePrayer { name: "piety".into() },
            ActivePrayer { name: "protect_from_missiles".into() },
        ];
        assert_eq!(state.current_protection(), Some(ProtectionKind::Missiles));
    }

    #[test]
    fn inventory_slot_lookup_prefers_lowest_slot() {
        let store = StateStore::new();
        store.apply_raw(&json!({"type": "inventory_changed", "data": {"items": {
            "12": {"item_id": 20557},
            "3":  {"item_id": 20557},
            "7":  {"item_id": 4151}
        }}}).to_string());
        assert_eq!(store.read().inventory_slot_of(20557), Some("3"));
        assert_eq!(store.read().inventory_slot_of(1), None);
    }

    #[test]
    fn readers_never_see_partial_full_sync() {
        let store = Arc::new(StateStore::new());

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for n in 1..=2_000u32 {
                    store.apply_raw(&json!({"type": "full_sync", "data": {
                        "tick": n,
                        "canvas_width": n,
                        "inventory_slots": {"0": {"item_id": n}},
                        "equipment_slots": {"3": {"item_id": n}}
                    }}).to_string());
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        let s = store.read();
                        if s.tick == 0 {
                            continue;
                        }
                        assert_eq!(s.canvas_width as u64, s.tick);
                        assert_eq!(s.inventory["0"].item_id as u64, s.tick);
                        assert_eq!(s.equipped_weapon_id() as u64, s.tick);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
