/// Per-hotkey policies.
///
/// `plan` decides, from the hotkey and a snapshot, which items to equip,
/// which offensive prayers to run and what happens after the switch.
/// `run_hotkey` executes the plan:
///   gear → prayers (with the engine's recommended protection) → finish
///
/// F11 with a granite maul does the spec stack; F11 without one falls back
/// to the F6 mage switch with blood barrage.
use super::{
    steps::{RESTORE_EXACT, RESTORE_LOOSE},
    Switcher,
};
use crate::{
    events::Tab,
    input::Point,
    items::{
        offensive_prayers, AttackCategory, Bracket, DARK_BOW, DRAGON_ARROW, GRANITE_MAUL,
        MAGES_BOOK, SPEC_WEAPONS, SPIRIT_SHIELD, TWO_HANDERS, UNHOLY_BOOK,
    },
    motion::{
        DOUBLE_CLICK_GAP, POINTER_MOVE, SPEC_BAR_PRECLICK, SPEC_BAR_WAIT, STACK_FINAL_CLICK,
        STACK_SPEC_AFTER, STACK_SPEC_WAIT, STACK_TAB_WAIT, STACK_WEAPON_CLICK,
    },
    state::GameState,
    stop::StopSignal,
    tables::{Hotkey, HotkeyTable, WantedItem},
};
use anyhow::Result;
use std::sync::Arc;

/// What a sequence does once gear and prayers are in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    /// Click the maul, double-spec from the attack tab, click at the origin.
    SpecStack,
    /// Cast a spell and leave the spellbook open.
    Spell(&'static str),
    /// Single spec-bar click from the attack tab.
    SpecBar,
    /// Back to the inventory.
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub items:         Vec<WantedItem>,
    pub skip_gear:     bool,
    pub skip_defender: bool,
    pub prayers:       &'static [&'static str],
    pub finish:        Finish,
}

impl Plan {
    fn new(items: Vec<WantedItem>, prayers: &'static [&'static str], finish: Finish) -> Self {
        Self { items, skip_gear: false, skip_defender: false, prayers, finish }
    }
}

fn has_anywhere(state: &GameState, item_id: i32) -> bool {
    state.inventory_has(item_id) || state.equipment_has(item_id)
}

pub fn plan(hotkey: Hotkey, state: &GameState, bracket: Bracket, loadouts: &HotkeyTable) -> Plan {
    let mut items = loadouts.items(hotkey);

    match hotkey {
        Hotkey::F11 if has_anywhere(state, GRANITE_MAUL) => Plan::new(
            items,
            offensive_prayers(AttackCategory::Melee, bracket),
            Finish::SpecStack,
        ),

        Hotkey::F6 | Hotkey::F11 => {
            let mut items = loadouts.items(Hotkey::F6);
            if has_anywhere(state, MAGES_BOOK) {
                items.retain(|w| w.id != SPIRIT_SHIELD && w.id != UNHOLY_BOOK);
                if !items.iter().any(|w| w.id == MAGES_BOOK) {
                    items.push(WantedItem::new(MAGES_BOOK));
                }
            }
            let spell = if hotkey == Hotkey::F6 { "ice_barrage" } else { "blood_barrage" };
            Plan::new(items, offensive_prayers(AttackCategory::Magic, bracket), Finish::Spell(spell))
        }

        Hotkey::F10 => {
            let dark_bow = state.inventory_has(DARK_BOW);
            if SPEC_WEAPONS.contains(&state.equipped_weapon_id()) {
                let category = if dark_bow { AttackCategory::Ranged } else { AttackCategory::Melee };
                let mut plan = Plan::new(items, offensive_prayers(category, bracket), Finish::SpecBar);
                plan.skip_gear = true;
                plan
            } else if dark_bow {
                if !state.equipment_has(DRAGON_ARROW) && !items.iter().any(|w| w.id == DRAGON_ARROW) {
                    items.push(WantedItem::new(DRAGON_ARROW));
                }
                Plan::new(items, offensive_prayers(AttackCategory::Ranged, bracket), Finish::SpecBar)
            } else {
                let spec_in_inventory = state.inventory.values().any(|i| SPEC_WEAPONS.contains(&i.item_id));
                let mut plan = Plan::new(items, offensive_prayers(AttackCategory::Melee, bracket), Finish::SpecBar);
                plan.skip_defender = spec_in_inventory;
                plan
            }
        }

        Hotkey::F9 => {
            let equipping_two_hander = items
                .iter()
                .any(|w| TWO_HANDERS.contains(&w.id) && state.inventory_has(w.id));
            let mut plan = Plan::new(items, offensive_prayers(AttackCategory::Melee, bracket), Finish::Plain);
            plan.skip_defender = equipping_two_hander;
            plan
        }

        Hotkey::F8 => Plan::new(items, offensive_prayers(AttackCategory::Ranged, bracket), Finish::Plain),

        Hotkey::F7 | Hotkey::F12 => Plan::new(items, &[], Finish::Plain),
    }
}

impl Switcher {
    /// Body of an `Action::Hotkey`.
    pub fn run_hotkey(&mut self, hotkey: Hotkey, stop: &StopSignal) -> Result<()> {
        if stop.is_raised() {
            tracing::debug!("{} cancelled before start", hotkey);
            return Ok(());
        }
        let guard = Arc::clone(&self.ctx.guard);
        let _sequence = guard.lease_sequence();

        let origin = self.ctx.device.lock().cursor()?;
        let state = self.ctx.store.read();
        let Some(bracket) = state.bracket else {
            tracing::info!("{} ignored: bracket not known yet", hotkey);
            return Ok(());
        };
        let protection = self.ctx.engine.recommend_protection();
        let plan = plan(hotkey, &state, bracket, &self.ctx.tables.hotkeys);
        tracing::info!(
            "{} → {} item(s), prayers {:?}, protection {:?}, {:?}",
            hotkey,
            plan.items.len(),
            plan.prayers,
            protection,
            plan.finish
        );

        if !plan.skip_gear {
            self.switch_gear(&plan.items, plan.skip_defender, stop)?;
            if stop.is_raised() {
                return Ok(());
            }
        }

        if !plan.prayers.is_empty() || protection.is_some() {
            self.switch_prayers(plan.prayers, protection, stop)?;
            if stop.is_raised() {
                return Ok(());
            }
        }

        match plan.finish {
            Finish::SpecStack => self.spec_stack(&state, origin, stop),
            Finish::Spell(name) => {
                self.cast_spell(name, stop)?;
                self.switch_tab(&Tab::Spellbook, stop)?;
                self.restore_pointer(origin, RESTORE_EXACT, stop)
            }
            Finish::SpecBar => {
                self.switch_tab(&Tab::Attack, stop)?;
                if !self.motion.pause(SPEC_BAR_WAIT, stop) || !self.motion.pause(SPEC_BAR_PRECLICK, stop) {
                    return Ok(());
                }
                self.click_spec_bar(stop)?;
                self.switch_tab(&Tab::Inventory, stop)?;
                self.restore_pointer(origin, RESTORE_EXACT, stop)
            }
            Finish::Plain => {
                self.switch_tab(&Tab::Inventory, stop)?;
                self.restore_pointer(origin, RESTORE_EXACT, stop)
            }
        }
    }

    fn spec_stack(&mut self, state: &GameState, origin: Point, stop: &StopSignal) -> Result<()> {
        let maul = state
            .inventory_slot_of(GRANITE_MAUL)
            .and_then(|slot| self.ctx.tables.coords.inventory_slot(slot));
        if let Some(at) = maul {
            if !self.motion.pause(STACK_WEAPON_CLICK, stop) {
                return Ok(());
            }
            self.motion.click_at(&self.ctx.device, at, POINTER_MOVE, stop)?;
        }

        if !self.motion.pause(STACK_TAB_WAIT, stop) {
            return Ok(());
        }
        self.switch_tab(&Tab::Attack, stop)?;
        if !self.motion.pause(STACK_SPEC_WAIT, stop) {
            return Ok(());
        }
        self.click_spec_bar(stop)?;
        if !self.motion.pause(DOUBLE_CLICK_GAP, stop) {
            return Ok(());
        }
        self.click_spec_bar(stop)?;
        if !self.motion.pause(STACK_SPEC_AFTER, stop) {
            return Ok(());
        }
        self.switch_tab(&Tab::Inventory, stop)?;
        self.restore_pointer(origin, RESTORE_LOOSE, stop)?;
        if !self.motion.pause(STACK_FINAL_CLICK, stop) {
            return Ok(());
        }
        self.motion.click(&self.ctx.device, stop)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::input::{
        testing::{clicks, Call, RecordingDevice},
        Key, MouseButton,
    };
    use crate::scheduler::{Action, ActionRunner};

    fn snapshot(inventory: &[(u32, i32)], equipment: &[(&str, i32)]) -> GameState {
        store_with(inventory, equipment, "inventory").read()
    }

    fn ids(plan: &Plan) -> Vec<i32> {
        plan.items.iter().map(|w| w.id).collect()
    }

    #[test]
    fn f11_with_maul_stacks_specs() {
        let p = plan(Hotkey::F11, &snapshot(&[(4, GRANITE_MAUL)], &[]), Bracket::Max, &tables().hotkeys);
        assert_eq!(p.finish, Finish::SpecStack);
        assert_eq!(p.prayers, &["piety"]);
        assert_eq!(ids(&p), vec![AGS]);
    }

    #[test]
    fn f11_without_maul_is_a_blood_barrage_mage_switch() {
        let p = plan(Hotkey::F11, &snapshot(&[], &[]), Bracket::Pure, &tables().hotkeys);
        assert_eq!(p.finish, Finish::Spell("blood_barrage"));
        assert_eq!(p.prayers, &["mystic_might"]);
        assert_eq!(ids(&p), vec![STAFF, ROBE, SPIRIT]);
    }

    #[test]
    fn mages_book_replaces_the_shield() {
        let p = plan(Hotkey::F6, &snapshot(&[(3, MAGES_BOOK)], &[]), Bracket::Max, &tables().hotkeys);
        assert_eq!(p.finish, Finish::Spell("ice_barrage"));
        assert_eq!(ids(&p), vec![STAFF, ROBE, MAGES_BOOK]);
    }

    #[test]
    fn f10_with_spec_weapon_worn_skips_gear() {
        let worn = [("3", 27184)];
        let p = plan(Hotkey::F10, &snapshot(&[(1, DARK_BOW)], &worn), Bracket::Max, &tables().hotkeys);
        assert!(p.skip_gear);
        assert_eq!(p.prayers, &["rigour"]);

        let p = plan(Hotkey::F10, &snapshot(&[], &worn), Bracket::Max, &tables().hotkeys);
        assert_eq!(p.prayers, &["piety"]);
    }

    #[test]
    fn f10_dark_bow_brings_arrows() {
        let p = plan(Hotkey::F10, &snapshot(&[(1, DARK_BOW)], &[]), Bracket::Zerker, &tables().hotkeys);
        assert!(!p.skip_gear);
        assert_eq!(p.prayers, &["eagle_eye"]);
        assert!(ids(&p).contains(&DRAGON_ARROW));

        let p = plan(Hotkey::F10, &snapshot(&[(1, DARK_BOW)], &[("13", DRAGON_ARROW)]), Bracket::Zerker, &tables().hotkeys);
        assert!(!ids(&p).contains(&DRAGON_ARROW));
    }

    #[test]
    fn f10_spec_weapon_in_inventory_skips_defender() {
        let p = plan(Hotkey::F10, &snapshot(&[(2, 20593)], &[]), Bracket::Max, &tables().hotkeys);
        assert!(p.skip_defender);
        assert_eq!(p.finish, Finish::SpecBar);
    }

    #[test]
    fn f9_two_hander_skips_defender() {
        let loadouts = HotkeyTable::new(std::collections::HashMap::from([(
            Hotkey::F9,
            vec![WantedItem { id: 21205, slot: Some(3) }, WantedItem::new(DEFENDER)],
        )]));
        let p = plan(Hotkey::F9, &snapshot(&[(0, 21205)], &[]), Bracket::Max, &loadouts);
        assert!(p.skip_defender);

        let p = plan(Hotkey::F9, &snapshot(&[], &[]), Bracket::Max, &loadouts);
        assert!(!p.skip_defender, "two-hander not in inventory");
    }

    #[test]
    fn plain_hotkeys_have_no_prayers() {
        let p = plan(Hotkey::F7, &snapshot(&[], &[]), Bracket::Max, &tables().hotkeys);
        assert!(p.prayers.is_empty());
        assert_eq!(p.finish, Finish::Plain);
    }

    #[test]
    fn unknown_bracket_is_a_no_op() {
        let store = std::sync::Arc::new(crate::state::StateStore::new());
        let (device, calls) = RecordingDevice::new().share();
        let mut s = switcher(context(store, device));
        s.run_hotkey(Hotkey::F8, &StopSignal::new()).unwrap();
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn f8_switch_equips_prays_and_restores() {
        let store = store_with(&[(0, BOW), (1, BLESSING)], &[], "inventory");
        let (device, calls) = RecordingDevice::new().at(Point::new(300, 300)).share();
        let ctx = context(store, device);
        let guard = ctx.guard.clone();
        let mut s = switcher(ctx);

        s.run(&Action::Hotkey { hotkey: Hotkey::F8, stop: StopSignal::new() }).unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(clicks(&calls), 3, "two items and eagle eye");
        assert_eq!(calls.last(), Some(&Call::Move(Point::new(300, 300))));
        assert!(!guard.is_sequence_active());
        assert!(!guard.is_surface_leased());
    }

    /// Pointer position at each left press, starting from `origin`.
    fn click_points(origin: Point, calls: &[Call]) -> Vec<Point> {
        let mut at = origin;
        let mut points = Vec::new();
        for call in calls {
            match call {
                Call::Move(p) => at = *p,
                Call::Down(_) => points.push(at),
                _ => {}
            }
        }
        points
    }

    /// Panel keys in press order.
    fn tab_presses(calls: &[Call]) -> String {
        calls
            .iter()
            .filter_map(|c| match c {
                Call::KeyDown(Key::Char(k)) => Some(*k),
                _ => None,
            })
            .collect()
    }

    fn near(p: Point, q: Point, within: i32) -> bool {
        (p.x - q.x).abs() <= within && (p.y - q.y).abs() <= within
    }

    const SPEC_BAR: Point = Point::new(660, 430);

    #[test]
    fn f11_with_maul_runs_the_spec_stack() {
        let origin = Point::new(300, 300);
        let store = store_with(&[(4, GRANITE_MAUL)], &[], "inventory");
        let (device, calls) = RecordingDevice::new().at(origin).share();
        let ctx = context(store, device);
        let guard = ctx.guard.clone();
        let mut s = switcher(ctx);

        s.run_hotkey(Hotkey::F11, &StopSignal::new()).unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(tab_presses(&calls), "asaqa", "gear, prayer, back, attack, inventory");
        let points = click_points(origin, &calls);
        assert_eq!(points.len(), 6, "two prayers, maul, two specs, final click");
        assert!(near(points[0], prayer_point("ultimate_strength"), 4));
        assert!(near(points[1], prayer_point("incredible_reflexes"), 4));
        assert!(near(points[2], slot_point(4), 4), "maul at {:?}", points[2]);
        assert!(near(points[3], SPEC_BAR, 3) && near(points[4], SPEC_BAR, 3));
        assert!(near(points[5], origin, 4), "final click near origin: {:?}", points[5]);
        assert_eq!(calls.last(), Some(&Call::Up(MouseButton::Left)));

        // Maul click happens before the attack tab opens.
        let maul_index = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Call::Down(_)))
            .nth(2)
            .map(|(i, _)| i)
            .unwrap();
        let attack_index = calls.iter().position(|c| *c == Call::KeyDown(Key::Char('q'))).unwrap();
        assert!(maul_index < attack_index);
        assert!(!guard.is_sequence_active());
    }

    #[test]
    fn f6_casts_then_leaves_the_spellbook_open() {
        let origin = Point::new(250, 260);
        let store = store_with(&[(0, STAFF), (1, ROBE), (2, SPIRIT)], &[], "inventory");
        let (device, calls) = RecordingDevice::new().at(origin).share();
        let mut s = switcher(context(store, device));

        s.run_hotkey(Hotkey::F6, &StopSignal::new()).unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(tab_presses(&calls), "asadd");
        let points = click_points(origin, &calls);
        assert_eq!(points.len(), 5, "three items, mystic might, the spell");
        assert!(near(points[0], slot_point(1), 4));
        assert!(near(points[1], slot_point(2), 4));
        assert!(near(points[2], slot_point(0), 4), "staff goes last");
        assert!(near(points[3], prayer_point("mystic_might"), 4));
        assert!(near(points[4], Point::new(650, 300), 4), "ice barrage at {:?}", points[4]);
        assert_eq!(calls.last(), Some(&Call::Move(origin)), "exact restore");
    }

    #[test]
    fn f10_clicks_the_spec_bar_from_the_attack_tab() {
        let origin = Point::new(320, 310);
        let store = store_with(&[(0, AGS)], &[], "inventory");
        let (device, calls) = RecordingDevice::new().at(origin).share();
        let mut s = switcher(context(store, device));

        s.run_hotkey(Hotkey::F10, &StopSignal::new()).unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(tab_presses(&calls), "asaqa");
        let points = click_points(origin, &calls);
        assert_eq!(points.len(), 4, "weapon, two prayers, spec bar");
        assert!(near(points[0], slot_point(0), 4));
        assert!(near(points[3], SPEC_BAR, 3), "spec click at {:?}", points[3]);
        assert_eq!(calls.last(), Some(&Call::Move(origin)));
    }

    fn assert_cancellation_is_clean(hotkey: Hotkey, inventory: &[(u32, i32)]) {
        let build = |raise_at: Option<usize>| {
            let store = store_with(inventory, &[], "inventory");
            let stop = StopSignal::new();
            let raiser = stop.clone();
            let (device, calls) = RecordingDevice::new()
                .with_hook(move |_, index| {
                    if Some(index) == raise_at {
                        raiser.raise();
                    }
                })
                .share();
            let ctx = context(store, device);
            let guard = ctx.guard.clone();
            (switcher(ctx), guard, stop, calls)
        };

        let (mut s, _, stop, calls) = build(None);
        s.run_hotkey(hotkey, &stop).unwrap();
        let total = calls.lock().unwrap().len();
        assert!(total > 10, "{hotkey} issued only {total} calls");

        for raise_at in (0..total).step_by(7) {
            let (mut s, guard, stop, calls) = build(Some(raise_at));
            s.run_hotkey(hotkey, &stop).unwrap();
            assert!(!guard.is_surface_leased(), "{hotkey}: surface leaked when raised at {raise_at}");
            assert!(!guard.is_sequence_active(), "{hotkey}: sequence leaked when raised at {raise_at}");
            let n = calls.lock().unwrap().len();
            assert!(n <= raise_at + 2, "{hotkey}: input continued after cancel at {raise_at}: {n} calls");
        }
    }

    #[test]
    fn cancellation_at_any_point_leaves_no_lease_behind() {
        assert_cancellation_is_clean(Hotkey::F8, &[(0, BOW), (1, BLESSING)]);
    }

    #[test]
    fn spec_stack_cancels_cleanly() {
        assert_cancellation_is_clean(Hotkey::F11, &[(4, GRANITE_MAUL)]);
    }

    #[test]
    fn spec_bar_finish_cancels_cleanly() {
        assert_cancellation_is_clean(Hotkey::F10, &[(0, AGS)]);
    }

    #[test]
    fn spell_finish_cancels_cleanly() {
        assert_cancellation_is_clean(Hotkey::F6, &[(0, STAFF), (1, ROBE), (2, SPIRIT)]);
    }
}
