/// Primitive steps shared by every sequence.
use super::Switcher;
use crate::{
    config::TabKeys,
    events::Tab,
    input::{InputError, Key, Point},
    motion::{
        DelayRange, Path, CURVE_JITTER, CURVE_STEPS, GEAR_SETTLE, INVENTORY_CLICK, POINTER_MOVE,
        POINTER_RESTORE, SHIFT_RESTORE, SPEC_BAR_SETTLE, SPELL_SETTLE, TAB_SWITCH,
    },
    stop::StopSignal,
};
use anyhow::Result;

/// Pointer restore shape at the end of a sequence.
#[derive(Debug, Clone, Copy)]
pub struct Restore {
    pub offset: i32,
    pub steps:  usize,
    pub jitter: i32,
}

/// Back onto the original spot.
pub const RESTORE_EXACT: Restore = Restore { offset: 0, steps: CURVE_STEPS / 4, jitter: 2 };
/// Near the original spot.
pub const RESTORE_LOOSE: Restore = Restore { offset: 4, steps: 10, jitter: 3 };

const SPEC_BAR_OFFSET: i32 = 3;

fn tab_key(keys: &TabKeys, tab: &Tab) -> Option<char> {
    match tab {
        Tab::Inventory => Some(keys.inventory),
        Tab::Prayer    => Some(keys.prayer),
        Tab::Spellbook => Some(keys.spellbook),
        Tab::Attack    => Some(keys.attack),
        Tab::Other(_)  => None,
    }
}

impl Switcher {
    /// Press the panel key, then settle the pointer in place for a
    /// tab-switch delay.
    pub fn switch_tab(&mut self, tab: &Tab, stop: &StopSignal) -> Result<()> {
        if stop.is_raised() {
            tracing::debug!("switch_tab {:?} interrupted", tab);
            return Ok(());
        }
        let Some(key) = tab_key(&self.ctx.tab_keys, tab) else {
            return Ok(());
        };
        let here = {
            let mut d = self.ctx.device.lock();
            d.tap(Key::Char(key))?;
            d.cursor()?
        };
        let settle = Path::new(self.motion.delay(TAB_SWITCH), 2, 1);
        self.motion.move_to(&self.ctx.device, here, settle, stop)?;
        Ok(())
    }

    /// Click an inventory slot. With the inventory open, a held shift would
    /// turn the click into a drop, so it is released for the click and
    /// pressed again afterwards.
    pub fn click_inventory_slot(&mut self, at: Point, inventory_open: bool, stop: &StopSignal) -> Result<()> {
        if stop.is_raised() {
            return Ok(());
        }
        let (released, release_err) = if inventory_open {
            self.release_shift()
        } else {
            (Vec::new(), None)
        };

        let clicked = match release_err {
            Some(e) => Err(e.into()),
            None => self.click_after(GEAR_SETTLE, at, stop),
        };
        let restored = self.press_again(&released, stop);
        clicked.and(restored)
    }

    /// Release whichever shift keys are held. Keys already released are
    /// returned even when a later device call fails.
    fn release_shift(&mut self) -> (Vec<Key>, Option<InputError>) {
        let mut released = Vec::new();
        let mut d = self.ctx.device.lock();
        for key in [Key::LShift, Key::RShift] {
            match d.is_key_down(key) {
                Ok(false) => {}
                Ok(true) => match d.key_up(key) {
                    Ok(()) => released.push(key),
                    Err(e) => return (released, Some(e)),
                },
                Err(e) => return (released, Some(e)),
            }
        }
        (released, None)
    }

    /// Press `keys` again unless the user already has. Every key is tried;
    /// the first failure is returned.
    fn press_again(&mut self, keys: &[Key], stop: &StopSignal) -> Result<()> {
        let mut first_err = None;
        for &key in keys {
            let pressed = {
                let mut d = self.ctx.device.lock();
                match d.is_key_down(key) {
                    Ok(true) => Ok(false),
                    Ok(false) => d.key_down(key).map(|()| true),
                    Err(e) => Err(e),
                }
            };
            match pressed {
                Ok(true) => {
                    self.motion.pause(SHIFT_RESTORE, stop);
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Could not press {:?} again: {}", key, e);
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn click_after(&mut self, settle: DelayRange, at: Point, stop: &StopSignal) -> Result<()> {
        if !self.motion.pause(settle, stop) {
            return Ok(());
        }
        self.motion.click_at(&self.ctx.device, at, INVENTORY_CLICK, stop)?;
        Ok(())
    }

    /// Open the spellbook and click `name`.
    pub fn cast_spell(&mut self, name: &str, stop: &StopSignal) -> Result<()> {
        self.switch_tab(&Tab::Spellbook, stop)?;
        let Some(at) = self.ctx.tables.coords.spell(name) else {
            tracing::warn!("No coordinates for spell '{}'", name);
            return Ok(());
        };
        if !self.motion.pause(SPELL_SETTLE, stop) {
            return Ok(());
        }
        self.motion.click_at(&self.ctx.device, at, POINTER_MOVE, stop)?;
        Ok(())
    }

    /// Click near the centre of the special-attack bar.
    pub fn click_spec_bar(&mut self, stop: &StopSignal) -> Result<()> {
        if stop.is_raised() {
            return Ok(());
        }
        let (dx, dy) = self.motion.offset(SPEC_BAR_OFFSET);
        let target = self.ctx.tables.coords.spec_bar.centre().offset(dx, dy);
        let path = Path::new(self.motion.delay(POINTER_MOVE), CURVE_STEPS / 2, CURVE_JITTER);
        if !self.motion.move_to(&self.ctx.device, target, path, stop)? {
            return Ok(());
        }
        if !self.motion.pause(SPEC_BAR_SETTLE, stop) {
            return Ok(());
        }
        self.motion.click(&self.ctx.device, stop)?;
        Ok(())
    }

    /// Glide back to where the pointer was before the sequence.
    pub fn restore_pointer(&mut self, origin: Point, shape: Restore, stop: &StopSignal) -> Result<()> {
        if stop.is_raised() {
            return Ok(());
        }
        let (dx, dy) = self.motion.offset(shape.offset);
        let target = origin.offset(dx, dy);
        let path = Path::new(self.motion.delay(POINTER_RESTORE), shape.steps, shape.jitter);
        if self.motion.move_to(&self.ctx.device, target, path, stop)? {
            tracing::debug!("Pointer restored to ({}, {})", target.x, target.y);
        }
        Ok(())
    }
}
