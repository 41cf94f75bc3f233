/// Pointer and keyboard capability.
///
/// The actual OS mechanism sits behind `InputDevice`. Devices are not assumed
/// to be thread-safe, so the one instance is shared as a `SharedDevice`
/// (mutex-wrapped) between the action drain worker and the suppression
/// watcher, the only two callers.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    LShift,
    RShift,
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("input rejected: {0}")]
    Rejected(String),
}

pub trait InputDevice: Send {
    fn cursor(&mut self) -> Result<Point, InputError>;
    fn set_cursor(&mut self, at: Point) -> Result<(), InputError>;

    fn button_down(&mut self, button: MouseButton) -> Result<(), InputError>;
    fn button_up(&mut self, button: MouseButton) -> Result<(), InputError>;
    fn is_button_down(&mut self, button: MouseButton) -> Result<bool, InputError>;

    fn key_down(&mut self, key: Key) -> Result<(), InputError>;
    fn key_up(&mut self, key: Key) -> Result<(), InputError>;
    fn is_key_down(&mut self, key: Key) -> Result<bool, InputError>;

    fn click(&mut self, button: MouseButton) -> Result<(), InputError> {
        self.button_down(button)?;
        self.button_up(button)
    }

    fn tap(&mut self, key: Key) -> Result<(), InputError> {
        self.key_down(key)?;
        self.key_up(key)
    }
}

/// Cheap, cloneable handle to the single device instance.
#[derive(Clone)]
pub struct SharedDevice(Arc<Mutex<Box<dyn InputDevice>>>);

impl SharedDevice {
    pub fn new(device: impl InputDevice + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(device))))
    }

    pub fn lock(&self) -> MutexGuard<'_, Box<dyn InputDevice>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// DryRunDevice
// ---------------------------------------------------------------------------

/// Tracks pointer/button/key state in memory and logs every call instead of
/// touching the OS. The binary runs with this until a platform backend is
/// plugged in. Releasing a button or key that is not held is rejected.
#[derive(Debug, Default)]
pub struct DryRunDevice {
    cursor:  Point,
    buttons: HashSet<MouseButton>,
    keys:    HashSet<Key>,
}

impl DryRunDevice {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputDevice for DryRunDevice {
    fn cursor(&mut self) -> Result<Point, InputError> {
        Ok(self.cursor)
    }

    fn set_cursor(&mut self, at: Point) -> Result<(), InputError> {
        tracing::trace!("[dry-run] cursor -> ({}, {})", at.x, at.y);
        self.cursor = at;
        Ok(())
    }

    fn button_down(&mut self, button: MouseButton) -> Result<(), InputError> {
        tracing::debug!("[dry-run] {:?} down at ({}, {})", button, self.cursor.x, self.cursor.y);
        self.buttons.insert(button);
        Ok(())
    }

    fn button_up(&mut self, button: MouseButton) -> Result<(), InputError> {
        if !self.buttons.remove(&button) {
            return Err(InputError::Rejected(format!("{:?} released while not held", button)));
        }
        tracing::debug!("[dry-run] {:?} up", button);
        Ok(())
    }

    fn is_button_down(&mut self, button: MouseButton) -> Result<bool, InputError> {
        Ok(self.buttons.contains(&button))
    }

    fn key_down(&mut self, key: Key) -> Result<(), InputError> {
        tracing::debug!("[dry-run] key {:?} down", key);
        self.keys.insert(key);
        Ok(())
    }

    fn key_up(&mut self, key: Key) -> Result<(), InputError> {
        if !self.keys.remove(&key) {
            return Err(InputError::Rejected(format!("key {:?} released while not held", key)));
        }
        tracing::debug!("[dry-run] key {:?} up", key);
        Ok(())
    }

    fn is_key_down(&mut self, key: Key) -> Result<bool, InputError> {
        Ok(self.keys.contains(&key))
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_tracks_state() {
        let device = SharedDevice::new(DryRunDevice::new());
        {
            let mut d = device.lock();
            d.set_cursor(Point::new(10, 20)).unwrap();
            d.button_down(MouseButton::Left).unwrap();
            d.key_down(Key::LShift).unwrap();
        }
        let mut d = device.lock();
        assert_eq!(d.cursor().unwrap(), Point::new(10, 20));
        assert!(d.is_button_down(MouseButton::Left).unwrap());
        assert!(d.is_key_down(Key::LShift).unwrap());
        d.click(MouseButton::Left).unwrap();
        assert!(!d.is_button_down(MouseButton::Left).unwrap());
    }

    #[test]
    fn dry_run_rejects_release_of_unheld_input() {
        let mut d = DryRunDevice::new();
        assert!(matches!(d.button_up(MouseButton::Left), Err(InputError::Rejected(_))));
        assert!(matches!(d.key_up(Key::RShift), Err(InputError::Rejected(_))));
        d.tap(Key::Char('a')).unwrap();
        assert!(d.key_up(Key::Char('a')).is_err(), "tap leaves the key released");
    }
}
