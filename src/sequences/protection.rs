/// Standalone protection switch queued by the protection poller.
use super::{steps::RESTORE_LOOSE, Switcher};
use crate::{items::ProtectionKind, stop::StopSignal};
use anyhow::Result;

impl Switcher {
    /// Not cancellable: the poller never preempts and hotkeys only cancel
    /// their own class.
    pub fn protection_switch(&mut self, kind: ProtectionKind) -> Result<()> {
        let stop = StopSignal::new();
        let origin = self.ctx.device.lock().cursor()?;
        self.switch_prayers(&[], Some(kind), &stop)?;
        self.restore_pointer(origin, RESTORE_LOOSE, &stop)
    }
}
