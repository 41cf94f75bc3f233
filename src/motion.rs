/// Pointer motion and timing model.
///
/// Every delay a sequence takes is drawn from a narrow `DelayRange` rather
/// than a constant, pointer moves follow a randomized cubic Bézier with
/// per-step jitter, and step deadlines are hit with `PreciseSleeper`
/// (park for half the remaining time, spin the last fraction of a
/// millisecond). Every wait is a suspension point that honours the action's
/// `StopSignal`.
use crate::{
    input::{InputError, MouseButton, Point, SharedDevice},
    stop::StopSignal,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::TAU;
use std::time::{Duration, Instant};

/// Default number of samples along a move.
pub const CURVE_STEPS: usize = 24;
/// Default per-step jitter in pixels.
pub const CURVE_JITTER: i32 = 6;
/// Default random offset applied to click targets.
pub const CLICK_OFFSET: i32 = 4;

// ---------------------------------------------------------------------------
// Delay ranges
// ---------------------------------------------------------------------------

/// Uniform range a delay is drawn from, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayRange {
    pub min_ms: f64,
    pub max_ms: f64,
}

impl DelayRange {
    pub const fn new(min_ms: f64, max_ms: f64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let ms = if self.max_ms > self.min_ms {
            rng.random_range(self.min_ms..=self.max_ms)
        } else {
            self.min_ms
        };
        Duration::from_secs_f64(ms.max(0.0) / 1_000.0)
    }
}

pub const INVENTORY_CLICK:   DelayRange = DelayRange::new(21.0, 37.0);
pub const PRAYER_CLICK:      DelayRange = DelayRange::new(19.0, 32.0);
pub const TAB_SWITCH:        DelayRange = DelayRange::new(21.0, 44.0);
pub const POINTER_RESTORE:   DelayRange = DelayRange::new(14.0, 30.0);
pub const GEAR_SETTLE:       DelayRange = DelayRange::new(17.0, 31.0);
pub const POINTER_MOVE:      DelayRange = DelayRange::new(13.0, 26.0);
pub const SPEC_BAR_WAIT:     DelayRange = DelayRange::new(24.0, 38.0);
pub const SPEC_BAR_PRECLICK: DelayRange = DelayRange::new(16.0, 32.0);
pub const DOUBLE_CLICK_GAP:  DelayRange = DelayRange::new(37.0, 82.0);
pub const SPEC_BAR_SETTLE:   DelayRange = DelayRange::new(11.0, 16.0);
pub const SPELL_SETTLE:      DelayRange = DelayRange::new(19.0, 32.0);
pub const PRAYER_VERIFY:     DelayRange = DelayRange::new(70.0, 80.0);
pub const SHIFT_RESTORE:     DelayRange = DelayRange::new(4.0, 8.0);

// Spec-stack timings (weapon click → attack tab → double spec → back).
pub const STACK_WEAPON_CLICK: DelayRange = DelayRange::new(24.0, 38.0);
pub const STACK_TAB_WAIT:     DelayRange = DelayRange::new(21.0, 34.0);
pub const STACK_SPEC_WAIT:    DelayRange = DelayRange::new(24.0, 40.0);
pub const STACK_SPEC_AFTER:   DelayRange = DelayRange::new(22.0, 33.0);
pub const STACK_FINAL_CLICK:  DelayRange = DelayRange::new(17.0, 28.0);

// ---------------------------------------------------------------------------
// PreciseSleeper
// ---------------------------------------------------------------------------

/// Hybrid park/spin sleeper. `thread::sleep` alone oversleeps by up to a
/// scheduler quantum; spinning alone burns a core.
#[derive(Debug, Clone, Copy)]
pub struct PreciseSleeper {
    spin_threshold: Duration,
}

impl Default for PreciseSleeper {
    fn default() -> Self {
        Self::new(Duration::from_micros(800))
    }
}

impl PreciseSleeper {
    pub fn new(spin_threshold: Duration) -> Self {
        Self { spin_threshold }
    }

    /// Sleep until `deadline`. Returns false if `stop` was raised first.
    pub fn sleep_until(&self, deadline: Instant, stop: &StopSignal) -> bool {
        loop {
            if stop.is_raised() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let remain = deadline - now;
            if remain > self.spin_threshold {
                std::thread::sleep(remain / 2);
            } else {
                std::hint::spin_loop();
                std::thread::yield_now();
            }
        }
    }

    pub fn sleep(&self, duration: Duration, stop: &StopSignal) -> bool {
        self.sleep_until(Instant::now() + duration, stop)
    }
}

// ---------------------------------------------------------------------------
// Curves
// ---------------------------------------------------------------------------

/// Point on the cubic Bézier `p0..p3` at `t` in [0, 1].
pub fn bezier(p0: (f64, f64), p1: (f64, f64), p2: (f64, f64), p3: (f64, f64), t: f64) -> (f64, f64) {
    let omt = 1.0 - t;
    let omt2 = omt * omt;
    let omt3 = omt2 * omt;
    let t2 = t * t;
    let t3 = t2 * t;
    (
        omt3 * p0.0 + 3.0 * omt2 * t * p1.0 + 3.0 * omt * t2 * p2.0 + t3 * p3.0,
        omt3 * p0.1 + 3.0 * omt2 * t * p1.1 + 3.0 * omt * t2 * p2.1 + t3 * p3.1,
    )
}

/// Shape of one pointer move.
#[derive(Debug, Clone, Copy)]
pub struct Path {
    pub duration: Duration,
    pub steps:    usize,
    pub jitter:   i32,
}

impl Path {
    pub fn new(duration: Duration, steps: usize, jitter: i32) -> Self {
        Self { duration, steps, jitter }
    }
}

// ---------------------------------------------------------------------------
// MotionProfile
// ---------------------------------------------------------------------------

/// Owns the RNG and sleeper used by one drain worker.
pub struct MotionProfile {
    rng:     StdRng,
    sleeper: PreciseSleeper,
}

impl MotionProfile {
    pub fn new(sleeper: PreciseSleeper) -> Self {
        Self { rng: StdRng::from_os_rng(), sleeper }
    }

    pub fn seeded(seed: u64, sleeper: PreciseSleeper) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), sleeper }
    }

    pub fn delay(&mut self, range: DelayRange) -> Duration {
        range.sample(&mut self.rng)
    }

    /// Sleep for a duration drawn from `range`. False if interrupted.
    pub fn pause(&mut self, range: DelayRange, stop: &StopSignal) -> bool {
        let d = self.delay(range);
        self.sleeper.sleep(d, stop)
    }

    /// Uniform offset in `[-amount, amount]` on both axes.
    pub fn offset(&mut self, amount: i32) -> (i32, i32) {
        let amount = amount.abs();
        (
            self.rng.random_range(-amount..=amount),
            self.rng.random_range(-amount..=amount),
        )
    }

    /// Move along a randomized curve to `target`. Returns Ok(false) if the
    /// stop signal interrupted the move; the pointer is then left wherever
    /// the last completed step put it.
    pub fn move_to(
        &mut self,
        device: &SharedDevice,
        target: Point,
        path: Path,
        stop: &StopSignal,
    ) -> Result<bool, InputError> {
        let start = device.lock().cursor()?;
        let p0 = (start.x as f64, start.y as f64);
        let p3 = (target.x as f64, target.y as f64);
        let mid = (
            ((start.x + target.x) / 2) as f64,
            ((start.y + target.y) / 2) as f64,
        );

        let variation = self.rng.random_range(10_i32..=80) as f64;
        let angle = self.rng.random_range(0.0..TAU);
        let angle2 = angle + self.rng.random_range(-0.8..=0.8);
        let r1 = variation * self.rng.random_range(0.3..=1.0);
        let r2 = variation * self.rng.random_range(0.3..=1.0);
        let p1 = (mid.0 + (r1 * angle.cos()).trunc(), mid.1 + (r1 * angle.sin()).trunc());
        let p2 = (mid.0 + (r2 * angle2.cos()).trunc(), mid.1 + (r2 * angle2.sin()).trunc());

        let steps = path.steps.max(1);
        let per_step = path.duration / steps as u32;
        let jitter = path.jitter.abs();
        let t0 = Instant::now();

        for i in 1..=steps {
            if stop.is_raised() {
                tracing::debug!("Move to ({}, {}) interrupted at step {}/{}", target.x, target.y, i, steps);
                return Ok(false);
            }
            let t = i as f64 / steps as f64;
            let (px, py) = bezier(p0, p1, p2, p3, t);
            let jx = self.rng.random_range(-jitter..=jitter);
            let jy = self.rng.random_range(-jitter..=jitter);
            device.lock().set_cursor(Point::new(px as i32 + jx, py as i32 + jy))?;

            if !self.sleeper.sleep_until(t0 + per_step * i as u32, stop) {
                tracing::debug!("Move to ({}, {}) interrupted after step {}/{}", target.x, target.y, i, steps);
                return Ok(false);
            }
        }
        device.lock().set_cursor(target)?;
        Ok(true)
    }

    /// Default-shaped move lasting a duration drawn from `range`.
    pub fn glide(
        &mut self,
        device: &SharedDevice,
        target: Point,
        range: DelayRange,
        stop: &StopSignal,
    ) -> Result<bool, InputError> {
        let duration = self.delay(range);
        self.move_to(device, target, Path::new(duration, CURVE_STEPS, CURVE_JITTER), stop)
    }

    pub fn click(&mut self, device: &SharedDevice, stop: &StopSignal) -> Result<(), InputError> {
        if stop.is_raised() {
            return Ok(());
        }
        device.lock().click(MouseButton::Left)
    }

    /// Move near `target` (± `CLICK_OFFSET`) and left-click.
    pub fn click_at(
        &mut self,
        device: &SharedDevice,
        target: Point,
        range: DelayRange,
        stop: &StopSignal,
    ) -> Result<(), InputError> {
        if stop.is_raised() {
            return Ok(());
        }
        let (dx, dy) = self.offset(CLICK_OFFSET);
        if !self.glide(device, target.offset(dx, dy), range, stop)? {
            return Ok(());
        }
        self.click(device, stop)
    }
}
