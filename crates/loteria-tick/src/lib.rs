//! Draw timer for Lotería rooms.
//!
//! A room reveals its deck on a fixed cadence. The timer owned by each
//! room goes through three timed phases:
//!
//! ```text
//! arm()                     begin_grace()
//!   │  warm-up    draw  draw  draw …  last │    grace      GraceElapsed
//!   ├───────────►│◄───►│◄───►│         ───┼──────────────►│
//!   Idle → WarmUp → Drawing ──────────────→ Grace ─────────→ Idle
//! ```
//!
//! - **Warm-up**: a one-shot delay between "game started" and the first
//!   reveal, so clients can render their boards first.
//! - **Drawing**: one [`TimerEvent::Draw`] per interval.
//! - **Grace**: after the last card, a one-shot window during which a win
//!   may still be claimed; ends with [`TimerEvent::GraceElapsed`].
//!
//! [`DrawScheduler::cancel`] returns to `Idle` from any phase. Every phase
//! change is a plain field assignment, so once `cancel` or `begin_grace`
//! has returned no further draw can be produced.
//!
//! # Integration
//!
//! The scheduler sits inside a room actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* join, start, claim… */ }
//!         event = scheduler.wait() => match event {
//!             TimerEvent::Draw { .. } => { /* reveal next card */ }
//!             TimerEvent::GraceElapsed => { /* end the game */ }
//!         },
//!     }
//! }
//! ```
//!
//! [`DrawScheduler::wait`] is cancel-safe: if another `select!` branch
//! wins, the dropped future has not touched the scheduler.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Durations for one game's timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawTimings {
    /// Delay between arming and the first draw.
    pub warm_up: Duration,
    /// Delay between consecutive draws.
    pub interval: Duration,
    /// Window after the last draw before the game auto-closes.
    pub grace: Duration,
}

impl Default for DrawTimings {
    fn default() -> Self {
        Self {
            warm_up: Duration::from_millis(2_000),
            interval: Duration::from_millis(4_000),
            grace: Duration::from_millis(4_000),
        }
    }
}

impl DrawTimings {
    /// Shortest interval accepted. A zero interval would spin the room
    /// actor without ever yielding to commands.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

    /// Fix any out-of-range values so the timings are safe to use.
    ///
    /// Called automatically by [`DrawScheduler::arm`].
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_secs_f64() * 1000.0,
                "draw interval below minimum — clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Events and phases
// ---------------------------------------------------------------------------

/// What the timer asks the room to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Reveal the next card. `tick` counts draws since the last `arm`,
    /// starting at 1.
    Draw { tick: u64 },
    /// The grace period after the last card ran out.
    GraceElapsed,
}

/// Where the timer currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    /// Nothing armed; `wait` pends forever.
    Idle,
    /// Waiting for the first draw.
    WarmUp { first_draw_at: Instant },
    /// Drawing one card per interval.
    Drawing { next_draw_at: Instant },
    /// Last card drawn; waiting for the grace period to end.
    Grace { expires_at: Instant },
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The draw timer of a single room. One per room actor, never shared.
#[derive(Debug)]
pub struct DrawScheduler {
    timings: DrawTimings,
    phase: TimerPhase,
    /// Draws produced since the last `arm`.
    ticks: u64,
    /// Wake-ups that came at least one full interval late.
    overruns: u64,
}

impl DrawScheduler {
    /// Creates an idle scheduler.
    pub fn new() -> Self {
        Self {
            timings: DrawTimings::default(),
            phase: TimerPhase::Idle,
            ticks: 0,
            overruns: 0,
        }
    }

    /// Arms the timer for a new game: warm-up, then one draw per interval.
    ///
    /// Replaces whatever was armed before, so a restarted game can never
    /// receive a tick belonging to the previous one.
    pub fn arm(&mut self, timings: DrawTimings) {
        let timings = timings.validated();
        if self.is_armed() {
            debug!(phase = ?self.phase, "re-arming draw timer — previous schedule dropped");
        }
        self.timings = timings;
        self.ticks = 0;
        self.phase = TimerPhase::WarmUp {
            first_draw_at: Instant::now() + timings.warm_up,
        };
        debug!(
            warm_up_ms = timings.warm_up.as_millis(),
            interval_ms = timings.interval.as_millis(),
            "draw timer armed"
        );
    }

    /// Stops the repeating draw immediately and starts the grace period.
    ///
    /// Called in the same turn as the last draw, so the room never waits
    /// an extra interval before the countdown begins.
    pub fn begin_grace(&mut self) {
        self.phase = TimerPhase::Grace {
            expires_at: Instant::now() + self.timings.grace,
        };
        debug!(
            ticks = self.ticks,
            grace_ms = self.timings.grace.as_millis(),
            "draws stopped — grace period started"
        );
    }

    /// Cancels everything. Safe to call when nothing is armed.
    pub fn cancel(&mut self) {
        if self.is_armed() {
            debug!(phase = ?self.phase, ticks = self.ticks, "draw timer cancelled");
        }
        self.phase = TimerPhase::Idle;
    }

    /// Waits until the next timer event is due.
    ///
    /// Pends forever while idle; `tokio::select!` keeps serving its other
    /// branches.
    pub async fn wait(&mut self) -> TimerEvent {
        let deadline = match self.phase {
            TimerPhase::Idle => return std::future::pending().await,
            TimerPhase::WarmUp { first_draw_at } => first_draw_at,
            TimerPhase::Drawing { next_draw_at } => next_draw_at,
            TimerPhase::Grace { expires_at } => expires_at,
        };

        time::sleep_until(deadline).await;

        // Nothing below awaits: the phase change and the returned event
        // happen together or not at all.
        if let TimerPhase::Grace { .. } = self.phase {
            self.phase = TimerPhase::Idle;
            trace!("grace period elapsed");
            return TimerEvent::GraceElapsed;
        }

        let now = Instant::now();
        let interval = self.timings.interval;
        let late_by = now.saturating_duration_since(deadline);

        // A late wake-up never produces a burst of catch-up draws: the
        // cadence restarts from now.
        let next_draw_at = if late_by >= interval {
            self.overruns += 1;
            warn!(
                tick = self.ticks + 1,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "draw timer overrun — re-anchoring cadence"
            );
            now + interval
        } else {
            deadline + interval
        };

        self.phase = TimerPhase::Drawing { next_draw_at };
        self.ticks += 1;
        trace!(tick = self.ticks, "draw tick");
        TimerEvent::Draw { tick: self.ticks }
    }

    /// Current phase.
    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    /// Whether any phase is pending.
    pub fn is_armed(&self) -> bool {
        self.phase != TimerPhase::Idle
    }

    /// Whether the repeating draw (including its warm-up) is active.
    pub fn is_drawing(&self) -> bool {
        matches!(self.phase, TimerPhase::WarmUp { .. } | TimerPhase::Drawing { .. })
    }

    /// Draws produced since the last `arm`.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Late wake-ups observed over the scheduler's lifetime.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

impl Default for DrawScheduler {
    fn default() -> Self {
        Self::new()
    }
}
