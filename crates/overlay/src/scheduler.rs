use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_FRAMES: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// One frame request: which frame, and where in the stream it sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub index: u32,
    pub timestamp_us: u64,
}

/// Fixed-interval frame cadence. Pure state: the caller supplies `now` and
/// does the waiting, so the next tick is only scheduled once the current
/// one has completed.
#[derive(Debug)]
pub struct FrameScheduler {
    state: SchedulerState,
    interval: Duration,
    max_frames: u32,
    frame_index: u32,
    next_due: Option<Instant>,
    in_flight: bool,
    paused_while_running: bool,
}

impl FrameScheduler {
    pub fn new(interval: Duration, max_frames: u32) -> Self {
        Self {
            state: SchedulerState::Idle,
            interval,
            max_frames,
            frame_index: 0,
            next_due: None,
            in_flight: false,
            paused_while_running: false,
        }
    }

    /// Begin from frame 0 with the first tick due immediately. Returns false
    /// (and changes nothing) if already running or the source is not ready.
    pub fn start(&mut self, source_ready: bool, now: Instant) -> bool {
        if self.state == SchedulerState::Running {
            tracing::debug!("Scheduler already running");
            return false;
        }
        if !source_ready {
            tracing::warn!("Frame source not ready, scheduler stays idle");
            return false;
        }

        self.state = SchedulerState::Running;
        self.frame_index = 0;
        self.next_due = Some(now);
        self.in_flight = false;
        self.paused_while_running = false;
        true
    }

    /// Cancel the pending tick. A tick already in flight completes but is
    /// ignored.
    pub fn stop(&mut self) {
        self.state = SchedulerState::Idle;
        self.next_due = None;
        self.in_flight = false;
        self.paused_while_running = false;
    }

    pub fn pause(&mut self) {
        let was_running = self.state == SchedulerState::Running;
        self.state = SchedulerState::Idle;
        self.next_due = None;
        self.paused_while_running = was_running;
    }

    /// Replay from the first frame, as a fresh `start`. Only restarts a
    /// scheduler that was running when paused; a tick still in flight from
    /// before the pause is then ignored.
    pub fn resume(&mut self, now: Instant) -> bool {
        if !self.paused_while_running {
            return false;
        }
        self.start(true, now)
    }

    /// The tick due at `now`, if any. Reaching the frame cap ends the run.
    pub fn poll(&mut self, now: Instant) -> Option<Tick> {
        if self.state != SchedulerState::Running || self.in_flight {
            return None;
        }
        let due = self.next_due?;
        if now < due {
            return None;
        }

        if self.frame_index >= self.max_frames {
            tracing::info!(max_frames = self.max_frames, "Frame cap reached");
            self.state = SchedulerState::Idle;
            self.next_due = None;
            return None;
        }

        self.in_flight = true;
        self.next_due = None;
        Some(Tick {
            index: self.frame_index,
            timestamp_us: self.frame_index as u64 * self.interval.as_micros() as u64,
        })
    }

    /// Finish the in-flight tick. `frame_found == false` is end of stream.
    pub fn complete(&mut self, frame_found: bool, now: Instant) {
        if !self.in_flight {
            return;
        }
        self.in_flight = false;

        if !frame_found {
            if self.state == SchedulerState::Running {
                tracing::info!(frame_index = self.frame_index, "End of stream");
            }
            self.state = SchedulerState::Idle;
            self.next_due = None;
            self.paused_while_running = false;
            return;
        }

        self.frame_index += 1;
        if self.state == SchedulerState::Running {
            self.next_due = Some(now + self.interval);
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.paused_while_running
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_INTERVAL, DEFAULT_MAX_FRAMES)
    }
}
