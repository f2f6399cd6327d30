use std::time::{Duration, Instant};

/// Monotonic time origin for a run of ticks.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    origin: Instant,
}

impl FrameClock {
    pub fn start() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(origin: Instant) -> Self {
        Self { origin }
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }

    pub fn restart(&mut self) {
        self.origin = Instant::now();
    }

    pub fn restart_at(&mut self, origin: Instant) {
        self.origin = origin;
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }

    /// Time since the origin; instants before it read as zero.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.origin)
    }

    pub fn elapsed_seconds(&self, now: Instant) -> f64 {
        self.elapsed_at(now).as_secs_f64()
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::start()
    }
}

/// Identifier of a pending frame request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequest(u64);

/// One-shot frame requests in the style of `requestAnimationFrame`: a tick
/// may only run against a pending request, and each tick must ask again for
/// the next one.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    pending: Option<FrameRequest>,
    next_id: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the next frame, replacing any request still pending.
    pub fn request(&mut self) -> FrameRequest {
        self.next_id += 1;
        let request = FrameRequest(self.next_id);
        self.pending = Some(request);
        request
    }

    /// Cancels `request` if it is still the pending one.
    pub fn cancel(&mut self, request: FrameRequest) -> bool {
        if self.pending == Some(request) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Cancels whatever is pending.
    pub fn cancel_pending(&mut self) -> Option<FrameRequest> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Consumes the pending request so the caller can run its tick.
    pub fn take(&mut self) -> Option<FrameRequest> {
        self.pending.take()
    }
}
