/// Where a polled resource is in its fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// Nothing requested yet.
    Idle,
    /// First fetch in flight; there is no real data yet.
    Loading,
    Ready,
    /// A later fetch is in flight; the previous data is still shown.
    Refreshing,
    /// The most recent applied fetch failed; the previous data is still shown.
    Error,
}

/// State behind one polled resource. Data is replaced only by a successful fetch, so a
/// failed poll leaves the last good snapshot on screen with `error` set next to it.
///
/// Every fetch takes a sequence number from `begin`. A completion is applied only if it is
/// newer than the last one applied, so a slow response can never overwrite a fresher one.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState<T> {
    pub data: T,
    pub error: Option<String>,
    phase: PollPhase,
    issued: u64,
    applied: u64,
}

impl<T> PollState<T> {
    pub fn new(initial: T) -> Self {
        PollState {
            data: initial,
            error: None,
            phase: PollPhase::Idle,
            issued: 0,
            applied: 0,
        }
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// True until the first fetch completes, successfully or not.
    pub fn loading(&self) -> bool {
        matches!(self.phase, PollPhase::Idle | PollPhase::Loading)
    }

    /// Starts a fetch and returns its sequence number.
    pub fn begin(&mut self) -> u64 {
        self.issued += 1;
        self.phase = match self.phase {
            PollPhase::Idle | PollPhase::Loading => PollPhase::Loading,
            PollPhase::Ready | PollPhase::Refreshing | PollPhase::Error => PollPhase::Refreshing,
        };
        self.issued
    }

    /// Applies the result of fetch `seq`. Returns false when the result was stale and dropped.
    pub fn complete(&mut self, seq: u64, result: Result<T, String>) -> bool {
        if seq <= self.applied || seq > self.issued {
            return false;
        }
        self.applied = seq;
        match result {
            Ok(data) => {
                self.data = data;
                self.error = None;
                self.phase = PollPhase::Ready;
            }
            Err(e) => {
                self.error = Some(e);
                self.phase = PollPhase::Error;
            }
        }
        true
    }
}
