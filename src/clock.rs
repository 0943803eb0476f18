//! Time source for new profile ids

use crate::profile::ProfileId;

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;

    fn next_id(&self) -> ProfileId {
        ProfileId(self.now_millis())
    }
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that starts at a fixed instant and advances one millisecond per read
#[cfg(test)]
#[derive(Debug)]
pub struct SteppingClock(std::sync::atomic::AtomicI64);

#[cfg(test)]
impl SteppingClock {
    pub fn starting_at(millis: i64) -> Self {
        Self(std::sync::atomic::AtomicI64::new(millis))
    }
}

#[cfg(test)]
impl Clock for SteppingClock {
    fn now_millis(&self) -> i64 {
        self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}
