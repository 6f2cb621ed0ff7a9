/// What a scan does when no coroutine in the ring can run.
///
/// Through the public API this is not expected to happen: waiting twice on a
/// coroutine, or on itself, aborts, and the root cannot be waited on, so every
/// chain of waiters ends at a coroutine that can run. In particular this does
/// not catch coroutines waiting on each other, since the root keeps running.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum Livelock {
    /// Keep scanning. Nothing can change, so the thread hangs.
    #[default]
    Spin,
    /// Log a diagnostic and abort the process.
    Abort,
}

/// Per-thread runtime settings, see [`crate::configure`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Config {
    stack_size: usize,
    livelock: Livelock,
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    /// Stack size of coroutines created through [`crate::create`] and [`crate::spawn`].
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn livelock(&self) -> Livelock {
        self.livelock
    }

    pub fn with_livelock(mut self, livelock: Livelock) -> Self {
        self.livelock = livelock;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            stack_size: memory_pool::DEFAULT_STACK_SIZE,
            livelock: Livelock::Spin,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{Config, Livelock};

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(64 * 1024, config.stack_size());
        assert_eq!(Livelock::Spin, config.livelock());

        let config = config
            .with_stack_size(128 * 1024)
            .with_livelock(Livelock::Abort);
        assert_eq!(128 * 1024, config.stack_size());
        assert_eq!(Livelock::Abort, config.livelock());
    }
}
