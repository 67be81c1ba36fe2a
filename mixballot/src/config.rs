use crate::Error;
use std::time::Duration;

pub const STREAM_TIMEOUT_ENV: &str = "MIXBALLOT_STREAM_TIMEOUT_SECS";
pub const POLL_ATTEMPTS_ENV: &str = "MIXBALLOT_POLL_ATTEMPTS_PER_MEMBER";
pub const POLL_INTERVAL_ENV: &str = "MIXBALLOT_POLL_INTERVAL_MS";

/// Timing of a shuffle run
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShuffleConfig {
    /// Maximum time to deliver the StartShuffle message to the roster
    pub stream_timeout: Duration,

    /// Number of times the store is polled, per roster member, before giving up
    pub poll_attempts_per_member: usize,

    /// Base interval between two polls, scaled with the roster size
    pub poll_interval: Duration,
}

impl Default for ShuffleConfig {
    fn default() -> Self {
        ShuffleConfig {
            stream_timeout: Duration::from_secs(30),
            poll_attempts_per_member: 10,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl ShuffleConfig {
    /// Defaults overridden by the `MIXBALLOT_*` environment variables that are set
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, Error> {
        let mut config = ShuffleConfig::default();

        if let Some(secs) = parse(&lookup, STREAM_TIMEOUT_ENV)? {
            config.stream_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse(&lookup, POLL_ATTEMPTS_ENV)? {
            config.poll_attempts_per_member = attempts as usize;
        }
        if let Some(millis) = parse(&lookup, POLL_INTERVAL_ENV)? {
            config.poll_interval = Duration::from_millis(millis);
        }

        Ok(config)
    }

    /// Total number of polls for a roster of `members` nodes
    pub fn poll_attempts(&self, members: usize) -> usize {
        members * self.poll_attempts_per_member
    }

    /// Time to wait between two polls for a roster of `members` nodes
    pub fn poll_wait(&self, members: usize) -> Duration {
        self.poll_interval * (members / 2 + 1) as u32
    }
}

fn parse<F: Fn(&str) -> Option<String>>(lookup: &F, key: &'static str) -> Result<Option<u64>, Error> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(key, value)),
    }
}
