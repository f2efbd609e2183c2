//! Centralized configuration for Lockstep.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

/// Central configuration for all Lockstep simulations.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct LockstepConfig {
    pub timing: TimingConfig,
    pub producer_consumer: ProducerConsumerConfig,
    pub dining: DiningPhilosophersConfig,
    pub reader_writer: ReaderWriterConfig,
}

/// Timing behavior shared by every simulation.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Multiplier applied to every simulated work delay. The default of 2.0
    /// runs simulations at half real speed to keep visualization legible.
    pub speed_factor: f64,
    /// Poll granularity of the cooperative pause loop.
    pub pause_poll: Duration,
    /// Fixed delay before retrying a failed non-blocking acquisition.
    pub backoff: Duration,
    /// How long `stop` waits for cancelled workers to unwind.
    pub stop_grace: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            speed_factor: 2.0,
            pause_poll: Duration::from_millis(100),
            backoff: Duration::from_millis(100),
            stop_grace: Duration::from_secs(2),
        }
    }
}

/// Parameters of the bounded-buffer producer/consumer simulation.
#[derive(Debug, Clone)]
pub struct ProducerConsumerConfig {
    pub producers: usize,
    pub consumers: usize,
    /// Bounded buffer capacity.
    pub capacity: usize,
    /// Time to produce one item.
    pub production_delay: Duration,
    /// Time to consume one item.
    pub consumption_delay: Duration,
}

impl Default for ProducerConsumerConfig {
    fn default() -> Self {
        Self {
            producers: 2,
            consumers: 2,
            capacity: 5,
            production_delay: Duration::from_millis(1000),
            consumption_delay: Duration::from_millis(1500),
        }
    }
}

/// Parameters of the dining philosophers simulation.
#[derive(Debug, Clone)]
pub struct DiningPhilosophersConfig {
    pub philosophers: usize,
    pub thinking_delay: Duration,
    pub eating_delay: Duration,
    /// When enabled, odd philosophers acquire their forks in reversed order,
    /// breaking the circular wait of the classic deadlock.
    pub deadlock_avoidance: bool,
}

impl Default for DiningPhilosophersConfig {
    fn default() -> Self {
        Self {
            philosophers: 5,
            thinking_delay: Duration::from_millis(2000),
            eating_delay: Duration::from_millis(1000),
            deadlock_avoidance: true,
        }
    }
}

/// Parameters of the reader-writer simulation.
#[derive(Debug, Clone)]
pub struct ReaderWriterConfig {
    pub readers: usize,
    pub writers: usize,
    pub read_delay: Duration,
    pub write_delay: Duration,
    /// When enabled, a waiting writer blocks admission of new readers until
    /// it has acquired and released the lock.
    pub writer_priority: bool,
    /// Pause between two reads by the same reader.
    pub inter_read_pause: Duration,
    /// Pause between two writes by the same writer.
    pub inter_write_pause: Duration,
}

impl Default for ReaderWriterConfig {
    fn default() -> Self {
        Self {
            readers: 3,
            writers: 2,
            read_delay: Duration::from_millis(1000),
            write_delay: Duration::from_millis(2000),
            writer_priority: false,
            inter_read_pause: Duration::from_millis(500),
            inter_write_pause: Duration::from_millis(1000),
        }
    }
}

impl TimingConfig {
    /// Creates timing suitable for tests: real speed, tight poll and backoff
    /// intervals, short grace period.
    pub fn for_testing() -> Self {
        Self {
            speed_factor: 1.0,
            pause_poll: Duration::from_millis(10),
            backoff: Duration::from_millis(5),
            stop_grace: Duration::from_millis(500),
        }
    }
}

impl LockstepConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(factor) = std::env::var("LOCKSTEP_SPEED_FACTOR") {
            if let Ok(value) = factor.parse::<f64>() {
                if value > 0.0 {
                    config.timing.speed_factor = value;
                }
            }
        }

        if let Ok(grace) = std::env::var("LOCKSTEP_STOP_GRACE_MS") {
            if let Ok(millis) = grace.parse::<u64>() {
                config.timing.stop_grace = Duration::from_millis(millis);
            }
        }

        if let Ok(poll) = std::env::var("LOCKSTEP_PAUSE_POLL_MS") {
            if let Ok(millis) = poll.parse::<u64>() {
                config.timing.pause_poll = Duration::from_millis(millis);
            }
        }

        config
    }

    /// Creates a configuration optimized for testing: millisecond-scale
    /// delays so properties can be observed within a short bounded run.
    pub fn for_testing() -> Self {
        Self {
            timing: TimingConfig::for_testing(),
            producer_consumer: ProducerConsumerConfig {
                production_delay: Duration::from_millis(10),
                consumption_delay: Duration::from_millis(15),
                ..Default::default()
            },
            dining: DiningPhilosophersConfig {
                thinking_delay: Duration::from_millis(10),
                eating_delay: Duration::from_millis(5),
                ..Default::default()
            },
            reader_writer: ReaderWriterConfig {
                read_delay: Duration::from_millis(10),
                write_delay: Duration::from_millis(20),
                inter_read_pause: Duration::from_millis(5),
                inter_write_pause: Duration::from_millis(10),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = LockstepConfig::default();

        assert_eq!(config.timing.speed_factor, 2.0);
        assert_eq!(config.timing.pause_poll, Duration::from_millis(100));
        assert_eq!(config.timing.stop_grace, Duration::from_secs(2));
        assert_eq!(config.producer_consumer.producers, 2);
        assert_eq!(config.producer_consumer.capacity, 5);
        assert_eq!(config.dining.philosophers, 5);
        assert!(config.dining.deadlock_avoidance);
        assert_eq!(config.reader_writer.readers, 3);
        assert!(!config.reader_writer.writer_priority);
    }

    #[test]
    fn test_testing_preset_runs_at_real_speed() {
        let config = LockstepConfig::for_testing();
        assert_eq!(config.timing.speed_factor, 1.0);
        assert!(config.producer_consumer.production_delay < Duration::from_millis(100));
        assert!(config.timing.stop_grace < Duration::from_secs(1));
    }

    // Single test for all env interactions so parallel test threads never
    // race on the shared process environment.
    #[test]
    fn test_env_overrides_and_invalid_values() {
        unsafe {
            std::env::set_var("LOCKSTEP_SPEED_FACTOR", "0.5");
            std::env::set_var("LOCKSTEP_STOP_GRACE_MS", "750");
            std::env::set_var("LOCKSTEP_PAUSE_POLL_MS", "25");
        }

        let config = LockstepConfig::from_env();
        assert_eq!(config.timing.speed_factor, 0.5);
        assert_eq!(config.timing.stop_grace, Duration::from_millis(750));
        assert_eq!(config.timing.pause_poll, Duration::from_millis(25));

        // A non-positive speed factor is ignored in favor of the default.
        unsafe {
            std::env::set_var("LOCKSTEP_SPEED_FACTOR", "-3");
            std::env::remove_var("LOCKSTEP_STOP_GRACE_MS");
            std::env::remove_var("LOCKSTEP_PAUSE_POLL_MS");
        }
        let config = LockstepConfig::from_env();
        assert_eq!(config.timing.speed_factor, 2.0);
        assert_eq!(config.timing.stop_grace, Duration::from_secs(2));

        unsafe {
            std::env::remove_var("LOCKSTEP_SPEED_FACTOR");
        }
    }
}
