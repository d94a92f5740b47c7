//! Immutable pool configuration.

use typed_builder::TypedBuilder;

use crate::error::{Error, Result};

/// Configuration for a [`crate::manager::PoolManager`], immutable once the manager is
/// constructed.
///
/// `0` disables the corresponding time-based check (idle pruning, lifetime pruning); `max_wait_time_ms
/// = Some(0)` makes acquisition non-blocking, while `None` waits indefinitely.
#[derive(Clone, Debug, TypedBuilder)]
pub struct PoolSettings {
    /// Hard cap on the number of live items. Must be at least 1.
    #[builder(default = 100)]
    pub max_size: u32,

    /// The floor the maintenance task tries to maintain. Must be no greater than `max_size`.
    #[builder(default = 0)]
    pub min_size: u32,

    /// Upper bound on the number of threads concurrently attempting acquisition.
    #[builder(default = 500)]
    pub max_wait_queue_size: u32,

    /// Default acquisition timeout, in milliseconds. `Some(0)` means non-blocking; `None` means
    /// wait indefinitely.
    #[builder(default = Some(120_000))]
    pub max_wait_time_ms: Option<u64>,

    /// Items idle in the pool longer than this (in milliseconds) are pruned. `0` disables idle
    /// pruning.
    #[builder(default = 0)]
    pub max_connection_idle_time_ms: u64,

    /// Items older than this (in milliseconds) since creation are pruned. `0` disables lifetime
    /// pruning.
    #[builder(default = 0)]
    pub max_connection_life_time_ms: u64,

    /// Period, in milliseconds, of the background maintenance task.
    #[builder(default = 60_000)]
    pub maintenance_frequency_ms: u64,

    /// Initial delay, in milliseconds, before the first maintenance run.
    #[builder(default = 0)]
    pub maintenance_initial_delay_ms: u64,
}

impl PoolSettings {
    /// Validates the cross-field invariants the builder can't express.
    pub fn validate(&self) -> Result<()> {
        if self.max_size < 1 {
            return Err(Error::precondition("max_size must be at least 1"));
        }

        if self.min_size > self.max_size {
            return Err(Error::precondition("min_size must not exceed max_size"));
        }

        Ok(())
    }

    /// Whether the maintenance task should run at all: a scheduler is only constructed when at
    /// least one of idle pruning, lifetime pruning, or `min_size > 0` is enabled.
    pub(crate) fn maintenance_enabled(&self) -> bool {
        self.max_connection_idle_time_ms > 0 || self.max_connection_life_time_ms > 0 || self.min_size > 0
    }

    pub(crate) fn pruning_enabled(&self) -> bool {
        self.max_connection_idle_time_ms > 0 || self.max_connection_life_time_ms > 0
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings::builder().build()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PoolSettings::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_max_size() {
        let settings = PoolSettings::builder().max_size(0).build();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_min_above_max() {
        let settings = PoolSettings::builder().max_size(2).min_size(3).build();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn maintenance_disabled_when_nothing_enabled() {
        let settings = PoolSettings::builder().build();
        assert!(!settings.maintenance_enabled());
    }

    #[test]
    fn maintenance_enabled_by_min_size() {
        let settings = PoolSettings::builder().min_size(1).build();
        assert!(settings.maintenance_enabled());
        assert!(!settings.pruning_enabled());
    }
}
