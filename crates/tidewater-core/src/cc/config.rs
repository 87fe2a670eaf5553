//! Scheduler configuration types.

use std::fmt;
use std::str::FromStr;

use super::error::CcError;

/// Default number of commits joined into one pessimistic transaction.
pub const DEFAULT_TXN_JOINT_COUNT: usize = 1;

/// Default number of evaluation steps per `wake_up`.
pub const DEFAULT_BATCH_COUNT: usize = 1;

/// Concurrency-control protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CcMode {
    /// No concurrency control. Inconsistent windows are emitted as is.
    #[default]
    None,
    /// Detect inconsistent windows at the commit operator and redo them.
    Optimistic,
    /// Hold relation locks until the transaction commits.
    TwoPhaseLocking,
    /// Read private relation snapshots refreshed at each commit.
    Snapshot,
}

impl CcMode {
    /// Returns `true` for the lock- and snapshot-based protocols.
    #[must_use]
    pub fn is_pessimistic(self) -> bool {
        matches!(self, Self::TwoPhaseLocking | Self::Snapshot)
    }

    /// Returns the command-line spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Optimistic => "optimistic",
            Self::TwoPhaseLocking => "2pl",
            Self::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for CcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CcMode {
    type Err = CcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "optimistic" => Ok(Self::Optimistic),
            "2pl" => Ok(Self::TwoPhaseLocking),
            "snapshot" => Ok(Self::Snapshot),
            other => Err(CcError::UnknownMode(other.to_string())),
        }
    }
}

/// Order in which the scheduler picks operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingPolicy {
    /// Cycle through the operators, upstream first.
    #[default]
    RoundRobin,
}

/// Configuration for a concurrency-control scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Protocol to run.
    pub mode: CcMode,

    /// Commits joined into one pessimistic transaction before locks are
    /// released or snapshots refreshed.
    pub txn_joint_count: usize,

    /// Operator selection policy.
    pub policy: SchedulingPolicy,

    /// Evaluation steps per `wake_up`.
    pub batch_count: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: CcMode::None,
            txn_joint_count: DEFAULT_TXN_JOINT_COUNT,
            policy: SchedulingPolicy::RoundRobin,
            batch_count: DEFAULT_BATCH_COUNT,
        }
    }
}

impl SchedulerConfig {
    /// Creates a default configuration for `mode`.
    #[must_use]
    pub fn with_mode(mode: CcMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Creates a builder for custom configuration.
    #[must_use]
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }
}

/// Builder for `SchedulerConfig`.
#[derive(Debug, Default)]
pub struct SchedulerConfigBuilder {
    mode: Option<CcMode>,
    txn_joint_count: Option<usize>,
    policy: Option<SchedulingPolicy>,
    batch_count: Option<usize>,
}

impl SchedulerConfigBuilder {
    /// Sets the protocol.
    #[must_use]
    pub fn mode(mut self, mode: CcMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Sets the joint commit count. Values below 1 become 1.
    #[must_use]
    pub fn txn_joint_count(mut self, count: usize) -> Self {
        self.txn_joint_count = Some(count);
        self
    }

    /// Sets the scheduling policy.
    #[must_use]
    pub fn policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Sets the batch count. Values below 1 become 1.
    #[must_use]
    pub fn batch_count(mut self, count: usize) -> Self {
        self.batch_count = Some(count);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> SchedulerConfig {
        SchedulerConfig {
            mode: self.mode.unwrap_or_default(),
            txn_joint_count: self
                .txn_joint_count
                .unwrap_or(DEFAULT_TXN_JOINT_COUNT)
                .max(1),
            policy: self.policy.unwrap_or_default(),
            batch_count: self.batch_count.unwrap_or(DEFAULT_BATCH_COUNT).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.mode, CcMode::None);
        assert_eq!(config.txn_joint_count, 1);
        assert_eq!(config.batch_count, 1);
        assert_eq!(config.policy, SchedulingPolicy::RoundRobin);
    }

    #[test]
    fn test_builder_clamps() {
        let config = SchedulerConfig::builder()
            .mode(CcMode::Snapshot)
            .txn_joint_count(0)
            .batch_count(0)
            .build();
        assert_eq!(config.mode, CcMode::Snapshot);
        assert_eq!(config.txn_joint_count, 1);
        assert_eq!(config.batch_count, 1);
    }

    #[test]
    fn test_mode_parsing() {
        for mode in [
            CcMode::None,
            CcMode::Optimistic,
            CcMode::TwoPhaseLocking,
            CcMode::Snapshot,
        ] {
            assert_eq!(mode.as_str().parse::<CcMode>().unwrap(), mode);
        }
        assert_eq!("2PL".parse::<CcMode>().unwrap(), CcMode::TwoPhaseLocking);
        assert!("lock".parse::<CcMode>().is_err());
        assert!(matches!(
            "mvcc".parse::<CcMode>(),
            Err(CcError::UnknownMode(m)) if m == "mvcc"
        ));
        assert!(CcMode::Snapshot.is_pessimistic());
        assert!(!CcMode::Optimistic.is_pessimistic());
    }
}
