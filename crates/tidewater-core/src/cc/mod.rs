//! # Concurrency Control
//!
//! Schedulers that keep windowed aggregates consistent with relations that
//! change while a query runs.
//!
//! Every scheduler serializes the plan upstream first and evaluates one
//! operator per [`CcScheduler::wake_up`], round-robin. Two static analyses
//! run once at construction:
//!
//! - [`CommitOperatorFinder`] picks the aggregation whose windows mark
//!   transaction boundaries.
//! - [`RedoArea`] collects the operators to reset and the streams to back
//!   up so an aborted window can be replayed.
//!
//! ## Protocols
//!
//! | Mode | Scheduler | On commit |
//! |------|-----------|-----------|
//! | `none` | [`WithoutCcScheduler`] | nothing |
//! | `optimistic` | [`OptimisticCcScheduler`] | evict backups; redo on lost consistency |
//! | `2pl` | [`PessimisticCcScheduler<TwoPhaseLocking>`] | release locks |
//! | `snapshot` | [`PessimisticCcScheduler<SnapshotIsolation>`] | refresh snapshots |

mod commit_finder;
mod config;
mod error;
mod optimistic;
mod pessimistic;
mod redo_area;
mod scheduler;
mod without;

pub use commit_finder::CommitOperatorFinder;
pub use config::{
    CcMode, SchedulerConfig, SchedulerConfigBuilder, SchedulingPolicy, DEFAULT_BATCH_COUNT,
    DEFAULT_TXN_JOINT_COUNT,
};
pub use error::CcError;
pub use optimistic::OptimisticCcScheduler;
pub use pessimistic::{PessimisticCcScheduler, PessimisticPolicy, SnapshotIsolation, TwoPhaseLocking};
pub use redo_area::RedoArea;
pub use scheduler::{build_scheduler, CcScheduler, SchedulerCore, SchedulerMetrics};
pub use without::WithoutCcScheduler;
