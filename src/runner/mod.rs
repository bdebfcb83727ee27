//! Orchestration around the evolution core: JSON state files, round
//! archiving, the single-round runner and the background daemon.
//!
//! This is the only layer that logs or touches the filesystem.

pub mod archive;
pub mod daemon;
pub mod lock;
pub mod round;
pub mod store;

pub use archive::RoundArchiver;
pub use daemon::{Daemon, DaemonSummary};
pub use lock::InstanceLock;
pub use round::{RoundReport, RoundRunner};
pub use store::StateStore;
