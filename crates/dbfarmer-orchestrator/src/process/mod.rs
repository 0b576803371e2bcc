//! Local process backend support.
//!
//! - `ProcessSupervisor`: starts one entrypoint process per node and stops
//!   nodes through the lock files they leave in their data directories
//! - `Signal`: termination signals and the `kill` commands that send them

mod handle;
mod lock;
mod signal;
mod supervisor;

pub use handle::ProcessHandle;
pub use lock::{find_lock_files, read_lock_file, LockFile};
pub use signal::Signal;
pub use supervisor::{ProcessSupervisor, SupervisorConfig, SupervisorConfigBuilder, TeardownReport};
