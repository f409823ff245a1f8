//! Runtime core: per-policy supervision of subject workers.
//!
//! The public API of this module is [`LifecycleManager`] (built through
//! [`ManagerBuilder`] and driven through [`ManagerHandle`]) plus the
//! [`WorkerId`] / [`RegistryView`] types it reports with.
//!
//! Internal modules:
//! - [`manager`]: reconciles snapshots, supervises workers, handles shutdown;
//! - [`worker`]: timer/retry state machine of one subject;
//! - [`plan`]: computes the steps a worker executes;
//! - [`registry`]: bijective subject ↔ worker bookkeeping;
//! - [`builder`]: wires collaborators, bus, and subscribers.

mod builder;
mod manager;
mod plan;
mod registry;
mod worker;

pub use builder::ManagerBuilder;
pub use manager::{LifecycleManager, ManagerHandle};
pub use registry::{RegistryView, WorkerId};
