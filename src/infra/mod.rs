//! Side-effecting infrastructure: remote hosting, CI polling, artifacts on
//! disk, locks, the published ledger and child processes.

pub mod artifacts;
pub mod cancel;
pub mod ci;
pub mod hosting;
pub mod ledger;
pub mod lock;
pub mod policy;
pub mod process;

pub use cancel::CancelFlag;
pub use ci::{CiGate, CiSettings};
pub use policy::{CallPolicy, TimeoutClass};
