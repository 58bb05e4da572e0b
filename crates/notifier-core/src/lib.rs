//! The router and supervisor: the two pieces of the pipeline that sit
//! between ingress and egress. The router parses JSON-RPC, resolves the
//! method to an output list, and fans out one task per output. The
//! supervisor owns the current [`notifier_runtime::RuntimeContext`],
//! drives the admission-gated dequeue loop, and handles `INT`/`TERM`/`HUP`.

mod reload;
mod router;
mod supervisor;

pub use reload::reload;
pub use router::route;
pub use supervisor::run;
