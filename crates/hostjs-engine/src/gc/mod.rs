//! Garbage collection
//!
//! A stop-the-world mark-sweep collector over the runtime heap. Roots are
//! the per-context globals and intrinsics, pending exceptions, values on the
//! native call stack and every object the host holds a reference to.

mod collector;
mod roots;

pub use collector::{collect, GcOutcome, GcStats};
pub use roots::RootSet;
