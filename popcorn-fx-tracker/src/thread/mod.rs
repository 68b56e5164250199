pub use context::*;
pub use errors::*;
pub use scheduler::*;
pub use tracker_thread::*;

mod context;
mod errors;
mod scheduler;
mod tracker_thread;
