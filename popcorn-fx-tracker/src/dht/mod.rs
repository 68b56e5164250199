pub use controller::*;
pub use errors::*;
pub use router::*;

mod controller;
mod errors;
mod router;
