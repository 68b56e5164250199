pub use errors::*;
pub use http::*;
pub use manager::*;
pub use worker::*;

mod errors;
mod http;
mod manager;
mod worker;
