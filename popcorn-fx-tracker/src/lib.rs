pub use compact::*;
pub use context::*;
pub use info_hash::*;
pub use settings::*;

mod compact;
mod context;
pub mod dht;
mod info_hash;
pub mod net;
mod settings;
pub mod thread;
pub mod tracker;
