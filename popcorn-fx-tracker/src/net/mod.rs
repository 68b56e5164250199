pub use http::*;
pub use ip_preference::*;
pub use policy::*;

mod http;
mod ip_preference;
mod policy;
