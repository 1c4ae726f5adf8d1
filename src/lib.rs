mod buffer;
pub mod constant;
pub mod error;
mod opts;
mod pbwire;

pub mod auth;
pub mod codec;
pub mod pagecache;
pub mod result;
pub mod row;
pub mod session;
pub mod transport;

pub use buffer::BufferSet;
pub use opts::{AuthMechanism, CapabilityValue, Opts};
pub use pagecache::PageCache;
pub use session::Session;
