//! Session pipeline stages.

pub mod connect;
pub mod fetch;
pub mod handshake;
pub mod probe;
pub mod relay;

pub use connect::open_target;
pub use fetch::fetch;
pub use probe::{PingProbe, ReachabilityProbe};
pub use relay::{relay_tcp, RelayReport};
