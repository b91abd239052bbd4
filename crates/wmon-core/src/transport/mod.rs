//! Transport layer module.

pub mod mock;
pub mod pacing;
pub mod tcp;
pub mod traits;

pub use mock::MockTransport;
pub use pacing::Pacing;
pub use tcp::TcpTransport;
pub use traits::{Transport, TransportError};
