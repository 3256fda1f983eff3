pub mod discovery;
pub mod responses;
pub mod session;
pub mod soap;
pub mod xml;

pub use discovery::WsDiscoveryProbe;
pub use session::{OnvifConnector, OnvifSession};
