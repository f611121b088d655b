pub mod transport;

pub use transport::{TransportEvent, TransportEventKind, TransportFactory, VoiceTransport};
