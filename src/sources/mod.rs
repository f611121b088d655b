pub mod http;
pub mod manager;
pub mod plugin;
pub mod stream;

pub use manager::SourceManager;
pub use plugin::{BoxedSource, ResolveOptions, SourceError, SourcePlugin, SourceResolver};
pub use stream::{AudioStream, ByteStream, StreamHealth, StreamHealthHandle};
