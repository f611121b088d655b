use std::{
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use bytes::Bytes;
use futures::Stream;

use crate::common::StreamError;

/// Raw encoded audio as delivered by a source.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamHealth {
    Readable = 0,
    Ended = 1,
    Errored = 2,
    Destroyed = 3,
}

impl StreamHealth {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Readable,
            1 => Self::Ended,
            2 => Self::Errored,
            _ => Self::Destroyed,
        }
    }
}

/// Shared view of a stream's health, kept by whoever feeds or consumes it.
#[derive(Clone, Debug)]
pub struct StreamHealthHandle(Arc<AtomicU8>);

impl StreamHealthHandle {
    pub fn get(&self) -> StreamHealth {
        StreamHealth::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, health: StreamHealth) {
        self.0.store(health as u8, Ordering::Release);
    }
}

/// A resolved, not yet consumed audio stream.
pub struct AudioStream {
    descriptor: String,
    offset_ms: u64,
    body: Option<ByteStream>,
    health: StreamHealthHandle,
}

impl AudioStream {
    pub fn new<S>(descriptor: impl Into<String>, body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
    {
        Self {
            descriptor: descriptor.into(),
            offset_ms: 0,
            body: Some(Box::pin(body)),
            health: StreamHealthHandle(Arc::new(AtomicU8::new(StreamHealth::Readable as u8))),
        }
    }

    /// Start offset the transport should skip to.
    pub fn with_offset(mut self, offset_ms: u64) -> Self {
        self.offset_ms = offset_ms;
        self
    }

    /// Direct location the stream was opened from.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn offset_ms(&self) -> u64 {
        self.offset_ms
    }

    pub fn health(&self) -> StreamHealth {
        self.health.get()
    }

    pub fn health_handle(&self) -> StreamHealthHandle {
        self.health.clone()
    }

    pub fn is_readable(&self) -> bool {
        self.body.is_some() && self.health() == StreamHealth::Readable
    }

    pub fn take_body(&mut self) -> Option<ByteStream> {
        self.body.take()
    }

    pub fn destroy(&mut self) {
        self.body = None;
        self.health.set(StreamHealth::Destroyed);
    }
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("descriptor", &self.descriptor)
            .field("offset_ms", &self.offset_ms)
            .field("health", &self.health())
            .field("has_body", &self.body.is_some())
            .finish()
    }
}
