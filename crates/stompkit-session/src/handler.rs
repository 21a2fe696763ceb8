//! Frame handlers supplied by the session layer.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tracing::{trace, warn};

use stompkit_core::{FrameHandler, StompHeaders};

/// Handler that only logs received frames at trace level.
///
/// Used for destinations carried over a reconnect without an application
/// handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingFrameHandler;

impl FrameHandler for LoggingFrameHandler {
    fn handle_frame(&self, headers: &StompHeaders, payload: &[u8]) {
        trace!(
            "Received frame: destination={:?}, headers=[{}], payload={}",
            headers.destination(),
            headers,
            String::from_utf8_lossy(payload)
        );
    }
}

/// Handler that decodes JSON payloads into `T` before calling `callback`.
///
/// Payloads that fail to decode are logged and dropped.
pub struct JsonFrameHandler<T, F> {
    callback: F,
    _payload: PhantomData<fn() -> T>,
}

impl<T, F> JsonFrameHandler<T, F>
where
    T: DeserializeOwned,
    F: Fn(&StompHeaders, T) + Send + Sync,
{
    /// Wrap `callback`.
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            _payload: PhantomData,
        }
    }
}

impl<T, F> FrameHandler for JsonFrameHandler<T, F>
where
    T: DeserializeOwned,
    F: Fn(&StompHeaders, T) + Send + Sync,
{
    fn handle_frame(&self, headers: &StompHeaders, payload: &[u8]) {
        match serde_json::from_slice::<T>(payload) {
            Ok(value) => (self.callback)(headers, value),
            Err(e) => warn!(
                "Dropping frame for {:?}: payload is not valid JSON for {}: {}",
                headers.destination(),
                std::any::type_name::<T>(),
                e
            ),
        }
    }
}
