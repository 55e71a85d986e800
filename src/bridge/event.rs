//! Event payload carried through the async bridge.

use std::any::Any;

/// Mutable payload handed to an async handler and returned to the
/// suspended caller. The engine never interprets the data; it only moves
/// it to the worker and back. When the deadline wins the race instead,
/// the caller receives a timed-out marker and the handler's result is
/// discarded.
#[derive(Default)]
pub struct AsyncEvent {
    data: Option<Box<dyn Any + Send>>,
    timed_out: bool,
}

impl std::fmt::Debug for AsyncEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncEvent")
            .field("has_data", &self.data.is_some())
            .field("timed_out", &self.timed_out)
            .finish()
    }
}

impl AsyncEvent {
    /// Create an empty event.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an event carrying an initial payload.
    pub fn with_data<T: Any + Send>(value: T) -> Self {
        Self {
            data: Some(Box::new(value)),
            timed_out: false,
        }
    }

    /// Marker delivered when the deadline elapsed before completion.
    pub(crate) fn timeout_marker() -> Self {
        Self {
            data: None,
            timed_out: true,
        }
    }

    /// Store a payload, replacing any previous one.
    pub fn set_data<T: Any + Send>(&mut self, value: T) {
        self.data = Some(Box::new(value));
    }

    /// Take the payload out, downcast to `T`. Returns `None` when absent
    /// or of a different type.
    pub fn take_data<T: Any + Send>(&mut self) -> Option<T> {
        let data = self.data.take()?;
        match data.downcast::<T>() {
            Ok(boxed) => Some(*boxed),
            Err(data) => {
                self.data = Some(data);
                None
            }
        }
    }

    /// Whether a payload is present.
    #[inline]
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Whether the operation was resumed via the timeout path.
    #[inline]
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }
}
