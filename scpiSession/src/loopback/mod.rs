//! The loopback module provides an instrument simulator for testing purposes.
//!
//! The [`LoopbackTransport`] allows to test instrument drivers without hardware: it checks that
//! the commands sent by the driver are the expected ones, replies with scripted responses (lines,
//! raw bytes, or silence), and raises scripted service requests on its own thread.
//!
//! Check out the [`LoopbackTransport`] for more details and examples on how to use it. You can
//! also find simple and more advanced test examples that use the loopback transport in the
//! instrument drivers of this workspace.

mod loopback_transport;

pub use loopback_transport::*;

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::Mutex;

use crate::{ServiceRequestHandler, StatusByte};

/// A self-incrementing index structure that by default starts at 0 and increments whenever `next`
/// is called.
#[derive(Debug, Default)]
struct IncrIndex {
    index: usize,
}

impl IncrIndex {
    fn next(&mut self) -> usize {
        let current = self.index;
        self.index += 1;
        current
    }
}

/// The simulated SRQ line of a [`LoopbackTransport`].
///
/// Firing the line calls the handler that the session registered with the transport, just like
/// a real transport does from its notification thread. Clone it to fire from other threads.
#[derive(Clone, Default)]
pub struct ServiceRequestLine {
    handler: Arc<Mutex<Option<ServiceRequestHandler>>>,
}

impl ServiceRequestLine {
    /// Assert SRQ with the given status byte on the calling thread.
    ///
    /// Returns `false` if no handler is registered yet.
    pub fn fire(&self, status: StatusByte) -> bool {
        match &*self.handler.lock() {
            Some(handler) => {
                handler(status);
                true
            }
            None => false,
        }
    }

    /// Assert SRQ with the given status byte from a new thread after `delay`.
    pub fn fire_after(&self, delay: Duration, status: StatusByte) -> JoinHandle<bool> {
        let line = self.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            line.fire(status)
        })
    }

    fn register(&self, handler: ServiceRequestHandler) {
        *self.handler.lock() = Some(handler);
    }
}
