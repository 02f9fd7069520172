//! A call session on one device.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::debug;

use crate::Result;
use crate::context::CallContext;
use crate::device::Device;

/// One [`CallContext`] bound to a [`Device`].
///
/// Derefs to the context, so every remote call is available directly on
/// the session. Dropping a connected session disconnects it.
#[derive(Debug)]
pub struct Session {
    /// Context borrowing the device's info.
    context: CallContext,
    /// Device this session was opened on.
    device: Arc<Device>,
}

impl Session {
    /// Wraps `context` for `device`.
    pub(crate) const fn new(context: CallContext, device: Arc<Device>) -> Self {
        Self { context, device }
    }

    /// Device this session was opened on.
    pub const fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Connects the session.
    pub fn rapi_init(&mut self) -> Result<()> {
        self.context.connect()
    }

    /// Disconnects the session.
    pub fn rapi_uninit(&mut self) -> Result<()> {
        self.context.disconnect()
    }
}

impl Deref for Session {
    type Target = CallContext;

    fn deref(&self) -> &CallContext {
        &self.context
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut CallContext {
        &mut self.context
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.context.is_initialized() {
            debug!(device = %self.device.name(), "closing session on drop");
            // Disconnecting a connected context cannot fail.
            let _ = self.context.disconnect();
        }
    }
}
