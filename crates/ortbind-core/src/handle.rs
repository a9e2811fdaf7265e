//! Scoped ownership of engine handles.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::EnvironmentConfig;
use crate::dtype::ElementType;
use crate::engine::{Engine, HandleKind, RawHandle};
use crate::error::{Error, Result};
use crate::shape::Shape;
use crate::tensor::TensorDescriptor;

/// Owns one engine handle and releases it exactly once on drop.
pub struct NativeHandle {
    engine: Arc<dyn Engine>,
    kind: HandleKind,
    raw: RawHandle,
}

impl NativeHandle {
    pub(crate) fn adopt(engine: &Arc<dyn Engine>, kind: HandleKind, raw: RawHandle) -> Self {
        trace!(?kind, handle = raw.get(), "acquired native handle");
        Self {
            engine: Arc::clone(engine),
            kind,
            raw,
        }
    }

    pub fn raw(&self) -> RawHandle {
        self.raw
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        trace!(kind = ?self.kind, handle = self.raw.get(), "releasing native handle");
        self.engine.release(self.kind, self.raw);
    }
}

impl std::fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeHandle")
            .field("kind", &self.kind)
            .field("raw", &self.raw)
            .finish()
    }
}

/// Process-wide engine environment. Created once, shared read-only by every session.
pub struct Environment {
    handle: NativeHandle,
    config: EnvironmentConfig,
}

impl Environment {
    pub fn new(engine: Arc<dyn Engine>, config: EnvironmentConfig) -> Result<Arc<Self>> {
        let raw = engine.create_environment(&config.log_id)?;
        let handle = NativeHandle::adopt(&engine, HandleKind::Environment, raw);
        debug!(engine = engine.name(), log_id = %config.log_id, "created engine environment");
        Ok(Arc::new(Self { handle, config }))
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.handle.engine
    }

    pub fn raw(&self) -> RawHandle {
        self.handle.raw
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }
}

/// Engine value wrapping a host buffer for the duration of one call.
pub(crate) struct InputValue<'buf> {
    handle: NativeHandle,
    _buffer: PhantomData<&'buf [u8]>,
}

impl<'buf> InputValue<'buf> {
    pub(crate) fn create(
        engine: &Arc<dyn Engine>,
        allocator: RawHandle,
        desc: &TensorDescriptor<'buf>,
    ) -> Result<Self> {
        let bytes = desc.bytes();
        let dims = desc.shape().to_native();
        // SAFETY: the bytes are borrowed for 'buf and the guard cannot outlive 'buf, so
        // they stay valid until the handle is released in Drop.
        let raw = unsafe {
            engine.create_tensor(
                allocator,
                bytes.as_ptr(),
                bytes.len(),
                desc.dtype().ordinal(),
                &dims,
            )
        }
        .map_err(|status| Error::RunFailed(status.message))?;
        Ok(Self {
            handle: NativeHandle::adopt(engine, HandleKind::Value, raw),
            _buffer: PhantomData,
        })
    }

    pub(crate) fn raw(&self) -> RawHandle {
        self.handle.raw
    }
}

/// Engine-owned output value. Descriptors read from it borrow the guard.
pub(crate) struct OutputValue {
    handle: NativeHandle,
}

impl OutputValue {
    pub(crate) fn adopt(engine: &Arc<dyn Engine>, raw: RawHandle) -> Self {
        Self {
            handle: NativeHandle::adopt(engine, HandleKind::Value, raw),
        }
    }

    pub(crate) fn descriptor<'a>(&'a self, name: &'a str) -> Result<TensorDescriptor<'a>> {
        let native = self
            .handle
            .engine
            .tensor_data(self.handle.raw)
            .map_err(|status| Error::RunFailed(status.message))?;

        let dtype = ElementType::from_ordinal(native.info.element_type).ok_or_else(|| {
            Error::UnsupportedType(format!(
                "engine produced unknown element type {}",
                native.info.element_type
            ))
        })?;
        let shape = Shape::from_native(&native.info.dims)?;

        let bytes: &'a [u8] = if native.byte_len == 0 {
            &[]
        } else if native.data.is_null() {
            return Err(Error::RunFailed("engine returned a null tensor buffer".into()));
        } else {
            // SAFETY: the engine keeps the buffer alive until this value handle is
            // released, which cannot happen while `self` is borrowed.
            unsafe { std::slice::from_raw_parts(native.data, native.byte_len) }
        };

        Ok(TensorDescriptor::borrowed(dtype, shape, bytes, Some(name))?.with_native(self.handle.raw))
    }
}
