//! Contract with the external inference engine.
//!
//! The engine is reached through opaque handles and paired create/release calls, and
//! reports failure through a status/message pair. Nothing outside this crate's
//! `handle` module should hold a [`RawHandle`] without a guard that releases it.

use std::fmt;
use std::num::NonZeroU64;
use std::path::Path;

use thiserror::Error;

use crate::config::SessionConfig;

/// Opaque engine handle. Carries no ownership by itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawHandle(NonZeroU64);

impl RawHandle {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Environment,
    SessionOptions,
    Allocator,
    Session,
    TypeInfo,
    Value,
}

impl HandleKind {
    pub const ALL: [HandleKind; 6] = [
        HandleKind::Environment,
        HandleKind::SessionOptions,
        HandleKind::Allocator,
        HandleKind::Session,
        HandleKind::TypeInfo,
        HandleKind::Value,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IoSide {
    Input,
    Output,
}

impl fmt::Display for IoSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoSide::Input => f.write_str("input"),
            IoSide::Output => f.write_str("output"),
        }
    }
}

/// Engine status codes. The first eleven mirror the engine's own numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Fail = 1,
    InvalidArgument = 2,
    NoSuchFile = 3,
    NoModel = 4,
    EngineError = 5,
    RuntimeException = 6,
    InvalidProtobuf = 7,
    ModelLoaded = 8,
    NotImplemented = 9,
    InvalidGraph = 10,
    EpFail = 11,
    /// Number of inputs fed to `run` does not match what the session accepts.
    InputCountMismatch = 100,
}

/// Non-null status returned by a failed engine call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message} ({code:?})")]
pub struct EngineStatus {
    pub code: StatusCode,
    pub message: String,
}

impl EngineStatus {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Fail, message)
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineStatus>;

/// Element type and dims as reported by the engine. Symbolic dims are negative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeTensorInfo {
    pub element_type: i32,
    pub dims: Vec<i64>,
}

/// Location of an engine-owned tensor buffer.
///
/// `data` stays valid until the value handle it was read from is released.
#[derive(Clone, Debug)]
pub struct NativeTensorData {
    pub data: *const u8,
    pub byte_len: usize,
    pub info: NativeTensorInfo,
}

/// Handle-based inference engine.
///
/// Implementations must tolerate `release` being called for every handle they hand out,
/// exactly once, in any order the caller chooses.
pub trait Engine: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn create_environment(&self, log_id: &str) -> EngineResult<RawHandle>;

    fn create_session_options(&self, config: &SessionConfig) -> EngineResult<RawHandle>;

    /// Default CPU allocator, also used as the memory description for input tensors.
    fn create_allocator(&self) -> EngineResult<RawHandle>;

    fn load_session(
        &self,
        env: RawHandle,
        path: &Path,
        options: RawHandle,
    ) -> EngineResult<RawHandle>;

    fn io_count(&self, session: RawHandle, side: IoSide) -> EngineResult<usize>;

    fn io_name(
        &self,
        session: RawHandle,
        side: IoSide,
        index: usize,
        allocator: RawHandle,
    ) -> EngineResult<String>;

    /// Returns a `TypeInfo` handle that must be released by the caller.
    fn io_type_info(&self, session: RawHandle, side: IoSide, index: usize)
        -> EngineResult<RawHandle>;

    fn tensor_info(&self, type_info: RawHandle) -> EngineResult<NativeTensorInfo>;

    /// Wraps caller memory as an engine value without taking ownership of it.
    ///
    /// # Safety
    /// `data` must point to `byte_len` readable bytes that stay valid and unmodified until
    /// the returned handle is released.
    unsafe fn create_tensor(
        &self,
        allocator: RawHandle,
        data: *const u8,
        byte_len: usize,
        element_type: i32,
        dims: &[i64],
    ) -> EngineResult<RawHandle>;

    /// Blocks until every requested output is ready. Returns one value handle per output
    /// name, in the requested order.
    fn run(
        &self,
        session: RawHandle,
        input_names: &[&str],
        inputs: &[RawHandle],
        output_names: &[&str],
    ) -> EngineResult<Vec<RawHandle>>;

    fn tensor_data(&self, value: RawHandle) -> EngineResult<NativeTensorData>;

    fn release(&self, kind: HandleKind, handle: RawHandle);
}
