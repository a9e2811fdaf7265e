//! ONNX Runtime engine for ortbind, built on the `ort` crate.
//!
//! `ort` owns its native objects through RAII types, so [`OrtEngine`] keeps them in a
//! handle table and hands out [`RawHandle`]s that map back to table slots. Releasing a
//! handle drops the slot.

#[cfg(not(target_endian = "little"))]
compile_error!("ortbind passes host typed arrays as little-endian memory; big-endian targets are not supported");

mod convert;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use once_cell::sync::OnceCell;
use ort::session::{builder::GraphOptimizationLevel as OrtOptimizationLevel, Session, SessionInputValue};
use ort::value::DynValue;
use ortbind_core::{
    ElementType, Engine, EngineResult, EngineStatus, Environment, EnvironmentConfig,
    GraphOptimizationLevel, HandleKind, IoSide, NativeTensorData, NativeTensorInfo,
    RawHandle, Result, SessionConfig, StatusCode,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

enum Slot {
    Environment { log_id: String },
    Options(SessionConfig),
    Allocator,
    Session(Arc<Mutex<Session>>),
    TypeInfo(NativeTensorInfo),
    /// Taken by the first `run` it is fed to.
    Input(Option<DynValue>),
    Output(DynValue),
}

impl Slot {
    fn kind(&self) -> HandleKind {
        match self {
            Slot::Environment { .. } => HandleKind::Environment,
            Slot::Options(_) => HandleKind::SessionOptions,
            Slot::Allocator => HandleKind::Allocator,
            Slot::Session(_) => HandleKind::Session,
            Slot::TypeInfo(_) => HandleKind::TypeInfo,
            Slot::Input(_) | Slot::Output(_) => HandleKind::Value,
        }
    }
}

pub struct OrtEngine {
    next: AtomicU64,
    slots: Mutex<HashMap<u64, Slot>>,
}

impl OrtEngine {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, slot: Slot) -> EngineResult<RawHandle> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let handle = RawHandle::new(id).ok_or_else(|| EngineStatus::fail("handle space exhausted"))?;
        self.slots.lock().insert(id, slot);
        Ok(handle)
    }

    fn expect(&self, handle: RawHandle, kind: HandleKind) -> EngineResult<()> {
        match self.slots.lock().get(&handle.get()) {
            Some(slot) if slot.kind() == kind => Ok(()),
            _ => Err(invalid(format!("handle {} is not a live {kind:?}", handle.get()))),
        }
    }

    /// The name the environment behind `handle` was committed with.
    pub fn environment_name(&self, handle: RawHandle) -> Option<String> {
        match self.slots.lock().get(&handle.get()) {
            Some(Slot::Environment { log_id }) => Some(log_id.clone()),
            _ => None,
        }
    }

    /// Moves each input's value out of its slot. Input values are single-use.
    fn take_feeds(
        &self,
        input_names: &[&str],
        inputs: &[RawHandle],
    ) -> EngineResult<Vec<(String, SessionInputValue<'static>)>> {
        let mut slots = self.slots.lock();
        let mut feeds = Vec::with_capacity(inputs.len());
        for (name, handle) in input_names.iter().zip(inputs) {
            let value = match slots.get_mut(&handle.get()) {
                Some(Slot::Input(value)) => value.take().ok_or_else(|| {
                    invalid(format!("input value {} was already run", handle.get()))
                })?,
                _ => return Err(invalid(format!("handle {} is not an input value", handle.get()))),
            };
            feeds.push((name.to_string(), SessionInputValue::from(value)));
        }
        Ok(feeds)
    }

    fn session(&self, handle: RawHandle) -> EngineResult<Arc<Mutex<Session>>> {
        match self.slots.lock().get(&handle.get()) {
            Some(Slot::Session(session)) => Ok(Arc::clone(session)),
            _ => Err(invalid(format!("handle {} is not a live session", handle.get()))),
        }
    }
}

impl Default for OrtEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for OrtEngine {
    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    /// Commits the global ORT environment under `log_id`. ORT's own log records reach
    /// `tracing`, so severity is chosen by the subscriber's filter. A commit that ORT
    /// refuses surfaces when the first session is built.
    fn create_environment(&self, log_id: &str) -> EngineResult<RawHandle> {
        let committed = ort::init().with_name(log_id).commit();
        debug!(log_id, ?committed, "onnxruntime environment");
        self.insert(Slot::Environment {
            log_id: log_id.to_string(),
        })
    }

    fn create_session_options(&self, config: &SessionConfig) -> EngineResult<RawHandle> {
        self.insert(Slot::Options(config.clone()))
    }

    fn create_allocator(&self) -> EngineResult<RawHandle> {
        self.insert(Slot::Allocator)
    }

    fn load_session(
        &self,
        env: RawHandle,
        path: &Path,
        options: RawHandle,
    ) -> EngineResult<RawHandle> {
        self.expect(env, HandleKind::Environment)?;
        let config = match self.slots.lock().get(&options.get()) {
            Some(Slot::Options(config)) => config.clone(),
            _ => return Err(invalid("not a session options handle")),
        };
        if !path.is_file() {
            return Err(EngineStatus::new(
                StatusCode::NoSuchFile,
                format!("Load model from {} failed: file doesn't exist", path.display()),
            ));
        }

        let session = build_session(path, &config)
            .map_err(|err| EngineStatus::new(StatusCode::InvalidGraph, format!("{err:#}")))?;
        info!(
            path = %path.display(),
            inputs = session.inputs.len(),
            outputs = session.outputs.len(),
            "onnxruntime session created"
        );
        self.insert(Slot::Session(Arc::new(Mutex::new(session))))
    }

    fn io_count(&self, session: RawHandle, side: IoSide) -> EngineResult<usize> {
        let session = self.session(session)?;
        let session = session.lock();
        Ok(match side {
            IoSide::Input => session.inputs.len(),
            IoSide::Output => session.outputs.len(),
        })
    }

    fn io_name(
        &self,
        session: RawHandle,
        side: IoSide,
        index: usize,
        allocator: RawHandle,
    ) -> EngineResult<String> {
        self.expect(allocator, HandleKind::Allocator)?;
        let session = self.session(session)?;
        let session = session.lock();
        let name = match side {
            IoSide::Input => session.inputs.get(index).map(|input| input.name.clone()),
            IoSide::Output => session.outputs.get(index).map(|output| output.name.clone()),
        };
        name.ok_or_else(|| invalid(format!("{side} index {index} out of range")))
    }

    fn io_type_info(
        &self,
        session: RawHandle,
        side: IoSide,
        index: usize,
    ) -> EngineResult<RawHandle> {
        let session = self.session(session)?;
        let info = {
            let session = session.lock();
            match side {
                IoSide::Input => session
                    .inputs
                    .get(index)
                    .map(|input| convert::tensor_info(&input.input_type)),
                IoSide::Output => session
                    .outputs
                    .get(index)
                    .map(|output| convert::tensor_info(&output.output_type)),
            }
        };
        let info = info.ok_or_else(|| invalid(format!("{side} index {index} out of range")))?;
        self.insert(Slot::TypeInfo(info))
    }

    fn tensor_info(&self, type_info: RawHandle) -> EngineResult<NativeTensorInfo> {
        match self.slots.lock().get(&type_info.get()) {
            Some(Slot::TypeInfo(info)) => Ok(info.clone()),
            _ => Err(invalid("not a type info handle")),
        }
    }

    unsafe fn create_tensor(
        &self,
        allocator: RawHandle,
        data: *const u8,
        byte_len: usize,
        element_type: i32,
        dims: &[i64],
    ) -> EngineResult<RawHandle> {
        self.expect(allocator, HandleKind::Allocator)?;
        let dtype = ElementType::from_ordinal(element_type)
            .ok_or_else(|| invalid(format!("unknown element type {element_type}")))?;
        let bytes: &[u8] = if byte_len == 0 {
            &[]
        } else if data.is_null() {
            return Err(invalid("null tensor data"));
        } else {
            // SAFETY: the caller guarantees `byte_len` readable bytes at `data`.
            unsafe { std::slice::from_raw_parts(data, byte_len) }
        };
        let value = convert::value_from_bytes(dtype, dims, bytes)
            .map_err(|err| invalid(format!("{err:#}")))?;
        self.insert(Slot::Input(Some(value)))
    }

    fn run(
        &self,
        session: RawHandle,
        input_names: &[&str],
        inputs: &[RawHandle],
        output_names: &[&str],
    ) -> EngineResult<Vec<RawHandle>> {
        let session = self.session(session)?;
        if input_names.len() != inputs.len() {
            return Err(invalid(format!(
                "{} input names for {} input values",
                input_names.len(),
                inputs.len()
            )));
        }
        check_input_count(session.lock().inputs.len(), inputs.len())?;
        let feeds = self.take_feeds(input_names, inputs)?;

        let mut values = Vec::with_capacity(output_names.len());
        {
            let mut session = session.lock();
            let mut outputs = session
                .run(feeds)
                .map_err(|err| EngineStatus::new(StatusCode::RuntimeException, err.to_string()))?;
            for name in output_names {
                let value = outputs
                    .remove(*name)
                    .ok_or_else(|| invalid(format!("Invalid output name: {name}")))?;
                values.push(value);
            }
        }

        let mut handles = Vec::with_capacity(values.len());
        for value in values {
            match self.insert(Slot::Output(value)) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    for handle in handles {
                        self.release(HandleKind::Value, handle);
                    }
                    return Err(err);
                }
            }
        }
        Ok(handles)
    }

    fn tensor_data(&self, value: RawHandle) -> EngineResult<NativeTensorData> {
        match self.slots.lock().get(&value.get()) {
            Some(Slot::Output(output)) => convert::tensor_data(output)
                .with_context(|| format!("output value {}", value.get()))
                .map_err(|err| EngineStatus::fail(format!("{err:#}"))),
            _ => Err(invalid(format!("handle {} is not an output value", value.get()))),
        }
    }

    fn release(&self, kind: HandleKind, handle: RawHandle) {
        let slot = self.slots.lock().remove(&handle.get());
        match slot {
            Some(slot) if slot.kind() != kind => {
                warn!(?kind, actual = ?slot.kind(), handle = handle.get(), "released handle with wrong kind");
            }
            Some(_) => {}
            None => warn!(?kind, handle = handle.get(), "release of unknown handle"),
        }
    }
}

fn invalid(message: impl Into<String>) -> EngineStatus {
    EngineStatus::new(StatusCode::InvalidArgument, message)
}

fn check_input_count(expected: usize, actual: usize) -> EngineResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(EngineStatus::new(
            StatusCode::InputCountMismatch,
            format!("expected {expected} inputs, got {actual}"),
        ))
    }
}

fn optimization_level(level: GraphOptimizationLevel) -> OrtOptimizationLevel {
    match level {
        GraphOptimizationLevel::Disabled => OrtOptimizationLevel::Disable,
        GraphOptimizationLevel::Basic => OrtOptimizationLevel::Level1,
        GraphOptimizationLevel::Extended => OrtOptimizationLevel::Level2,
        GraphOptimizationLevel::All => OrtOptimizationLevel::Level3,
    }
}

fn build_session(path: &Path, config: &SessionConfig) -> anyhow::Result<Session> {
    let mut builder = Session::builder()
        .context("failed to create ORT session builder")?
        .with_optimization_level(optimization_level(config.graph_optimization))
        .context("failed to configure ORT session builder")?;
    if let Some(threads) = config.intra_op_threads {
        builder = builder
            .with_intra_threads(threads)
            .context("failed to set intra-op thread count")?;
    }

    builder
        .commit_from_file(path)
        .context("failed to load ONNX model")
}

static ENVIRONMENT: OnceCell<Arc<Environment>> = OnceCell::new();

/// Creates the process-wide ONNX Runtime environment on first call and returns it on
/// every later one. Later configs are ignored.
pub fn init(config: EnvironmentConfig) -> Result<Arc<Environment>> {
    let env = ENVIRONMENT.get_or_try_init(|| {
        let engine: Arc<dyn Engine> = Arc::new(OrtEngine::new());
        Environment::new(engine, config.clone())
    })?;
    if env.config() != &config {
        warn!(
            requested = %config.log_id,
            active = %env.config().log_id,
            "onnxruntime environment already initialized; ignoring new config"
        );
    }
    Ok(Arc::clone(env))
}
