#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ortbind_core::{
    Engine, EngineResult, EngineStatus, Environment, EnvironmentConfig, ElementType, HandleKind,
    IoSide, NativeTensorData, NativeTensorInfo, RawHandle, SessionConfig, StatusCode,
};
use parking_lot::Mutex;

#[derive(Clone, Debug)]
pub struct FakeIo {
    pub name: String,
    pub dtype: ElementType,
    pub dims: Vec<i64>,
}

pub fn io(name: &str, dtype: ElementType, dims: &[i64]) -> FakeIo {
    FakeIo {
        name: name.to_string(),
        dtype,
        dims: dims.to_vec(),
    }
}

#[derive(Clone, Debug, Default)]
pub struct FakeModel {
    pub inputs: Vec<FakeIo>,
    pub outputs: Vec<FakeIo>,
}

impl FakeModel {
    pub fn identity(name_in: &str, name_out: &str, dtype: ElementType, dims: &[i64]) -> Self {
        Self {
            inputs: vec![io(name_in, dtype, dims)],
            outputs: vec![io(name_out, dtype, dims)],
        }
    }

    fn side(&self, side: IoSide) -> &[FakeIo] {
        match side {
            IoSide::Input => &self.inputs,
            IoSide::Output => &self.outputs,
        }
    }
}

/// Where the fake engine should report failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailPoint {
    LoadSession,
    IoCount(IoSide),
    IoName(IoSide, usize),
    TensorInfo(IoSide, usize),
    Run,
}

enum Slot {
    Environment,
    Options,
    Allocator,
    Session(FakeModel),
    TypeInfo { side: IoSide, index: usize, info: NativeTensorInfo },
    Input { data: *const u8, byte_len: usize, info: NativeTensorInfo },
    Output { bytes: Vec<u8>, info: NativeTensorInfo },
}

// Input slots hold pointers into caller memory that the fake only reads during `run`.
unsafe impl Send for Slot {}

#[derive(Default)]
struct State {
    next: u64,
    live: HashMap<u64, Slot>,
    created: HashMap<HandleKind, usize>,
    released: HashMap<HandleKind, usize>,
    release_log: Vec<HandleKind>,
    run_calls: usize,
    last_run_inputs: Vec<String>,
    last_run_outputs: Vec<String>,
}

impl State {
    fn insert(&mut self, kind: HandleKind, slot: Slot) -> RawHandle {
        self.next += 1;
        self.live.insert(self.next, slot);
        *self.created.entry(kind).or_default() += 1;
        RawHandle::new(self.next).expect("handle ids start at 1")
    }
}

/// In-memory engine that counts every handle and echoes input `i` as output `i`.
#[derive(Default)]
pub struct FakeEngine {
    models: Mutex<HashMap<PathBuf, FakeModel>>,
    fail: Mutex<Option<FailPoint>>,
    state: Mutex<State>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_model(self: &Arc<Self>, path: &str, model: FakeModel) -> Arc<Self> {
        self.models.lock().insert(PathBuf::from(path), model);
        Arc::clone(self)
    }

    pub fn fail_at(&self, point: Option<FailPoint>) {
        *self.fail.lock() = point;
    }

    fn check(&self, point: FailPoint) -> EngineResult<()> {
        if *self.fail.lock() == Some(point) {
            return Err(EngineStatus::fail(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    pub fn created(&self, kind: HandleKind) -> usize {
        self.state.lock().created.get(&kind).copied().unwrap_or(0)
    }

    pub fn released(&self, kind: HandleKind) -> usize {
        self.state.lock().released.get(&kind).copied().unwrap_or(0)
    }

    pub fn live(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn release_log(&self) -> Vec<HandleKind> {
        self.state.lock().release_log.clone()
    }

    pub fn run_calls(&self) -> usize {
        self.state.lock().run_calls
    }

    pub fn last_run_inputs(&self) -> Vec<String> {
        self.state.lock().last_run_inputs.clone()
    }

    pub fn last_run_outputs(&self) -> Vec<String> {
        self.state.lock().last_run_outputs.clone()
    }

    /// Every kind created so far has been released as often as it was created.
    pub fn balanced(&self) -> bool {
        let state = self.state.lock();
        HandleKind::ALL
            .iter()
            .all(|kind| state.created.get(kind) == state.released.get(kind))
    }

    fn model(&self, session: RawHandle) -> EngineResult<FakeModel> {
        match self.state.lock().live.get(&session.get()) {
            Some(Slot::Session(model)) => Ok(model.clone()),
            _ => Err(EngineStatus::new(StatusCode::InvalidArgument, "not a session")),
        }
    }
}

impl Engine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn create_environment(&self, _log_id: &str) -> EngineResult<RawHandle> {
        Ok(self.state.lock().insert(HandleKind::Environment, Slot::Environment))
    }

    fn create_session_options(&self, _config: &SessionConfig) -> EngineResult<RawHandle> {
        Ok(self.state.lock().insert(HandleKind::SessionOptions, Slot::Options))
    }

    fn create_allocator(&self) -> EngineResult<RawHandle> {
        Ok(self.state.lock().insert(HandleKind::Allocator, Slot::Allocator))
    }

    fn load_session(
        &self,
        _env: RawHandle,
        path: &Path,
        _options: RawHandle,
    ) -> EngineResult<RawHandle> {
        self.check(FailPoint::LoadSession)?;
        let model = self.models.lock().get(path).cloned().ok_or_else(|| {
            EngineStatus::new(
                StatusCode::NoSuchFile,
                format!("Load model from {} failed: file doesn't exist", path.display()),
            )
        })?;
        Ok(self.state.lock().insert(HandleKind::Session, Slot::Session(model)))
    }

    fn io_count(&self, session: RawHandle, side: IoSide) -> EngineResult<usize> {
        self.check(FailPoint::IoCount(side))?;
        Ok(self.model(session)?.side(side).len())
    }

    fn io_name(
        &self,
        session: RawHandle,
        side: IoSide,
        index: usize,
        _allocator: RawHandle,
    ) -> EngineResult<String> {
        self.check(FailPoint::IoName(side, index))?;
        self.model(session)?
            .side(side)
            .get(index)
            .map(|io| io.name.clone())
            .ok_or_else(|| EngineStatus::new(StatusCode::InvalidArgument, "index out of range"))
    }

    fn io_type_info(
        &self,
        session: RawHandle,
        side: IoSide,
        index: usize,
    ) -> EngineResult<RawHandle> {
        let model = self.model(session)?;
        let io = model
            .side(side)
            .get(index)
            .ok_or_else(|| EngineStatus::new(StatusCode::InvalidArgument, "index out of range"))?;
        let info = NativeTensorInfo {
            element_type: io.dtype.ordinal(),
            dims: io.dims.clone(),
        };
        Ok(self
            .state
            .lock()
            .insert(HandleKind::TypeInfo, Slot::TypeInfo { side, index, info }))
    }

    fn tensor_info(&self, type_info: RawHandle) -> EngineResult<NativeTensorInfo> {
        let (side, index, info) = match self.state.lock().live.get(&type_info.get()) {
            Some(Slot::TypeInfo { side, index, info }) => (*side, *index, info.clone()),
            _ => return Err(EngineStatus::new(StatusCode::InvalidArgument, "not a type info")),
        };
        self.check(FailPoint::TensorInfo(side, index))?;
        Ok(info)
    }

    unsafe fn create_tensor(
        &self,
        _allocator: RawHandle,
        data: *const u8,
        byte_len: usize,
        element_type: i32,
        dims: &[i64],
    ) -> EngineResult<RawHandle> {
        let info = NativeTensorInfo {
            element_type,
            dims: dims.to_vec(),
        };
        Ok(self.state.lock().insert(
            HandleKind::Value,
            Slot::Input {
                data,
                byte_len,
                info,
            },
        ))
    }

    fn run(
        &self,
        session: RawHandle,
        input_names: &[&str],
        inputs: &[RawHandle],
        output_names: &[&str],
    ) -> EngineResult<Vec<RawHandle>> {
        let model = self.model(session)?;
        let mut state = self.state.lock();
        state.run_calls += 1;
        state.last_run_inputs = input_names.iter().map(|n| n.to_string()).collect();
        state.last_run_outputs = output_names.iter().map(|n| n.to_string()).collect();
        drop(state);

        self.check(FailPoint::Run)?;
        if inputs.len() != model.inputs.len() {
            return Err(EngineStatus::new(
                StatusCode::InputCountMismatch,
                format!(
                    "expected {} inputs, got {}",
                    model.inputs.len(),
                    inputs.len()
                ),
            ));
        }
        for name in input_names {
            if !model.inputs.iter().any(|io| io.name == *name) {
                return Err(EngineStatus::new(
                    StatusCode::InvalidArgument,
                    format!("Invalid input name: {name}"),
                ));
            }
        }

        let mut state = self.state.lock();
        let mut echoed = Vec::with_capacity(output_names.len());
        for (idx, out_name) in output_names.iter().enumerate() {
            let declared = model
                .outputs
                .iter()
                .find(|io| io.name == *out_name)
                .ok_or_else(|| {
                    EngineStatus::new(
                        StatusCode::InvalidArgument,
                        format!("Invalid output name: {out_name}"),
                    )
                })?;
            let source = inputs.get(idx).or_else(|| inputs.last()).ok_or_else(|| {
                EngineStatus::new(StatusCode::InvalidArgument, "no input to echo")
            })?;
            let (bytes, dims) = match state.live.get(&source.get()) {
                Some(Slot::Input {
                    data,
                    byte_len,
                    info,
                }) => {
                    let bytes = if *byte_len == 0 {
                        Vec::new()
                    } else {
                        // The caller keeps input buffers alive until the value is released.
                        unsafe { std::slice::from_raw_parts(*data, *byte_len) }.to_vec()
                    };
                    (bytes, info.dims.clone())
                }
                _ => return Err(EngineStatus::new(StatusCode::InvalidArgument, "not a value")),
            };
            echoed.push(Slot::Output {
                bytes,
                info: NativeTensorInfo {
                    element_type: declared.dtype.ordinal(),
                    dims,
                },
            });
        }
        Ok(echoed
            .into_iter()
            .map(|slot| state.insert(HandleKind::Value, slot))
            .collect())
    }

    fn tensor_data(&self, value: RawHandle) -> EngineResult<NativeTensorData> {
        match self.state.lock().live.get(&value.get()) {
            Some(Slot::Output { bytes, info }) => Ok(NativeTensorData {
                data: bytes.as_ptr(),
                byte_len: bytes.len(),
                info: info.clone(),
            }),
            Some(Slot::Input {
                data,
                byte_len,
                info,
            }) => Ok(NativeTensorData {
                data: *data,
                byte_len: *byte_len,
                info: info.clone(),
            }),
            _ => Err(EngineStatus::new(StatusCode::InvalidArgument, "not a value")),
        }
    }

    fn release(&self, kind: HandleKind, handle: RawHandle) {
        let mut state = self.state.lock();
        assert!(
            state.live.remove(&handle.get()).is_some(),
            "double release of {kind:?} {}",
            handle.get()
        );
        *state.released.entry(kind).or_default() += 1;
        state.release_log.push(kind);
    }
}

pub fn environment(engine: &Arc<FakeEngine>) -> Arc<Environment> {
    let engine: Arc<dyn Engine> = engine.clone();
    Environment::new(engine, EnvironmentConfig::default()).expect("create fake environment")
}
