use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::codec;
use crate::config::SessionConfig;
use crate::dtype::ElementType;
use crate::engine::{Engine, EngineStatus, HandleKind, IoSide, RawHandle, StatusCode};
use crate::error::{Error, Result, ResultExt};
use crate::handle::{Environment, InputValue, NativeHandle, OutputValue};
use crate::host::HostValue;
use crate::spec::{SessionMetadata, TensorSpec};

struct LoadedModel {
    handle: NativeHandle,
    metadata: SessionMetadata,
}

/// One model slot together with the native resources needed to load and run it.
///
/// `Unloaded` until [`SessionResource::load`] succeeds, `Loaded` forever after. Calls are
/// expected to be serialized by the caller.
pub struct SessionResource {
    // Drop order is field order: model, allocator, options, then the environment
    // reference. That is the reverse of acquisition.
    model: Option<LoadedModel>,
    allocator: NativeHandle,
    options: NativeHandle,
    env: Arc<Environment>,
}

impl SessionResource {
    pub fn new(env: Arc<Environment>, config: &SessionConfig) -> Result<Self> {
        let engine = Arc::clone(env.engine());
        let options = NativeHandle::adopt(
            &engine,
            HandleKind::SessionOptions,
            engine.create_session_options(config)?,
        );
        let allocator =
            NativeHandle::adopt(&engine, HandleKind::Allocator, engine.create_allocator()?);
        Ok(Self {
            model: None,
            allocator,
            options,
            env,
        })
    }

    fn engine(&self) -> &Arc<dyn Engine> {
        self.env.engine()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn metadata(&self) -> Result<&SessionMetadata> {
        self.model
            .as_ref()
            .map(|m| &m.metadata)
            .ok_or(Error::NotInitialized)
    }

    /// Opens the model and captures its signature. Either everything is captured or the
    /// resource stays `Unloaded` with nothing left open.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        if self.model.is_some() {
            return Err(Error::AlreadyLoaded);
        }

        let engine = Arc::clone(self.engine());
        let raw = engine
            .load_session(self.env.raw(), path, self.options.raw())
            .map_err(|status| Error::ModelLoadFailed(status.message))?;
        let handle = NativeHandle::adopt(&engine, HandleKind::Session, raw);

        let inputs = read_specs(&engine, handle.raw(), self.allocator.raw(), IoSide::Input)?;
        let outputs = read_specs(&engine, handle.raw(), self.allocator.raw(), IoSide::Output)?;

        info!(
            path = %path.display(),
            inputs = inputs.len(),
            outputs = outputs.len(),
            "model loaded"
        );
        self.model = Some(LoadedModel {
            handle,
            metadata: SessionMetadata { inputs, outputs },
        });
        Ok(())
    }

    /// Runs the model once over host tensors and returns one host tensor per output, in
    /// metadata order.
    pub fn run(&self, inputs: &[HostValue]) -> Result<Vec<HostValue>> {
        let model = self.model.as_ref().ok_or(Error::NotInitialized)?;
        let metadata = &model.metadata;
        let engine = self.engine();

        let (names, specs): (Vec<Cow<'_, str>>, Vec<Option<&TensorSpec>>) = inputs
            .iter()
            .enumerate()
            .map(|(index, input)| resolve_input(metadata, index, input))
            .unzip();

        let mut values: Vec<InputValue<'_>> = Vec::with_capacity(inputs.len());
        for (index, ((input, name), spec)) in inputs.iter().zip(&names).zip(&specs).enumerate() {
            let expected = spec
                .map(|spec| spec.dtype)
                .filter(|&dtype| dtype != ElementType::Undefined);
            let desc = codec::decode(input, expected, Some(name.as_ref()))
                .with_context(|| format!("input {index} ('{name}')"))?;
            let value = InputValue::create(engine, self.allocator.raw(), &desc)
                .with_context(|| format!("input {index} ('{name}')"))?;
            values.push(value);
        }

        let input_names: Vec<&str> = names.iter().map(|name| name.as_ref()).collect();
        let input_raws: Vec<RawHandle> = values.iter().map(InputValue::raw).collect();
        let output_names = metadata.output_names();

        debug!(
            inputs = input_raws.len(),
            outputs = output_names.len(),
            "running session"
        );
        let result = engine.run(model.handle.raw(), &input_names, &input_raws, &output_names);
        drop(values);

        let raws = result.map_err(run_error)?;
        let outputs: Vec<OutputValue> = raws
            .into_iter()
            .map(|raw| OutputValue::adopt(engine, raw))
            .collect();
        if outputs.len() != output_names.len() {
            warn!(
                expected = output_names.len(),
                actual = outputs.len(),
                "engine returned wrong number of outputs"
            );
            return Err(Error::RunFailed(format!(
                "expected {} outputs, engine returned {}",
                output_names.len(),
                outputs.len()
            )));
        }

        outputs
            .iter()
            .zip(&output_names)
            .enumerate()
            .map(|(index, (value, name))| {
                value
                    .descriptor(name)
                    .and_then(|desc| {
                        trace!(index, handle = ?desc.native_handle(), "encoding output");
                        codec::encode(&desc)
                    })
                    .with_context(|| format!("output {index} ('{name}')"))
            })
            .collect()
    }
}

/// Explicit `name` field, else the positional input name, else `input{index}`. The
/// `TensorSpec` comes from the same source as the name, so an unnamed input is typed by
/// its position even when the model repeats a name.
fn resolve_input<'a>(
    metadata: &'a SessionMetadata,
    index: usize,
    input: &'a HostValue,
) -> (Cow<'a, str>, Option<&'a TensorSpec>) {
    if let Some(HostValue::String(name)) = input.get("name") {
        return (Cow::Borrowed(name.as_str()), metadata.input(name));
    }
    match metadata.inputs.get(index) {
        Some(spec) => (Cow::Borrowed(spec.name.as_str()), Some(spec)),
        None => (Cow::Owned(format!("input{index}")), None),
    }
}

fn run_error(status: EngineStatus) -> Error {
    match status.code {
        StatusCode::InputCountMismatch => Error::InputCountMismatch(status.message),
        _ => Error::RunFailed(status.message),
    }
}

fn read_specs(
    engine: &Arc<dyn Engine>,
    session: RawHandle,
    allocator: RawHandle,
    side: IoSide,
) -> Result<Vec<TensorSpec>> {
    let load_failed = |status: EngineStatus| Error::ModelLoadFailed(status.message);

    let count = engine
        .io_count(session, side)
        .map_err(load_failed)
        .with_context(|| format!("{side} count"))?;
    let mut specs = Vec::with_capacity(count);
    for index in 0..count {
        let spec = read_spec(engine, session, allocator, side, index)
            .map_err(load_failed)
            .with_context(|| format!("{side} {index}"))?;
        specs.push(spec);
    }
    Ok(specs)
}

fn read_spec(
    engine: &Arc<dyn Engine>,
    session: RawHandle,
    allocator: RawHandle,
    side: IoSide,
    index: usize,
) -> std::result::Result<TensorSpec, EngineStatus> {
    let name = engine.io_name(session, side, index, allocator)?;
    let type_info = NativeHandle::adopt(
        engine,
        HandleKind::TypeInfo,
        engine.io_type_info(session, side, index)?,
    );
    let info = engine.tensor_info(type_info.raw())?;
    drop(type_info);

    let dtype = ElementType::from_ordinal(info.element_type).unwrap_or(ElementType::Undefined);
    let dims = info
        .dims
        .iter()
        .map(|&d| usize::try_from(d).ok())
        .collect();
    Ok(TensorSpec { name, dtype, dims })
}
