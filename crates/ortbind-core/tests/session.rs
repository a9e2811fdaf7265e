mod common;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use common::{environment, io, FailPoint, FakeEngine, FakeModel};
use ortbind_core::{
    ElementType, ErrorKind, HandleKind, HostArray, HostTensor, HostValue, InferenceSession,
    IoSide, SessionConfig, SessionResource,
};

const MODEL: &str = "models/identity.onnx";

fn float_input(name: Option<&str>, dims: &[usize], data: &[f32]) -> HostValue {
    let tensor = HostTensor::new(dims, HostArray::from_slice(data)).with_type(ElementType::Float32);
    match name {
        Some(name) => tensor.with_name(name).into_host_value(),
        None => tensor.into_host_value(),
    }
}

fn identity_session(engine: &std::sync::Arc<FakeEngine>) -> Result<InferenceSession> {
    engine.with_model(
        MODEL,
        FakeModel::identity("x", "y", ElementType::Float32, &[1, 3]),
    );
    let mut session = InferenceSession::new(environment(engine), &SessionConfig::default())?;
    session.load_model(MODEL)?;
    Ok(session)
}

#[test]
fn identity_run_returns_one_float_output() -> Result<()> {
    let engine = FakeEngine::new();
    let session = identity_session(&engine)?;

    assert_eq!(session.input_names()?, vec!["x"]);
    assert_eq!(session.output_names()?, vec!["y"]);

    let outputs = session.run(&[float_input(Some("x"), &[1, 3], &[1.0, 2.0, 3.0])])?;
    assert_eq!(outputs.len(), 1);

    let out = HostTensor::from_host_value(&outputs[0])?;
    assert_eq!(out.dims, vec![1, 3]);
    assert_eq!(out.dtype, Some(ElementType::Float32));
    assert_eq!(out.data.to_vec::<f32>(), Some(vec![1.0, 2.0, 3.0]));
    assert_eq!(out.name, None);

    assert_eq!(engine.run_calls(), 1);
    assert_eq!(engine.last_run_inputs(), vec!["x"]);
    assert_eq!(engine.last_run_outputs(), vec!["y"]);
    // one input value and one output value, both gone
    assert_eq!(engine.created(HandleKind::Value), 2);
    assert_eq!(engine.released(HandleKind::Value), 2);
    Ok(())
}

#[test]
fn unnamed_input_takes_positional_name() -> Result<()> {
    let engine = FakeEngine::new();
    let session = identity_session(&engine)?;

    session.run(&[float_input(None, &[1, 3], &[0.0; 3])])?;
    assert_eq!(engine.last_run_inputs(), vec!["x"]);
    Ok(())
}

#[test]
fn fractional_dim_fails_before_any_native_value() -> Result<()> {
    let engine = FakeEngine::new();
    let session = identity_session(&engine)?;

    let mut bad = float_input(Some("x"), &[1, 3], &[0.0; 3]);
    if let HostValue::Object(map) = &mut bad {
        map.insert(
            "dims".to_string(),
            HostValue::Array(vec![HostValue::Number(2.5)]),
        );
    }

    let err = session.run(&[bad]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidShape);
    assert!(err.to_string().starts_with("run: input 0 ('x'): invalid shape"), "{err}");
    assert_eq!(engine.created(HandleKind::Value), 0);
    assert_eq!(engine.run_calls(), 0);
    Ok(())
}

#[test]
fn int32_data_declared_float32_is_type_mismatch() -> Result<()> {
    let engine = FakeEngine::new();
    let session = identity_session(&engine)?;

    let input = HostTensor::new(&[1, 3], HostArray::from_slice(&[1i32, 2, 3]))
        .with_type(ElementType::Float32)
        .with_name("x")
        .into_host_value();
    let err = session.run(&[input]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    assert_eq!(engine.created(HandleKind::Value), 0);
    Ok(())
}

#[test]
fn expected_type_comes_from_metadata() -> Result<()> {
    let engine = FakeEngine::new();
    let session = identity_session(&engine)?;

    // No type field: the metadata says float32, and an Int32Array is not that.
    let input = HostTensor::new(&[1, 3], HostArray::from_slice(&[1i32, 2, 3]))
        .with_name("x")
        .into_host_value();
    assert_eq!(session.run(&[input]).unwrap_err().kind(), ErrorKind::TypeMismatch);

    let input = HostTensor::new(&[1, 3], HostArray::from_slice(&[1f32, 2.0, 3.0]))
        .with_name("x")
        .into_host_value();
    assert_eq!(session.run(&[input])?.len(), 1);
    Ok(())
}

#[test]
fn unnamed_inputs_are_typed_by_position_when_names_repeat() -> Result<()> {
    let engine = FakeEngine::new().with_model(
        MODEL,
        FakeModel {
            inputs: vec![
                io("z", ElementType::Float32, &[2]),
                io("a", ElementType::Float32, &[2]),
                io("z", ElementType::Uint8, &[2]),
            ],
            outputs: vec![io("out", ElementType::Float32, &[2])],
        },
    );
    let mut session = InferenceSession::new(environment(&engine), &SessionConfig::default())?;
    session.load_model(MODEL)?;

    // No type fields: the third input must be checked against uint8, not the first "z".
    let inputs = vec![
        HostTensor::new(&[2], HostArray::from_slice(&[1f32, 2.0])).into_host_value(),
        HostTensor::new(&[2], HostArray::from_slice(&[3f32, 4.0])).into_host_value(),
        HostTensor::new(&[2], HostArray::from_slice(&[5u8, 6])).into_host_value(),
    ];
    let outputs = session.run(&inputs)?;
    assert_eq!(outputs.len(), 1);
    assert_eq!(engine.last_run_inputs(), vec!["z", "a", "z"]);
    assert_eq!(engine.released(HandleKind::Value), 4);
    Ok(())
}

#[test]
fn decode_failure_midway_releases_earlier_inputs() -> Result<()> {
    let engine = FakeEngine::new().with_model(
        MODEL,
        FakeModel {
            inputs: vec![
                io("a", ElementType::Float32, &[2]),
                io("b", ElementType::Float32, &[2]),
                io("c", ElementType::Float32, &[2]),
            ],
            outputs: vec![io("out", ElementType::Float32, &[2])],
        },
    );
    let mut session = InferenceSession::new(environment(&engine), &SessionConfig::default())?;
    session.load_model(MODEL)?;

    let inputs = vec![
        float_input(Some("a"), &[2], &[1.0, 2.0]),
        HostValue::String("not a tensor".into()),
        float_input(Some("c"), &[2], &[5.0, 6.0]),
    ];
    let err = session.run(&inputs).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(err.to_string().contains("input 1"), "{err}");

    assert_eq!(engine.created(HandleKind::Value), 1);
    assert_eq!(engine.released(HandleKind::Value), 1);
    assert_eq!(engine.run_calls(), 0);
    Ok(())
}

#[test]
fn engine_run_failure_releases_inputs() -> Result<()> {
    let engine = FakeEngine::new();
    let session = identity_session(&engine)?;
    engine.fail_at(Some(FailPoint::Run));

    let err = session
        .run(&[float_input(Some("x"), &[1, 3], &[0.0; 3])])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RunFailed);
    assert!(err.to_string().contains("injected failure"), "{err}");
    assert_eq!(engine.created(HandleKind::Value), 1);
    assert_eq!(engine.released(HandleKind::Value), 1);
    Ok(())
}

#[test]
fn engine_detects_input_count_mismatch() -> Result<()> {
    let engine = FakeEngine::new();
    let session = identity_session(&engine)?;

    let inputs = vec![
        float_input(Some("x"), &[1, 3], &[0.0; 3]),
        float_input(Some("x"), &[1, 3], &[0.0; 3]),
    ];
    let err = session.run(&inputs).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputCountMismatch);
    assert!(err.to_string().contains("expected 1 inputs, got 2"), "{err}");
    assert_eq!(engine.released(HandleKind::Value), 2);
    Ok(())
}

#[test]
fn unknown_input_name_is_left_to_engine() -> Result<()> {
    let engine = FakeEngine::new();
    let session = identity_session(&engine)?;

    let err = session
        .run(&[float_input(Some("z"), &[1, 3], &[0.0; 3])])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RunFailed);
    assert_eq!(engine.run_calls(), 1);
    assert_eq!(engine.last_run_inputs(), vec!["z"]);
    Ok(())
}

#[test]
fn untransferable_output_is_released_after_failure() -> Result<()> {
    let engine = FakeEngine::new().with_model(
        MODEL,
        FakeModel {
            inputs: vec![io("x", ElementType::Float64, &[2])],
            outputs: vec![io("ids", ElementType::Int64, &[2])],
        },
    );
    let mut session = InferenceSession::new(environment(&engine), &SessionConfig::default())?;
    session.load_model(MODEL)?;

    let input = HostTensor::new(&[2], HostArray::from_slice(&[1.0f64, 2.0]))
        .with_type(ElementType::Float64)
        .into_host_value();
    let err = session.run(&[input]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedType);
    assert!(err.to_string().contains("output 0 ('ids')"), "{err}");
    assert_eq!(engine.created(HandleKind::Value), 2);
    assert_eq!(engine.released(HandleKind::Value), 2);
    Ok(())
}

#[test]
fn run_before_load_touches_nothing() -> Result<()> {
    let engine = FakeEngine::new();
    let resource = SessionResource::new(environment(&engine), &SessionConfig::default())?;

    let err = resource
        .run(&[float_input(Some("x"), &[1, 3], &[0.0; 3])])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInitialized);
    assert_eq!(engine.run_calls(), 0);
    assert_eq!(engine.created(HandleKind::Value), 0);
    assert_eq!(engine.created(HandleKind::Session), 0);
    Ok(())
}

#[test]
fn introspection_requires_load() -> Result<()> {
    let engine = FakeEngine::new();
    let session = InferenceSession::new(environment(&engine), &SessionConfig::default())?;

    let err = session.input_names().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInitialized);
    assert_eq!(err.to_string(), "inputNames: session not initialized");
    assert_eq!(
        session.output_names().unwrap_err().kind(),
        ErrorKind::NotInitialized
    );
    Ok(())
}

#[test]
fn second_load_is_rejected_without_side_effects() -> Result<()> {
    let engine = FakeEngine::new();
    let mut session = identity_session(&engine)?;
    engine.with_model(
        "models/other.onnx",
        FakeModel::identity("a", "b", ElementType::Int32, &[4]),
    );

    let inputs_before: Vec<String> = session.input_names()?.iter().map(|s| s.to_string()).collect();
    let outputs_before: Vec<String> =
        session.output_names()?.iter().map(|s| s.to_string()).collect();

    let err = session.load_model("models/other.onnx").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyLoaded);
    assert_eq!(engine.created(HandleKind::Session), 1);
    assert_eq!(engine.released(HandleKind::Session), 0);

    assert_eq!(session.input_names()?, inputs_before);
    assert_eq!(session.output_names()?, outputs_before);
    Ok(())
}

#[test]
fn missing_model_is_load_failure() -> Result<()> {
    let engine = FakeEngine::new();
    let mut session = InferenceSession::new(environment(&engine), &SessionConfig::default())?;

    let err = session.load_model("models/missing.onnx").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelLoadFailed);
    assert!(err.to_string().contains("file doesn't exist"), "{err}");
    assert!(!session.is_loaded());
    Ok(())
}

#[test]
fn metadata_failure_releases_partial_handles() -> Result<()> {
    let points = [
        FailPoint::LoadSession,
        FailPoint::IoCount(IoSide::Input),
        FailPoint::IoName(IoSide::Input, 1),
        FailPoint::TensorInfo(IoSide::Input, 0),
        FailPoint::IoCount(IoSide::Output),
        FailPoint::TensorInfo(IoSide::Output, 0),
    ];
    for point in points {
        let engine = FakeEngine::new().with_model(
            MODEL,
            FakeModel {
                inputs: vec![
                    io("a", ElementType::Float32, &[1]),
                    io("b", ElementType::Int32, &[-1, 4]),
                ],
                outputs: vec![io("c", ElementType::Float32, &[1])],
            },
        );
        let mut resource = SessionResource::new(environment(&engine), &SessionConfig::default())?;
        engine.fail_at(Some(point));

        let err = resource.load(Path::new(MODEL)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelLoadFailed, "{point:?}");
        assert!(err.to_string().contains("injected failure"), "{point:?}: {err}");
        assert!(resource.metadata().is_err(), "{point:?}");
        assert_eq!(
            engine.created(HandleKind::Session),
            engine.released(HandleKind::Session),
            "{point:?}"
        );
        assert_eq!(
            engine.created(HandleKind::TypeInfo),
            engine.released(HandleKind::TypeInfo),
            "{point:?}"
        );

        // The resource is still usable once the engine recovers.
        engine.fail_at(None);
        resource.load(Path::new(MODEL)).context("retry load")?;
        assert_eq!(resource.metadata()?.input_names(), vec!["a", "b"]);
    }
    Ok(())
}

#[test]
fn metadata_preserves_engine_order_and_dynamic_dims() -> Result<()> {
    let engine = FakeEngine::new().with_model(
        MODEL,
        FakeModel {
            inputs: vec![
                io("z", ElementType::Float32, &[-1, 3]),
                io("a", ElementType::Int64, &[]),
                io("z", ElementType::Uint8, &[2]),
            ],
            outputs: vec![io("out", ElementType::Float32, &[-1, 3])],
        },
    );
    let mut session = InferenceSession::new(environment(&engine), &SessionConfig::default())?;
    session.load_model(MODEL)?;

    assert_eq!(session.input_names()?, vec!["z", "a", "z"]);
    let metadata = session.metadata()?;
    assert_eq!(metadata.inputs[0].dims, vec![None, Some(3)]);
    assert_eq!(metadata.inputs[1].dtype, ElementType::Int64);
    assert_eq!(metadata.inputs[1].rank(), 0);
    // type info handles never outlive the load
    assert_eq!(
        engine.created(HandleKind::TypeInfo),
        engine.released(HandleKind::TypeInfo)
    );
    assert_eq!(engine.created(HandleKind::TypeInfo), 4);
    Ok(())
}

#[test]
fn drop_releases_in_reverse_acquisition_order() -> Result<()> {
    let engine = FakeEngine::new();
    let session = identity_session(&engine)?;
    session.run(&[float_input(Some("x"), &[1, 3], &[0.0; 3])])?;
    drop(session);

    let log: Vec<HandleKind> = engine
        .release_log()
        .into_iter()
        .filter(|kind| !matches!(kind, HandleKind::TypeInfo | HandleKind::Value))
        .collect();
    assert_eq!(
        log,
        vec![
            HandleKind::Session,
            HandleKind::Allocator,
            HandleKind::SessionOptions,
            HandleKind::Environment,
        ]
    );
    assert!(engine.balanced());
    assert_eq!(engine.live(), 0);
    Ok(())
}

#[test]
fn run_named_orders_feeds_and_keys_outputs() -> Result<()> {
    let engine = FakeEngine::new().with_model(
        MODEL,
        FakeModel {
            inputs: vec![
                io("first", ElementType::Int32, &[2]),
                io("second", ElementType::Uint8, &[3]),
            ],
            outputs: vec![
                io("out0", ElementType::Int32, &[2]),
                io("out1", ElementType::Uint8, &[3]),
            ],
        },
    );
    let mut session = InferenceSession::new(environment(&engine), &SessionConfig::default())?;
    session.load_model(MODEL)?;

    let mut feeds = BTreeMap::new();
    feeds.insert(
        "second".to_string(),
        HostTensor::new(&[3], HostArray::from_slice(&[7u8, 8, 9])).into_host_value(),
    );
    let err = session.run_named(&feeds).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(err.to_string().contains("missing input 'first'"), "{err}");

    feeds.insert(
        "first".to_string(),
        HostTensor::new(&[2], HostArray::from_slice(&[-1i32, 1])).into_host_value(),
    );
    let outputs = session.run_named(&feeds)?;
    assert_eq!(engine.last_run_inputs(), vec!["first", "second"]);

    let out0 = HostTensor::from_host_value(&outputs["out0"])?;
    assert_eq!(out0.data.to_vec::<i32>(), Some(vec![-1, 1]));
    let out1 = HostTensor::from_host_value(&outputs["out1"])?;
    assert_eq!(out1.data.to_vec::<u8>(), Some(vec![7, 8, 9]));
    Ok(())
}

#[test]
fn zero_element_tensor_round_trips() -> Result<()> {
    let engine = FakeEngine::new().with_model(
        MODEL,
        FakeModel::identity("x", "y", ElementType::Float32, &[0, 3]),
    );
    let mut session = InferenceSession::new(environment(&engine), &SessionConfig::default())?;
    session.load_model(MODEL)?;

    let outputs = session.run(&[float_input(None, &[0, 3], &[])])?;
    let out = HostTensor::from_host_value(&outputs[0])?;
    assert_eq!(out.dims, vec![0, 3]);
    assert!(out.data.is_empty());
    Ok(())
}
