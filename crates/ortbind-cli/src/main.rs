mod cli;
mod feed;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use ortbind_core::{
    EnvironmentConfig, HostArray, HostArrayKind, HostTensor, InferenceSession, SessionConfig,
    TensorSpec,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log).context("invalid --log filter")?)
        .with_writer(std::io::stderr)
        .init();

    let env = ortbind_backend_ort::init(EnvironmentConfig::default().with_log_id(&cli.log_id))?;
    let mut config = SessionConfig::default().with_graph_optimization(cli.opt_level);
    if let Some(threads) = cli.intra_threads {
        config = config.with_intra_op_threads(threads);
    }
    let mut session = InferenceSession::new(env, &config)?;

    match cli.command {
        Command::Inspect { model_path } => {
            load(&mut session, &model_path)?;
            inspect(&session)
        }
        Command::Run { model_path, inputs } => {
            load(&mut session, &model_path)?;
            run(&session, inputs)
        }
    }
}

fn load(session: &mut InferenceSession, path: &Path) -> Result<()> {
    session
        .load_model(path)
        .with_context(|| format!("failed to load {}", path.display()))
}

fn inspect(session: &InferenceSession) -> Result<()> {
    let metadata = session.metadata()?;
    println!("inputs:");
    for spec in &metadata.inputs {
        println!("  {}", describe(spec));
    }
    println!("outputs:");
    for spec in &metadata.outputs {
        println!("  {}", describe(spec));
    }
    Ok(())
}

fn run(session: &InferenceSession, inputs: Vec<HostTensor>) -> Result<()> {
    let inputs: Vec<_> = inputs.into_iter().map(HostTensor::into_host_value).collect();
    tracing::info!(inputs = inputs.len(), "running model");
    let outputs = session.run(&inputs)?;

    for (name, output) in session.output_names()?.into_iter().zip(&outputs) {
        let tensor = HostTensor::from_host_value(output)?;
        let dtype = tensor
            .dtype
            .map_or_else(|| "?".to_string(), |dtype| dtype.to_string());
        println!(
            "{name}: {dtype} {:?} = {}",
            tensor.dims,
            format_values(&tensor.data)
        );
    }
    Ok(())
}

fn describe(spec: &TensorSpec) -> String {
    let dims = spec
        .dims
        .iter()
        .map(|d| d.map_or_else(|| "?".to_string(), |d| d.to_string()))
        .collect::<Vec<_>>()
        .join(",");
    format!("{}: {} [{dims}]", spec.name, spec.dtype)
}

fn format_values(data: &HostArray) -> String {
    fn join<T: std::fmt::Display>(values: Option<Vec<T>>) -> String {
        let values = values.unwrap_or_default();
        let body = values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("[{body}]")
    }

    match data.kind() {
        HostArrayKind::Float32 => join(data.to_vec::<f32>()),
        HostArrayKind::Float64 => join(data.to_vec::<f64>()),
        HostArrayKind::Int8 => join(data.to_vec::<i8>()),
        HostArrayKind::Uint8 => join(data.to_vec::<u8>()),
        HostArrayKind::Int16 => join(data.to_vec::<i16>()),
        HostArrayKind::Uint16 => join(data.to_vec::<u16>()),
        HostArrayKind::Int32 => join(data.to_vec::<i32>()),
        HostArrayKind::Uint32 => join(data.to_vec::<u32>()),
        HostArrayKind::BigInt64 => join(data.to_vec::<i64>()),
        HostArrayKind::BigUint64 => join(data.to_vec::<u64>()),
    }
}
