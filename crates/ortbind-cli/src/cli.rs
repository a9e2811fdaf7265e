use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ortbind_core::{GraphOptimizationLevel, HostTensor};

use crate::feed::parse_feed;

#[derive(Parser, Debug)]
#[command(name = "ortbind", version, about = "Inspect and run ONNX models")]
pub struct Cli {
    /// Log filter (RUST_LOG syntax)
    #[arg(long, global = true, default_value = "warn")]
    pub log: String,

    /// Identifier the runtime environment logs under
    #[arg(long, global = true, default_value = "ortbind")]
    pub log_id: String,

    /// Graph optimization level: disabled, basic, extended or all
    #[arg(long, global = true, default_value = "all")]
    pub opt_level: GraphOptimizationLevel,

    /// Intra-op thread count; the runtime picks when unset
    #[arg(long, global = true)]
    pub intra_threads: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a model's inputs and outputs
    Inspect {
        /// Path to ONNX model file
        #[arg(long)]
        model_path: PathBuf,
    },
    /// Run a model once and print every output
    Run {
        /// Path to ONNX model file
        #[arg(long)]
        model_path: PathBuf,

        /// Input tensor as [name=]type:d0xd1:v0,v1,... (repeat per input, in order)
        #[arg(long = "input", value_parser = parse_feed)]
        inputs: Vec<HostTensor>,
    },
}
