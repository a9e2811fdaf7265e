//! Marshalling layer between host tensor values and a handle-based inference engine.
//!
//! Data flows `HostValue -> codec::decode -> TensorDescriptor -> engine -> TensorDescriptor
//! -> codec::encode -> HostValue`. Every engine handle is owned by a guard from
//! [`handle`], so each acquisition is matched by exactly one release on every exit path.

pub mod codec;
pub mod config;
pub mod dtype;
pub mod engine;
pub mod error;
pub mod facade;
pub mod handle;
pub mod host;
pub mod session;
pub mod shape;
pub mod spec;
pub mod tensor;

pub use config::*;
pub use dtype::*;
pub use engine::*;
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use facade::*;
pub use handle::{Environment, NativeHandle};
pub use host::*;
pub use session::*;
pub use shape::*;
pub use spec::*;
pub use tensor::*;
