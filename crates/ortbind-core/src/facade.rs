use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::error::{Error, Result, ResultExt};
use crate::handle::Environment;
use crate::host::HostValue;
use crate::session::SessionResource;
use crate::spec::SessionMetadata;

/// Entry point for the host binding: load once, introspect, run.
///
/// Every error is tagged with the host-facing operation that raised it.
pub struct InferenceSession {
    resource: SessionResource,
}

impl InferenceSession {
    pub fn new(env: Arc<Environment>, config: &SessionConfig) -> Result<Self> {
        let resource = SessionResource::new(env, config).context("InferenceSession")?;
        Ok(Self { resource })
    }

    pub fn load_model(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.resource.load(path.as_ref()).context("loadModel")
    }

    pub fn is_loaded(&self) -> bool {
        self.resource.is_loaded()
    }

    pub fn input_names(&self) -> Result<Vec<&str>> {
        self.resource
            .metadata()
            .map(SessionMetadata::input_names)
            .context("inputNames")
    }

    pub fn output_names(&self) -> Result<Vec<&str>> {
        self.resource
            .metadata()
            .map(SessionMetadata::output_names)
            .context("outputNames")
    }

    pub fn metadata(&self) -> Result<&SessionMetadata> {
        self.resource.metadata().context("metadata")
    }

    pub fn run(&self, inputs: &[HostValue]) -> Result<Vec<HostValue>> {
        self.resource.run(inputs).context("run")
    }

    /// Runs with inputs keyed by name and returns outputs keyed by name.
    ///
    /// Feeds are ordered by the model's input names; extra feeds are ignored.
    pub fn run_named(
        &self,
        feeds: &BTreeMap<String, HostValue>,
    ) -> Result<BTreeMap<String, HostValue>> {
        let metadata = self.resource.metadata().context("run")?;
        let mut inputs = Vec::with_capacity(metadata.inputs.len());
        for spec in &metadata.inputs {
            let feed = feeds
                .get(&spec.name)
                .ok_or_else(|| Error::InvalidInput(format!("missing input '{}'", spec.name)))
                .context("run")?;
            inputs.push(feed.clone());
        }

        let outputs = self.run(&inputs)?;
        Ok(metadata
            .outputs
            .iter()
            .map(|spec| spec.name.clone())
            .zip(outputs)
            .collect())
    }
}
