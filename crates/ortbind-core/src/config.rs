use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GraphOptimizationLevel {
    Disabled,
    Basic,
    Extended,
    #[default]
    All,
}

impl FromStr for GraphOptimizationLevel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "disabled" | "none" | "0" => Ok(GraphOptimizationLevel::Disabled),
            "basic" | "1" => Ok(GraphOptimizationLevel::Basic),
            "extended" | "2" => Ok(GraphOptimizationLevel::Extended),
            "all" | "3" => Ok(GraphOptimizationLevel::All),
            other => Err(format!(
                "unknown optimization level: {other} (expected disabled, basic, extended or all)"
            )),
        }
    }
}

/// Settings for the process-wide environment.
///
/// `log_id` names the engine environment; the engine's own log records are tagged with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvironmentConfig {
    pub log_id: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            log_id: "ortbind".to_string(),
        }
    }
}

impl EnvironmentConfig {
    pub fn with_log_id(mut self, log_id: impl Into<String>) -> Self {
        self.log_id = log_id.into();
        self
    }
}

/// Per-session options handed to the engine when the options handle is created.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SessionConfig {
    pub graph_optimization: GraphOptimizationLevel,
    /// `None` lets the engine pick.
    pub intra_op_threads: Option<usize>,
}

impl SessionConfig {
    pub fn with_graph_optimization(mut self, level: GraphOptimizationLevel) -> Self {
        self.graph_optimization = level;
        self
    }

    pub fn with_intra_op_threads(mut self, threads: usize) -> Self {
        self.intra_op_threads = Some(threads);
        self
    }
}
