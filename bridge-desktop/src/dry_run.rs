//! Dry-run command runner

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    process::{CommandOutput, CommandRunner, CommandSpec},
};
use std::sync::Arc;
use tracing::info;

/// Runner that logs commands instead of executing them
///
/// Commands marked [`read_only`](CommandSpec::read_only) are delegated to the
/// wrapped runner so that observations (such as a parity diff) still reflect
/// the real state. Every other command reports a synthetic success.
pub struct DryRunCommandRunner {
    inner: Arc<dyn CommandRunner>,
}

impl DryRunCommandRunner {
    pub fn new(inner: Arc<dyn CommandRunner>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CommandRunner for DryRunCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        if spec.read_only {
            info!("(DRY-RUN, read-only) {}", spec);
            return self.inner.run(spec).await;
        }

        info!("(DRY-RUN) {}", spec);
        Ok(CommandOutput::synthetic_success())
    }
}
