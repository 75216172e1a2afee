//! Structured run logging.

use tracing::{error, info, warn, Span};

use accmask_models::{MaskStrategy, RunId};

/// Logs run lifecycle events with the run id and strategy attached.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    strategy: String,
}

impl RunLogger {
    pub fn new(run_id: &RunId, strategy: MaskStrategy) -> Self {
        Self {
            run_id: run_id.to_string(),
            strategy: strategy.as_str().to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            strategy = %self.strategy,
            "Run started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            strategy = %self.strategy,
            "Run progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            run_id = %self.run_id,
            strategy = %self.strategy,
            "Run warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            run_id = %self.run_id,
            strategy = %self.strategy,
            "Run error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            strategy = %self.strategy,
            "Run completed: {}", message
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    /// Span covering the whole run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "run",
            run_id = %self.run_id,
            strategy = %self.strategy
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_logger_creation() {
        let run_id = RunId::new();
        let logger = RunLogger::new(&run_id, MaskStrategy::Saliency);

        assert_eq!(logger.run_id(), run_id.to_string());
        assert_eq!(logger.strategy(), "saliency");
    }
}
