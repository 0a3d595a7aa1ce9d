//! End-to-end flow: prompt, generate, sanitize, validate, execute.
//!
//! Only generation exhaustion escapes [`CodeTestingTool::test_generated_code`]
//! as an error. Every failure after a valid generation, including runner
//! infrastructure problems, is folded into a failed [`TestRun`].

use crate::executor::{ExecutionError, TestExecutor, TestReport};
use crate::generation::{GeneratedTests, GenerationError, TestGenerator};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Serialize)]
pub struct TestRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub test_code: String,
    pub attempts: u32,
    pub report: Option<TestReport>,
    /// Set when execution could not produce a report at all.
    pub execution_error: Option<String>,
    pub passed: bool,
}

impl TestRun {
    /// Diagnostic line for a failed run, or the report summary.
    pub fn summary(&self) -> String {
        match (&self.report, &self.execution_error) {
            (Some(report), _) => report.summary(),
            (None, Some(err)) => format!("Unexpected error: {}", err),
            (None, None) => "No report".to_string(),
        }
    }
}

pub struct CodeTestingTool {
    generator: TestGenerator,
    executor: Box<dyn TestExecutor>,
}

impl CodeTestingTool {
    pub fn new(generator: TestGenerator, executor: Box<dyn TestExecutor>) -> Self {
        Self {
            generator,
            executor,
        }
    }

    pub fn generator(&self) -> &TestGenerator {
        &self.generator
    }

    pub async fn generate_test_cases(&self, code: &str) -> Result<GeneratedTests, GenerationError> {
        self.generator.generate_tests(code).await
    }

    pub async fn test_generated_code(&self, code: &str) -> PipelineResult<TestRun> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(run_id = %id, "Generating tests");

        let generated = self.generate_test_cases(code).await?;
        let attempts = generated.attempts();

        let (report, execution_error) = match self.executor.execute(code, &generated.code).await {
            Ok(report) => (Some(report), None),
            Err(e) => {
                Self::log_execution_error(&e);
                (None, Some(e.to_string()))
            }
        };

        let passed = report.as_ref().is_some_and(TestReport::passed);
        if let Some(report) = &report {
            if passed {
                info!(run_id = %id, "{}", report.summary());
            } else {
                warn!(run_id = %id, "{}", report.summary());
            }
        }

        Ok(TestRun {
            id,
            started_at,
            test_code: generated.code,
            attempts,
            report,
            execution_error,
            passed,
        })
    }

    fn log_execution_error(err: &ExecutionError) {
        match err {
            ExecutionError::InvalidReport { message, stderr } => {
                error!("Test runner failed: {}\n{}", message, stderr)
            }
            other => error!("Test execution failed: {}", other),
        }
    }
}
