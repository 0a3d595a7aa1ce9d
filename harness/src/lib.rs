pub mod config;
pub mod executor;
pub mod generation;
pub mod pipeline;
pub mod prompt;
pub mod sanitize;
pub mod syntax;

pub use config::{AppConfig, ConfigError, ProviderKind};
pub use executor::{
    ExecutionError, ExecutionOutcome, ExecutorConfig, PythonExecutor, TestExecutor, TestReport,
};
pub use generation::{
    AttemptOutcome, GeneratedTests, GenerationAttempt, GenerationConfig, GenerationError,
    TestGenerator,
};
pub use pipeline::{CodeTestingTool, PipelineError, TestRun};
pub use prompt::{TestPrompt, END_OF_PROMPT_MARKER, TEST_CLASS_NAME};
pub use sanitize::{clean_code, SanitizeRule};
pub use syntax::{check_syntax, is_valid_python, SyntaxIssue};
