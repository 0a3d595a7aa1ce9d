//! Out-of-process execution of generated unit tests.
//!
//! Generated code is never run inside this process. Each execution spawns a
//! fresh Python interpreter in isolated mode (`-I`), inside an empty temporary
//! working directory and with a scrubbed environment. The interpreter runs a
//! small driver script that:
//!
//! 1. reads a JSON payload (source under test, test code, runner options)
//!    from stdin,
//! 2. executes both into a fresh namespace,
//! 3. loads the test class into a suite and runs it with a fail-fast,
//!    verbose `TextTestRunner` writing into an in-memory buffer,
//! 4. writes a single JSON [`TestReport`] to a file in the working directory.
//!
//! The report never travels over stdout, so output that bypasses Python's
//! `sys.stdout` (`os.system`, subprocesses, C extensions) cannot corrupt it.
//! Such stray output is appended to [`TestReport::stdout`] instead.
//!
//! Wall time is bounded by [`ExecutorConfig::timeout`]; on expiry the child is
//! killed. Captured text is bounded by [`ExecutorConfig::max_output_chars`].

use crate::prompt::TEST_CLASS_NAME;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const REPORT_FILE: &str = "report.json";

const RUNNER_SCRIPT: &str = r#"
import contextlib
import io
import json
import sys
import unittest


def clip(text, limit):
    if len(text) <= limit:
        return text
    return text[:limit] + "\n... [truncated]"


def main():
    payload = json.load(sys.stdin)
    limit = payload["max_output_chars"]
    captured = io.StringIO()
    report = {}
    namespace = {"__name__": "__generated__", "unittest": unittest}
    try:
        with contextlib.redirect_stdout(captured):
            exec(compile(payload["source"], "<source-under-test>", "exec"), namespace)
            exec(compile(payload["tests"], "<generated-tests>", "exec"), namespace)
            test_class = namespace.get(payload["class_name"])
            if test_class is None:
                report = {"status": "class_not_found", "class_name": payload["class_name"]}
            else:
                stream = io.StringIO()
                runner = unittest.TextTestRunner(
                    stream=stream,
                    verbosity=payload["verbosity"],
                    failfast=payload["failfast"],
                )
                suite = unittest.TestLoader().loadTestsFromTestCase(test_class)
                result = runner.run(suite)
                report = {
                    "status": "completed",
                    "success": result.wasSuccessful(),
                    "tests_run": result.testsRun,
                    "failures": len(result.failures),
                    "errors": len(result.errors),
                    "skipped": len(result.skipped),
                    "output": clip(stream.getvalue(), limit),
                }
    except SyntaxError as exc:
        report = {"status": "syntax_error", "message": str(exc)}
    except BaseException as exc:
        report = {"status": "error", "message": "%s: %s" % (type(exc).__name__, exc)}
    report["stdout"] = clip(captured.getvalue(), limit)
    with open(payload["report_path"], "w", encoding="utf-8") as handle:
        json.dump(report, handle)


main()
"#;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Python interpreter '{interpreter}' not found. Install Python 3 or set executor.interpreter")]
    InterpreterNotFound { interpreter: String },

    #[error("Test execution timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Test runner produced no usable report: {message}")]
    InvalidReport { message: String, stderr: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Interpreter binary, looked up on `PATH`.
    pub interpreter: String,
    pub timeout: Duration,
    pub max_output_chars: usize,
    pub verbosity: u8,
    pub failfast: bool,
    /// Pass `-I` (ignore environment variables, user site-packages and cwd on `sys.path`).
    pub isolated: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout: Duration::from_secs(60),
            max_output_chars: 64 * 1024,
            verbosity: 2,
            failfast: true,
            isolated: true,
        }
    }
}

impl ExecutorConfig {
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.interpreter.trim().is_empty() {
            return Err("Interpreter cannot be empty".to_string());
        }
        if self.timeout.is_zero() {
            return Err("Execution timeout must be greater than 0".to_string());
        }
        if self.max_output_chars == 0 {
            return Err("Max output size must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// What happened inside the interpreter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed {
        success: bool,
        tests_run: u32,
        failures: u32,
        errors: u32,
        skipped: u32,
        /// Verbose runner output.
        output: String,
    },
    ClassNotFound {
        class_name: String,
    },
    SyntaxError {
        message: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    #[serde(flatten)]
    pub outcome: ExecutionOutcome,
    /// Anything the executed code printed.
    #[serde(default)]
    pub stdout: String,
    #[serde(skip)]
    pub duration: Duration,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Completed { success: true, .. })
    }

    /// Human-readable one-line summary of the outcome.
    pub fn summary(&self) -> String {
        match &self.outcome {
            ExecutionOutcome::Completed {
                success,
                tests_run,
                failures,
                errors,
                skipped,
                ..
            } => format!(
                "{} test(s) run: {} failure(s), {} error(s), {} skipped -> {}",
                tests_run,
                failures,
                errors,
                skipped,
                if *success { "OK" } else { "FAILED" }
            ),
            ExecutionOutcome::ClassNotFound { class_name } => {
                format!("Error: {} class not found in output", class_name)
            }
            ExecutionOutcome::SyntaxError { message } => {
                format!("Critical syntax error: {}", message)
            }
            ExecutionOutcome::Error { message } => format!("Unexpected error: {}", message),
        }
    }
}

#[derive(Serialize)]
struct RunnerPayload<'a> {
    source: &'a str,
    tests: &'a str,
    class_name: &'a str,
    verbosity: u8,
    failfast: bool,
    max_output_chars: usize,
    report_path: &'a Path,
}

/// Runs a generated test module against the code it was written for.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    async fn execute(&self, source: &str, tests: &str) -> ExecutionResult<TestReport>;
}

pub struct PythonExecutor {
    config: ExecutorConfig,
}

impl PythonExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// `python3 --version`, as a cheap availability probe.
    pub async fn interpreter_version(&self) -> ExecutionResult<String> {
        let output = Command::new(&self.config.interpreter)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() {
            Ok(String::from_utf8_lossy(&output.stderr).trim().to_string())
        } else {
            Ok(version)
        }
    }

    fn spawn_error(&self, err: std::io::Error) -> ExecutionError {
        if err.kind() == std::io::ErrorKind::NotFound {
            ExecutionError::InterpreterNotFound {
                interpreter: self.config.interpreter.clone(),
            }
        } else {
            ExecutionError::Io(err)
        }
    }

    fn command(&self, workdir: &Path) -> Command {
        let mut command = Command::new(&self.config.interpreter);
        if self.config.isolated {
            command.arg("-I");
        }
        command
            .arg("-c")
            .arg(RUNNER_SCRIPT)
            .current_dir(workdir)
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn parse_report(&self, report: &str, stderr: &[u8]) -> ExecutionResult<TestReport> {
        let stderr = truncate_chars(&String::from_utf8_lossy(stderr), self.config.max_output_chars);

        if report.trim().is_empty() {
            return Err(ExecutionError::InvalidReport {
                message: "runner exited without writing a report".to_string(),
                stderr,
            });
        }

        serde_json::from_str(report.trim()).map_err(|e| ExecutionError::InvalidReport {
            message: e.to_string(),
            stderr,
        })
    }

    async fn read_report(path: &Path) -> ExecutionResult<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(report) => Ok(report),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for PythonExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

#[async_trait]
impl TestExecutor for PythonExecutor {
    async fn execute(&self, source: &str, tests: &str) -> ExecutionResult<TestReport> {
        let workdir = tempfile::Builder::new().prefix("testsmith-").tempdir()?;
        let report_path = workdir.path().join(REPORT_FILE);
        let payload = serde_json::to_vec(&RunnerPayload {
            source,
            tests,
            class_name: TEST_CLASS_NAME,
            verbosity: self.config.verbosity,
            failfast: self.config.failfast,
            max_output_chars: self.config.max_output_chars,
            report_path: &report_path,
        })?;

        debug!(
            "Spawning {} in {}",
            self.config.interpreter,
            workdir.path().display()
        );
        let started = Instant::now();
        let mut child = self
            .command(workdir.path())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let run = async move {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        };

        let output = match timeout(self.config.timeout, run).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    "Test execution exceeded {:?}; interpreter killed",
                    self.config.timeout
                );
                return Err(ExecutionError::Timeout {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                });
            }
        };

        let raw_report = Self::read_report(&report_path).await?;
        let mut report = self.parse_report(&raw_report, &output.stderr)?;
        report.duration = started.elapsed();

        let stray = String::from_utf8_lossy(&output.stdout);
        if !stray.is_empty() {
            debug!("Interpreter wrote {} bytes outside sys.stdout", stray.len());
            report
                .stdout
                .push_str(&truncate_chars(&stray, self.config.max_output_chars));
        }

        info!(
            "Test execution finished in {:?}: {}",
            report.duration,
            report.summary()
        );
        Ok(report)
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}\n... [truncated]", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::EXAMPLE_TESTS;

    const ADD_SOURCE: &str = "def add(a, b):\n    return a + b\n";

    fn python_available() -> bool {
        let available = std::process::Command::new("python3")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success());
        if !available {
            println!("python3 not available - skipping execution test");
        }
        available
    }

    #[test]
    fn test_default_config() {
        let config = ExecutorConfig::default();
        assert_eq!(config.interpreter, "python3");
        assert_eq!(config.verbosity, 2);
        assert!(config.failfast);
        assert!(config.isolated);
        assert!(config.validate().is_ok());

        assert!(ExecutorConfig::default()
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ExecutorConfig::default()
            .with_interpreter(" ")
            .validate()
            .is_err());
    }

    #[test]
    fn test_report_deserialization() {
        let json = r#"{"status":"completed","success":true,"tests_run":3,"failures":0,"errors":0,"skipped":0,"output":"ok","stdout":""}"#;
        let report: TestReport = serde_json::from_str(json).unwrap();
        assert!(report.passed());

        let json = r#"{"status":"class_not_found","class_name":"GeneratedTests","stdout":"hi"}"#;
        let report: TestReport = serde_json::from_str(json).unwrap();
        assert!(!report.passed());
        assert_eq!(report.stdout, "hi");
        assert_eq!(
            report.summary(),
            "Error: GeneratedTests class not found in output"
        );

        let json = r#"{"status":"error","message":"NameError: name 'x' is not defined"}"#;
        let report: TestReport = serde_json::from_str(json).unwrap();
        assert!(report.summary().starts_with("Unexpected error: NameError"));
    }

    #[test]
    fn test_parse_report_rejects_garbage() {
        let executor = PythonExecutor::default();
        let result = executor.parse_report("", b"Traceback ...");
        match result {
            Err(ExecutionError::InvalidReport { stderr, .. }) => assert_eq!(stderr, "Traceback ..."),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            executor.parse_report("not json", b""),
            Err(ExecutionError::InvalidReport { .. })
        ));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc\n... [truncated]");
        assert_eq!(truncate_chars("ééé", 2), "éé\n... [truncated]");
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let executor = PythonExecutor::new(
            ExecutorConfig::default().with_interpreter("testsmith-no-such-python"),
        );
        let result = executor.execute(ADD_SOURCE, EXAMPLE_TESTS).await;
        assert!(matches!(
            result,
            Err(ExecutionError::InterpreterNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_example_tests_pass() {
        if !python_available() {
            return;
        }
        let report = PythonExecutor::default()
            .execute(ADD_SOURCE, EXAMPLE_TESTS)
            .await
            .unwrap();

        assert!(report.passed(), "report: {report:?}");
        match report.outcome {
            ExecutionOutcome::Completed {
                tests_run, output, ..
            } => {
                assert_eq!(tests_run, 3);
                assert!(output.contains("test_normal_case"));
                assert!(output.contains("OK"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failfast_stops_after_first_failure() {
        if !python_available() {
            return;
        }
        let tests = "import unittest\nclass GeneratedTests(unittest.TestCase):\n    def test_a(self):\n        self.assertEqual(add(1, 1), 3)\n\n    def test_b(self):\n        self.assertEqual(add(1, 1), 4)\n";
        let report = PythonExecutor::default()
            .execute(ADD_SOURCE, tests)
            .await
            .unwrap();

        assert!(!report.passed());
        match report.outcome {
            ExecutionOutcome::Completed {
                tests_run,
                failures,
                ..
            } => {
                assert_eq!(tests_run, 1);
                assert_eq!(failures, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_class() {
        if !python_available() {
            return;
        }
        let tests = "import unittest\nclass OtherTests(unittest.TestCase):\n    def test_a(self):\n        pass\n";
        let report = PythonExecutor::default()
            .execute(ADD_SOURCE, tests)
            .await
            .unwrap();

        assert_eq!(
            report.outcome,
            ExecutionOutcome::ClassNotFound {
                class_name: "GeneratedTests".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_syntax_and_runtime_errors() {
        if !python_available() {
            return;
        }
        let executor = PythonExecutor::default();

        let report = executor.execute(ADD_SOURCE, "def broken(:\n").await.unwrap();
        assert!(matches!(report.outcome, ExecutionOutcome::SyntaxError { .. }));

        let report = executor
            .execute(ADD_SOURCE, "import no_such_module_for_testsmith\n")
            .await
            .unwrap();
        match report.outcome {
            ExecutionOutcome::Error { message } => {
                assert!(message.contains("ModuleNotFoundError"), "{message}")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_captures_printed_output() {
        if !python_available() {
            return;
        }
        let tests = "import unittest\nprint('loaded tests')\nclass GeneratedTests(unittest.TestCase):\n    def test_a(self):\n        self.assertTrue(True)\n";
        let report = PythonExecutor::default()
            .execute(ADD_SOURCE, tests)
            .await
            .unwrap();

        assert!(report.passed());
        assert_eq!(report.stdout.trim(), "loaded tests");
    }

    #[tokio::test]
    async fn test_output_outside_sys_stdout_does_not_break_the_report() {
        if !python_available() {
            return;
        }
        let source = format!(
            "import os\nimport sys\nos.system('echo building fixtures')\nsys.__stdout__.write('raw write\\n')\nsys.__stdout__.flush()\n{}",
            ADD_SOURCE
        );
        let report = PythonExecutor::default()
            .execute(&source, EXAMPLE_TESTS)
            .await
            .unwrap();

        assert!(report.passed(), "report: {report:?}");
        assert!(report.stdout.contains("building fixtures"));
        assert!(report.stdout.contains("raw write"));
    }

    #[tokio::test]
    async fn test_missing_report_is_invalid() {
        if !python_available() {
            return;
        }
        let result = PythonExecutor::default()
            .execute("import os\nos._exit(0)\n", EXAMPLE_TESTS)
            .await;
        assert!(matches!(
            result,
            Err(ExecutionError::InvalidReport { .. })
        ));
    }

    #[tokio::test]
    async fn test_interpreter_version() {
        if !python_available() {
            return;
        }
        let version = PythonExecutor::default().interpreter_version().await.unwrap();
        assert!(version.starts_with("Python 3"), "{version}");
    }

    #[tokio::test]
    async fn test_timeout_kills_runaway_code() {
        if !python_available() {
            return;
        }
        let executor = PythonExecutor::new(
            ExecutorConfig::default().with_timeout(Duration::from_millis(500)),
        );
        let result = executor.execute("while True:\n    pass\n", EXAMPLE_TESTS).await;
        assert!(matches!(
            result,
            Err(ExecutionError::Timeout { timeout_ms: 500 })
        ));
    }
}
