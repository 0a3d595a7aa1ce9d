use clap::{Args, Parser, Subcommand};
use harness::config::{AppConfig, ProviderKind};
use harness::executor::{ExecutionOutcome, PythonExecutor};
use harness::generation::{GenerationError, TestGenerator};
use harness::pipeline::{CodeTestingTool, PipelineError, TestRun};
use harness::syntax::check_syntax;
use model::ModelProvider;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXAMPLE_SOURCE: &str = "
def add(a, b):
    return a + b
";

#[derive(Parser)]
#[command(name = "testsmith")]
#[command(about = "Generate, sanitize and run language-model-written unit tests for Python code")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Generation backend
    #[arg(long, global = true, value_enum)]
    provider: Option<ProviderKind>,
    /// Model name (provider default if omitted)
    #[arg(short, long, global = true)]
    model: Option<String>,
    /// Maximum generation attempts
    #[arg(long, global = true)]
    max_retries: Option<u32>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate tests for the code, run them and report pass/fail
    Run(SourceArgs),
    /// Generate and validate tests without running them
    Generate(SourceArgs),
    /// Check whether a Python file parses
    Check {
        /// File to check
        file: PathBuf,
    },
    /// Check the test interpreter and that the provider is reachable and authenticated
    Health,
    /// List models visible to the provider
    Models,
}

#[derive(Args, Default)]
struct SourceArgs {
    /// Read the code under test from a file
    #[arg(short, long, conflicts_with = "code")]
    file: Option<PathBuf>,
    /// Code under test, inline
    #[arg(short, long)]
    code: Option<String>,
}

impl SourceArgs {
    fn read(&self) -> std::io::Result<String> {
        match (&self.file, &self.code) {
            (Some(path), _) => std::fs::read_to_string(path),
            (None, Some(code)) => Ok(code.clone()),
            (None, None) => Ok(EXAMPLE_SOURCE.to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let exit = match cli.command.unwrap_or(Commands::Run(SourceArgs::default())) {
        Commands::Run(source) => run(&config, &source.read()?).await?,
        Commands::Generate(source) => generate(&config, &source.read()?).await?,
        Commands::Check { file } => check(&std::fs::read_to_string(&file)?),
        Commands::Health => {
            let provider = config.build_provider()?;
            let executor = PythonExecutor::new(config.executor_config());
            health_check(provider.as_ref(), &executor).await?
        }
        Commands::Models => {
            let provider = config.build_provider()?;
            list_models(provider.as_ref()).await?
        }
    };

    Ok(exit)
}

fn load_config(cli: &Cli) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    if let Some(provider) = cli.provider {
        config.provider.kind = provider;
    }
    if let Some(model) = &cli.model {
        config.generation.model = Some(model.clone());
    }
    if let Some(max_retries) = cli.max_retries {
        config.generation.max_retries = max_retries;
    }

    config.validate()?;
    Ok(config)
}

fn build_tool(config: &AppConfig) -> Result<CodeTestingTool, Box<dyn std::error::Error>> {
    let generator = TestGenerator::new(config.build_provider()?, config.generation_config())?;
    let executor = PythonExecutor::new(config.executor_config());
    Ok(CodeTestingTool::new(generator, Box::new(executor)))
}

fn print_test_code(code: &str) {
    println!("\n{}", "=".repeat(40));
    println!("Generated Test Code:");
    println!("{}", code);
    println!("{}\n", "=".repeat(40));
}

fn print_run(run: &TestRun) {
    print_test_code(&run.test_code);

    match &run.report {
        Some(report) => {
            if let ExecutionOutcome::Completed { output, .. } = &report.outcome {
                println!("\nTEST RESULTS:");
                println!("{}", output);
            } else {
                println!("{}", report.summary());
            }
            if !report.stdout.is_empty() {
                println!("Captured output:\n{}", report.stdout);
            }
        }
        None => println!("{}", run.summary()),
    }
}

fn report_generation_failure(err: &GenerationError) {
    error!("{}", err);
    if let GenerationError::RetriesExhausted { history, .. } = err {
        for attempt in history {
            info!("attempt {}: {:?}", attempt.attempt, attempt.outcome);
        }
    }
}

async fn run(config: &AppConfig, code: &str) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let tool = build_tool(config)?;
    info!(
        "Testing code with {} via {}",
        tool.generator().config().model,
        tool.generator().provider().provider_name()
    );

    let passed = match tool.test_generated_code(code).await {
        Ok(run) => {
            print_run(&run);
            run.passed
        }
        Err(PipelineError::Generation(e)) => {
            report_generation_failure(&e);
            false
        }
    };

    if passed {
        println!("✅ ALL TESTS PASSED!");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("❌ TESTING FAILED");
        Ok(ExitCode::FAILURE)
    }
}

async fn generate(config: &AppConfig, code: &str) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let tool = build_tool(config)?;

    match tool.generate_test_cases(code).await {
        Ok(generated) => {
            print_test_code(&generated.code);
            info!("Generated after {} attempt(s)", generated.attempts());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            report_generation_failure(&e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn check(code: &str) -> ExitCode {
    match check_syntax(code) {
        Ok(()) => {
            println!("✓ Syntax OK");
            ExitCode::SUCCESS
        }
        Err(issue) => {
            println!("✗ Syntax error: {}", issue);
            ExitCode::FAILURE
        }
    }
}

async fn health_check(
    provider: &dyn ModelProvider,
    executor: &PythonExecutor,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    println!("Performing health check...");

    match executor.interpreter_version().await {
        Ok(version) => println!("✓ Test interpreter: {}", version),
        Err(e) => {
            println!("✗ Test interpreter unavailable: {}", e);
            error!("Interpreter check failed: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    }

    match provider.health_check().await {
        Ok(()) => {
            println!(
                "✓ Health check passed. {} is reachable.",
                provider.provider_name()
            );
            info!("Health check successful");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("✗ Health check failed: {}", e);
            error!("Health check failed: {}", e);
            Err(e.into())
        }
    }
}

async fn list_models(provider: &dyn ModelProvider) -> Result<ExitCode, Box<dyn std::error::Error>> {
    println!("Available models:");
    let models = provider.list_models().await?;

    if models.is_empty() {
        println!("  No models found.");
    } else {
        for model in models {
            println!(
                "  - {} ({})",
                model.name,
                model
                    .size
                    .map(|s| format!("{:.1} GB", s as f64 / 1_000_000_000.0))
                    .unwrap_or_else(|| "unknown size".to_string())
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
