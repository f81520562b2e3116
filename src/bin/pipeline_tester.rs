use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use futures_util::StreamExt;
use pipeline_test_agent::policy::TestReport;
use pipeline_test_agent::{Agent, AgentEvent, GcpConfig, GoogleModel, PipelineServices, Verdict};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

const DEFAULT_PLAN: &str = "Trigger the scraper pipeline with default settings and verify that \
     results land in GCS and the functions log no errors.";

#[derive(Parser)]
#[command(name = "pipeline_tester")]
#[command(about = "Runs an LLM-driven integration test against the AISports pipeline", long_about = None)]
struct Cli {
    #[arg(help = "Test plan to hand to the agent")]
    plan: Vec<String>,

    #[arg(long, conflicts_with = "plan", help = "Read the test plan from a file")]
    plan_file: Option<PathBuf>,

    #[arg(long, help = "Gemini model to use (overrides VERTEX_AI_MODEL)")]
    model: Option<String>,

    #[arg(long, help = "Maximum model turns before giving up")]
    max_iterations: Option<u32>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pipeline_test_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(report) => match report.verdict {
            Some(Verdict::Passed) => ExitCode::SUCCESS,
            Some(Verdict::Failed) => ExitCode::from(1),
            None => {
                eprintln!("no VERDICT line in the final report");
                ExitCode::from(2)
            }
        },
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<TestReport, Box<dyn Error>> {
    let plan = match &cli.plan_file {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => cli.plan.join(" "),
    };
    let plan = if plan.trim().is_empty() {
        DEFAULT_PLAN.to_string()
    } else {
        plan
    };

    let mut config = GcpConfig::from_env();
    if let Some(model) = cli.model {
        config.model = model;
    }

    let model = GoogleModel::from_gcp(&config)?;
    println!("model: {}", model.model_name());

    let mut builder = PipelineServices::from_config(config)?.register(Agent::builder().model(model));
    if let Some(max_iterations) = cli.max_iterations {
        builder = builder.max_iterations(max_iterations);
    }
    let mut agent = builder.build()?;

    let mut final_content = None;
    {
        let stream = agent.query_stream(plan);
        futures_util::pin_mut!(stream);

        while let Some(event) = stream.next().await {
            match event? {
                AgentEvent::ToolCall {
                    tool,
                    args_json,
                    tool_call_id,
                } => {
                    println!(
                        "tool-call [{tool_call_id}] {tool}: {}",
                        truncate(&args_json.to_string(), 160)
                    );
                }
                AgentEvent::ToolResult {
                    tool,
                    result_text,
                    tool_call_id,
                    is_error,
                } => {
                    println!(
                        "tool-result [{tool_call_id}] {tool} (error={is_error}): {}",
                        truncate(&result_text, 240)
                    );
                }
                AgentEvent::Thinking { content } => {
                    println!("thinking: {}", truncate(&content, 160));
                }
                AgentEvent::Text { content } => {
                    println!("assistant: {}", truncate(&content, 200));
                }
                AgentEvent::FinalResponse { content } => {
                    final_content = Some(content);
                }
            }
        }
    }

    let report = TestReport::from_content(final_content.unwrap_or_default());
    println!("\n{}", report.content);
    let usage = agent.usage();
    println!(
        "tokens: {} in / {} out",
        usage.input_tokens, usage.output_tokens
    );
    Ok(report)
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}
