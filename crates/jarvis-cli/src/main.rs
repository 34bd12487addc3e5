use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use clap::{Args, Parser, Subcommand, ValueEnum};
use jarvis_core::{
    CancellationToken, Config, ConfigLoader, DEFAULT_MIME_TYPE, DispatchFailure, DispatchOutcome,
    Dispatcher, PipelineState, RequestKind, Source, Stages, TelemetryOptions, TraceCollector,
    init_telemetry,
};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "jarvis",
    version,
    about = "Research topics, answer questions and analyze documents"
)]
struct Cli {
    /// TOML configuration file (defaults to JARVIS_CONFIG, then ./config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the per-stage trace after the result.
    #[arg(
        long,
        global = true,
        value_enum,
        num_args = 0..=1,
        default_missing_value = "markdown"
    )]
    explain: Option<ExplainFormat>,

    /// Emit the result as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ExplainFormat {
    Markdown,
    Mermaid,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search the web for a topic and write a report.
    Research(ResearchArgs),
    /// Answer a question, optionally grounded on context.
    Ask(AskArgs),
    /// Analyze a local document.
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
struct ResearchArgs {
    /// Topic to research.
    topic: String,

    /// Produce the longer five-section report.
    #[arg(long)]
    deep: bool,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Question to answer.
    question: String,

    /// Context text the answer should be based on.
    #[arg(long, conflicts_with = "context_file")]
    context: Option<String>,

    /// Read the context from a file.
    #[arg(long)]
    context_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// File to analyze.
    path: PathBuf,

    /// MIME type of the file; guessed from the extension when omitted.
    #[arg(long)]
    mime_type: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_telemetry(TelemetryOptions::default().with_default_level("warn"))?;

    let config = ConfigLoader::load(cli.config.clone())?;
    let state = initial_state(&cli.command)?;

    let rt = Runtime::new()?;
    rt.block_on(run(config, state, cli.explain, cli.json))
}

fn initial_state(command: &Command) -> Result<PipelineState> {
    match command {
        Command::Research(args) => Ok(PipelineState::research(args.topic.clone(), args.deep)),
        Command::Ask(args) => {
            let context = match (&args.context, &args.context_file) {
                (Some(text), _) => text.clone(),
                (None, Some(path)) => fs::read_to_string(path)
                    .with_context(|| format!("failed to read context from {}", path.display()))?,
                (None, None) => String::new(),
            };
            Ok(PipelineState::question(args.question.clone(), context))
        }
        Command::Analyze(args) => {
            let bytes = fs::read(&args.path)
                .with_context(|| format!("failed to read {}", args.path.display()))?;
            let mime_type = args
                .mime_type
                .clone()
                .unwrap_or_else(|| guess_mime_type(&args.path));
            Ok(PipelineState::document(STANDARD.encode(bytes), mime_type))
        }
    }
}

fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string()
}

fn render_trace(trace: &TraceCollector, format: ExplainFormat) -> Option<String> {
    if trace.is_empty() {
        return None;
    }
    let summary = trace.summary();
    Some(match format {
        ExplainFormat::Markdown => summary.render_markdown(),
        ExplainFormat::Mermaid => summary.render_mermaid(),
    })
}

async fn run(
    config: Config,
    state: PipelineState,
    explain: Option<ExplainFormat>,
    json: bool,
) -> Result<()> {
    let dispatcher = Dispatcher::new(Stages::from_config(&config)?);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling");
            interrupt.cancel();
        }
    });

    let flow = state.kind();
    info!(flow = %flow, subject = %state.subject(), "dispatching");

    match dispatcher.dispatch_with_trace(state, &cancel).await {
        Ok(DispatchOutcome { state, trace }) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&Rendered::from(&state))?);
            } else {
                print!("{}", render_text(&state));
            }
            if let Some(rendered) = explain.and_then(|format| render_trace(&trace, format)) {
                println!("\n{rendered}");
            }
            Ok(())
        }
        Err(DispatchFailure { error, trace }) => {
            if let Some(rendered) = explain.and_then(|format| render_trace(&trace, format)) {
                eprintln!("{rendered}");
            }
            Err(anyhow::Error::new(error).context(format!("{} failed", flow.label())))
        }
    }
}

/// JSON output, shaped like the HTTP responses.
#[derive(Serialize)]
#[serde(untagged)]
enum Rendered<'a> {
    Answer {
        answer: &'a str,
    },
    Report {
        report: &'a str,
        sources: &'a [Source],
        images: &'a [String],
    },
}

impl<'a> From<&'a PipelineState> for Rendered<'a> {
    fn from(state: &'a PipelineState) -> Self {
        match state.kind() {
            RequestKind::Question => Rendered::Answer {
                answer: state.answer.as_deref().unwrap_or_default(),
            },
            RequestKind::Research | RequestKind::Document => Rendered::Report {
                report: state.report.as_deref().unwrap_or_default(),
                sources: &state.sources,
                images: &state.images,
            },
        }
    }
}

fn render_text(state: &PipelineState) -> String {
    let mut output = String::new();
    match Rendered::from(state) {
        Rendered::Answer { answer } => {
            let _ = writeln!(output, "{answer}");
        }
        Rendered::Report {
            report,
            sources,
            images,
        } => {
            let _ = writeln!(output, "{report}");
            if !sources.is_empty() {
                output.push_str("\nSources:\n");
                for source in sources {
                    let _ = writeln!(output, "- {} <{}>", source.title, source.uri);
                }
            }
            if !images.is_empty() {
                output.push_str("\nImages:\n");
                for image in images {
                    let _ = writeln!(output, "- {image}");
                }
            }
        }
    }
    output
}
