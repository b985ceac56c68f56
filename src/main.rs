use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use sightline_config::GraphDef;
use sightline_device::{FrameSource, InputSink, RecordingInputSink, ReplayFrameSource};
use sightline_graph::TaskGraph;
use sightline_runtime::{Executor, ExecutorConfig, Interrupt};
use sightline_vision::{Recognizer, RecognizerSet, TemplateSet};

/// Sightline - vision-gated task graphs for UI automation
#[derive(Parser)]
#[command(name = "sightline")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.sightline)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Log level used when RUST_LOG is not set
  #[arg(long, global = true, default_value = "info")]
  log_level: String,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Check a graph file against the template library
  Validate {
    /// Path to the graph file (JSON)
    graph_file: PathBuf,

    /// Template directory (default: <data-dir>/templates)
    #[arg(long)]
    templates: Option<PathBuf>,
  },

  /// Dry-run a graph against a directory of captured frames
  Run {
    /// Path to the graph file (JSON)
    graph_file: PathBuf,

    /// Directory of frame images, replayed in name order
    #[arg(long)]
    frames: PathBuf,

    /// Template directory (default: <data-dir>/templates)
    #[arg(long)]
    templates: Option<PathBuf>,

    /// Seed for tap jitter
    #[arg(long)]
    seed: Option<u64>,

    /// Write the run report here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
  },

  /// List the templates in the library
  Templates {
    /// Template directory (default: <data-dir>/templates)
    #[arg(long)]
    templates: Option<PathBuf>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(&cli.log_level);

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".sightline"),
  };
  let default_templates = data_dir.join("templates");

  match cli.command {
    Some(Commands::Validate {
      graph_file,
      templates,
    }) => validate(&graph_file, &templates.unwrap_or(default_templates)),
    Some(Commands::Run {
      graph_file,
      frames,
      templates,
      seed,
      output,
    }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run(
        graph_file,
        frames,
        templates.unwrap_or(default_templates),
        seed,
        output,
      ))
    }
    Some(Commands::Templates { templates }) => {
      list_templates(&templates.unwrap_or(default_templates))
    }
    None => {
      println!("sightline - use --help to see available commands");
      Ok(())
    }
  }
}

fn init_tracing(level: &str) {
  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(true)
    .with_writer(std::io::stderr)
    .try_init();
}

/// A missing template directory is an empty library.
fn load_templates(dir: &Path) -> Result<TemplateSet> {
  if !dir.is_dir() {
    tracing::warn!(dir = %dir.display(), "template_dir_missing");
    return Ok(TemplateSet::empty());
  }
  TemplateSet::load_dir(dir)
    .with_context(|| format!("failed to load templates from {}", dir.display()))
}

fn load_graph(graph_file: &Path, templates: &TemplateSet) -> Result<TaskGraph> {
  let content = std::fs::read_to_string(graph_file)
    .with_context(|| format!("failed to read graph file: {}", graph_file.display()))?;

  let def: GraphDef = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse graph file: {}", graph_file.display()))?;

  TaskGraph::build(def, templates)
    .with_context(|| format!("invalid graph: {}", graph_file.display()))
}

fn validate(graph_file: &Path, templates_dir: &Path) -> Result<()> {
  let templates = load_templates(templates_dir)?;
  let graph = load_graph(graph_file, &templates)?;

  eprintln!(
    "Graph '{}' is valid: {} nodes, start '{}'",
    graph.graph_id,
    graph.len(),
    graph.start()
  );
  Ok(())
}

async fn run(
  graph_file: PathBuf,
  frames_dir: PathBuf,
  templates_dir: PathBuf,
  seed: Option<u64>,
  output: Option<PathBuf>,
) -> Result<()> {
  let templates = Arc::new(load_templates(&templates_dir)?);
  let graph = Arc::new(load_graph(&graph_file, &templates)?);
  eprintln!("Loaded graph: {} ({} nodes)", graph.name, graph.len());

  let frames = ReplayFrameSource::from_dir(&frames_dir)
    .await
    .with_context(|| format!("failed to read frames from {}", frames_dir.display()))?;
  if frames.is_empty() {
    bail!("no frame images found in {}", frames_dir.display());
  }
  eprintln!("Replaying {} frames", frames.len());

  let recognizers = RecognizerSet::new(templates);
  if !recognizers.has_text_backend() && reads_text(&graph) {
    tracing::warn!(graph_id = %graph.graph_id, "text_backend_missing");
    eprintln!("No text backend is configured; text checks will be unavailable");
  }

  let sink = Arc::new(RecordingInputSink::new());
  let executor = Executor::new(
    graph,
    Arc::new(recognizers),
    Arc::new(frames) as Arc<dyn FrameSource>,
    sink.clone() as Arc<dyn InputSink>,
  )
  .with_config(ExecutorConfig {
    jitter_seed: seed,
    ..ExecutorConfig::default()
  });

  let interrupt = Interrupt::new();
  let on_signal = interrupt.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      on_signal.trigger("ctrl_c");
    }
  });

  let report = executor.run(&interrupt).await;

  eprintln!(
    "Run {} finished at node '{}': {:?}",
    report.run_id,
    report.state.node().unwrap_or("-"),
    report.state
  );
  eprintln!("Gestures dispatched: {}", sink.gestures().await.len());

  let json = serde_json::to_string_pretty(&report)?;
  match output {
    Some(path) => std::fs::write(&path, json)
      .with_context(|| format!("failed to write report: {}", path.display()))?,
    None => println!("{}", json),
  }

  if !report.succeeded() {
    bail!("run did not succeed");
  }
  Ok(())
}

/// Whether any node predicate or transition condition extracts text.
fn reads_text(graph: &TaskGraph) -> bool {
  graph.nodes().any(|node| {
    std::iter::once(&node.predicate)
      .chain(node.transitions.iter().map(|t| &t.when))
      .flat_map(|predicate| predicate.checks())
      .any(|check| matches!(check.recognizer, Recognizer::TextExtract(_)))
  })
}

fn list_templates(dir: &Path) -> Result<()> {
  let templates = load_templates(dir)?;
  if templates.is_empty() {
    eprintln!("No templates in {}", dir.display());
    return Ok(());
  }

  for name in templates.names() {
    let Some(template) = templates.get(name) else {
      continue;
    };
    let label = template.label.as_deref().unwrap_or("-");
    println!(
      "{}\t{}x{}\t{} keypoints\t{}",
      name,
      template.width(),
      template.height(),
      template.keypoint_count(),
      label
    );
  }
  Ok(())
}
