use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use kubemerge_k8s::{KubeClient, PodInfo};
use kubemerge_logs::{
    AggregateError, AggregateRequest, Aggregator, LogSource, PodLogSource, parse_duration,
};

mod config;
mod render;

use config::FileConfig;
use render::{OutputFormat, Renderer};

/// kubemerge - Show logs from many pods as one time-ordered stream
#[derive(Parser, Debug)]
#[command(name = "kubemerge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Kubernetes context name (defaults to the current context)
    #[arg(value_name = "CONTEXT")]
    context: Option<String>,

    /// Namespace (defaults to the context's namespace, then "default")
    #[arg(value_name = "NAMESPACE")]
    namespace: Option<String>,

    /// Label selector for the pods to read, e.g. app=server
    #[arg(short = 'l', long)]
    selector: Option<String>,

    /// Read the pods selected by this deployment
    #[arg(long, conflicts_with = "selector")]
    deployment: Option<String>,

    /// Show logs only from the pod with this name (repeatable)
    #[arg(long = "pod", value_name = "POD")]
    pods: Vec<String>,

    /// Container to read in each pod (defaults to the pod's default container)
    #[arg(short, long)]
    container: Option<String>,

    /// Show logs more recent than a duration like 30s, 15m, or 3h
    #[arg(long, value_name = "DURATION")]
    since: Option<String>,

    /// Show logs more recent than an RFC3339 timestamp
    #[arg(long, value_name = "TIMESTAMP")]
    since_time: Option<String>,

    /// Keep streaming logs until interrupted
    #[arg(short, long)]
    follow: bool,

    /// How long live entries are held back to order them across pods
    #[arg(long, value_name = "DURATION")]
    delay_window: Option<String>,

    /// Only show lines whose message matches this regex
    #[arg(long, value_name = "REGEX")]
    grep: Option<String>,

    /// Match --grep case-insensitively
    #[arg(short = 'i', long, requires = "grep")]
    ignore_case: bool,

    /// Show lines that do not match --grep
    #[arg(long, requires = "grep")]
    invert: bool,

    /// Print each entry's timestamp after the pod prefix
    #[arg(short, long)]
    timestamps: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Config file (defaults to ./kubemerge.toml if present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    // Diagnostics go to stderr so stdout only carries log lines
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    // Reject bad options before any cluster access
    let file_config = FileConfig::load(args.config.as_deref())?;
    let request = AggregateRequest::from_flags(
        args.follow,
        args.since.as_deref(),
        args.since_time.as_deref(),
        args.pods.clone(),
    )?;
    let delay_window = args.delay_window.as_deref().map(parse_duration).transpose()?;
    let engine = file_config.engine.to_aggregator_config(delay_window)?;
    let filter = render::build_filter(args.grep.as_deref(), args.ignore_case, args.invert)?;

    let kube_client = KubeClient::new()?;
    let Some(context) = args
        .context
        .clone()
        .or_else(|| kube_client.current_context().map(str::to_string))
    else {
        anyhow::bail!("No context given and the kubeconfig has no current context");
    };
    let client = kube_client.client_for_context(&context).await?;

    let namespace = args
        .namespace
        .clone()
        .or_else(|| file_config.defaults.namespace.clone())
        .or_else(|| kube_client.context_namespace(&context))
        .unwrap_or_else(|| "default".to_string());

    let selector = match &args.deployment {
        Some(deployment) => {
            kube_client
                .deployment_selector(&client, &namespace, deployment)
                .await?
        }
        None => args
            .selector
            .clone()
            .or_else(|| file_config.defaults.selector.clone())
            .unwrap_or_default(),
    };

    let pods = kube_client.get_pods(&client, &namespace, &selector).await?;
    warn_not_running(&pods);

    let container = args.container.clone().or_else(|| file_config.defaults.container.clone());
    let sources: Vec<Arc<dyn LogSource>> = pods
        .into_iter()
        .map(|pod| {
            let container = log_container(&pod, container.as_deref());
            Arc::new(PodLogSource::new(client.clone(), &namespace, pod.name, container))
                as Arc<dyn LogSource>
        })
        .collect();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::debug!("Interrupted, stopping log streams");
                cancel.cancel();
            }
        }
    });

    let mut renderer = Renderer::new(std::io::stdout(), args.output, filter, cancel.clone())
        .with_timestamps(args.timestamps);

    let aggregator = Aggregator::new(engine);
    let summary = match aggregator
        .run(sources, &request, |prefix, entry| renderer.write(prefix, entry), &cancel)
        .await
    {
        Ok(summary) => summary,
        Err(AggregateError::NoSources) => {
            anyhow::bail!(
                "No pods found in namespace '{}'{}",
                namespace,
                if selector.is_empty() {
                    String::new()
                } else {
                    format!(" matching '{}'", selector)
                }
            );
        }
        Err(e) => return Err(e.into()),
    };

    let written = renderer.finish()?;
    tracing::debug!(
        "Emitted {} entries ({} historical, {} live), wrote {}, skipped {} malformed lines",
        summary.total_emitted(),
        summary.historical_emitted,
        summary.live_emitted,
        written,
        summary.malformed()
    );

    Ok(())
}

/// Pods that are not running may have no logs or stop streaming immediately
fn warn_not_running(pods: &[PodInfo]) {
    for pod in pods.iter().filter(|p| !p.is_running()) {
        tracing::warn!("Pod {} is {:?}; its logs may be incomplete", pod.name, pod.status);
    }
}

/// Requested container, else the one `kubectl logs` would pick for the pod
fn log_container(pod: &PodInfo, requested: Option<&str>) -> Option<String> {
    requested.or_else(|| pod.default_container()).map(str::to_string)
}
