use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use rcview_core::{parse_label_map, to_selector, LabelMap, LabelSelector, PodInfo};
use rcview_kubehub::KubeSource;
use rcview_ops::{controller_reports, distinct_by_selector, services_for_deletion, ControllerReport};
use serde::Serialize;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "rcviewctl", version, about = "ReplicationController pod reports and service cleanup candidates")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace
    #[arg(long = "ns", global = true, env = "RCVIEW_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Kubeconfig context (default: current context)
    #[arg(long = "context", global = true, env = "RCVIEW_CONTEXT")]
    context: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json, Yaml }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pod phase summary for each matching replication controller
    Pods {
        /// Label selector, e.g. "app=guestbook,tier=frontend" (empty: all controllers)
        #[arg(short = 'l', long = "selector", default_value = "")]
        selector: String,
    },
    /// Services that would be removed together with the matching controllers
    DeletionCandidates {
        /// Label selector, e.g. "app=guestbook"
        #[arg(short = 'l', long = "selector")]
        selector: String,
        /// Drop services whose selector repeats an earlier one
        #[arg(long = "distinct", action = ArgAction::SetTrue)]
        distinct: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("RCVIEW_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("RCVIEW_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid RCVIEW_METRICS_ADDR; expected host:port");
        }
    }
}

fn parse_selector(input: &str) -> Result<LabelSelector> {
    let map = parse_label_map(input).with_context(|| format!("parsing selector {:?}", input))?;
    to_selector(&map).with_context(|| format!("invalid selector {:?}", input))
}

fn render_labels(map: &LabelMap) -> String {
    if map.is_empty() {
        return "<none>".to_string();
    }
    map.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(",")
}

fn render_key(ns: Option<&str>, name: &str) -> String {
    format!("{}/{}", ns.unwrap_or("-"), name)
}

fn render_pod_info(info: &PodInfo) -> String {
    format!("{}/{}  running={} pending={} failed={}", info.current, info.desired, info.running, info.pending, info.failed)
}

fn print_structured<T: Serialize>(output: Output, value: &T) -> Result<()> {
    match output {
        Output::Yaml => print!("{}", serde_yaml::to_string(value)?),
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let ns = cli.namespace.as_str();
    // a bad selector fails before any cluster connection is attempted
    let sel = match &cli.command {
        Commands::Pods { selector } | Commands::DeletionCandidates { selector, .. } => parse_selector(selector)?,
    };
    let source = KubeSource::connect(cli.context.as_deref()).await?;
    match &cli.command {
        Commands::Pods { selector } => {
            info!(ns = %ns, selector = %selector, "pods invoked");
            let reports: Vec<ControllerReport> = controller_reports(&source, &sel, ns).await?;
            match cli.output {
                Output::Human => {
                    println!("{:<32} {:<36} SELECTOR", "CONTROLLER", "CURRENT/DESIRED  PODS");
                    for r in &reports {
                        println!("{:<32} {:<36} {}", render_key(r.namespace.as_deref(), &r.name), render_pod_info(&r.pod_info), render_labels(&r.selector));
                    }
                }
                out => print_structured(out, &reports)?,
            }
        }
        Commands::DeletionCandidates { selector, distinct } => {
            info!(ns = %ns, selector = %selector, distinct = *distinct, "deletion-candidates invoked");
            let mut services = services_for_deletion(&source, &sel, ns).await?;
            if *distinct {
                services = distinct_by_selector(services);
            }
            match cli.output {
                Output::Human => {
                    println!("{:<40} SELECTOR", "SERVICE");
                    for s in &services {
                        println!("{:<40} {}", render_key(s.namespace.as_deref(), &s.name), render_labels(&s.selector));
                    }
                }
                out => print_structured(out, &services)?,
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = ?e, "command failed");
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
