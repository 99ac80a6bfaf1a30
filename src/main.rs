use anyhow::{Context as _, bail};
use clap::{Args, Parser, Subcommand};
use kube_e2e::board::{self, Board};
use kube_e2e::config::{self, Labels, Settings};
use kube_e2e::error::Error;
use kube_e2e::k8s::{self, Context};
use kube_e2e::scenario::{self, Suite};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a test suite against the cluster, repeating until interrupted
    Run(RunArgs),
    /// Serve the status board
    Board(BoardArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(value_enum)]
    suite: Suite,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    #[arg(short, long, env = "TEST_NAMESPACE", default_value = config::DEFAULT_NAMESPACE)]
    namespace: String,

    #[arg(long, env = "TEST_DEPLOYMENT", default_value = config::DEFAULT_DEPLOYMENT)]
    deployment: String,

    #[arg(long, env = "TEST_SERVICE", default_value = config::DEFAULT_SERVICE)]
    service: String,

    #[arg(long, env = "TEST_REPLICAS", default_value_t = config::DEFAULT_REPLICAS)]
    replicas: i32,

    #[arg(long, env = "TEST_IMAGE", default_value = config::DEFAULT_IMAGE)]
    image: String,

    /// Extra deployment labels, `key=value,key2=value2`
    #[arg(long, env = "CUSTOM_TEST_DEPLOYMENT_LABELS")]
    labels: Option<String>,

    /// Node label holding the zone
    #[arg(long, env = "ZONE_LABEL", default_value = config::DEFAULT_ZONE_LABEL)]
    zone_label: String,

    /// Seconds to wait on any watch
    #[arg(long, env = "EVENT_TIMEOUT", default_value_t = config::DEFAULT_EVENT_TIMEOUT_SECS)]
    event_timeout: u64,

    #[arg(long, env = "SECONDS_BETWEEN_RUNS", default_value_t = 60)]
    seconds_between_runs: u64,

    /// Where status events are POSTed
    #[arg(long, env = "STATUS_SINK_URL")]
    status_sink: Option<String>,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

#[derive(Args, Debug)]
struct BoardArgs {
    #[arg(short, long, env = "STATUS_PORT", default_value_t = config::DEFAULT_STATUS_PORT)]
    port: u16,

    /// Minutes without new data before the board reports an error
    #[arg(long, env = "TIME_TO_REPORT_PROBLEM", default_value_t = config::DEFAULT_TIME_TO_REPORT_MINUTES)]
    time_to_report: f64,
}

impl RunArgs {
    fn settings(&self) -> Settings {
        let defaults = Settings::default();
        let custom = self.labels.as_deref().map(Labels::parse).unwrap_or_default();
        let template_labels = Labels::new([("app", self.deployment.as_str())]);
        Settings {
            namespace: self.namespace.clone(),
            deployment: self.deployment.clone(),
            service: self.service.clone(),
            replicas: self.replicas,
            labels: defaults.labels.merged(&custom),
            template_labels: template_labels.merged(&custom),
            image: self.image.clone(),
            zone_label: self.zone_label.clone(),
            event_timeout: Duration::from_secs(self.event_timeout.max(1)),
            status_sink: self
                .status_sink
                .clone()
                .unwrap_or(defaults.status_sink.clone()),
            service_requests: Settings::default_service_requests(self.replicas),
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kube_e2e=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    match Cli::parse().command {
        Command::Run(args) => run(args).await,
        Command::Board(args) => {
            let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
            let board = Arc::new(Board::new(args.time_to_report));
            board::serve(addr, board)
                .await
                .context("status board stopped")
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    if let Some(port) = args.metrics_port {
        kube_e2e::metrics::init_metrics_recorder(SocketAddr::from(([0, 0, 0, 0], port)))
            .context("installing metrics exporter")?;
        info!("Metrics on :{}/metrics", port);
    }

    let settings = args.settings();
    let client = k8s::client::new(&settings.user_agent).await?;
    let ctx = Context::new(client, settings)?;
    let pause = Duration::from_secs(args.seconds_between_runs);

    info!("Running {:?} against namespace {}", args.suite, ctx.namespace());
    loop {
        if args.suite != Suite::Namespace {
            if let Err(e) = scenario::require_namespace(&ctx).await {
                if args.once {
                    return Err(e.into());
                }
                warn!("{}, waiting", e);
                tokio::time::sleep(pause).await;
                continue;
            }
        }

        let mut scenario = args.suite.build(&ctx)?;
        let interrupted = tokio::select! {
            result = scenario.exec() => {
                match result {
                    Err(Error::NamespaceGone(ns)) => bail!("namespace {ns} was deleted during the run"),
                    Err(e) => error!("{:?} pass failed: {}", args.suite, e),
                    Ok(()) => info!("{:?} pass complete", args.suite),
                }
                false
            }
            _ = tokio::signal::ctrl_c() => true,
        };

        if interrupted {
            info!("Interrupted, cleaning up");
            scenario.finish().await?;
            return Ok(());
        }
        if args.once {
            return Ok(());
        }

        tokio::select! {
            () = tokio::time::sleep(pause) => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
