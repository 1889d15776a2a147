//! GlusterFS Simple Provisioner
//!
//! Command line front end: provisions a GlusterFS volume for a claim and
//! creates the resulting PersistentVolume, or tears a volume down and
//! deletes its PersistentVolume.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

use glusterfs_simple_provisioner::{
    volume_name_for_claim, Error, GlusterfsProvisioner, KubeAdapters, KubeObjectStore,
    ProvisionRequest, ProvisionerMetrics, Result, TeardownReport,
};
use k8s_openapi::api::core::v1::PersistentVolume;

// =============================================================================
// CLI Arguments
// =============================================================================

/// GlusterFS Simple Provisioner - GlusterFS volumes for Kubernetes claims
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    /// Write metrics in text exposition format to this file on exit
    #[arg(long, env = "METRICS_TEXTFILE", global = true)]
    metrics_textfile: Option<PathBuf>,

    /// Output format of the created PersistentVolume
    #[arg(long, env = "OUTPUT", value_enum, default_value_t = Output::Yaml, global = true)]
    output: Output,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision a volume for a claim and create its PersistentVolume
    Provision {
        /// Namespace of the claim
        #[arg(long)]
        namespace: String,

        /// Name of the claim
        #[arg(long)]
        claim: String,
    },

    /// Tear down a provisioned volume and delete its PersistentVolume
    Delete {
        /// Name of the PersistentVolume
        #[arg(long)]
        volume: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Output {
    Yaml,
    Json,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting GlusterFS Simple Provisioner");
    info!("  Version: {}", glusterfs_simple_provisioner::VERSION);

    let client = kube::Client::try_default().await?;
    let metrics = ProvisionerMetrics::new()?;
    let (store, provisioner) = KubeAdapters::provisioner(client, metrics.clone());

    let result = run(&args, &store, &provisioner).await;

    if let Some(path) = &args.metrics_textfile {
        if let Err(e) = metrics.write_textfile(path) {
            error!("Failed to write metrics to {}: {}", path.display(), e);
        }
    }

    if let Err(e) = &result {
        error!("{} (retry: {})", e, e.is_retryable());
    }
    result
}

async fn run(
    args: &Args,
    store: &KubeObjectStore,
    provisioner: &GlusterfsProvisioner,
) -> Result<()> {
    match &args.command {
        Command::Provision { namespace, claim } => {
            let pvc = store.claim(namespace, claim).await?;
            let class_name = pvc
                .spec
                .as_ref()
                .and_then(|s| s.storage_class_name.clone())
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "claim {}/{} names no storage class",
                        namespace, claim
                    ))
                })?;
            let class = store.storage_class(&class_name).await?;
            let volume_name = volume_name_for_claim(&pvc)?;
            let request = ProvisionRequest::from_claim(&pvc, &class, &volume_name)?;

            // Provisioning again over a recorded volume would roll it back
            match store.volume(&volume_name).await {
                Ok(_) => {
                    return Err(Error::ResourceExists {
                        kind: "PersistentVolume".into(),
                        name: volume_name,
                    })
                }
                Err(Error::ResourceNotFound { .. }) => {}
                Err(e) => return Err(e),
            }

            let created = provisioner
                .provision_and_record(&request, |volume| async move {
                    store.persist_volume(&volume).await
                })
                .await?;
            print_volume(&created, args.output)
        }
        Command::Delete { volume } => {
            let pv = store.volume(volume).await?;
            let report = provisioner.delete(&pv).await?;
            log_report(volume, &report);
            store.remove_volume(volume).await
        }
    }
}

fn log_report(volume: &str, report: &TeardownReport) {
    if report.is_clean() {
        return;
    }
    warn!(
        "Volume {} torn down with {} failure(s)",
        volume,
        report.failures.len()
    );
    for failure in &report.failures {
        warn!("  {}", failure);
    }
}

fn print_volume(volume: &PersistentVolume, output: Output) -> Result<()> {
    let rendered = match output {
        Output::Yaml => serde_yaml::to_string(volume)?,
        Output::Json => serde_json::to_string_pretty(volume)?,
    };
    println!("{}", rendered);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let directive = |d: &str| -> Result<Directive> {
        d.parse()
            .map_err(|e| Error::Configuration(format!("Invalid log directive {}: {}", d, e)))
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(directive("hyper=warn")?)
        .add_directive(directive("kube=info")?)
        .add_directive(directive("tower=warn")?);

    // Logs go to stderr so stdout carries only the rendered volume
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}
