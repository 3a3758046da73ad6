use crate::GlobalArgs;
use anyhow::Context;
use colored::Colorize;
use flightdeck_cloud::{EntityStore, LocalEntityStore};
use flightdeck_cloud_aws::{AwsCloud, AwsCredentials, DynamoEntityStore};
use flightdeck_config::Configuration;
use flightdeck_core::{
    EventSink, Orchestrator, ProgressAggregator, ProgressMode, TerminalView, event_channel,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Read the configuration file and apply command-line overrides on top
pub fn load_configuration(global: &GlobalArgs) -> anyhow::Result<Configuration> {
    let mut config = match &global.config {
        Some(path) => {
            let mut config = Configuration::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            config.apply_env();
            config
        }
        None => Configuration::load()?,
    };

    if let Some(region) = &global.region {
        config.region = region.clone();
    }
    if let Some(key) = &global.access_key {
        config.access_key = Some(key.clone());
    }
    if let Some(secret) = &global.secret_key {
        config.secret_key = Some(secret.clone());
    }
    if let Some(set) = &global.template_set {
        config.template_set = set.clone();
    }
    Ok(config)
}

/// Build the orchestrator over AWS and check the region and credentials
pub async fn connect(config: Configuration, global: &GlobalArgs) -> anyhow::Result<Orchestrator> {
    config.validate_region()?;
    let credentials = config
        .credentials()
        .map(|(access_key_id, secret_access_key)| AwsCredentials {
            access_key_id,
            secret_access_key,
        });
    let cloud = Arc::new(AwsCloud::connect(&config.region, credentials).await);

    let store: Arc<dyn EntityStore> = match &global.local_store {
        Some(dir) => {
            tracing::debug!("Using local registry under {}", dir.display());
            Arc::new(LocalEntityStore::new(dir))
        }
        None => Arc::new(DynamoEntityStore::new(&cloud)),
    };

    let orchestrator = Orchestrator::new(cloud.clients(), store, config);
    spin("Checking credentials", orchestrator.preflight()).await?;
    Ok(orchestrator)
}

/// `-d`, then the configured domain, then the first domain found
pub async fn resolve_domain(
    orchestrator: &Orchestrator,
    domain: Option<&str>,
) -> anyhow::Result<String> {
    if let Some(d) = domain.or(orchestrator.config().domain.as_deref()) {
        return Ok(d.to_string());
    }
    let domain = spin("Finding domain", orchestrator.inventory().default_domain()).await?;
    Ok(domain.name)
}

/// Show a spinner while `fut` runs
pub async fn spin<T>(label: &str, fut: impl Future<Output = T>) -> T {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(label.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    let out = fut.await;
    spinner.finish_and_clear();
    out
}

/// Run an orchestration call with its events rendered as live progress.
///
/// `total` seeds the counter; operations that know better send their own.
pub async fn with_progress<T, F, Fut>(
    label: &str,
    mode: ProgressMode,
    total: usize,
    op: F,
) -> flightdeck_core::Result<T>
where
    F: FnOnce(EventSink) -> Fut,
    Fut: Future<Output = flightdeck_core::Result<T>>,
{
    let (sink, stream) = event_channel();
    let aggregator = ProgressAggregator::new(mode, total, TerminalView::new(label));
    // `op` owns the only sink, so the stream closes once it returns
    let (result, ()) = tokio::join!(op(sink), aggregator.consume(stream));
    result
}

pub fn print_heading(text: &str) {
    println!("{}", text.bold());
}

pub fn print_done(text: &str) {
    println!("\n{}", text.green().bold());
}

/// Print a name and an underline of the same width
pub fn print_underlined(indent: &str, name: &str) {
    println!("{}{}", indent, name.cyan());
    println!("{}{}", indent, "-".repeat(name.chars().count()));
}
