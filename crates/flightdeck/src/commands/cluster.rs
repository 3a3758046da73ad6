use crate::utils;
use crate::{ClusterCommands, GlobalArgs};
use anyhow::Context;
use colored::Colorize;
use flightdeck_config::Configuration;
use flightdeck_core::counts::{
    CLUSTER_RESOURCES, COMPONENT_RESOURCES, COMPUTE_GROUP_RESOURCES, SOLO_CLUSTER_RESOURCES,
};
use flightdeck_core::{
    Cluster, ComputeGroup, LaunchOptions, Orchestrator, ProgressMode, QueueOptions, catalog,
};
use std::path::Path;

/// Check an instance type against its catalog and record it as a setting
fn apply_instance_type(
    config: &mut Configuration,
    setting: &str,
    value: Option<&str>,
    valid: fn(&str) -> bool,
) -> anyhow::Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !valid(value) {
        anyhow::bail!(
            "Invalid instance type '{}'. See `flightdeck config catalog` for the available types",
            value
        );
    }
    config.set_setting(setting, value);
    Ok(())
}

/// RFC 3339 timestamp as unix seconds
fn parse_expiry(value: &str) -> anyhow::Result<i64> {
    let time = chrono::DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid expiry '{}', expected an RFC 3339 time", value))?;
    Ok(time.timestamp())
}

fn format_expiry(expiry: i64) -> String {
    chrono::DateTime::from_timestamp(expiry, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| expiry.to_string())
}

fn print_access(cluster: &Cluster, components: Vec<String>) {
    let Some(details) = cluster.details(components) else {
        println!("{}", "Cluster has no master yet.".yellow());
        return;
    };
    println!("{}", details);
    println!(
        "Log in with: {}",
        format!("ssh {}@{}", details.username, details.access_ip).cyan()
    );
}

pub async fn handle(
    cmd: ClusterCommands,
    mut config: Configuration,
    global: &GlobalArgs,
) -> anyhow::Result<()> {
    // Instance types and the key pair shape the launch parameters, so they
    // land in the configuration before the orchestrator takes it.
    let key_pair = match &cmd {
        ClusterCommands::Launch {
            master_instance_type,
            compute_instance_type,
            key_pair,
            ..
        } => {
            apply_instance_type(
                &mut config,
                "master-instance-type",
                master_instance_type.as_deref(),
                catalog::is_master_instance_type,
            )?;
            apply_instance_type(
                &mut config,
                "compute-instance-type",
                compute_instance_type.as_deref(),
                catalog::is_compute_instance_type,
            )?;
            if let Some(name) = key_pair {
                config.access_key_name = name.clone();
            }
            Some(config.access_key_name.clone())
        }
        ClusterCommands::Addq {
            queue_instance_type,
            ..
        } => {
            apply_instance_type(
                &mut config,
                "queue-instance-type",
                queue_instance_type.as_deref(),
                catalog::is_compute_instance_type,
            )?;
            None
        }
        _ => None,
    };

    let orchestrator = utils::connect(config, global).await?;
    if let Some(name) = key_pair {
        utils::spin("Checking key pair", orchestrator.validate_key_pair(&name)).await?;
    }

    match cmd {
        ClusterCommands::Launch {
            cluster,
            solo: true,
            ..
        } => launch_solo(&orchestrator, &cluster).await,
        ClusterCommands::Launch {
            cluster,
            domain,
            queue,
            ..
        } => {
            let domain = utils::resolve_domain(&orchestrator, domain.as_deref()).await?;
            launch(&orchestrator, &domain, &cluster, queue).await
        }
        ClusterCommands::Destroy {
            cluster,
            domain,
            solo,
        } => {
            let domain = if solo {
                None
            } else {
                Some(utils::resolve_domain(&orchestrator, domain.as_deref()).await?)
            };
            destroy(&orchestrator, domain.as_deref(), &cluster).await
        }
        ClusterCommands::Purge { cluster, domain } => {
            let domain = utils::resolve_domain(&orchestrator, domain.as_deref()).await?;
            purge(&orchestrator, &domain, &cluster).await
        }
        ClusterCommands::Addq {
            cluster,
            queue,
            domain,
            params,
            expiry,
            ..
        } => {
            let domain = utils::resolve_domain(&orchestrator, domain.as_deref()).await?;
            let options = QueueOptions {
                params_file: params,
                expiry: expiry.as_deref().map(parse_expiry).transpose()?,
            };
            add_queue(&orchestrator, &domain, &cluster, &queue, &options).await
        }
        ClusterCommands::Delq {
            cluster,
            queue,
            domain,
        } => {
            let domain = utils::resolve_domain(&orchestrator, domain.as_deref()).await?;
            destroy_queue(&orchestrator, &domain, &cluster, &queue).await
        }
        ClusterCommands::Expand {
            cluster,
            component,
            domain,
            name,
            params,
        } => {
            let domain = utils::resolve_domain(&orchestrator, domain.as_deref()).await?;
            expand(
                &orchestrator,
                &domain,
                &cluster,
                &component,
                name.as_deref(),
                params.as_deref(),
            )
            .await
        }
        ClusterCommands::Reduce {
            cluster,
            component,
            domain,
            name,
        } => {
            let domain = utils::resolve_domain(&orchestrator, domain.as_deref()).await?;
            reduce(&orchestrator, &domain, &cluster, &component, name.as_deref()).await
        }
        ClusterCommands::List { domain, solo } => {
            let domain = if solo {
                None
            } else {
                Some(utils::resolve_domain(&orchestrator, domain.as_deref()).await?)
            };
            list(&orchestrator, domain.as_deref()).await
        }
        ClusterCommands::Show {
            cluster,
            domain,
            solo,
        } => {
            let domain = if solo {
                None
            } else {
                Some(utils::resolve_domain(&orchestrator, domain.as_deref()).await?)
            };
            show(&orchestrator, domain.as_deref(), &cluster).await
        }
        ClusterCommands::Qstat {
            cluster,
            queue,
            domain,
        } => {
            let domain = utils::resolve_domain(&orchestrator, domain.as_deref()).await?;
            qstat(&orchestrator, &domain, &cluster, queue.as_deref()).await
        }
    }
}

async fn launch(
    orchestrator: &Orchestrator,
    domain: &str,
    name: &str,
    queue: Option<String>,
) -> anyhow::Result<()> {
    let region = &orchestrator.config().region;
    println!(
        "Launching cluster '{}' in domain '{}' ({})...\n",
        name.cyan(),
        domain,
        region
    );

    let total = match queue {
        Some(_) => CLUSTER_RESOURCES,
        None => CLUSTER_RESOURCES - COMPUTE_GROUP_RESOURCES,
    };
    let options = LaunchOptions {
        queue,
        queue_options: QueueOptions::default(),
    };
    let cluster = utils::with_progress("Launching cluster", ProgressMode::Create, total, |sink| {
        let options = &options;
        async move { orchestrator.launch_cluster(domain, name, options, &sink).await }
    })
    .await?;

    utils::print_done("Cluster launched.");
    println!();
    let components = orchestrator.cluster_components(domain, name).await?;
    print_access(&cluster, components);
    Ok(())
}

async fn launch_solo(orchestrator: &Orchestrator, name: &str) -> anyhow::Result<()> {
    let region = &orchestrator.config().region;
    println!("Launching solo cluster '{}' ({})...\n", name.cyan(), region);

    let cluster = utils::with_progress(
        "Launching cluster",
        ProgressMode::Create,
        SOLO_CLUSTER_RESOURCES,
        |sink| async move { orchestrator.launch_solo_cluster(name, &sink).await },
    )
    .await?;

    utils::print_done("Cluster launched.");
    println!();
    print_access(&cluster, Vec::new());
    Ok(())
}

async fn destroy(orchestrator: &Orchestrator, domain: Option<&str>, name: &str) -> anyhow::Result<()> {
    let region = &orchestrator.config().region;
    match domain {
        Some(d) => println!(
            "Destroying cluster '{}' in domain '{}' ({})...\n",
            name.cyan(),
            d,
            region
        ),
        None => println!("Destroying solo cluster '{}' ({})...\n", name.cyan(), region),
    }

    let total = match domain {
        Some(_) => CLUSTER_RESOURCES,
        None => SOLO_CLUSTER_RESOURCES,
    };
    utils::with_progress("Destroying cluster", ProgressMode::Destroy, total, |sink| async move {
        orchestrator.destroy_cluster(domain, name, &sink).await
    })
    .await?;

    utils::print_done("Cluster destroyed.");
    Ok(())
}

async fn purge(orchestrator: &Orchestrator, domain: &str, name: &str) -> anyhow::Result<()> {
    let region = &orchestrator.config().region;
    println!(
        "Purging cluster '{}' in domain '{}' ({})...\n",
        name.cyan(),
        domain,
        region
    );

    utils::with_progress(
        "Purging cluster",
        ProgressMode::Destroy,
        CLUSTER_RESOURCES,
        |sink| async move { orchestrator.purge_cluster(domain, name, &sink).await },
    )
    .await?;

    utils::print_done("Purge complete.");
    Ok(())
}

async fn add_queue(
    orchestrator: &Orchestrator,
    domain: &str,
    cluster: &str,
    queue: &str,
    options: &QueueOptions,
) -> anyhow::Result<()> {
    let region = &orchestrator.config().region;
    println!(
        "Adding queue '{}' to cluster '{}' in domain '{}' ({})...\n",
        queue.cyan(),
        cluster,
        domain,
        region
    );

    let group = utils::with_progress(
        "Adding queue",
        ProgressMode::Create,
        COMPUTE_GROUP_RESOURCES,
        |sink| async move {
            orchestrator
                .add_queue(domain, cluster, queue, options, &sink)
                .await
        },
    )
    .await?;

    utils::print_done("Cluster queue created.");
    if let Some(expiry) = group.expiry {
        println!("Expires: {}", format_expiry(expiry));
    }
    Ok(())
}

async fn destroy_queue(
    orchestrator: &Orchestrator,
    domain: &str,
    cluster: &str,
    queue: &str,
) -> anyhow::Result<()> {
    let region = &orchestrator.config().region;
    println!(
        "Removing queue '{}' from cluster '{}' in domain '{}' ({})...\n",
        queue.cyan(),
        cluster,
        domain,
        region
    );

    utils::with_progress(
        "Removing queue",
        ProgressMode::Destroy,
        COMPUTE_GROUP_RESOURCES,
        |sink| async move {
            orchestrator
                .destroy_queue(domain, cluster, queue, &sink)
                .await
        },
    )
    .await?;

    utils::print_done("Cluster queue destroyed.");
    Ok(())
}

fn component_label(component: &str, name: Option<&str>) -> String {
    match name {
        Some(n) => format!("{} ({})", component, n),
        None => component.to_string(),
    }
}

async fn expand(
    orchestrator: &Orchestrator,
    domain: &str,
    cluster: &str,
    component: &str,
    name: Option<&str>,
    params: Option<&Path>,
) -> anyhow::Result<()> {
    let region = &orchestrator.config().region;
    println!(
        "Expanding cluster '{}' in domain '{}' ({}) with '{}'...\n",
        cluster.cyan(),
        domain,
        region,
        component_label(component, name)
    );

    utils::with_progress(
        "Expanding cluster",
        ProgressMode::Create,
        COMPONENT_RESOURCES,
        |sink| async move {
            orchestrator
                .expand_cluster(domain, cluster, component, name, params, &sink)
                .await
        },
    )
    .await?;

    utils::print_done("Cluster expanded.");
    Ok(())
}

async fn reduce(
    orchestrator: &Orchestrator,
    domain: &str,
    cluster: &str,
    component: &str,
    name: Option<&str>,
) -> anyhow::Result<()> {
    let region = &orchestrator.config().region;
    println!(
        "Reducing cluster '{}' in domain '{}' ({}) by removing '{}'...\n",
        cluster.cyan(),
        domain,
        region,
        component_label(component, name)
    );

    utils::with_progress(
        "Reducing cluster",
        ProgressMode::Destroy,
        COMPONENT_RESOURCES,
        |sink| async move {
            orchestrator
                .reduce_cluster(domain, cluster, component, name, &sink)
                .await
        },
    )
    .await?;

    utils::print_done("Cluster reduced.");
    Ok(())
}

async fn list(orchestrator: &Orchestrator, domain: Option<&str>) -> anyhow::Result<()> {
    let status = match domain {
        Some(d) => utils::spin("Listing clusters", orchestrator.domain_status(d)).await?,
        None => utils::spin("Listing clusters", orchestrator.inventory().solo_status()).await?,
    };

    match domain {
        Some(_) => println!("== Clusters ==\n"),
        None => println!("== Solo Clusters ==\n"),
    }
    if status.clusters.is_empty() {
        println!("<none>");
    }
    for cluster in status.clusters.values() {
        utils::print_underlined("    ", &cluster.name);
        for group in &cluster.compute_groups {
            println!("    {}", group.name);
        }
        println!();
    }
    Ok(())
}

async fn show(orchestrator: &Orchestrator, domain: Option<&str>, name: &str) -> anyhow::Result<()> {
    let cluster = utils::spin("Loading cluster", orchestrator.load_cluster(domain, name)).await?;
    let components = match domain {
        Some(d) => orchestrator.cluster_components(d, name).await?,
        None => Vec::new(),
    };

    match domain {
        Some(d) => utils::print_heading(&format!("== {}/{} ==\n", d, name)),
        None => utils::print_heading(&format!("== {} ==\n", name)),
    }
    print_access(&cluster, components);
    Ok(())
}

async fn print_group(orchestrator: &Orchestrator, group: &ComputeGroup) -> anyhow::Result<()> {
    let capacity = orchestrator.compute_group_capacity(group).await?;
    let running = i32::try_from(capacity.instances.len()).unwrap_or(i32::MAX);

    utils::print_underlined("", &group.name);
    println!("Type: {}", group.instance_type);
    println!("Pricing: {}", group.pricing);
    println!("Capacity: {}-{}", capacity.min_size, capacity.max_size);
    println!("Running: {}", running);
    println!("Pending: {}", (capacity.desired_capacity - running).max(0));
    if let Some(expiry) = group.expiry {
        println!("Expiry: {}", format_expiry(expiry));
    }
    println!();
    Ok(())
}

async fn qstat(
    orchestrator: &Orchestrator,
    domain: &str,
    name: &str,
    queue: Option<&str>,
) -> anyhow::Result<()> {
    let cluster = utils::spin("Loading cluster", orchestrator.load_cluster(Some(domain), name)).await?;
    let groups: Vec<&ComputeGroup> = match queue {
        Some(q) => vec![
            cluster
                .compute_group(q)
                .ok_or_else(|| anyhow::anyhow!("Queue '{}' not found on cluster: {}/{}", q, domain, name))?,
        ],
        None => cluster.compute_groups.iter().collect(),
    };

    let region = &orchestrator.config().region;
    utils::print_heading(&format!("== {}/{} ({}) ==\n", domain, name, region));
    if groups.is_empty() {
        println!("<no queues>");
    }
    for group in groups {
        print_group(orchestrator, group).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_expiry() {
        assert_eq!(parse_expiry("2026-01-01T00:00:00Z").unwrap(), 1_767_225_600);
        assert!(parse_expiry("tomorrow").is_err());
    }

    #[test]
    fn test_format_expiry() {
        assert_eq!(format_expiry(1_767_225_600), "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_apply_instance_type() {
        let mut config = Configuration::default();
        apply_instance_type(
            &mut config,
            "master-instance-type",
            Some("small-t2.large"),
            catalog::is_master_instance_type,
        )
        .unwrap();
        assert_eq!(config.setting("master-instance-type"), Some("small-t2.large"));

        let err = apply_instance_type(
            &mut config,
            "master-instance-type",
            Some("t2.large"),
            catalog::is_master_instance_type,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Invalid instance type 't2.large'"));
        assert_eq!(config.setting("master-instance-type"), Some("small-t2.large"));
    }

    #[test]
    fn test_component_label() {
        assert_eq!(component_label("gpu", None), "gpu");
        assert_eq!(component_label("gpu", Some("a")), "gpu (a)");
    }
}
