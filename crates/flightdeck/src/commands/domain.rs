use crate::utils;
use colored::Colorize;
use flightdeck_core::{DomainStatus, Orchestrator, ProgressMode};
use std::path::Path;

pub async fn create(
    orchestrator: &Orchestrator,
    domain: &str,
    prefix: Option<&str>,
    params: Option<&Path>,
) -> anyhow::Result<()> {
    let region = &orchestrator.config().region;
    println!("Creating domain '{}' ({})...\n", domain.cyan(), region);

    let prefix = prefix.unwrap_or(domain);
    utils::with_progress("Creating domain", ProgressMode::Create, 0, |sink| async move {
        orchestrator.create_domain(domain, prefix, params, &sink).await
    })
    .await?;

    utils::print_done("Domain created.");
    Ok(())
}

pub async fn destroy(orchestrator: &Orchestrator, domain: &str, force: bool) -> anyhow::Result<()> {
    let region = &orchestrator.config().region;
    println!("Destroying domain '{}' ({})...\n", domain.cyan(), region);

    utils::with_progress("Destroying domain", ProgressMode::Destroy, 0, |sink| async move {
        orchestrator.destroy_domain(domain, force, &sink).await
    })
    .await?;

    utils::print_done("Domain destroyed.");
    Ok(())
}

pub async fn purge(orchestrator: &Orchestrator, domain: &str, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!(
            "You must supply `--yes` to confirm you want to purge domain: {}",
            domain
        );
    }
    let region = &orchestrator.config().region;
    println!("Purging domain '{}' ({})...\n", domain.cyan(), region);

    utils::with_progress("Purging domain", ProgressMode::Destroy, 0, |sink| async move {
        orchestrator.purge_domain(domain, &sink).await
    })
    .await?;

    utils::print_done("Purge complete.");
    Ok(())
}

fn print_status(status: &DomainStatus) {
    println!("== Infrastructure ==");
    if status.appliances.is_empty() {
        println!("<none>");
    }
    for appliance in status.appliances.values() {
        println!("{}", appliance.kind.name());
        for (key, value) in appliance.access_details() {
            println!("    {}: {}", key, value);
        }
    }

    println!("\n== Clusters ==");
    if status.clusters.is_empty() {
        println!("<none>");
    }
    for cluster in status.clusters.values() {
        println!("{}", cluster.name);
        for group in &cluster.compute_groups {
            println!("    {} ({})", group.name, group.instance_type);
        }
    }

    println!("\n== Network ==");
    let internet = if status.has_internet_access {
        "enabled".green()
    } else {
        "disabled".yellow()
    };
    println!("Internet access: {}", internet);
    if let Some(vpn) = &status.vpn_connection {
        println!("VPN connection: {}", vpn);
    }
    if let Some(peer) = &status.peer_vpc {
        match &status.peer_vpc_cidr_block {
            Some(cidr) => println!("Peer VPC: {} ({})", peer, cidr),
            None => println!("Peer VPC: {}", peer),
        }
    }
}

pub async fn status(orchestrator: &Orchestrator, domain: Option<&str>) -> anyhow::Result<()> {
    let domain = utils::resolve_domain(orchestrator, domain).await?;
    let status = utils::spin("Collating domain status", orchestrator.domain_status(&domain)).await?;

    let region = &orchestrator.config().region;
    utils::print_heading(&format!(">>> Domain '{}' ({}) <<<\n", domain, region));
    print_status(&status);
    Ok(())
}

pub async fn list(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let domains = utils::spin("Listing domains", orchestrator.inventory().domains()).await?;

    println!("== Domains ==\n");
    if domains.is_empty() {
        println!("<none>");
    }
    for domain in &domains {
        let state = if domain.is_ready() {
            domain.stack.status.to_string().green()
        } else {
            domain.stack.status.to_string().yellow()
        };
        println!("    {} [{}] {}", domain.name.cyan(), domain.prefix(), state);
    }
    Ok(())
}
