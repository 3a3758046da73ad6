use crate::utils;
use crate::{GlobalArgs, InfraCommands};
use colored::Colorize;
use flightdeck_config::Configuration;
use flightdeck_core::{ApplianceKind, Orchestrator, ProgressMode, catalog};

fn parse_kind(name: &str) -> anyhow::Result<ApplianceKind> {
    name.parse::<ApplianceKind>()
        .map_err(|_| anyhow::anyhow!("Unknown appliance type: {}", name))
}

pub async fn handle(
    cmd: InfraCommands,
    mut config: Configuration,
    global: &GlobalArgs,
) -> anyhow::Result<()> {
    match cmd {
        InfraCommands::Launch {
            appliance,
            all,
            domain,
            instance_type,
            key_pair,
        } => {
            let kinds = match (all, appliance) {
                (true, _) => ApplianceKind::ALL.to_vec(),
                (false, Some(name)) => vec![parse_kind(&name)?],
                (false, None) => anyhow::bail!("Name an appliance or pass --all"),
            };
            if let Some(value) = instance_type {
                if !catalog::is_appliance_instance_type(&value) {
                    anyhow::bail!(
                        "Invalid instance type '{}'. See `flightdeck config catalog` for the available types",
                        value
                    );
                }
                config.set_setting("appliance-instance-type", value);
            }
            if let Some(name) = key_pair {
                config.access_key_name = name;
            }
            let key_pair = config.access_key_name.clone();

            let orchestrator = utils::connect(config, global).await?;
            utils::spin("Checking key pair", orchestrator.validate_key_pair(&key_pair)).await?;
            let domain = utils::resolve_domain(&orchestrator, domain.as_deref()).await?;
            for kind in kinds {
                launch(&orchestrator, &domain, kind).await?;
            }
            Ok(())
        }
        InfraCommands::Destroy { appliance, domain } => {
            let kind = parse_kind(&appliance)?;
            let orchestrator = utils::connect(config, global).await?;
            let domain = utils::resolve_domain(&orchestrator, domain.as_deref()).await?;
            destroy(&orchestrator, &domain, kind).await
        }
    }
}

async fn launch(orchestrator: &Orchestrator, domain: &str, kind: ApplianceKind) -> anyhow::Result<()> {
    let region = &orchestrator.config().region;
    println!(
        "Launching appliance '{}' in domain '{}' ({})...\n",
        kind.name().cyan(),
        domain,
        region
    );

    let appliance = utils::with_progress(
        "Launching appliance",
        ProgressMode::Create,
        kind.resource_count(),
        |sink| async move { orchestrator.launch_appliance(domain, kind, &sink).await },
    )
    .await?;

    utils::print_done("Appliance launched.");
    println!();
    for (key, value) in appliance.access_details() {
        println!("{}: {}", key, value);
    }
    println!();
    Ok(())
}

async fn destroy(orchestrator: &Orchestrator, domain: &str, kind: ApplianceKind) -> anyhow::Result<()> {
    let region = &orchestrator.config().region;
    println!(
        "Destroying appliance '{}' in domain '{}' ({})...\n",
        kind.name().cyan(),
        domain,
        region
    );

    utils::with_progress(
        "Destroying appliance",
        ProgressMode::Destroy,
        kind.resource_count(),
        |sink| async move { orchestrator.destroy_appliance(domain, kind, &sink).await },
    )
    .await?;

    utils::print_done("Appliance destroyed.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("directory").unwrap(), ApplianceKind::Directory);
        let err = parse_kind("mail-server").unwrap_err();
        assert_eq!(err.to_string(), "Unknown appliance type: mail-server");
    }
}
