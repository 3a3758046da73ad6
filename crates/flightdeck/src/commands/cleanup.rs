use crate::utils;
use colored::Colorize;
use flightdeck_core::Orchestrator;

pub async fn handle(orchestrator: &Orchestrator, dry_run: bool) -> anyhow::Result<()> {
    println!("Collating resources for domains and solo clusters");
    let active = utils::spin("Collating resources", orchestrator.active_channel_names()).await?;
    println!("\nActive resources: {}\n", active.join(", "));

    let (plan, applied) = orchestrator
        .cleanup(&active, dry_run, |line| println!("{}", line))
        .await?;

    for failure in &applied.failed {
        eprintln!(
            "{} {}: {}",
            "Failed".red().bold(),
            failure.action_id,
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }

    let summary = plan.summary();
    if dry_run {
        println!("\n{} ({})", "Dry run complete.".yellow().bold(), summary);
    } else if applied.is_success() {
        utils::print_done(&format!("Cleanup complete ({}).", summary));
    } else {
        anyhow::bail!(
            "{} of {} removals failed",
            applied.failed.len(),
            summary.delete
        );
    }
    Ok(())
}
