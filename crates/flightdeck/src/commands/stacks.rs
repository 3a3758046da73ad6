use crate::utils;
use colored::Colorize;
use flightdeck_cloud::{StackDescriptor, tags};
use flightdeck_core::Orchestrator;

fn describe(stack: &StackDescriptor) -> String {
    let kind = stack.stack_type().unwrap_or("-");
    let mut line = format!("    {:<48} {:<12} {}", stack.name, kind, stack.status);
    if let Some(expiry) = stack.tag(tags::EXPIRY) {
        line.push_str(&format!("  expires {}", expiry));
    }
    line
}

pub async fn handle(orchestrator: &Orchestrator, expired: bool, other: bool) -> anyhow::Result<()> {
    let inventory = orchestrator.inventory();
    let (title, stacks) = if expired {
        let now = chrono::Utc::now().timestamp();
        let stacks = utils::spin("Listing stacks", inventory.expired_stacks(now)).await?;
        ("== Expired Stacks ==", stacks)
    } else if other {
        let stacks = utils::spin("Listing stacks", inventory.other_stacks()).await?;
        ("== Other Stacks ==", stacks)
    } else {
        let stacks = utils::spin("Listing stacks", inventory.flight_stacks()).await?;
        ("== Flight Stacks ==", stacks.to_vec())
    };

    println!("{}\n", title.bold());
    if stacks.is_empty() {
        println!("<none>");
    }
    for stack in &stacks {
        println!("{}", describe(stack).cyan());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightdeck_cloud::StackStatus;

    #[test]
    fn test_describe() {
        let stack = StackDescriptor::new("flight-lab-hpc-compute-q1", StackStatus::CreateComplete)
            .with_tag(tags::TYPE, "compute")
            .with_tag(tags::EXPIRY, "1767225600");
        let line = describe(&stack);
        assert!(line.starts_with("    flight-lab-hpc-compute-q1"));
        assert!(line.contains("compute"));
        assert!(line.ends_with("expires 1767225600"));
    }
}
