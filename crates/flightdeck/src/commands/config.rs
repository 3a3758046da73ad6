use crate::{GlobalArgs, utils};
use colored::Colorize;
use flightdeck_config::{Configuration, find_config_file};
use flightdeck_core::{catalog, write_parameter_directory};
use std::path::Path;

pub fn defaults() -> anyhow::Result<()> {
    print!("{}", Configuration::render_defaults()?);
    Ok(())
}

fn mask(secret: &str) -> String {
    let shown: String = secret.chars().take(4).collect();
    format!("{}****", shown)
}

pub fn show(global: &GlobalArgs) -> anyhow::Result<()> {
    let config = utils::load_configuration(global)?;
    let source = match &global.config {
        Some(path) => Some(path.clone()),
        None => find_config_file()?,
    };

    println!("{}", "== Configuration ==".bold());
    match source {
        Some(path) => println!("File: {}", path.display().to_string().cyan()),
        None => println!("File: {}", "<defaults>".yellow()),
    }
    println!("Region: {}", config.region);
    println!("Key pair: {}", config.access_key_name);
    println!("Domain: {}", config.domain.as_deref().unwrap_or("<first found>"));
    println!("Access key: {}", config.access_key.as_deref().unwrap_or("<unset>"));
    println!(
        "Secret key: {}",
        config.secret_key.as_deref().map(mask).unwrap_or_else(|| "<unset>".to_string())
    );
    println!("Templates: {}", config.template_url(""));
    if let Some(dir) = &config.parameter_directory {
        println!("Parameters: {}", dir.display());
    }

    println!("\n{}", "== Settings ==".bold());
    for (key, value) in &config.settings {
        println!("{}: {}", key, value);
    }
    Ok(())
}

pub fn params(dir: &Path) -> anyhow::Result<()> {
    let written = write_parameter_directory(dir)?;
    for path in &written {
        println!("  • {}", path.display().to_string().cyan());
    }
    println!(
        "\nSet `parameter-directory: {}` to launch with these tables.",
        dir.display()
    );
    Ok(())
}

pub fn catalogs() -> anyhow::Result<()> {
    print!("{}", catalog::render_catalogs());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask() {
        assert_eq!(mask("abcdefgh"), "abcd****");
        assert_eq!(mask("ab"), "ab****");
    }
}
