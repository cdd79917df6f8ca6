//! Configuration view and validation commands: `ideation config`.

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use ideation::config::Config;
    use ideation::engine_config::{CONFIG_FILE_NAME, EngineToml};

    let config_path = project_dir.join(CONFIG_FILE_NAME);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Ideation Configuration");
            println!("======================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                EngineToml::load(&config_path)?
            } else {
                println!("No {} found at {}", CONFIG_FILE_NAME, config_path.display());
                println!("Using default configuration.");
                EngineToml::default()
            };
            println!();

            println!("[budget]");
            println!("  total_sec = {}", toml.budget.total_sec);
            println!("  variable_pool_sec = {}", toml.budget.variable_pool_sec);
            println!("  base_sec = {:?}", toml.budget.base_sec);
            println!("  variable_max_sec = {:?}", toml.budget.variable_max_sec);
            println!();

            println!("[gates]");
            println!(
                "  feasibility_threshold = {}",
                toml.gates.feasibility_threshold
            );
            println!(
                "  validation_threshold = {}",
                toml.gates.validation_threshold
            );
            println!("  dedup_threshold = {}", toml.gates.dedup_threshold);
            println!();

            println!("[signals]");
            println!("  always = {:?}", toml.signals.always);
            println!("  pool = {:?}", toml.signals.pool);
            if !toml.signals.commands.is_empty() {
                let names: Vec<_> = toml.signals.commands.keys().collect();
                println!("  commands configured for {:?}", names);
            }
            println!();

            println!("[concurrency]");
            println!("  max_concurrent = {}", toml.concurrency.max_concurrent);
            println!();

            let config = Config::from_toml(project_dir.to_path_buf(), toml, false, false);
            println!("Effective values (with env overrides):");
            println!("  reasoning_cmd = \"{}\"", config.reasoning_cmd);
            println!("  catalog_db = {}", config.catalog_db.display());
            println!("  output_dir = {}", config.output_dir.display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE_NAME);
                return Ok(());
            }

            let toml = EngineToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!(
                    "{} already exists at {}",
                    CONFIG_FILE_NAME,
                    config_path.display()
                );
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(project_dir)?;
            EngineToml::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE_NAME, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [budget] total and per-stage seconds");
            println!("  - [gates] feasibility, validation and dedup thresholds");
            println!("  - [signals.commands] one command per signal source");
            println!();
        }
    }

    Ok(())
}
