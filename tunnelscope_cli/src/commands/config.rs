//! Config command - show or initialise the config file

use crate::config::{self, Config};
use anyhow::Result;
use console::style;

/// Print the effective config, writing the defaults first when `init` is set
pub fn run(init: bool) -> Result<()> {
    let path = config::config_file();

    if init {
        if path.exists() {
            cliclack::log::warning(format!("Config already exists at {}", path.display()))?;
        } else {
            Config::default().save()?;
            cliclack::log::success(format!("Wrote defaults to {}", path.display()))?;
        }
    }

    let config = Config::load()?;
    let source = if path.exists() {
        path.display().to_string()
    } else {
        "built-in defaults".to_string()
    };

    cliclack::note(
        format!("Config ({})", source),
        format!(
            "inspect_addr:   {}\nretry_delay_ms: {}\nregex_search:   {}",
            style(&config.inspect_addr).cyan(),
            config.retry_delay_ms,
            config.regex_search
        ),
    )?;
    Ok(())
}
