use anyhow::Context;
use enroute_core::config::Config;
use enroute_core::paths;
use std::path::Path;

/// Write the default config unless one already exists. Idempotent.
pub fn run(root: &Path) -> anyhow::Result<()> {
    let config_path = paths::config_path(root);
    if config_path.exists() {
        println!("Already initialized: {}", config_path.display());
        return Ok(());
    }

    let config = Config::default();
    config.save(root).context("failed to write config")?;
    println!("Initialized enroute in {}", root.join(paths::ENROUTE_DIR).display());
    println!(
        "Set {} to your provider API key before running `enroute watch`.",
        config.provider.api_key_env
    );
    Ok(())
}
