//! `agenx config`: Print the default configuration.

use agenx_config::AppConfig;

pub fn run(path: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path {
        println!("{}", AppConfig::config_dir().join("config.toml").display());
    } else {
        println!("{}", AppConfig::default_toml());
    }
    Ok(())
}
