//! `parley config`: show configuration.

use parley_config::AppConfig;

pub fn run(config: &AppConfig, default: bool) -> Result<(), Box<dyn std::error::Error>> {
    if default {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let mut shown = config.clone();
    if shown.inference.api_key.take().is_some() {
        println!("# inference.api_key is set (hidden)");
    }
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}
