use crate::config::generate::generate_starter_config;
use crate::config::user_config_path;
use std::fs;
use std::path::PathBuf;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    let config_path = user_config_path()
        .filter(|path| match path.parent() {
            Some(parent) => match fs::create_dir_all(parent) {
                Ok(_) => true,
                Err(_) => {
                    eprintln!("Warning: Could not create directory {}", parent.display());
                    eprintln!("Falling back to /etc/lokitee/config.yml");
                    false
                }
            },
            None => false,
        })
        .unwrap_or_else(|| PathBuf::from("/etc/lokitee/config.yml"));

    if config_path.exists() {
        return Err(format!(
            "Config file already exists at {}. Remove it first or use --stdout.",
            config_path.display()
        )
        .into());
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create directory {}: {}", parent.display(), e))?;
    }

    fs::write(&config_path, config_content)
        .map_err(|e| format!("Failed to write config to {}: {}", config_path.display(), e))?;

    println!("Config file created at: {}", config_path.display());
    Ok(())
}
