use crate::config::default_config_paths;
use crate::config::generate::generate_starter_config;
use std::fs;
use std::path::PathBuf;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    let config_path = writable_config_path()?;

    if config_path.exists() {
        eprintln!(
            "Error: Config file already exists at {}",
            config_path.display()
        );
        eprintln!("Remove it first or use --stdout to print the config");
        std::process::exit(1);
    }

    fs::write(&config_path, config_content)?;
    println!("Config file written to {}", config_path.display());
    Ok(())
}

/// First default location whose directory exists or can be created.
fn writable_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    for path in default_config_paths() {
        let Some(parent) = path.parent() else {
            continue;
        };
        match fs::create_dir_all(parent) {
            Ok(()) => return Ok(path),
            Err(e) => {
                eprintln!("Warning: Could not create directory {}: {}", parent.display(), e);
            }
        }
    }
    Err("no writable config location, use --stdout and redirect the output".into())
}

pub fn validate(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path.ok_or("No config file found. Use --config to specify a path.")?;

    println!("Validating config file: {}", path.display());

    match crate::config::load_config(&path) {
        Ok(_) => {
            println!("✓ Config is valid");
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Config validation failed:\n{}", e);
            std::process::exit(1);
        }
    }
}
