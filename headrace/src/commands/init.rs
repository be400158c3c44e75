// Copyright (c) 2026 The Headrace Project

//! `headrace init` - create a config file and identity keyfile.

use anyhow::{bail, Result};
use headrace_keys::{write_keyfile, SigningKey};
use std::path::Path;

use crate::config::{keyfile_path_from_config, Config};

pub fn run(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        bail!(
            "Config already exists at {}; remove it to re-initialize",
            config_path.display()
        );
    }

    let config = Config::default();
    config.save(config_path)?;

    let keyfile = keyfile_path_from_config(config_path);
    let key = SigningKey::generate();
    write_keyfile(&keyfile, &key)?;

    println!("Initialized node at {}", config_path.display());
    println!("Network:          {}", config.network);
    println!("Verification key: {}", key.verification_key());
    println!();
    println!("Share the verification key with the other parties of your head.");
    Ok(())
}
