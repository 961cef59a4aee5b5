//! Classify log text into structured messages.

use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use flowlens_core::messages::parse_log_messages;

pub fn run(file: Option<&Path>) -> Result<()> {
    let text = match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("read stdin")?;
            buffer
        }
    };

    let messages = parse_log_messages(&text);
    println!("{}", serde_json::to_string_pretty(&messages)?);
    Ok(())
}
