use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use rust_tokenizer_bridge::client;

/// Smoke test for the tokenizer C ABI: init, encode, print, free.
#[derive(Parser, Debug)]
#[command(name = "tokenizer-smoke", version, about)]
struct Cli {
    /// Tokenizer configuration (JSON or .tiktoken).
    #[arg(long, default_value = "tokenizer.json")]
    config: PathBuf,

    #[arg(long, default_value = "Windows JNA Test")]
    text: String,

    /// Comma-separated ids the encoding must match, e.g. `1,7,23,42`.
    #[arg(long, value_delimiter = ',')]
    expect: Option<Vec<i32>>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    println!("init_tokenizer");
    client::init(&cli.config)
        .with_context(|| format!("init_tokenizer FAILED for {}", cli.config.display()))?;

    println!("encode_to_ids");
    let ids = client::encode(&cli.text).context("encode_to_ids returned NULL")?;
    println!("Token count = {}", ids.len());
    let rendered: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    println!("IDs: {}", rendered.join(" "));

    if let Some(expected) = &cli.expect {
        if ids.as_slice() != expected.as_slice() {
            bail!("expected ids {:?}, got {:?}", expected, ids);
        }
    }

    println!("free_ids");
    drop(ids);

    println!("SMOKE TEST SUCCESS");
    Ok(())
}
