use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Assemble and link a RISC-V executable from a manifest"
)]
struct Opts {
    /// Input manifest file
    #[arg(value_name = "MANIFEST")]
    input: PathBuf,
    /// Print the resolved layout as JSON after linking
    #[arg(long)]
    map: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let artifact = rvasm_rs::compile(&opts.input)?;
    if opts.map {
        println!("{}", serde_json::to_string_pretty(&artifact.map)?);
    }
    Ok(())
}
