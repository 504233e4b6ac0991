//! meshlite overlay node binary.

mod cli;

use clap::Parser;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = cli::MeshliteCli::parse();
    let _guard = meshlite_node_core::logging::init_logging(&cli.logs)?;

    cli::run(cli).await
}
