// xmlrpc_host - main.rs
// Parses the command line and hands off to the CLI dispatcher.

use clap::Parser;
use xmlrpc_host::cli::{dispatch, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dispatch(cli)?;
    Ok(())
}
