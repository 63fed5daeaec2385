mod cli;
mod paths;
mod run;
mod snapshots;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    if let Command::Where = cli.command {
        return run::describe_paths();
    }

    let config = run::load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Render(args) => run::render(config, args),
        Command::Single(args) => run::single(config, args),
        Command::Plan(args) => run::plan(config, args),
        Command::Where => run::describe_paths(),
    }
}
