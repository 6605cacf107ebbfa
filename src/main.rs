use anyhow::Result;
use clap::Parser;

mod cli;
mod config;
mod console;
mod controller;
mod distance;
mod frame;
mod link;
mod mode;
mod port;
mod proto;
mod relay;
mod report;
mod rx;
mod stats;
mod tx;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match args.cmd {
        cli::Cmd::Run(opts) => mode::run_node(opts),
        cli::Cmd::Ping(opts) => tx::run(opts),
        cli::Cmd::Listen(opts) => rx::run(opts),
    }
}
