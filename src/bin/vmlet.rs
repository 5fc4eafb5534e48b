mod cli;

use clap::Parser;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = cli::Cli::parse();

    let result = cli
        .into_config()
        .and_then(vmlet::run);

    if let Err(err) = result {
        eprintln!("vmlet: {err}");
        std::process::exit(1);
    }
}
