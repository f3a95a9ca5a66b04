use clap::Parser;
use snow_cli::cli::Cli;
use snow_cli::error::SnowError;
use snow_cli::{commands, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = commands::dispatch(cli).await {
		report(&err);
		std::process::exit(1);
	}
}

fn report(err: &SnowError) {
	eprintln!("Error: {err}");
	if let Some(hint) = err.hint() {
		eprintln!("Hint: {hint}");
	}
}
