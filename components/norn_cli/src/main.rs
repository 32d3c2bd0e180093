//! norn virtual machine CLI
//!
//! Entry point: parses arguments, sets up logging and delegates to the
//! [`Runner`].

use clap::Parser as ClapParser;
use norn_cli::{Cli, CliError, Runner};

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    let runner = Runner::new(cli.config());

    if cli.bytecode {
        match runner.load(&cli.file) {
            Ok(program) => print!("{}", program),
            Err(e) => fail(e),
        }
        return;
    }

    match runner.run_file(&cli.file) {
        Ok(report) => {
            if cli.stats {
                match report.to_json() {
                    Ok(json) => eprintln!("{}", json),
                    Err(e) => fail(e),
                }
            }
        }
        Err(e) => fail(e),
    }
}

fn fail(error: CliError) -> ! {
    match error {
        CliError::Vm(e) => e.report(),
        other => eprintln!("Error: {}", other),
    }
    std::process::exit(1);
}
