//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use ridewise_cli::CliError;

fn main() {
    if let Err(err) = ridewise_cli::run() {
        if let CliError::ArgumentParsing(parse_err) = &err {
            parse_err.exit();
        }
        eprintln!("ridewise: {err}");
        std::process::exit(1);
    }
}
