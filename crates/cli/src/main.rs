use std::process::ExitCode;

fn main() -> ExitCode {
    itgov_cli::run()
}
