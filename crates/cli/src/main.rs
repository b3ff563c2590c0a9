use std::process::ExitCode;

fn main() -> ExitCode {
    lapwise_cli::run()
}
