use std::process::ExitCode;

fn main() -> ExitCode {
    invoicer_cli::run()
}
