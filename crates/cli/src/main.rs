use std::process::ExitCode;

fn main() -> ExitCode {
    quotecraft_cli::run()
}
