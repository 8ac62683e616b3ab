use std::process::ExitCode;

fn main() -> ExitCode {
    karmic_cli::run()
}
