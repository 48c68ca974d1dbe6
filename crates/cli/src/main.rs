use std::process::ExitCode;

fn main() -> ExitCode {
    playbook_cli::run()
}
