use std::process::ExitCode;

fn main() -> ExitCode {
    match maple_monitor_cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
