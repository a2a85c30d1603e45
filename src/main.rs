use env_logger::{Builder, Env};
use log::error;
use std::process::exit;

fn main() {
    // Initialize logger with default info level
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    match envlint::cli::run() {
        Ok(true) => {}
        Ok(false) => exit(1),
        Err(e) => {
            error!("Error: {}", e);
            exit(1);
        }
    }
}
