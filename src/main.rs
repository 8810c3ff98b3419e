use clap::Parser;
use tracing::error;

use motor_teleop::cli::Opts;

// One execution context: the control loop never runs concurrently with anything
#[tokio::main(flavor = "current_thread")]
async fn main() {
    motor_teleop::logging::init();

    let opts = Opts::parse();

    let result = match opts.into_config() {
        Ok(config) => motor_teleop::runtime::run(&config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
