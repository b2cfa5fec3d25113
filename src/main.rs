use harbor_replicator::cli::{Args, Runner};
use harbor_replicator::logging;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_args();
    logging::init(args.verbose);

    let config = match args.apply_env().and_then(Args::into_config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let runner = match Runner::new(config) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match runner.run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
