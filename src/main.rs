use std::sync::Arc;

use clap::{error::ErrorKind, CommandFactory, Parser};
use log::info;

use sipload::config::Args;
use sipload::protocol::{MessageDefaults, Sip2Codec};
use sipload::samples::SamplePools;
use sipload::session::{SessionContext, TcpConnector};
use sipload::supervisor::Supervisor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "tracing")]
    console_subscriber::init();

    let env = env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info");
    env_logger::init_from_env(env);

    let args = Args::parse();

    let tunables = match args.tunables() {
        Ok(tunables) => tunables,
        Err(e) => Args::command().error(ErrorKind::ValueValidation, e).exit(),
    };

    let pools = SamplePools::load(&args.sample_files(), args.sampling())?;

    let codec = Sip2Codec::new(MessageDefaults::default()).with_error_detection(args.checksum);
    let ctx = SessionContext {
        codec: Arc::new(codec),
        pools: Arc::new(pools),
        tunables,
        pacing: args.pacing,
    };

    info!("Targeting SIP server at {}", args.server);

    let supervisor = Supervisor::new(TcpConnector::new(args.server.clone()), ctx, args.clients);
    let reports = supervisor.run(args.duration()).await;

    info!("{} sessions ended before the run was stopped", reports.len());

    Ok(())
}
