mod cli;
mod logging;
mod pipeline;
mod recorder;
mod session;
mod shutdown;
mod supervisor;

use clap::Parser;
use cli::RecorderArgs;
use kiwi_core::config::now_unix_secs;
use shutdown::RunFlag;

fn main() -> anyhow::Result<()> {
    let args = RecorderArgs::parse();

    let _logging_guard = logging::init(&logging::LoggingConfig {
        level: args.log_level.clone(),
        log_dir: None,
    })?;

    let test_mode = args.test_mode;
    let tdoa = args.tdoa;
    let fanout = args.into_fanout_config()?;
    let sessions = fanout.expand(now_unix_secs(), std::process::id());

    tracing::info!(sessions = sessions.len(), "starting kiwirecorder");

    let run_flag = RunFlag::new();
    shutdown::install_ctrlc_handler(run_flag.clone())?;

    let reports = supervisor::run(sessions, run_flag, test_mode);

    if tdoa {
        for report in &reports {
            println!("status={},{}", report.index, report.status.code());
        }
    }

    let any_fatal = reports.iter().any(|r| r.fatal);
    if any_fatal {
        std::process::exit(1);
    }
    Ok(())
}
