use super::args::*;
use sqlgrade_core::codec::{Codec, Secret};
use sqlgrade_core::config::{load_runner_config, RunnerConfig};

pub mod package;
pub mod parse;
pub mod run;
pub mod scores;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const ARTIFACT_REJECTED: i32 = 1;
    pub const FATAL: i32 = 2;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => run::run(args, runner_config(&cli.config)?).await,
        Command::Package(args) => package::run(args).await,
        Command::Parse(args) => parse::run(args),
        Command::Scores(args) => scores::run(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn runner_config(path: &Option<std::path::PathBuf>) -> anyhow::Result<RunnerConfig> {
    let mut cfg = load_runner_config(path.as_deref())?;
    cfg.apply_env();
    Ok(cfg)
}

pub const DEV_SECRET_ENV: &str = "SQLGRADE_DEV_SECRET";

/// Codec keyed by the secret compiled into this binary. Debug builds without
/// one fall back to `SQLGRADE_DEV_SECRET`; release builds never read it.
pub fn codec() -> Codec {
    let secret = Secret::from_build(option_env!("SQLGRADE_SECRET")).or_else(|| {
        if cfg!(debug_assertions) {
            Secret::from_build(std::env::var(DEV_SECRET_ENV).ok().as_deref())
        } else {
            None
        }
    });
    Codec::new(secret)
}
