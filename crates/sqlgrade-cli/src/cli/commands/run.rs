use super::exit_codes;
use crate::cli::args::RunArgs;
use anyhow::Context;
use sqlgrade_core::config::RunnerConfig;
use sqlgrade_core::engine::runner::Runner;
use sqlgrade_core::mode::ExecutionContext;
use sqlgrade_core::providers::db::connector_for;
use sqlgrade_core::report::console;
use sqlgrade_core::submission::write_submission;

pub async fn run(args: RunArgs, mut cfg: RunnerConfig) -> anyhow::Result<i32> {
    if let Some(db) = args.practice_db {
        cfg.practice_db = db;
    }
    if let Some(db) = args.grading_db {
        cfg.grading_db = db;
    }
    if let Some(dir) = args.out_dir {
        cfg.out_dir = dir;
    }

    let mut ctx = ExecutionContext::select(&cfg, args.grade, args.student_id.as_deref())?;
    if let Some(suite) = args.suite {
        ctx.suite_path = suite;
    }

    let suite_bytes = std::fs::read(&ctx.suite_path).with_context(|| {
        format!(
            "cannot read the {} test suite {}; it ships with the lab package",
            ctx.mode,
            ctx.suite_path.display()
        )
    })?;
    let script = std::fs::read_to_string(&args.script)
        .with_context(|| format!("cannot read script {}", args.script.display()))?;

    let runner = Runner::new(connector_for(&ctx.target), super::codec());
    let artifacts = runner
        .run(&ctx, &suite_bytes, &script, chrono::Utc::now())
        .await?;

    console::print_summary(&artifacts.report);

    if let (Some(sealed), Some(student_id)) = (&artifacts.sealed, &ctx.student_id) {
        let dir = write_submission(&cfg.out_dir, student_id, &script, sealed)
            .context("failed to write submission")?;
        eprintln!("\nSubmission written to {}", dir.display());
        eprintln!("Upload this directory (zipped) as your submission.");
    } else {
        eprintln!("\nPractice run: nothing was saved. Use --grade --student-id <ID> to submit.");
    }

    Ok(exit_codes::OK)
}
