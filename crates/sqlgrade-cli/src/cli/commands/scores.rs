use super::exit_codes;
use crate::cli::args::ScoresArgs;
use serde_json::json;
use sqlgrade_core::errors::IntegrityError;
use sqlgrade_core::submission::{collect_reports, find_result_files, CollectedReport};

pub fn run(args: ScoresArgs) -> anyhow::Result<i32> {
    let codec = super::codec();
    if !codec.has_secret() {
        return Err(IntegrityError::MissingSecret.into());
    }

    let files = find_result_files(&args.inputs)?;
    if files.is_empty() {
        anyhow::bail!("no *_results.enc files found in the given paths");
    }
    let reports = collect_reports(&codec, &files)?;

    if args.format == "json" {
        print_json(&reports)?;
    } else {
        print_text(&reports);
    }

    let rejected = reports
        .iter()
        .filter(|r| r.outcome.is_err() || !r.id_matches_file())
        .count();
    if rejected > 0 {
        eprintln!("{} of {} result files need attention", rejected, reports.len());
        Ok(exit_codes::ARTIFACT_REJECTED)
    } else {
        Ok(exit_codes::OK)
    }
}

fn print_text(reports: &[CollectedReport]) {
    println!(
        "{:<16} {:<26} {:>8} {:>8}  {}",
        "student_id", "submitted_at", "score", "max", "questions"
    );
    for r in reports {
        match &r.outcome {
            Ok(sealed) => {
                let questions: Vec<String> = sealed
                    .report
                    .results
                    .iter()
                    .map(|row| format!("{}={}", row.test_id, row.status.as_str()))
                    .collect();
                let flag = if r.id_matches_file() {
                    ""
                } else {
                    "  [file name names another student]"
                };
                println!(
                    "{:<16} {:<26} {:>8.2} {:>8.2}  {}{}",
                    sealed.student_id,
                    sealed.submitted_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    sealed.report.total_score,
                    sealed.report.max_score,
                    questions.join(" "),
                    flag
                );
            }
            Err(e) => println!("{:<16} REJECTED {}: {}", "-", r.path.display(), e),
        }
    }
}

fn print_json(reports: &[CollectedReport]) -> anyhow::Result<()> {
    let rows: Vec<_> = reports
        .iter()
        .map(|r| match &r.outcome {
            Ok(sealed) => json!({
                "file": r.path,
                "ok": true,
                "id_matches_file": r.id_matches_file(),
                "student_id": sealed.student_id,
                "submitted_at": sealed.submitted_at,
                "suite_fingerprint": sealed.suite_fingerprint,
                "script_sha256": sealed.script_sha256,
                "total_score": sealed.report.total_score,
                "max_score": sealed.report.max_score,
                "results": sealed.report.results,
            }),
            Err(e) => json!({
                "file": r.path,
                "ok": false,
                "error": e.to_string(),
            }),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
