use crate::model::{GradingReport, SuiteMode, TestResultRow, TestStatus};

fn icon(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Pass => "✅",
        TestStatus::ConstraintFail => "🚫",
        TestStatus::Mismatch => "❌",
        TestStatus::Error => "💥",
    }
}

/// One line per test, as printed by `print_summary`.
pub fn format_row(r: &TestResultRow, mode: SuiteMode) -> String {
    let verdict = if r.status == TestStatus::Pass {
        "PASS"
    } else {
        "FAIL"
    };
    match mode {
        SuiteMode::Sample => format!("{} {:<8} {:<4} {}", icon(r.status), r.test_id, verdict, r.status.as_str()),
        SuiteMode::Eval => format!(
            "{} {:<8} {:<15} {:>6.2}/{:<6.2}",
            icon(r.status),
            r.test_id,
            r.status.as_str(),
            r.score,
            r.max_score
        ),
    }
}

pub fn print_summary(report: &GradingReport) {
    eprintln!("\nGrading {} ({} tests, {} mode)...", report.lab, report.results.len(), report.mode);

    let mut constraint_fail = 0;
    let mut mismatch = 0;
    let mut error = 0;

    for r in &report.results {
        eprintln!("{}", format_row(r, report.mode));
        match r.status {
            TestStatus::Pass => {}
            TestStatus::ConstraintFail => constraint_fail += 1,
            TestStatus::Mismatch => mismatch += 1,
            TestStatus::Error => error += 1,
        }
        if r.status != TestStatus::Pass && !r.reason.is_empty() {
            eprintln!("      → {}", r.reason);
        }
    }

    eprintln!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    eprintln!(
        "Summary: {} passed, {} constraint failures, {} mismatched, {} errors",
        report.passed(),
        constraint_fail,
        mismatch,
        error
    );
    if report.mode == SuiteMode::Eval {
        eprintln!(
            "Score: {:.2} / {:.2} ({:.1}%)",
            report.total_score,
            report.max_score,
            report.percentage()
        );
    }
}
