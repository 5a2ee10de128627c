//! Submission directory layout and instructor-side collection.
//!
//! ```text
//! <out_dir>/<student_id>_submission/
//!     solution.sql
//!     <student_id>_results.enc
//! ```

use crate::codec::Codec;
use crate::errors::IntegrityError;
use crate::mode::StudentId;
use crate::model::SealedReport;
use anyhow::Context;
use std::path::{Path, PathBuf};

pub const SOLUTION_FILE: &str = "solution.sql";
pub const RESULTS_SUFFIX: &str = "_results.enc";

pub fn results_file_name(student_id: &StudentId) -> String {
    format!("{}{}", student_id, RESULTS_SUFFIX)
}

pub fn submission_dir(out_dir: &Path, student_id: &StudentId) -> PathBuf {
    out_dir.join(format!("{}_submission", student_id))
}

/// Writes the sealed report and the script. The directory is assembled under
/// a staging name and renamed into place, so it is either complete or absent.
/// An existing submission for the same student is replaced.
pub fn write_submission(
    out_dir: &Path,
    student_id: &StudentId,
    script: &str,
    sealed: &[u8],
) -> anyhow::Result<PathBuf> {
    let dir = submission_dir(out_dir, student_id);
    let staging = out_dir.join(format!(".{}_submission.partial", student_id));
    if staging.exists() {
        std::fs::remove_dir_all(&staging)?;
    }

    let staged = std::fs::create_dir_all(&staging)
        .and_then(|_| std::fs::write(staging.join(results_file_name(student_id)), sealed))
        .and_then(|_| std::fs::write(staging.join(SOLUTION_FILE), script));
    if let Err(e) = staged {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e).with_context(|| format!("failed to stage {}", staging.display()));
    }

    if dir.exists() {
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("failed to replace {}", dir.display()))?;
    }
    std::fs::rename(&staging, &dir)
        .with_context(|| format!("failed to move submission into {}", dir.display()))?;

    tracing::info!(
        event = "sqlgrade.submission.written",
        student_id = %student_id,
        dir = %dir.display(),
    );
    Ok(dir)
}

#[derive(Debug)]
pub struct CollectedReport {
    pub path: PathBuf,
    pub outcome: Result<SealedReport, IntegrityError>,
}

impl CollectedReport {
    /// Identifier implied by the file name, e.g. `2021a7ps0001g_results.enc`.
    pub fn file_student_id(&self) -> Option<String> {
        self.path
            .file_name()?
            .to_str()?
            .strip_suffix(RESULTS_SUFFIX)
            .map(|s| s.to_ascii_lowercase())
    }

    /// `false` when the report inside names a different student than the file.
    pub fn id_matches_file(&self) -> bool {
        match (&self.outcome, self.file_student_id()) {
            (Ok(r), Some(id)) => r.student_id == id,
            _ => true,
        }
    }
}

/// Finds result artifacts under `inputs` (files, directories, or submission
/// directories one level down), sorted by path.
pub fn find_result_files(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for input in inputs {
        if input.is_file() {
            found.push(input.clone());
            continue;
        }
        for entry in std::fs::read_dir(input)? {
            let path = entry?.path();
            if path.is_dir() {
                for inner in std::fs::read_dir(&path)? {
                    let inner = inner?.path();
                    if is_result_file(&inner) {
                        found.push(inner);
                    }
                }
            } else if is_result_file(&path) {
                found.push(path);
            }
        }
    }
    found.sort();
    found.dedup();
    Ok(found)
}

fn is_result_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(RESULTS_SUFFIX))
}

/// Opens every artifact. Failures are kept per file.
pub fn collect_reports(codec: &Codec, files: &[PathBuf]) -> anyhow::Result<Vec<CollectedReport>> {
    let mut out = Vec::with_capacity(files.len());
    for path in files {
        let bytes = std::fs::read(path)?;
        let outcome = codec.open_report(&bytes);
        if let Err(e) = &outcome {
            tracing::warn!(file = %path.display(), error = %e, "result artifact rejected");
        }
        out.push(CollectedReport {
            path: path.clone(),
            outcome,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Secret;
    use crate::model::{GradingReport, SuiteMode};
    use chrono::Utc;

    fn sealed_for(codec: &Codec, student: &str) -> anyhow::Result<Vec<u8>> {
        Ok(codec.seal_report(&SealedReport {
            student_id: student.into(),
            submitted_at: Utc::now(),
            suite_fingerprint: "fp".into(),
            script_sha256: "sha".into(),
            report: GradingReport {
                lab: "lab".into(),
                mode: SuiteMode::Eval,
                results: vec![],
                total_score: 0.0,
                max_score: 0.0,
            },
        })?)
    }

    #[test]
    fn test_resubmission_replaces_the_whole_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let codec = Codec::new(Some(Secret::from_bytes(b"k")));
        let id = StudentId::parse("2021a7ps0001g")?;

        let first = write_submission(dir.path(), &id, "SELECT 1;", &sealed_for(&codec, id.as_str())?)?;
        std::fs::write(first.join("stale.txt"), b"left over")?;

        let second = write_submission(dir.path(), &id, "SELECT 2;", &sealed_for(&codec, id.as_str())?)?;
        assert_eq!(first, second);
        assert!(!second.join("stale.txt").exists());
        assert_eq!(std::fs::read_to_string(second.join(SOLUTION_FILE))?, "SELECT 2;");
        assert!(second.join(results_file_name(&id)).exists());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn test_failed_write_leaves_no_submission() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let not_a_dir = dir.path().join("out");
        std::fs::write(&not_a_dir, b"")?;
        let id = StudentId::parse("2021a7ps0001g")?;

        assert!(write_submission(&not_a_dir, &id, "SELECT 1;", b"sealed").is_err());
        let entries = std::fs::read_dir(dir.path())?.count();
        assert_eq!(entries, 1);
        Ok(())
    }

    #[test]
    fn test_write_and_collect() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let codec = Codec::new(Some(Secret::from_bytes(b"k")));
        let alice = StudentId::parse("2021a7ps0001g")?;
        let bob = StudentId::parse("2021a7ps0002g")?;

        let sub = write_submission(dir.path(), &alice, "SELECT 1;", &sealed_for(&codec, "2021a7ps0001g")?)?;
        assert_eq!(std::fs::read_to_string(sub.join(SOLUTION_FILE))?, "SELECT 1;");

        // Bob's directory carries a report that was generated for Alice.
        write_submission(dir.path(), &bob, "SELECT 2;", &sealed_for(&codec, "2021a7ps0001g")?)?;
        std::fs::write(dir.path().join("junk_results.enc"), b"not sealed")?;

        let files = find_result_files(&[dir.path().to_path_buf()])?;
        assert_eq!(files.len(), 3);

        let reports = collect_reports(&codec, &files)?;
        let by_name = |n: &str| {
            reports
                .iter()
                .find(|r| r.path.file_name().and_then(|f| f.to_str()) == Some(n))
                .unwrap()
        };
        assert!(by_name("2021a7ps0001g_results.enc").id_matches_file());
        assert!(!by_name("2021a7ps0002g_results.enc").id_matches_file());
        assert!(matches!(
            by_name("junk_results.enc").outcome,
            Err(IntegrityError::Malformed)
        ));
        Ok(())
    }
}
