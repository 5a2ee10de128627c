use super::exit_codes;
use crate::cli::args::PackageArgs;
use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlgrade_core::config::manifest::{load_manifest, LabManifest};
use sqlgrade_core::engine::capture::capture_suite;
use sqlgrade_core::errors::IntegrityError;
use sqlgrade_core::fingerprint;
use sqlgrade_core::model::SuiteMode;
use sqlgrade_core::providers::db::{connector_for, DbTarget};

pub async fn run(args: PackageArgs) -> anyhow::Result<i32> {
    let codec = super::codec();
    // Fail before capture touches either database.
    if !codec.has_secret() {
        return Err(IntegrityError::MissingSecret.into());
    }

    let script = std::fs::read_to_string(&args.script)
        .with_context(|| format!("cannot read solution script {}", args.script.display()))?;
    let manifest = match &args.manifest {
        Some(path) => load_manifest(path)?,
        None => LabManifest::default(),
    };
    let allowed_after = match &args.allowed_after {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .with_context(|| format!("--allowed-after '{}' is not an RFC 3339 timestamp", raw))?
                .with_timezone(&Utc),
        ),
        None => manifest.allowed_after,
    };

    std::fs::create_dir_all(&args.out)?;

    let targets = [
        (SuiteMode::Sample, DbTarget::practice(args.practice_db.clone()), None, "sample_tests.enc"),
        (SuiteMode::Eval, DbTarget::grading(args.grading_db.clone()), allowed_after, "eval_tests.enc"),
    ];
    for (mode, target, gate, file) in targets {
        let suite = capture_suite(connector_for(&target).as_ref(), &target, &script, &manifest, mode, gate)
            .await
            .with_context(|| format!("capturing the {} suite on the {}", mode, target))?;
        let sealed = codec.seal_suite(&suite)?;
        let path = args.out.join(file);
        std::fs::write(&path, sealed)
            .with_context(|| format!("failed to write {}", path.display()))?;

        let fp = fingerprint::suite(&suite);
        eprintln!(
            "wrote {} ({} tests, max score {:.2}, fingerprint {})",
            path.display(),
            suite.tests.len(),
            suite.max_score(),
            &fp.hex[..12]
        );
    }
    if let Some(t) = allowed_after {
        eprintln!("eval suite opens at {}", t.to_rfc3339());
    }

    Ok(exit_codes::OK)
}
