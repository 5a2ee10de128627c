use crate::model::TestSuite;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub hex: String,
    pub components: Vec<String>,
}

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Deterministic identity of a plaintext suite.
///
/// Each test contributes its id, weight, canonical constraint list and a digest
/// of its captured expectation, so two suites share a fingerprint only when
/// they would grade identically.
pub fn suite(suite: &TestSuite) -> Fingerprint {
    let mut parts = Vec::new();

    parts.push(format!("lab={}", suite.lab));
    parts.push(format!("mode={}", suite.mode));
    parts.push(format!(
        "allowed_after={}",
        suite
            .allowed_after
            .map(|t| t.to_rfc3339())
            .unwrap_or_default()
    ));

    for tc in &suite.tests {
        let constraints = tc
            .constraints
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");
        // serde_json output is stable for these structs (no maps).
        let expected = serde_json::to_string(&tc.expected_result).unwrap_or_default();
        parts.push(format!(
            "test={}|type={}|score={}|ordered={}|constraints={}|expected={}",
            tc.id,
            tc.query_type.as_str(),
            tc.score_weight,
            tc.ordered,
            constraints,
            sha256_hex(&expected)
        ));
    }

    parts.push(format!("sqlgrade_version={}", env!("CARGO_PKG_VERSION")));

    let raw = parts.join("\n");
    Fingerprint {
        hex: sha256_hex(&raw),
        components: parts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QueryType, SuiteMode, TestCase};

    fn one(weight: f64) -> TestSuite {
        TestSuite {
            lab: "lab".into(),
            mode: SuiteMode::Sample,
            tests: vec![TestCase {
                id: "q1".into(),
                statement_text: "SELECT 1".into(),
                query_type: QueryType::Select,
                constraints: Default::default(),
                expected_result: None,
                score_weight: weight,
                function_arguments: None,
                check_query: None,
                ordered: false,
            }],
            allowed_after: None,
        }
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let a = suite(&one(1.0));
        assert_eq!(a.hex, suite(&one(1.0)).hex);
        assert_ne!(a.hex, suite(&one(2.0)).hex);
        assert_eq!(a.hex.len(), 64);
        assert!(a.components.iter().any(|c| c.starts_with("test=q1|")));
    }
}
