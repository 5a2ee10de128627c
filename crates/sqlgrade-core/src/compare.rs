use crate::model::{QueryType, ResultSet, Row, TestCase, Value};
use std::collections::VecDeque;

pub const FLOAT_ABS_TOLERANCE: f64 = 1e-6;
pub const FLOAT_REL_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingMode {
    /// Row i must match row i.
    Positional,
    /// Multiset equality; duplicates count, order does not.
    Set,
}

impl OrderingMode {
    pub fn for_case(tc: &TestCase) -> Self {
        if tc.ordered || tc.query_type == QueryType::Function {
            OrderingMode::Positional
        } else {
            OrderingMode::Set
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    Mismatch(String),
}

impl Comparison {
    pub fn is_equal(&self) -> bool {
        matches!(self, Comparison::Equal)
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Int(x), Value::Int(y)) => x == y,
        (x, y) if x.is_float() || y.is_float() => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => floats_close(x, y),
            _ => false,
        },
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Text(x), Value::Text(y)) => x == y,
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::Blob(x), Value::Blob(y)) => x == y,
        _ => false,
    }
}

fn floats_close(x: f64, y: f64) -> bool {
    if x == y {
        return true;
    }
    if !x.is_finite() || !y.is_finite() {
        return false;
    }
    let diff = (x - y).abs();
    diff <= FLOAT_ABS_TOLERANCE || diff <= FLOAT_REL_TOLERANCE * x.abs().max(y.abs())
}

pub fn rows_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
}

/// Compares a statement's output against the captured expectation.
///
/// Both sides absent (statement produced no rows) counts as equal.
pub fn compare(
    actual: Option<&ResultSet>,
    expected: Option<&ResultSet>,
    mode: OrderingMode,
) -> Comparison {
    let (actual, expected) = match (actual, expected) {
        (None, None) => return Comparison::Equal,
        (Some(_), None) => {
            return Comparison::Mismatch("statement returned rows but none were expected".into())
        }
        (None, Some(_)) => {
            return Comparison::Mismatch("statement returned no result set".into())
        }
        (Some(a), Some(e)) => (a, e),
    };

    if actual.column_count() != expected.column_count() {
        return Comparison::Mismatch(format!(
            "expected {} column(s), got {}",
            expected.column_count(),
            actual.column_count()
        ));
    }
    if actual.rows.len() != expected.rows.len() {
        return Comparison::Mismatch(format!(
            "expected {} row(s), got {}",
            expected.rows.len(),
            actual.rows.len()
        ));
    }

    // Reasons reach the student, so they only ever quote the student's own rows.
    match mode {
        OrderingMode::Positional => {
            for (i, (a, e)) in actual.rows.iter().zip(&expected.rows).enumerate() {
                if !rows_equal(a, e) {
                    return Comparison::Mismatch(format!(
                        "row {} differs from the expected output (got {})",
                        i + 1,
                        render(a)
                    ));
                }
            }
            Comparison::Equal
        }
        OrderingMode::Set => match unmatched_row(&actual.rows, &expected.rows) {
            Some(i) => Comparison::Mismatch(format!(
                "row {} is not in the expected output",
                render(&actual.rows[i])
            )),
            None => Comparison::Equal,
        },
    }
}

/// Index of an actual row left over by a maximum one-to-one matching, if any.
///
/// Tolerant float equality is not transitive, so a first-fit pass can pair a
/// row with the wrong partner. Augmenting paths repair that.
fn unmatched_row(actual: &[Row], expected: &[Row]) -> Option<usize> {
    let mut partner_of_expected: Vec<Option<usize>> = vec![None; expected.len()];
    let mut partner_of_actual: Vec<Option<usize>> = vec![None; actual.len()];

    for start in 0..actual.len() {
        let mut reached_from: Vec<Option<usize>> = vec![None; expected.len()];
        let mut queue = VecDeque::from([start]);
        let mut free = None;

        'search: while let Some(a) = queue.pop_front() {
            for (e, row) in expected.iter().enumerate() {
                if reached_from[e].is_some() || !rows_equal(&actual[a], row) {
                    continue;
                }
                reached_from[e] = Some(a);
                match partner_of_expected[e] {
                    None => {
                        free = Some(e);
                        break 'search;
                    }
                    Some(next) => queue.push_back(next),
                }
            }
        }

        let Some(mut e) = free else {
            return Some(start);
        };
        while let Some(a) = reached_from[e] {
            let previous = partner_of_actual[a];
            partner_of_actual[a] = Some(e);
            partner_of_expected[e] = Some(a);
            match previous {
                Some(p) => e = p,
                None => break,
            }
        }
    }
    None
}

fn render(row: &Row) -> String {
    let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
    format!("({})", cells.join(", "))
}
