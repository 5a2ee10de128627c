//! Structural feature detection over SQL text.
//!
//! This is a lexical heuristic, not a grammar: the tokenizer skips string
//! literals, quoted identifiers and comments, then features are read off the
//! keyword stream. Known limits: a derived table in `FROM (SELECT ...)` counts
//! as a nested select; `ORDER BY` inside a window specification counts as
//! ordering; implicit comma joins are not joins.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bare word, uppercased.
    Word(String),
    /// Quoted identifier or string literal; never a keyword.
    Quoted,
    Number,
    LParen,
    RParen,
    Symbol(char),
}

pub fn tokenize(sql: &str) -> Vec<Token> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if (c == '-' && chars.get(i + 1) == Some(&'-')) || c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i += 2;
        } else if c == '\'' || c == '"' || c == '`' {
            i += 1;
            while i < chars.len() {
                if chars[i] == '\\' && c != '`' {
                    i += 2;
                    continue;
                }
                if chars[i] == c {
                    if chars.get(i + 1) == Some(&c) {
                        i += 2;
                        continue;
                    }
                    break;
                }
                i += 1;
            }
            i += 1;
            out.push(Token::Quoted);
        } else if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            out.push(Token::Number);
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            out.push(Token::Word(word.to_ascii_uppercase()));
        } else if c == '(' {
            out.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            out.push(Token::RParen);
            i += 1;
        } else {
            out.push(Token::Symbol(c));
            i += 1;
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Join,
    NestedSelect,
    GroupBy,
    OrderBy,
    Having,
    Aggregate,
    Distinct,
    Union,
}

impl Feature {
    pub const ALL: [Feature; 8] = [
        Feature::Join,
        Feature::NestedSelect,
        Feature::GroupBy,
        Feature::OrderBy,
        Feature::Having,
        Feature::Aggregate,
        Feature::Distinct,
        Feature::Union,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::Join => "join",
            Feature::NestedSelect => "nested_select",
            Feature::GroupBy => "group_by",
            Feature::OrderBy => "order_by",
            Feature::Having => "having",
            Feature::Aggregate => "aggregate",
            Feature::Distinct => "distinct",
            Feature::Union => "union",
        }
    }

    fn parse(s: &str) -> Option<Feature> {
        match s {
            "subquery" => return Some(Feature::NestedSelect),
            "aggregation" => return Some(Feature::Aggregate),
            _ => {}
        }
        Feature::ALL.into_iter().find(|f| f.name() == s)
    }
}

const AGGREGATES: [&str; 6] = ["COUNT", "SUM", "AVG", "MIN", "MAX", "GROUP_CONCAT"];

/// Features detected in one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    features: BTreeSet<Feature>,
    /// `ORDER BY` outside any parentheses, i.e. it orders the statement output.
    pub ordered_output: bool,
}

impl FeatureSet {
    pub fn has(&self, f: Feature) -> bool {
        self.features.contains(&f)
    }

    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        self.features.iter().copied()
    }
}

pub fn analyze(sql: &str) -> FeatureSet {
    let tokens = tokenize(sql);
    let mut set = FeatureSet::default();
    let mut depth: usize = 0;

    for (i, tok) in tokens.iter().enumerate() {
        let next = tokens.get(i + 1);
        match tok {
            Token::LParen => {
                depth += 1;
                if matches!(next, Some(Token::Word(w)) if w == "SELECT" || w == "WITH") {
                    set.features.insert(Feature::NestedSelect);
                }
            }
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Word(w) => match w.as_str() {
                "JOIN" => {
                    set.features.insert(Feature::Join);
                }
                "GROUP" if is_word(next, "BY") => {
                    set.features.insert(Feature::GroupBy);
                }
                "ORDER" if is_word(next, "BY") => {
                    set.features.insert(Feature::OrderBy);
                    if depth == 0 {
                        set.ordered_output = true;
                    }
                }
                "HAVING" => {
                    set.features.insert(Feature::Having);
                }
                "DISTINCT" => {
                    set.features.insert(Feature::Distinct);
                }
                "UNION" => {
                    set.features.insert(Feature::Union);
                }
                w if AGGREGATES.contains(&w) && next == Some(&Token::LParen) => {
                    set.features.insert(Feature::Aggregate);
                }
                _ => {}
            },
            _ => {}
        }
    }
    set
}

fn is_word(tok: Option<&Token>, word: &str) -> bool {
    matches!(tok, Some(Token::Word(w)) if w == word)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Requirement {
    Require,
    Forbid,
}

/// A `require_X` / `forbid_X` rule on a statement's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Constraint {
    pub requirement: Requirement,
    pub feature: Feature,
}

impl Constraint {
    pub fn require(feature: Feature) -> Self {
        Self {
            requirement: Requirement::Require,
            feature,
        }
    }

    pub fn forbid(feature: Feature) -> Self {
        Self {
            requirement: Requirement::Forbid,
            feature,
        }
    }

    pub fn is_satisfied_by(&self, features: &FeatureSet) -> bool {
        let present = features.has(self.feature);
        match self.requirement {
            Requirement::Require => present,
            Requirement::Forbid => !present,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.requirement {
            Requirement::Require => "require",
            Requirement::Forbid => "forbid",
        };
        write!(f, "{}_{}", prefix, self.feature.name())
    }
}

impl FromStr for Constraint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (requirement, rest) = if let Some(rest) = s.strip_prefix("require_") {
            (Requirement::Require, rest)
        } else if let Some(rest) = s.strip_prefix("forbid_") {
            (Requirement::Forbid, rest)
        } else {
            return Err(format!(
                "unknown constraint '{}': expected require_<feature> or forbid_<feature>",
                s
            ));
        };
        let feature = Feature::parse(rest).ok_or_else(|| {
            let known: Vec<_> = Feature::ALL.iter().map(|f| f.name()).collect();
            format!(
                "unknown constraint feature '{}' (known: {})",
                rest,
                known.join(", ")
            )
        })?;
        Ok(Constraint {
            requirement,
            feature,
        })
    }
}

impl TryFrom<String> for Constraint {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Constraint> for String {
    fn from(c: Constraint) -> String {
        c.to_string()
    }
}

/// Constraints from `declared` that `features` does not satisfy, in declaration order.
pub fn violations<'a>(
    declared: impl IntoIterator<Item = &'a Constraint>,
    features: &FeatureSet,
) -> Vec<Constraint> {
    declared
        .into_iter()
        .filter(|c| !c.is_satisfied_by(features))
        .copied()
        .collect()
}
