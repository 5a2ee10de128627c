use crate::constraints::{tokenize, Token};
use crate::errors::ParseError;
use crate::model::QueryType;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

pub const DEFAULT_TERMINATOR: &str = ";";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    pub text: String,
    #[serde(rename = "type")]
    pub query_type: QueryType,
    /// 1-based line where the statement starts.
    pub line: usize,
}

/// Splits a script into statements.
///
/// `DELIMITER <token>` at the start of a line switches the terminator until the
/// next `DELIMITER ;`, so routine bodies keep their inner `;`. Comments and
/// blank segments are dropped, terminators inside quotes are ignored.
pub fn parse_script(script: &str) -> Result<Vec<Statement>, ParseError> {
    let mut splitter = Splitter::new();
    for (idx, line) in script.lines().enumerate() {
        splitter.feed_line(idx + 1, line);
    }
    splitter.finish()
}

struct Splitter {
    terminator: Vec<char>,
    custom_since: Option<usize>,
    current: String,
    start_line: Option<usize>,
    quote: Option<(char, usize)>,
    block_comment: Option<usize>,
    last_line: usize,
    out: Vec<Statement>,
}

impl Splitter {
    fn new() -> Self {
        Self {
            terminator: DEFAULT_TERMINATOR.chars().collect(),
            custom_since: None,
            current: String::new(),
            start_line: None,
            quote: None,
            block_comment: None,
            last_line: 0,
            out: Vec::new(),
        }
    }

    fn feed_line(&mut self, lineno: usize, line: &str) {
        self.last_line = lineno;

        if self.quote.is_none() && self.block_comment.is_none() {
            if let Some(token) = delimiter_directive(line) {
                // Text left open before a directive is kept as its own statement.
                self.emit(lineno);
                self.custom_since = (token != DEFAULT_TERMINATOR).then_some(lineno);
                tracing::debug!(line = lineno, terminator = %token, "terminator switched");
                self.terminator = token.chars().collect();
                return;
            }
        }

        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];

            if self.block_comment.is_some() {
                if c == '*' && chars.get(i + 1) == Some(&'/') {
                    self.block_comment = None;
                    self.push(' ', lineno);
                    i += 2;
                } else {
                    i += 1;
                }
                continue;
            }

            if let Some((q, _)) = self.quote {
                self.push(c, lineno);
                if c == '\\' && q != '`' {
                    if let Some(&escaped) = chars.get(i + 1) {
                        self.push(escaped, lineno);
                    }
                    i += 2;
                    continue;
                }
                if c == q {
                    if chars.get(i + 1) == Some(&q) {
                        self.push(q, lineno);
                        i += 2;
                        continue;
                    }
                    self.quote = None;
                }
                i += 1;
                continue;
            }

            if chars[i..].starts_with(&self.terminator) {
                self.emit(lineno);
                i += self.terminator.len();
                continue;
            }

            match c {
                '\'' | '"' | '`' => {
                    self.quote = Some((c, lineno));
                    self.push(c, lineno);
                }
                '-' if chars.get(i + 1) == Some(&'-') => break,
                '#' => break,
                '/' if chars.get(i + 1) == Some(&'*') => {
                    self.block_comment = Some(lineno);
                    i += 2;
                    continue;
                }
                _ => self.push(c, lineno),
            }
            i += 1;
        }

        if !self.current.is_empty() {
            self.current.push('\n');
        }
    }

    fn push(&mut self, c: char, lineno: usize) {
        if self.start_line.is_none() && !c.is_whitespace() {
            self.start_line = Some(lineno);
        }
        self.current.push(c);
    }

    fn emit(&mut self, lineno: usize) {
        let text = self.current.trim();
        if !text.is_empty() {
            self.out.push(Statement {
                text: text.to_string(),
                query_type: classify(text),
                line: self.start_line.unwrap_or(lineno),
            });
        }
        self.current.clear();
        self.start_line = None;
    }

    fn finish(mut self) -> Result<Vec<Statement>, ParseError> {
        if let Some((q, line)) = self.quote {
            return Err(ParseError {
                line,
                message: format!("quoted text opened with {} is never closed", q),
            });
        }
        if let Some(line) = self.block_comment {
            return Err(ParseError {
                line,
                message: "/* comment is never closed".into(),
            });
        }
        if !self.current.trim().is_empty() {
            if self.terminator == [';'] {
                let last = self.last_line;
                self.emit(last);
            } else {
                let token: String = self.terminator.iter().collect();
                let start = self.start_line.unwrap_or(self.last_line);
                return Err(ParseError {
                    line: self.custom_since.unwrap_or(start),
                    message: format!(
                        "DELIMITER {} block is never terminated: statement starting at line {} has no closing '{}'",
                        token, start, token
                    ),
                });
            }
        }
        Ok(self.out)
    }
}

/// Returns the new terminator when `line` is a `DELIMITER` directive.
fn delimiter_directive(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let head = trimmed.get(..9)?;
    if !head.eq_ignore_ascii_case("DELIMITER") {
        return None;
    }
    let rest = &trimmed[9..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let token: String = rest.split_whitespace().collect();
    Some(if token.is_empty() {
        DEFAULT_TERMINATOR.to_string()
    } else {
        token
    })
}

fn leading_words(statement: &str, n: usize) -> Vec<String> {
    tokenize(statement)
        .into_iter()
        .filter_map(|t| match t {
            Token::Word(w) => Some(w),
            _ => None,
        })
        .take(n)
        .collect()
}

/// First keyword of the statement, uppercased.
pub fn leading_keyword(statement: &str) -> Option<String> {
    leading_words(statement, 1).pop()
}

/// Infers the query type from the leading keywords.
pub fn classify(statement: &str) -> QueryType {
    let words = leading_words(statement, 16);

    match words.first().map(String::as_str) {
        Some("CREATE") => {
            for w in &words[1..] {
                match w.as_str() {
                    "FUNCTION" => return QueryType::Function,
                    "VIEW" => return QueryType::View,
                    "TABLE" | "PROCEDURE" | "TRIGGER" | "INDEX" | "DATABASE" | "SCHEMA"
                    | "USER" | "EVENT" | "SEQUENCE" | "TYPE" => return QueryType::DdlDml,
                    _ => {}
                }
            }
            QueryType::DdlDml
        }
        Some("ALTER" | "DROP" | "TRUNCATE" | "RENAME") => QueryType::DdlDml,
        Some("INSERT" | "UPDATE" | "DELETE" | "REPLACE") => QueryType::Dml,
        Some("SELECT" | "WITH") => QueryType::Select,
        _ => QueryType::Unknown,
    }
}

const QUALIFIED_NAME: &str = r#"(?:[`"]?[\w$]+[`"]?\.)?[`"]?([\w$]+)"#;

fn cached(cell: &'static OnceLock<Regex>, prefix: &str) -> &'static Regex {
    cell.get_or_init(|| {
        Regex::new(&format!("{}{}", prefix, QUALIFIED_NAME)).expect("static name pattern")
    })
}

/// Name of the routine created by a `CREATE FUNCTION` statement.
pub fn routine_name(statement: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    capture_name(
        cached(
            &RE,
            r"(?i)\bCREATE\s+(?:OR\s+REPLACE\s+)?(?:DEFINER\s*=\s*\S+\s+)?FUNCTION\s+(?:IF\s+NOT\s+EXISTS\s+)?",
        ),
        statement,
    )
}

pub fn view_name(statement: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    capture_name(
        cached(
            &RE,
            r"(?i)\bCREATE\s+(?:OR\s+REPLACE\s+)?(?:\w+\s*=\s*\S+\s+)*VIEW\s+(?:IF\s+NOT\s+EXISTS\s+)?",
        ),
        statement,
    )
}

/// Table touched by a `CREATE/ALTER/DROP TABLE` statement.
pub fn table_name(statement: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    capture_name(
        cached(
            &RE,
            r"(?i)\b(?:CREATE|ALTER|DROP)\s+(?:TEMPORARY\s+)?TABLE\s+(?:IF\s+(?:NOT\s+)?EXISTS\s+)?",
        ),
        statement,
    )
}

/// Table written by an `INSERT/REPLACE/UPDATE/DELETE` statement.
pub fn dml_target(statement: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    capture_name(
        cached(
            &RE,
            r"(?i)\b(?:INSERT\s+(?:IGNORE\s+)?INTO|REPLACE\s+INTO|UPDATE|DELETE\s+FROM)\s+",
        ),
        statement,
    )
}

fn capture_name(re: &Regex, statement: &str) -> Option<String> {
    re.captures(statement)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_statements_count() {
        let script = "SELECT 1;\nSELECT 2; SELECT 3;\n\nUPDATE t SET a = 1;\n";
        let stmts = parse_script(script).unwrap();
        assert_eq!(stmts.len(), 4);
        assert_eq!(stmts[1].text, "SELECT 2");
        assert_eq!(stmts[1].line, 2);
        assert_eq!(stmts[2].line, 2);
        assert_eq!(stmts[3].query_type, QueryType::Dml);
    }

    #[test]
    fn test_delimiter_block_is_one_statement() {
        let script = r#"
DELIMITER //
CREATE FUNCTION add_one(x INT) RETURNS INT
DETERMINISTIC
BEGIN
  DECLARE y INT;
  SET y = x + 1;
  RETURN y;
END //
DELIMITER ;
SELECT add_one(1);
"#;
        let stmts = parse_script(script).unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].query_type, QueryType::Function);
        assert!(stmts[0].text.contains("SET y = x + 1;"));
        assert!(stmts[0].text.ends_with("END"));
        assert_eq!(stmts[0].line, 3);
        assert_eq!(stmts[1].query_type, QueryType::Select);
    }

    #[test]
    fn test_spaced_delimiter_token_is_collapsed() {
        let script = "delimiter / /\nCREATE VIEW v AS SELECT 1; //\nDELIMITER\nSELECT 2;";
        let stmts = parse_script(script).unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].text, "CREATE VIEW v AS SELECT 1;");
        assert_eq!(stmts[0].query_type, QueryType::View);
    }

    #[test]
    fn test_comments_and_quotes() {
        let script = "-- heading\n# another\nSELECT 'a;b' AS x -- trailing ; comment\n FROM t;\n/* block ; \n still */ SELECT \"q\"\"; \" FROM u;";
        let stmts = parse_script(script).unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].text.starts_with("SELECT 'a;b' AS x"));
        assert!(stmts[0].text.ends_with("FROM t"));
        assert_eq!(stmts[0].line, 3);
        assert_eq!(stmts[1].text, "SELECT \"q\"\"; \" FROM u");
        assert_eq!(stmts[1].line, 6);
    }

    #[test]
    fn test_blank_segments_dropped_and_missing_final_terminator() {
        let stmts = parse_script(";;\n  ;\nSELECT 1;;SELECT 2").unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1].text, "SELECT 2");
    }

    #[test]
    fn test_crlf_input() {
        let stmts = parse_script("SELECT 1;\r\nSELECT 2;\r\n").unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1].text, "SELECT 2");
    }

    #[test]
    fn test_unterminated_delimiter_block() {
        let script = "SELECT 1;\nDELIMITER $$\nCREATE FUNCTION f() RETURNS INT\nBEGIN\n RETURN 1;\nEND\n";
        let err = parse_script(script).unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("$$"));
    }

    #[test]
    fn test_unterminated_quote() {
        let err = parse_script("SELECT 1;\nSELECT 'oops;\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("with x as (select 1) select * from x"), QueryType::Select);
        assert_eq!(classify("CREATE OR REPLACE VIEW v AS SELECT 1"), QueryType::View);
        assert_eq!(
            classify("CREATE DEFINER=`root`@`%` FUNCTION f() RETURNS INT RETURN 1"),
            QueryType::Function
        );
        assert_eq!(classify("CREATE TABLE t AS SELECT * FROM u"), QueryType::DdlDml);
        assert_eq!(classify("CREATE TRIGGER trg BEFORE INSERT ON t"), QueryType::DdlDml);
        assert_eq!(classify("delete from t"), QueryType::Dml);
        assert_eq!(classify("SHOW TABLES"), QueryType::Unknown);
        assert_eq!(leading_keyword("  alter table t add c int").as_deref(), Some("ALTER"));
        assert_eq!(leading_keyword(""), None);
    }

    #[test]
    fn test_name_extraction() {
        assert_eq!(
            routine_name("CREATE FUNCTION `lab`.`net_pay`(x INT) RETURNS INT").as_deref(),
            Some("net_pay")
        );
        assert_eq!(
            view_name("create or replace view dept_summary as select 1").as_deref(),
            Some("dept_summary")
        );
        assert_eq!(
            table_name("CREATE TABLE IF NOT EXISTS staff (id INT)").as_deref(),
            Some("staff")
        );
        assert_eq!(
            dml_target("UPDATE emp SET salary = 1").as_deref(),
            Some("emp")
        );
        assert_eq!(
            dml_target("insert into hr.emp values (1)").as_deref(),
            Some("emp")
        );
        assert_eq!(routine_name("SELECT 1"), None);
    }
}
