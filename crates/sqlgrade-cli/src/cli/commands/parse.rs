use super::exit_codes;
use crate::cli::args::ParseArgs;
use anyhow::Context;
use serde_json::json;
use sqlgrade_core::config::manifest::question_id;
use sqlgrade_core::constraints::analyze;
use sqlgrade_core::parser::parse_script;

pub fn run(args: ParseArgs) -> anyhow::Result<i32> {
    let script = std::fs::read_to_string(&args.script)
        .with_context(|| format!("cannot read script {}", args.script.display()))?;
    let statements = parse_script(&script)?;

    let out: Vec<_> = statements
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let features = analyze(&s.text);
            json!({
                "id": question_id(i),
                "line": s.line,
                "type": s.query_type,
                "features": features.iter().map(|f| f.name()).collect::<Vec<_>>(),
                "query": s.text,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(exit_codes::OK)
}
