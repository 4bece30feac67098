//! Parse command - prints the lowered ESTree of one file

use anyhow::{Context, Result};
use clap::Args;
use hpg_core::ast::{IdGenerator, Node};
use hpg_core::parser::ParsedFile;
use std::fs;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// JavaScript file to parse
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Print compact JSON on one line
    #[arg(long)]
    pub compact: bool,
}

impl ParseArgs {
    pub fn run(&self) -> Result<()> {
        let program = self.parse()?;
        let json = if self.compact {
            serde_json::to_string(&program)
        } else {
            serde_json::to_string_pretty(&program)
        };
        println!("{}", json.context("Failed to serialize AST")?);
        Ok(())
    }

    fn parse(&self) -> Result<Node> {
        let code = fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read {}", self.file.display()))?;
        let ids = IdGenerator::new();
        let parsed = ParsedFile::from_source(&self.file.to_string_lossy(), &code, &ids);

        if parsed.program().is_none() {
            let reason = parsed
                .errors()
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            anyhow::bail!("Failed to parse {}: {}", self.file.display(), reason);
        }
        parsed
            .into_program()
            .with_context(|| format!("Failed to parse {}", self.file.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args(file: PathBuf) -> ParseArgs {
        ParseArgs {
            file,
            compact: true,
        }
    }

    #[test]
    fn parse_assigns_ids_in_preorder() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("app.js");
        fs::write(&file, "var a = 1;\n").unwrap();

        let program = args(file).parse().unwrap();
        let json: serde_json::Value = serde_json::to_value(&program).unwrap();

        assert_eq!(json["type"], "Program");
        assert_eq!(json["_id"], 1);
        assert!(json["body"][0]["_id"].as_u64().unwrap() > 1);
    }

    #[test]
    fn parse_reports_syntax_errors() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("broken.js");
        fs::write(&file, "function (").unwrap();

        let err = args(file).parse().unwrap_err();

        assert!(err.to_string().contains("broken.js"));
    }

    #[test]
    fn parse_reports_missing_files() {
        let dir = tempdir().unwrap();

        assert!(args(dir.path().join("missing.js")).parse().is_err());
    }
}
