//! Build command - turns JavaScript files into hybrid program graphs

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use hpg_core::config::{
    Config, load_config_or_default_with_warnings, load_config_with_warnings,
};
use hpg_core::model::{Hpg, analyze_source, analyze_sources};
use hpg_core::parser::SOURCE_EXTENSIONS;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Summary,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Path to a file or directory of JavaScript sources
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Write the output to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Treat every file as a page of one domain sharing storage
    #[arg(long)]
    pub single_domain: bool,

    /// Use this config file instead of searching for hpg.toml
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// One analyzed domain in the JSON output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DomainGraph {
    domain: String,
    files: Vec<String>,
    #[serde(flatten)]
    hpg: Hpg,
}

impl BuildArgs {
    pub fn run(&self) -> Result<()> {
        self.configure_colors();

        let config = self.load_config()?;
        let files = discover_files(&self.path)?;
        if files.is_empty() {
            eprintln!("No JavaScript files found in {}.", self.path.display());
            return Ok(());
        }
        tracing::info!(files = files.len(), single_domain = self.single_domain, "building graphs");

        let sources = read_sources(&files);
        let domains = if self.single_domain {
            self.build_single_domain(&sources, &config)?
        } else {
            build_per_file(&sources, &config)?
        };

        let skipped = sources.len() - domains.iter().map(|d| d.files.len()).sum::<usize>();
        if skipped > 0 {
            eprintln!(
                "{} skipped {} file(s) that could not be parsed",
                "warning:".yellow().bold(),
                skipped
            );
        }

        let rendered = match self.format {
            OutputFormat::Json => render_json(&domains, config.output.pretty)?,
            OutputFormat::Summary => render_summary(&domains),
        };
        self.write_output(&rendered)
    }

    fn configure_colors(&self) {
        let no_color_env = std::env::var("NO_COLOR").is_ok();
        if self.no_color || no_color_env || self.output.is_some() {
            colored::control::set_override(false);
        }
    }

    fn load_config(&self) -> Result<Config> {
        let result = match &self.config {
            Some(path) => load_config_with_warnings(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => load_config_or_default_with_warnings(config_search_dir(&self.path)),
        };
        for warning in &result.warnings {
            eprintln!("{} {}", "warning:".yellow().bold(), warning);
        }
        Ok(result.config)
    }

    fn build_single_domain(
        &self,
        sources: &[(PathBuf, String)],
        config: &Config,
    ) -> Result<Vec<DomainGraph>> {
        let names: Vec<String> = sources.iter().map(|(path, _)| display_name(path)).collect();
        let units: Vec<(&str, &str)> = names
            .iter()
            .zip(sources)
            .filter(|(name, (_, code))| {
                let parses = parses(name, code);
                if !parses {
                    report_parse_failure(name);
                }
                parses
            })
            .map(|(name, (_, code))| (name.as_str(), code.as_str()))
            .collect();

        let hpg = analyze_sources(&units, config)
            .with_context(|| format!("Failed to build graph for {}", self.path.display()))?;

        Ok(hpg
            .map(|hpg| DomainGraph {
                domain: display_name(&self.path),
                files: units.iter().map(|(name, _)| name.to_string()).collect(),
                hpg,
            })
            .into_iter()
            .collect())
    }

    fn write_output(&self, rendered: &str) -> Result<()> {
        match &self.output {
            Some(path) => {
                fs::write(path, rendered)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                eprintln!("{} {}", "Wrote".green().bold(), path.display());
            }
            None => println!("{}", rendered),
        }
        Ok(())
    }
}

fn build_per_file(sources: &[(PathBuf, String)], config: &Config) -> Result<Vec<DomainGraph>> {
    let results: Vec<Result<Option<DomainGraph>>> = sources
        .par_iter()
        .map(|(path, code)| {
            let name = display_name(path);
            let hpg = analyze_source(&name, code, config)
                .with_context(|| format!("Failed to build graph for {}", name))?;
            if hpg.is_none() {
                report_parse_failure(&name);
            }
            Ok(hpg.map(|hpg| DomainGraph {
                domain: name.clone(),
                files: vec![name],
                hpg,
            }))
        })
        .collect();

    let mut domains = Vec::with_capacity(results.len());
    for result in results {
        if let Some(domain) = result? {
            domains.push(domain);
        }
    }
    Ok(domains)
}

/// Reads every file, dropping the ones that cannot be read.
fn read_sources(files: &[PathBuf]) -> Vec<(PathBuf, String)> {
    files
        .iter()
        .filter_map(|file| match fs::read_to_string(file) {
            Ok(content) => Some((file.clone(), content)),
            Err(err) => {
                tracing::warn!(file = %file.display(), error = %err, "skipping unreadable file");
                None
            }
        })
        .collect()
}

fn parses(name: &str, code: &str) -> bool {
    let ids = hpg_core::ast::IdGenerator::new();
    hpg_core::parser::ParsedFile::from_source(name, code, &ids)
        .program()
        .is_some()
}

fn report_parse_failure(name: &str) {
    eprintln!("{} failed to parse {}", "error:".red().bold(), name);
}

fn render_json(domains: &[DomainGraph], pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(domains)
    } else {
        serde_json::to_string(domains)
    };
    json.context("Failed to serialize graph")
}

fn render_summary(domains: &[DomainGraph]) -> String {
    let mut out = String::new();
    for domain in domains {
        let summary = domain.hpg.summary();
        out.push_str(&format!(
            "{} ({} file(s)): {} nodes\n",
            domain.domain.bold(),
            domain.files.len(),
            summary.nodes
        ));
        for (label, count) in &summary.edges {
            out.push_str(&format!("  {:<14} {}\n", label.cyan(), count));
        }
        if domain.hpg.pdg_timeout {
            out.push_str(&format!(
                "  {} data dependencies are incomplete\n",
                "timeout:".yellow().bold()
            ));
        }
    }
    out.push_str(&format!("{} domain(s) built", domains.len()));
    out
}

fn display_name(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn config_search_dir(path: &Path) -> &Path {
    if path.is_file() {
        path.parent().unwrap_or(Path::new("."))
    } else {
        path
    }
}

fn discover_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        anyhow::bail!("Path does not exist: {}", path.display());
    }

    if path.is_file() {
        if is_supported_file(path) {
            return Ok(vec![path.to_path_buf()]);
        } else {
            return Ok(vec![]);
        }
    }

    let files: Vec<PathBuf> = WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_supported_file(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect();

    Ok(files)
}

fn is_supported_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.') || name == "node_modules")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn args(path: &Path, output: &Path) -> BuildArgs {
        BuildArgs {
            path: path.to_path_buf(),
            output: Some(output.to_path_buf()),
            format: OutputFormat::Json,
            single_domain: false,
            config: None,
            no_color: true,
        }
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn discover_files_finds_single_js_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("app.js");
        File::create(&file_path).unwrap();

        let files = discover_files(&file_path).unwrap();

        assert_eq!(files, vec![file_path]);
    }

    #[test]
    fn discover_files_walks_directories_in_name_order() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("b.mjs")).unwrap();
        File::create(dir.path().join("a.js")).unwrap();
        File::create(dir.path().join("c.jsx")).unwrap();

        let files = discover_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_str().unwrap())
            .collect();

        assert_eq!(names, vec!["a.js", "b.mjs", "c.jsx"]);
    }

    #[test]
    fn discover_files_ignores_unsupported_extensions() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("app.js")).unwrap();
        File::create(dir.path().join("index.html")).unwrap();
        File::create(dir.path().join("data.json")).unwrap();

        let files = discover_files(dir.path()).unwrap();

        assert_eq!(files.len(), 1);
    }

    #[test]
    fn discover_files_skips_hidden_and_node_modules() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".cache")).unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        File::create(dir.path().join(".cache/bundle.js")).unwrap();
        File::create(dir.path().join("node_modules/lib.js")).unwrap();
        File::create(dir.path().join("app.js")).unwrap();

        let files = discover_files(dir.path()).unwrap();

        assert_eq!(files, vec![dir.path().join("app.js")]);
    }

    #[test]
    fn discover_files_errors_on_missing_path() {
        let dir = tempdir().unwrap();

        assert!(discover_files(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn build_writes_one_graph_per_file() {
        let dir = tempdir().unwrap();
        let site = dir.path().join("site");
        fs::create_dir(&site).unwrap();
        fs::write(site.join("a.js"), "var a = 1;\nsink(a);\n").unwrap();
        fs::write(site.join("b.js"), "function f(x) { return x; }\nf(2);\n").unwrap();
        let output = dir.path().join("graph.json");

        args(&site, &output).run().unwrap();

        let json = read_json(&output);
        let domains = json.as_array().unwrap();
        assert_eq!(domains.len(), 2);
        assert!(domains[0]["domain"].as_str().unwrap().ends_with("a.js"));
        assert!(!domains[0]["graph"]["nodes"].as_array().unwrap().is_empty());
        assert_eq!(domains[0]["pdgTimeout"], false);
    }

    #[test]
    fn build_skips_files_that_fail_to_parse() {
        let dir = tempdir().unwrap();
        let site = dir.path().join("site");
        fs::create_dir(&site).unwrap();
        fs::write(site.join("good.js"), "var a = 1;\n").unwrap();
        fs::write(site.join("broken.js"), "function (").unwrap();
        let output = dir.path().join("graph.json");

        args(&site, &output).run().unwrap();

        let json = read_json(&output);
        let domains = json.as_array().unwrap();
        assert_eq!(domains.len(), 1);
        assert!(domains[0]["domain"].as_str().unwrap().ends_with("good.js"));
    }

    #[test]
    fn single_domain_builds_one_graph() {
        let dir = tempdir().unwrap();
        let site = dir.path().join("site");
        fs::create_dir(&site).unwrap();
        fs::write(site.join("a.js"), "localStorage.setItem(\"k\", 1);\n").unwrap();
        fs::write(site.join("b.js"), "var v = localStorage.getItem(\"k\");\n").unwrap();
        fs::write(site.join("c.js"), "function (").unwrap();
        let output = dir.path().join("graph.json");

        let mut build = args(&site, &output);
        build.single_domain = true;
        build.run().unwrap();

        let json = read_json(&output);
        let domains = json.as_array().unwrap();
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0]["files"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn explicit_config_controls_output() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("app.js");
        fs::write(&source, "var a = 1;\n").unwrap();
        let config = dir.path().join("custom.toml");
        fs::write(&config, "[output]\nast_edges = false\n").unwrap();
        let output = dir.path().join("graph.json");

        let mut build = args(&source, &output);
        build.config = Some(config);
        build.run().unwrap();

        let json = read_json(&output);
        let edges = json[0]["graph"]["edges"].as_array().unwrap();
        assert!(edges.iter().all(|e| e["relationLabel"] != "AST_parentOf"));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("app.js");
        fs::write(&source, "var a = 1;\n").unwrap();

        let mut build = args(&source, &dir.path().join("graph.json"));
        build.config = Some(dir.path().join("missing.toml"));

        assert!(build.run().is_err());
    }

    #[test]
    fn summary_lists_edge_labels() {
        colored::control::set_override(false);
        let dir = tempdir().unwrap();
        let source = dir.path().join("app.js");
        fs::write(&source, "function f(x) { return x; }\nf(1);\n").unwrap();
        let config = Config::default();
        let domains = build_per_file(&[(source.clone(), fs::read_to_string(&source).unwrap())], &config)
            .unwrap();

        let summary = render_summary(&domains);

        assert!(summary.contains("CFG_parentOf"));
        assert!(summary.contains("CG_parentOf"));
        assert!(summary.ends_with("1 domain(s) built"));
    }
}
