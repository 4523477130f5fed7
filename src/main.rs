use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use validator::Validate;

use schemalift::analysis::{AnalysisContext, AnalysisOptions, SchemaAnalyzer};
use schemalift::config;
use schemalift::documents::DocumentationSource;
use schemalift::documents::sql_text::split_statements;
use schemalift::llm::{HttpSuggestionChannel, SuggestionChannel};
use schemalift::schema_model::Database;

/// SchemaLift - enrich a relational schema into an enhanced model spec
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the schema JSON file (a Database document)
    schema: PathBuf,

    /// Documentation file to mine for relationships (.md, .sql, .txt); repeatable
    #[arg(long = "doc", value_name = "FILE")]
    docs: Vec<PathBuf>,

    /// SQL query file for constraint and derived-property analysis; repeatable
    #[arg(long = "sql", value_name = "FILE")]
    sql: Vec<PathBuf>,

    /// Minimum confidence for suggestions (0.0 - 1.0)
    #[arg(long)]
    threshold: Option<f64>,

    /// Enable hierarchy detection
    #[arg(long)]
    hierarchies: bool,

    /// Enable constraint analysis
    #[arg(long)]
    constraints: bool,

    /// Enable derived property analysis
    #[arg(long)]
    derived: bool,

    /// Disable enumeration detection
    #[arg(long)]
    no_enums: bool,

    /// Skip document relationship analysis
    #[arg(long)]
    no_docs: bool,

    /// Disable LLM-backed analysis
    #[arg(long)]
    no_llm: bool,

    /// Run the analysis categories on parallel tasks
    #[arg(long)]
    concurrent: bool,

    /// Write the resulting spec as JSON to this path
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

impl Cli {
    fn apply_to(&self, options: &mut AnalysisOptions) {
        if self.hierarchies {
            options.detect_hierarchies = true;
        }
        if self.constraints {
            options.detect_constraints = true;
        }
        if self.derived {
            options.detect_derived = true;
        }
        if self.no_enums {
            options.detect_enums = false;
        }
        if self.no_docs {
            options.analyze_document_relationships = false;
        }
        if self.no_llm {
            options.use_llm = false;
        }
        if let Some(threshold) = self.threshold {
            options.confidence_threshold = threshold;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut options = match config::options_from_env() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    cli.apply_to(&mut options);
    if let Err(e) = options.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let database = load_database(&cli.schema)?;
    info!(
        "Loaded schema '{}' with {} tables",
        database.name,
        database.table_count()
    );

    let mut context = AnalysisContext::new(database);

    let mut documentation = String::new();
    for path in &cli.docs {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read documentation file {}", path.display()))?;
        if !is_sql_file(path) {
            documentation.push_str(&content);
            documentation.push('\n');
        }
        context
            .doc_sources
            .push(DocumentationSource::from_text(path.display().to_string(), content));
    }
    if !documentation.is_empty() {
        context.documentation = Some(documentation);
    }

    for path in &cli.sql {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read SQL file {}", path.display()))?;
        context
            .sql_queries
            .extend(split_statements(&content).into_iter().map(|s| s.text));
        context
            .doc_sources
            .push(DocumentationSource::from_text(path.display().to_string(), content));
    }

    let channel: Option<Arc<dyn SuggestionChannel>> = if options.use_llm {
        match HttpSuggestionChannel::from_env() {
            Some(channel) => Some(Arc::new(channel)),
            None => {
                warn!("No LLM API key configured; continuing with pattern analysis only");
                None
            }
        }
    } else {
        None
    };

    let analyzer = SchemaAnalyzer::new(channel, options);
    let spec = if cli.concurrent {
        analyzer.analyze_concurrent(&mut context).await
    } else {
        analyzer.analyze(&mut context).await
    };

    println!("{}", spec.summary());

    if let Some(path) = &cli.output {
        let json = serde_json::to_string_pretty(&spec)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write spec to {}", path.display()))?;
        info!("Wrote enhanced model spec to {}", path.display());
    }

    Ok(())
}

fn load_database(path: &Path) -> Result<Database> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse schema JSON in {}", path.display()))
}

fn is_sql_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("sql"))
        .unwrap_or(false)
}
