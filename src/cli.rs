use crate::config::load_config;
use crate::model::{CompanyProfile, FieldValue, LineItem, RenderRequest};
use crate::render::{RenderedDocument, Renderer, write_output_html};
use crate::store::{MemoryStore, OrganizationRecord};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docmerge", version, about = "Render invoice, quote and letter templates to HTML")]
pub struct Args {
    /// Template file (.html) or '-' for stdin. Repeat to render several documents.
    #[arg(short = 't', long = "template", required = true)]
    pub templates: Vec<PathBuf>,

    /// Document data (JSON or JSON5): fields, line items, organization data
    #[arg(short = 'd', long = "data")]
    pub data: Option<PathBuf>,

    /// Output file, or a directory when rendering several templates. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Engine config JSON file (aliases, empty-state row, number and date formats)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Date used for system date fields (YYYY-MM-DD). Defaults to today.
    #[arg(long = "today")]
    pub today: Option<NaiveDate>,

    /// Exit with an error when a document renders in degraded form
    #[arg(long = "strict")]
    pub strict: bool,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Shape of the `--data` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DocumentData {
    #[serde(alias = "organizationId")]
    pub organization_id: Option<String>,
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(alias = "lineItems")]
    pub line_items: Vec<LineItem>,
    #[serde(alias = "companyProfile")]
    pub company_profile: Option<CompanyProfile>,
    pub organizations: HashMap<String, OrganizationRecord>,
}

impl DocumentData {
    pub fn parse(contents: &str) -> Result<Self> {
        match serde_json::from_str(contents) {
            Ok(parsed) => Ok(parsed),
            Err(_) => Ok(json5::from_str(contents)?),
        }
    }

    fn into_parts(self, today: NaiveDate) -> (RenderRequest, MemoryStore) {
        let mut request = RenderRequest::new(today);
        request.organization_id = self.organization_id;
        request.document_fields = self.fields;
        request.line_items = self.line_items;
        request.company_profile = self.company_profile;
        (request, MemoryStore::from_records(self.organizations))
    }
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = load_config(args.config.as_deref())?;
    let data = match args.data.as_deref() {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading data file {}", path.display()))?;
            DocumentData::parse(&contents)?
        }
        None => DocumentData::default(),
    };
    let today = args
        .today
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let (request, store) = data.into_parts(today);

    check_templates(&args.templates)?;
    let mut templates = Vec::with_capacity(args.templates.len());
    for path in &args.templates {
        templates.push(read_template(path)?);
    }
    let outputs = resolve_outputs(args.output.as_deref(), &args.templates)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let documents = runtime.block_on(render_all(
        Renderer::with_config(store, config),
        request,
        templates,
    ))?;

    let mut degraded = 0;
    for ((document, output), template) in documents.iter().zip(&outputs).zip(&args.templates) {
        for reason in document.status.degradations() {
            tracing::warn!(template = %template.display(), "{reason}");
        }
        if document.is_degraded() {
            degraded += 1;
        }
        write_output_html(&document.html, output.as_deref())?;
    }

    if args.strict && degraded > 0 {
        return Err(anyhow::anyhow!(
            "{degraded} document(s) rendered in degraded form"
        ));
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("docmerge={level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Renders every template concurrently against the same request.
async fn render_all(
    renderer: Renderer<MemoryStore>,
    request: RenderRequest,
    templates: Vec<String>,
) -> Result<Vec<RenderedDocument>> {
    let renderer = Arc::new(renderer);
    let request = Arc::new(request);
    let mut set = JoinSet::new();
    for (idx, template) in templates.into_iter().enumerate() {
        let renderer = Arc::clone(&renderer);
        let request = Arc::clone(&request);
        set.spawn(async move { (idx, renderer.render(&template, &request).await) });
    }

    let mut documents: Vec<Option<RenderedDocument>> = vec![None; set.len()];
    while let Some(joined) = set.join_next().await {
        let (idx, document) = joined?;
        documents[idx] = Some(document);
    }
    Ok(documents.into_iter().flatten().collect())
}

fn read_template(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading template {}", path.display()))
}

fn check_templates(templates: &[PathBuf]) -> Result<()> {
    let stdin_count = templates
        .iter()
        .filter(|path| path.as_path() == Path::new("-"))
        .count();
    if stdin_count > 1 {
        return Err(anyhow::anyhow!("stdin ('-') can be given as template only once"));
    }
    Ok(())
}

/// `None` means stdout.
fn resolve_outputs(output: Option<&Path>, templates: &[PathBuf]) -> Result<Vec<Option<PathBuf>>> {
    if templates.len() == 1 {
        return Ok(vec![output.map(Path::to_path_buf)]);
    }

    let base = output.ok_or_else(|| anyhow::anyhow!("Output path required for several templates"))?;
    if base.is_dir() {
        let stems: Vec<String> = templates
            .iter()
            .enumerate()
            .map(|(idx, template)| {
                template
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .filter(|s| *s != "-")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("document-{}", idx + 1))
            })
            .collect();
        return Ok(stems
            .iter()
            .enumerate()
            .map(|(idx, stem)| {
                let shared = stems.iter().filter(|other| *other == stem).count() > 1;
                let name = if shared {
                    format!("{stem}-{}.html", idx + 1)
                } else {
                    format!("{stem}.html")
                };
                Some(base.join(name))
            })
            .collect());
    }
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    Ok((0..templates.len())
        .map(|idx| Some(parent.join(format!("{}-{}.html", stem, idx + 1))))
        .collect())
}
