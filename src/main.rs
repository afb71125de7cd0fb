use anyhow::{bail, Context};
use std::io::Read;
use std::path::{Path, PathBuf};
use veritas_lib::models::{AnalysisReport, AnalysisRequest, ContentKind, FactorImpact, HistoryQuery};
use veritas_lib::services::{
    get_api_key, load_document, normalize_text, parse_provider, AnalysisSettings, Analyzer, ApiFlavor,
    AppConfig, ConfigStore, InferenceClient, JsonFileStore, ProviderClient, SearchClient,
};

const USAGE: &str = "Usage:
  veritas <path|-> [--json] [--related] [--user <id>] [--provider <name[:model]>] [--no-llm]
  veritas --history [<n>] [--user <id>] [--json]

Notes:
  - `-` reads the text from stdin; .docx and .pdf files are converted to text first.
  - API keys come from GEMINI_API_KEY / OPENAI_API_KEY, HF_API_TOKEN, SEARCH_API_KEY and
    SEARCH_ENGINE_ID, or from the config file.";

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

const VALUE_FLAGS: &[&str] = &["--user", "--provider", "--history"];

/// First argument that is neither a flag nor a flag's value. `-` counts as positional.
fn positional_arg(args: &[String]) -> Option<&str> {
    let mut skip_next = false;
    for a in args.iter().skip(1) {
        if skip_next {
            skip_next = false;
            continue;
        }
        if VALUE_FLAGS.contains(&a.as_str()) {
            skip_next = true;
            continue;
        }
        if a == "-" || !a.starts_with("--") {
            return Some(a);
        }
    }
    None
}

fn load_config() -> AppConfig {
    let mut config = ConfigStore::default_config_dir()
        .map(ConfigStore::new)
        .and_then(|store| match store.load() {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!("Config unreadable, using defaults: {}", e);
                None
            }
        })
        .unwrap_or_default();
    config.apply_env_overrides();
    config
}

fn read_text(mut reader: impl Read) -> anyhow::Result<String> {
    let mut text = String::new();
    reader.read_to_string(&mut text).context("read stdin failed")?;
    Ok(normalize_text(&text))
}

fn read_input(path: &str) -> anyhow::Result<(String, ContentKind, Option<String>)> {
    if path == "-" {
        return Ok((read_text(std::io::stdin())?, ContentKind::Text, None));
    }

    let p = Path::new(path);
    let kind = match p.extension().map(|e| e.to_string_lossy().to_lowercase()).as_deref() {
        Some("docx") | Some("pdf") => ContentKind::Document,
        _ => ContentKind::Text,
    };
    let text = load_document(p).with_context(|| format!("load {} failed", path))?;
    let name = p.file_name().map(|s| s.to_string_lossy().to_string());
    Ok((normalize_text(&text), kind, name))
}

fn print_report(report: &AnalysisReport) {
    let r = &report.result;
    println!("Report: {}", report.id);
    println!(
        "Verdict: {} (confidence {}%)",
        if r.is_ai { "AI-generated" } else { "Human-written" },
        r.confidence
    );
    println!("Probability: AI {}% / Human {}%", r.probability_ai, r.probability_human);
    println!("{}", r.explanation);
    println!();

    for verdict in &report.verdicts {
        let v = verdict.result();
        println!(
            "  [{}] AI {}% confidence {}%",
            verdict.backend_name(),
            v.probability_ai,
            v.confidence
        );
    }
    println!();

    if !r.factors.is_empty() {
        println!("Factors:");
        for f in &r.factors {
            let marker = match f.impact {
                FactorImpact::Positive => "+",
                FactorImpact::Negative => "-",
                FactorImpact::Neutral => "=",
            };
            println!("  {} {:<28} weight={:.2} value={:.1}", marker, f.name, f.weight, f.value);
        }
    }

    if !report.related.is_empty() {
        println!();
        println!("Related content:");
        for item in &report.related {
            println!("  {} <{}>", item.title, item.link);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || has_flag(&args, "--help") {
        eprintln!("{}", USAGE);
        return Ok(());
    }

    veritas_lib::init_logging();

    let config = load_config();
    let as_json = has_flag(&args, "--json");
    let user_id = parse_arg_value(&args, "--user");

    let mut generative_config = config.backends.generative.clone();
    if let Some(spec) = parse_arg_value(&args, "--provider").map(|p| parse_provider(&p)) {
        match ApiFlavor::from_name(&spec.name) {
            Some(flavor) => generative_config.flavor = flavor,
            None => bail!("unknown provider: {}", spec.name),
        }
        if !spec.model.is_empty() {
            generative_config.model = spec.model;
        }
    }

    let generative_key = get_api_key(generative_config.flavor.as_str());
    let generative = match config.proxy.as_ref().filter(|p| p.enabled).and_then(|p| p.https.as_deref()) {
        Some(proxy) => ProviderClient::with_proxy(&generative_config, generative_key, proxy)?,
        None => ProviderClient::new(&generative_config, generative_key),
    };
    let sentiment = InferenceClient::new(&config.backends.sentiment, get_api_key("huggingface"));
    let search = SearchClient::new(
        &config.backends.search,
        get_api_key("search"),
        get_api_key("search_engine"),
    );
    let history_dir = config.history_path().unwrap_or_else(|| PathBuf::from("history"));
    let store = JsonFileStore::new(history_dir);

    let mut settings = AnalysisSettings::from_config(&config.analysis);
    settings.use_generative = generative_config.enabled && !has_flag(&args, "--no-llm");
    settings.use_sentiment = config.backends.sentiment.enabled;
    settings.use_search = config.backends.search.enabled;

    let analyzer = Analyzer::new(generative, sentiment, search, store, settings);

    if has_flag(&args, "--history") {
        let limit = parse_arg_value(&args, "--history")
            .and_then(|s| s.parse().ok())
            .unwrap_or(HistoryQuery::default().limit);
        let reports = analyzer.history(&HistoryQuery { user_id, is_ai: None, limit })?;
        if as_json {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        } else {
            for r in &reports {
                println!(
                    "{}  {}  AI {:>3}%  {}",
                    r.created_at.format("%Y-%m-%d %H:%M"),
                    r.id,
                    r.result.probability_ai,
                    r.text_preview.chars().take(60).collect::<String>()
                );
            }
        }
        return Ok(());
    }

    let Some(input) = positional_arg(&args) else {
        bail!("missing input path\n\n{}", USAGE);
    };
    let (text, kind, source_name) = read_input(input)?;
    let request = AnalysisRequest {
        text,
        kind,
        user_id,
        source_name,
        find_related: has_flag(&args, "--related"),
    };

    let outcome = analyzer.analyze(request).await?;
    let report = outcome.with_related().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}
