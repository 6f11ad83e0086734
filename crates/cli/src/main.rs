mod config;

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use residencias_core::report::money;
use residencias_core::{
    aggregate, ingest_records, load_source, Dataset, MemoryBackend, SupabaseBackend, Table,
    TableBackend,
};
use residencias_rag::{
    dispatch_named, extract, parse_question, Answer, FunctionCallingResolver, LlmClient,
    LlmProvider, Phrasing, QueryPipeline, ResolverChain, Session, CATALOG,
};

use crate::config::{load_config, AppConfig, DEFAULT_CONFIG};

#[derive(Parser, Debug)]
#[command(
    name = "residencias",
    version,
    about = "Ask questions about residential care spending"
)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Serve tables from a JSON snapshot instead of the remote database.
    #[arg(long, global = true)]
    data: Option<PathBuf>,
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer one question
    Ask {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
        /// Print the report text without LLM phrasing
        #[arg(long, action = ArgAction::SetTrue)]
        raw: bool,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Interactive question loop
    Chat {
        #[arg(long, action = ArgAction::SetTrue)]
        raw: bool,
        /// Write the session transcript here on exit
        #[arg(long)]
        transcript: Option<PathBuf>,
    },
    /// Show the intent the keyword parser reads from a question
    Parse {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Run one catalog function with JSON parameters
    Call {
        name: String,
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Overview figures and spend breakdowns
    Dashboard {
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Load providers, contracts and invoices from a source JSON file
    Ingest { input: PathBuf },
    /// Verify every table can be read
    Check,
    /// List the functions offered to the model
    Catalog {
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
}

enum Tables {
    Remote(SupabaseBackend),
    Snapshot {
        backend: MemoryBackend,
        path: PathBuf,
    },
}

impl Tables {
    fn as_backend(&self) -> &dyn TableBackend {
        match self {
            Tables::Remote(backend) => backend,
            Tables::Snapshot { backend, .. } => backend,
        }
    }
}

/// Chat clients built from `[llm]`. `None` means phrasing was wanted but no key is configured.
struct LlmClients {
    answer: Option<LlmClient>,
    routing: Option<LlmClient>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut file_config = load_config(&config_path)?;
    file_config.apply_env(|name| env::var(name).ok());
    init_tracing(cli.verbose || file_config.verbose);

    match cli.command {
        Commands::Ask {
            question,
            raw,
            json,
        } => {
            let tables = open_tables(&file_config, cli.data.as_deref())?;
            let clients = build_llm_clients(&file_config)?;
            let pipeline = build_pipeline(&file_config, &tables, &clients, raw);
            let answer = pipeline.ask(&question.join(" "));
            print_answer(&answer, json)?;
        }
        Commands::Chat { raw, transcript } => {
            let tables = open_tables(&file_config, cli.data.as_deref())?;
            let clients = build_llm_clients(&file_config)?;
            let pipeline = build_pipeline(&file_config, &tables, &clients, raw);
            run_chat(&pipeline, transcript.as_deref())?;
        }
        Commands::Parse { question } => {
            let text = question.join(" ");
            let output = json!({
                "intent": parse_question(&text),
                "extracted": extracted_json(&text),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Call { name, params } => {
            let params: Value =
                serde_json::from_str(&params).context("--params must be a JSON object")?;
            let tables = open_tables(&file_config, cli.data.as_deref())?;
            let ds = Dataset::load(tables.as_backend());
            let report = dispatch_named(&name, &params, &ds);
            println!("{}", report.text);
        }
        Commands::Dashboard { json } => {
            let tables = open_tables(&file_config, cli.data.as_deref())?;
            let ds = Dataset::load(tables.as_backend());
            print_dashboard(&ds, json)?;
        }
        Commands::Ingest { input } => {
            let tables = open_tables(&file_config, cli.data.as_deref())?;
            let records = load_source(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let summary = ingest_records(tables.as_backend(), &records)?;
            if let Tables::Snapshot { backend, path } = &tables {
                let contents = serde_json::to_string_pretty(&backend.snapshot())?;
                fs::write(path, contents)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Check => {
            let tables = open_tables(&file_config, cli.data.as_deref())?;
            let mut failures = 0;
            for table in Table::ALL {
                match tables.as_backend().select_all(table) {
                    Ok(rows) => println!("{}: {} rows", table.as_str(), rows.len()),
                    Err(err) => {
                        failures += 1;
                        println!("{}: ERROR {err}", table.as_str());
                    }
                }
            }
            if failures > 0 {
                bail!("{failures} table(s) could not be read");
            }
        }
        Commands::Catalog { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&*CATALOG)?);
            } else {
                for spec in CATALOG.iter() {
                    println!("{:<30} {}", spec.name, spec.description);
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn open_tables(config: &AppConfig, data: Option<&Path>) -> Result<Tables> {
    let snapshot = data.map(Path::to_path_buf).or_else(|| config.backend.snapshot.clone());
    if let Some(path) = snapshot {
        let backend = if path.exists() {
            MemoryBackend::load_snapshot(&path)
                .with_context(|| format!("failed to load snapshot {}", path.display()))?
        } else {
            warn!(path = %path.display(), "snapshot not found, starting empty");
            MemoryBackend::new()
        };
        return Ok(Tables::Snapshot { backend, path });
    }
    let url = config.backend.url.as_deref().unwrap_or_default();
    let key = config.backend.key.as_deref().unwrap_or_default();
    let backend = SupabaseBackend::new(url, key)
        .context("set SUPABASE_URL and SUPABASE_KEY, or pass --data <snapshot.json>")?;
    Ok(Tables::Remote(backend))
}

fn build_llm_clients(config: &AppConfig) -> Result<LlmClients> {
    let llm = &config.llm;
    let provider = llm.provider()?;
    if provider == LlmProvider::Local {
        return Ok(LlmClients {
            answer: Some(LlmClient::local()),
            routing: Some(LlmClient::local()),
        });
    }
    let Some(api_key) = llm.api_key.clone() else {
        warn!(provider = provider.as_str(), "no LLM API key configured");
        return Ok(LlmClients {
            answer: None,
            routing: None,
        });
    };
    let answer = LlmClient::with_api_key(
        provider,
        llm.model_name(provider),
        Some(api_key.clone()),
        llm.base_url.clone(),
    )?;
    let routing = LlmClient::with_api_key(
        provider,
        llm.routing_model_name(provider),
        Some(api_key),
        llm.base_url.clone(),
    )?;
    Ok(LlmClients {
        answer: Some(answer),
        routing: Some(routing),
    })
}

fn build_pipeline<'a>(
    config: &AppConfig,
    tables: &'a Tables,
    clients: &'a LlmClients,
    raw: bool,
) -> QueryPipeline<'a> {
    let mut resolvers = ResolverChain::keywords_only();
    if config.llm.fallback {
        if let Some(routing) = &clients.routing {
            resolvers = resolvers.with(FunctionCallingResolver::new(routing));
        }
    }
    let phrasing = if raw || !config.llm.phrase_answers {
        Phrasing::Raw
    } else {
        match &clients.answer {
            Some(client) => Phrasing::Model(client),
            None => Phrasing::MissingCredential,
        }
    };
    QueryPipeline::new(tables.as_backend(), resolvers, phrasing)
}

fn print_answer(answer: &Answer, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(answer)?);
    } else {
        println!("{}", answer.text);
    }
    Ok(())
}

fn run_chat(pipeline: &QueryPipeline<'_>, transcript: Option<&Path>) -> Result<()> {
    let mut session = Session::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    println!("Ask a question about providers, contracts or invoices. Empty line or 'exit' quits.");
    loop {
        print!("> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() || matches!(question, "exit" | "quit" | "salir") {
            break;
        }
        let answer = pipeline.ask(question);
        println!("{}\n", answer.text);
        session.record(&answer);
    }
    if let Some(path) = transcript {
        fs::write(path, session.transcript())
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(turns = session.len(), path = %path.display(), "transcript written");
    }
    Ok(())
}

fn extracted_json(text: &str) -> Value {
    let extracted = extract(text);
    json!({
        "year": extracted.year,
        "facility": extracted.facility,
        "provider": extracted.provider,
        "range": extracted.range.map(|(start, end)| json!([start, end])),
        "amount": extracted.amount,
        "cutoff": extracted.cutoff,
        "limit": extracted.limit,
    })
}

fn print_dashboard(ds: &Dataset, json: bool) -> Result<()> {
    let overview = aggregate::overview(ds);
    let by_contract = aggregate::spend_by_contract(ds);
    let by_facility = aggregate::spend_by_facility(ds, None);
    let by_month = aggregate::spend_by_month(ds, None);
    if json {
        let output = json!({
            "overview": overview,
            "spend_by_contract": by_contract,
            "spend_by_facility": by_facility,
            "spend_by_month": by_month,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }
    if ds.is_empty() {
        return Err(anyhow!("no data: every table is empty or unreachable"));
    }
    println!(
        "providers: {}  contracts: {}  invoices: {}",
        overview.providers, overview.contracts, overview.invoices
    );
    println!(
        "total invoiced: {}  total contracted: {}",
        money(overview.total_invoiced),
        money(overview.total_contracted)
    );
    print_section("Billing per contract", &by_contract);
    print_section("Spend by facility", &by_facility);
    print_section("Spend by month", &by_month);
    Ok(())
}

fn print_section(title: &str, entries: &[residencias_core::RankEntry]) {
    println!("\n{title}");
    if entries.is_empty() {
        println!("  (none)");
    }
    for entry in entries {
        println!(
            "  {:<28} {:>14}  ({})",
            entry.key,
            money(entry.total),
            entry.count
        );
    }
}
