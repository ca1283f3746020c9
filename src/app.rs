use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use clap::{error::ErrorKind, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::fetcher::{DataFetcher, FetcherConfig, TableLoader, DEFAULT_BASE_URL};
use crate::navigation::{Location, MemoryHistory};
use crate::output::{self, OutputFormat};
use crate::query::LIMIT_KEY;
use crate::session::{default_columns, SessionOptions, TableSession, TableView};
use crate::state::PaginationState;

fn format_kv_line(label: &str, value: &str) {
    eprintln!(":: {:<10}: {}", label, value);
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PageStep {
    Next,
    Previous,
}

#[derive(Clone, Debug)]
struct RunConfig {
    base_url: String,
    timeout: u64,
    query: String,
    sort: Option<Option<crate::state::SortSpec>>,
    filters: Vec<(String, String)>,
    page: Option<usize>,
    limit: Option<usize>,
    step: Option<PageStep>,
    debounce: Duration,
    reset_page_on_filter: bool,
    output_format: OutputFormat,
    serialize_only: bool,
    no_color: bool,
    verbose: u8,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let no_color = args.no_color || cfg.no_color.unwrap_or(false);
    let verbose = if args.verbose > 0 {
        args.verbose
    } else {
        cfg.verbose.unwrap_or(0)
    };

    let base_url = args
        .base_url
        .or(cfg.base_url)
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    if reqwest::Url::parse(base_url.trim()).is_err() {
        return Err(format!("invalid base URL: {base_url}"));
    }
    let timeout = args.timeout.or(cfg.timeout).unwrap_or(10);
    if timeout == 0 {
        return Err("invalid timeout, expected positive integer".to_string());
    }

    let query = args.query.or(cfg.query).unwrap_or_default();

    let sort = match args.sort.as_deref() {
        Some(raw) => Some(
            crate::utils::parse_sort_arg(raw)
                .map_err(|e| format!("invalid --sort '{raw}': {e}"))?,
        ),
        None => None,
    };

    let columns = default_columns();
    let mut filters = Vec::new();
    for raw in args.filter.iter() {
        let (column, value) = crate::utils::parse_filter_arg(raw)
            .map_err(|e| format!("invalid --filter '{raw}': {e}"))?;
        crate::utils::ensure_known_column(&columns, &column)?;
        filters.push((column, value));
    }
    if let Some(Some(s)) = sort.as_ref() {
        crate::utils::ensure_known_column(&columns, &s.column_id)?;
    }

    // the config page size only applies when the URL does not carry one
    let limit = match args.limit {
        Some(limit) => Some(limit),
        None if !crate::query::QueryMap::parse(&query).contains_key(LIMIT_KEY) => {
            cfg.page_size.filter(|n| *n > 0)
        }
        None => None,
    };

    let step = match (args.next, args.previous) {
        (true, false) => Some(PageStep::Next),
        (false, true) => Some(PageStep::Previous),
        _ => None,
    };
    if step.is_some() && args.serialize_only {
        return Err(
            "--next/--prev need the page count from the server; drop --serialize-only".to_string(),
        );
    }

    let output_format = match args.output_format.or(cfg.output_format) {
        Some(raw) => OutputFormat::parse(&raw)
            .ok_or_else(|| format!("invalid output format '{raw}', expected text or json"))?,
        None => OutputFormat::Text,
    };

    let debounce = Duration::from_millis(args.debounce_ms.or(cfg.debounce_ms).unwrap_or(500));
    let reset_page_on_filter = args
        .reset_page_on_filter
        .or(cfg.reset_page_on_filter)
        .unwrap_or(false);

    Ok(RunConfig {
        base_url,
        timeout,
        query,
        sort,
        filters,
        page: args.page,
        limit,
        step,
        debounce,
        reset_page_on_filter,
        output_format,
        serialize_only: args.serialize_only,
        no_color,
        verbose,
    })
}

fn apply_actions(session: &TableSession, run: &RunConfig) {
    if let Some(sort) = run.sort.clone() {
        session.set_sort(sort);
    }
    for (column, value) in run.filters.iter() {
        session.apply_filter(column, value);
    }
    let current = session.snapshot().pagination;
    match (run.page, run.limit) {
        (Some(page), limit) => session.set_pagination(PaginationState::new(
            page - 1,
            limit.unwrap_or(current.page_size()),
        )),
        (None, Some(limit)) => session.set_page_size(limit),
        (None, None) => {}
    }
}

fn spinner(interactive: bool) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if !interactive {
        pb.set_draw_target(ProgressDrawTarget::hidden());
        return pb;
    }
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

async fn load_page(session: &TableSession) -> Result<TableView, String> {
    let pb = spinner(std::io::stderr().is_terminal());
    pb.set_message(format!("loading {}", session.location()));
    let loaded = session.load().await;
    pb.finish_and_clear();
    match loaded {
        Ok(Some(view)) => Ok(view),
        Ok(None) => Err("load was superseded by a newer request".to_string()),
        Err(e) => Err(format!("failed to load table: {e}")),
    }
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }

    let history = Arc::new(MemoryHistory::new(Location::parse(&run.query)));
    let fetcher = DataFetcher::new(&FetcherConfig {
        base_url: run.base_url.clone(),
        timeout: Duration::from_secs(run.timeout),
    })
    .map_err(|e| e.to_string())?;
    let endpoint = fetcher.endpoint().to_string();
    let loader = Arc::new(TableLoader::new(fetcher));

    let session = TableSession::mount(
        history,
        loader,
        SessionOptions {
            debounce: run.debounce,
            reset_page_on_filter: run.reset_page_on_filter,
            ..SessionOptions::default()
        },
    );
    apply_actions(&session, &run);
    session.sync_url();

    if run.verbose > 0 {
        format_kv_line("Endpoint", &endpoint);
        format_kv_line("Debounce", &format!("{}ms", run.debounce.as_millis()));
        format_kv_line("Reset page", format_bool(run.reset_page_on_filter));
    }
    format_kv_line("URL", &session.location().to_string().bold().to_string());

    if run.serialize_only {
        println!("{}", session.location());
        return Ok(());
    }

    let mut view = load_page(&session).await?;
    let moved = match run.step {
        Some(PageStep::Next) => session.next_page(),
        Some(PageStep::Previous) => session.previous_page(),
        None => false,
    };
    if run.step.is_some() && !moved {
        eprintln!(
            "{}{}{} already on the {} page",
            "[".bold().white(),
            "WRN".bold().yellow(),
            "]".bold().white(),
            if run.step == Some(PageStep::Next) {
                "last"
            } else {
                "first"
            }
        );
    }
    if moved {
        session.sync_url();
        format_kv_line("URL", &session.location().to_string().bold().to_string());
        view = load_page(&session).await?;
    }

    let report = output::build_report(
        &session.location().to_string(),
        &session.snapshot(),
        &view,
        session.columns(),
    );
    let rendered = output::render(&report, run.output_format);
    std::io::stdout()
        .write_all(&rendered)
        .map_err(|e| format!("failed to write output: {e}"))?;
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{e}");
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    let mut default_config_error = None;
    let cfg = match args.config.as_deref() {
        Some(path) => config::load_config(&config::expand_tilde(path), false)
            .map_err(|e| e.to_string())?,
        None => match config::default_config_path() {
            Some(path) => {
                if let Err(e) = config::ensure_default_config_file(&path) {
                    default_config_error = Some(e.to_string());
                }
                config::load_config(&path, true).map_err(|e| e.to_string())?
            }
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;
    crate::logging::init(run.verbose, run.no_color)?;
    if let Some(e) = default_config_error {
        tracing::warn!(error = %e, "could not create default config");
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))?;
    Ok(())
}
