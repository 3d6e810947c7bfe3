//! CLI binary for edgequake-statement.
//!
//! Maps CLI flags to `ExtractionConfig`, runs one extraction, then filters,
//! summarises and optionally exports the transactions.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use comfy_table::{Cell, CellAlignment, Table};
use edgequake_statement::config::{DEFAULT_API_BASE_URL, DEFAULT_MODEL};
use edgequake_statement::{
    export_to_file, extract, inspect, DroppedRow, ExportFormat, ExtractionConfig,
    ExtractionProgressCallback, ExtractionStats, PageSelection, ProgressCallback, RecordFilter,
    RecordSet, StatementOutput, Summary,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Single spinner whose message follows the pipeline stage. The request
/// stage is one opaque call, so there is nothing to count.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_render_start(&self, selected_pages: usize, total_pages: usize) {
        self.bar.set_prefix("Rendering");
        self.bar
            .set_message(format!("{selected_pages} of {total_pages} pages"));
    }

    fn on_render_complete(&self, rendered_pages: usize, duration_ms: u64) {
        self.bar.println(format!(
            "  {} Rendered {} pages  {}",
            green("✓"),
            rendered_pages,
            dim(&format!("{:.1}s", duration_ms as f64 / 1000.0)),
        ));
    }

    fn on_request_start(&self, images: usize) {
        self.bar.set_prefix("Extracting");
        self.bar
            .set_message(format!("waiting for the model ({images} images)"));
    }

    fn on_request_complete(&self, reply_len: usize, duration_ms: u64) {
        self.bar.println(format!(
            "  {} Reply received  {}  {}",
            green("✓"),
            dim(&format!("{reply_len} chars")),
            dim(&format!("{:.1}s", duration_ms as f64 / 1000.0)),
        ));
    }

    fn on_parse_complete(&self, records: usize, dropped: usize) {
        self.bar.finish_and_clear();
        if dropped == 0 {
            eprintln!("{} {} transactions", green("✔"), bold(&records.to_string()));
        } else {
            eprintln!(
                "{} {} transactions  ({} table lines dropped)",
                cyan("⚠"),
                bold(&records.to_string()),
                dropped
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract every page and print the transactions
  statement2xlsx estado.pdf

  # Skip the cover pages and the legal boilerplate at the end
  statement2xlsx --skip-first 2 --skip-last 2 estado.pdf -o noviembre.xlsx

  # Only expenses in the first half of the month, as CSV
  statement2xlsx --category Expense --from 2024-11-01 --to 2024-11-15 \
      estado.pdf -o gastos.csv

  # Page count and metadata (no API key needed)
  statement2xlsx --inspect-only estado.pdf

  # Use another vision provider through edgequake-llm
  statement2xlsx --provider openai --model gpt-4.1 estado.pdf

  # Machine-readable output
  statement2xlsx --json estado.pdf > estado.json

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key (default client)
  OPENAI_API_KEY, ...     Keys read by edgequake-llm when --provider is set
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Overrides the log filter
"#;

/// Extract bank-statement transactions from a PDF into a spreadsheet.
#[derive(Parser, Debug)]
#[command(
    name = "statement2xlsx",
    version,
    about = "Extract bank-statement transactions from a PDF with a vision model",
    long_about = "Render the transaction pages of a bank-statement PDF, ask a vision model for \
a Date / Concept / Amount / Type table, and summarise or export the result as XLSX or CSV.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Export the (filtered) transactions to this file.
    #[arg(short, long, env = "STATEMENT_OUTPUT")]
    output: Option<PathBuf>,

    /// Export format: xlsx or csv. Default: from the output extension, else xlsx.
    #[arg(long, env = "STATEMENT_FORMAT")]
    format: Option<ExportFormat>,

    /// Anthropic API key.
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model ID.
    #[arg(long, env = "STATEMENT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Use an edgequake-llm provider instead of the Anthropic client
    /// (openai, gemini, ollama, azure, anthropic).
    #[arg(long, env = "STATEMENT_PROVIDER")]
    provider: Option<String>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "STATEMENT_PAGES", default_value = "all")]
    pages: String,

    /// Skip this many pages at the start (overrides --pages).
    #[arg(long, env = "STATEMENT_SKIP_FIRST")]
    skip_first: Option<usize>,

    /// Skip this many pages at the end (overrides --pages).
    #[arg(long, env = "STATEMENT_SKIP_LAST")]
    skip_last: Option<usize>,

    /// Keep only these categories (repeatable). Default: all.
    #[arg(long = "category", value_name = "CATEGORY")]
    categories: Vec<String>,

    /// Keep transactions on or after this date (YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Keep transactions on or before this date (YYYY-MM-DD).
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Longest rendered edge in pixels.
    #[arg(long, env = "STATEMENT_MAX_PIXELS", default_value_t = 2000,
          value_parser = clap::value_parser!(u32).range(200..=8000))]
    max_pixels: u32,

    /// Max output tokens for the reply.
    #[arg(long, env = "STATEMENT_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// Sampling temperature (0.0–1.0).
    #[arg(long, env = "STATEMENT_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "STATEMENT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// PDF user password for encrypted statements.
    #[arg(long, env = "STATEMENT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Path to libpdfium (file or containing directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Base URL of the Messages API.
    #[arg(long, env = "STATEMENT_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,

    /// Timeout for the model call in seconds. Default: none.
    #[arg(long, env = "STATEMENT_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "STATEMENT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Fail when the reply contains no table header.
    #[arg(long, env = "STATEMENT_STRICT")]
    strict: bool,

    /// Print a JSON report instead of tables.
    #[arg(long, env = "STATEMENT_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "STATEMENT_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "STATEMENT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "STATEMENT_QUIET")]
    quiet: bool,
}

/// What `--json` prints.
#[derive(Serialize)]
struct JsonReport<'a> {
    records: &'a RecordSet,
    summary: Summary,
    category_counts: &'a [(String, usize)],
    dropped: &'a [DroppedRow],
    raw_reply: &'a str,
    stats: &'a ExtractionStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep INFO logs out
    // of its way unless -v was passed.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, None).await?;
        let info = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = info.title {
                println!("Title:        {}", t);
            }
            println!("Pages:        {}", info.page_count);
            println!("PDF Version:  {}", info.pdf_version);
            if let Some(ref p) = info.producer {
                println!("Producer:     {}", p);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run extraction ───────────────────────────────────────────────────
    let output = extract(&cli.input, &config)
        .await
        .context("Extraction failed")?;

    let report = build_report(&cli, &output)?;
    let selected = &report.selected;

    if cli.json {
        let json = JsonReport {
            records: selected,
            summary: report.summary,
            category_counts: &report.category_counts,
            dropped: &output.dropped,
            raw_reply: &output.raw_reply,
            stats: &output.stats,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        print_report(&output, &report);
    }

    // ── Export ───────────────────────────────────────────────────────────
    if let Some(ref path) = cli.output {
        let format = cli
            .format
            .or_else(|| ExportFormat::from_path(path))
            .unwrap_or_default();
        export_to_file(selected.records(), path, format)
            .await
            .with_context(|| format!("Failed to export to {}", path.display()))?;

        if !cli.quiet {
            eprintln!(
                "{}  {} transactions  →  {}",
                green("✔"),
                selected.len(),
                bold(&path.display().to_string()),
            );
        }
    }

    if !cli.quiet && !cli.json {
        eprintln!(
            "   {} tokens in  /  {} tokens out  ·  {}ms total",
            dim(&output.stats.input_tokens.to_string()),
            dim(&output.stats.output_tokens.to_string()),
            output.stats.total_duration_ms,
        );
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let pages = if cli.skip_first.is_some() || cli.skip_last.is_some() {
        PageSelection::Trim {
            leading: cli.skip_first.unwrap_or(0),
            trailing: cli.skip_last.unwrap_or(0),
        }
    } else {
        parse_pages(&cli.pages)?
    };

    let mut builder = ExtractionConfig::builder()
        .model(cli.model.clone())
        .pages(pages)
        .max_rendered_pixels(cli.max_pixels)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_base_url(cli.api_base_url.clone())
        .download_timeout_secs(cli.download_timeout)
        .require_table(cli.strict);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib.clone());
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Filtered rows for the table and export, metrics over the whole statement.
struct Report {
    selected: RecordSet,
    summary: Summary,
    category_counts: Vec<(String, usize)>,
}

fn build_report(cli: &Cli, output: &StatementOutput) -> Result<Report> {
    let filter = build_filter(cli, output)?;
    Ok(Report {
        selected: output.records.filter(&filter),
        summary: output.records.summary(),
        category_counts: output.records.category_counts(),
    })
}

/// Category selection plus date range. A missing bound takes the matching
/// end of the extracted data, or stays open when no date parses.
fn build_filter(cli: &Cli, output: &StatementOutput) -> Result<RecordFilter> {
    let mut filter = RecordFilter::all();
    if !cli.categories.is_empty() {
        filter = filter.with_categories(cli.categories.iter().cloned());
    }

    if cli.from.is_some() || cli.to.is_some() {
        let bounds = output.records.date_bounds();
        let from = cli
            .from
            .or(bounds.map(|b| b.0))
            .unwrap_or(NaiveDate::MIN);
        let to = cli.to.or(bounds.map(|b| b.1)).unwrap_or(NaiveDate::MAX);
        if from > to {
            anyhow::bail!("--from {} is after --to {}", from, to);
        }
        filter = filter.with_date_range(from, to);
    }
    Ok(filter)
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;
        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;
        if pages.contains(&0) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got 0)");
        }
        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}

// ── Rendering ────────────────────────────────────────────────────────────────

fn print_report(output: &StatementOutput, report: &Report) {
    let selected = &report.selected;
    let summary = &report.summary;
    if selected.is_empty() {
        println!("{}", dim("No transactions."));
    } else {
        let mut table = Table::new();
        table.set_header(vec!["Date", "Concept", "Amount (MXN)", "Type"]);
        for r in selected {
            table.add_row(vec![
                Cell::new(&r.date),
                Cell::new(&r.concept),
                Cell::new(money(r.amount)).set_alignment(CellAlignment::Right),
                Cell::new(&r.category),
            ]);
        }
        println!("{table}");
    }

    println!();
    println!("{}  {}", bold("Total Income: "), green(&money(summary.total_income)));
    println!("{}  {}", bold("Total Expenses:"), red(&money(summary.total_expense)));
    let balance = money(summary.balance);
    let balance = if summary.balance < 0.0 {
        red(&balance)
    } else {
        green(&balance)
    };
    println!("{}  {}", bold("Balance:       "), balance);

    let counts = &report.category_counts;
    if !counts.is_empty() {
        println!();
        println!("{}", bold("Transactions by type"));
        for line in bar_chart(counts, 40) {
            println!("  {line}");
        }
    }

    let malformed = output.malformed_rows().count();
    if malformed > 0 {
        eprintln!(
            "{} {} table rows had the wrong number of cells and were skipped (see --json)",
            cyan("⚠"),
            malformed
        );
    }
}

/// Horizontal bars scaled so the largest count spans `width` cells.
fn bar_chart(counts: &[(String, usize)], width: usize) -> Vec<String> {
    let max = counts.iter().map(|(_, n)| *n).max().unwrap_or(0);
    let label_width = counts.iter().map(|(c, _)| c.chars().count()).max().unwrap_or(0);
    counts
        .iter()
        .map(|(category, n)| {
            let len = if max == 0 {
                0
            } else {
                (n * width / max).max(1)
            };
            format!(
                "{:<label_width$}  {} {}",
                category,
                cyan(&"█".repeat(len)),
                n
            )
        })
        .collect()
}

/// Format a float as a dollar amount with thousands separators: $1,234.56
fn money(val: f64) -> String {
    let cents = format!("{:.2}", val.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    if val < 0.0 {
        format!("-${grouped}.{dec_part}")
    } else {
        format!("${grouped}.{dec_part}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_statement::TransactionRecord;

    #[test]
    fn money_formatting() {
        assert_eq!(money(1234.56), "$1,234.56");
        assert_eq!(money(-500.0), "-$500.00");
        assert_eq!(money(0.0), "$0.00");
        assert_eq!(money(1_000_000.99), "$1,000,000.99");
        assert_eq!(money(123.0), "$123.00");
    }

    #[test]
    fn page_flags() {
        assert_eq!(parse_pages("all").unwrap(), PageSelection::All);
        assert_eq!(parse_pages("3-9").unwrap(), PageSelection::Range(3, 9));
        assert_eq!(parse_pages("1,4").unwrap(), PageSelection::Set(vec![1, 4]));
        assert_eq!(parse_pages(" 2 ").unwrap(), PageSelection::Single(2));
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("9-3").is_err());
    }

    #[test]
    fn skip_flags_become_trim() {
        let cli = Cli::parse_from(["statement2xlsx", "--skip-first", "2", "--skip-last", "2", "x.pdf"]);
        assert_eq!(cli.skip_first, Some(2));
        assert_eq!(cli.skip_last, Some(2));
        let cli = Cli::parse_from([
            "statement2xlsx",
            "--category",
            "Income",
            "--category",
            "Expense",
            "--from",
            "2024-11-01",
            "x.pdf",
        ]);
        assert_eq!(cli.categories, vec!["Income", "Expense"]);
        assert_eq!(cli.from, NaiveDate::from_ymd_opt(2024, 11, 1));
    }

    fn statement() -> StatementOutput {
        StatementOutput {
            records: RecordSet::new(vec![
                TransactionRecord::new("05/11/2024", "NOMINA", 30000.0, "Income"),
                TransactionRecord::new("01/11/2024", "RENTA", 12000.0, "Expense"),
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn metrics_cover_whole_statement() {
        let cli = Cli::parse_from(["statement2xlsx", "--category", "Expense", "x.pdf"]);
        let report = build_report(&cli, &statement()).unwrap();

        assert_eq!(report.selected.len(), 1);
        assert_eq!(report.selected.records()[0].concept, "RENTA");
        assert_eq!(report.summary.total_income, 30000.0);
        assert_eq!(report.summary.total_expense, 12000.0);
        assert_eq!(report.summary.balance, 18000.0);
        assert_eq!(report.category_counts.len(), 2);
    }

    #[test]
    fn lone_bound_applies_without_parseable_dates() {
        let output = StatementOutput {
            records: RecordSet::new(vec![TransactionRecord::new(
                "fin de mes",
                "COMISION",
                50.0,
                "Expense",
            )]),
            ..Default::default()
        };

        let cli = Cli::parse_from(["statement2xlsx", "--from", "2024-11-01", "x.pdf"]);
        let filter = build_filter(&cli, &output).unwrap();
        assert_eq!(
            filter.date_range,
            Some((NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(), NaiveDate::MAX))
        );
        assert!(output.records.filter(&filter).is_empty());

        let cli = Cli::parse_from(["statement2xlsx", "--to", "2024-11-30", "x.pdf"]);
        let filter = build_filter(&cli, &output).unwrap();
        assert_eq!(
            filter.date_range,
            Some((NaiveDate::MIN, NaiveDate::from_ymd_opt(2024, 11, 30).unwrap()))
        );
    }

    #[test]
    fn lone_bound_takes_other_end_from_data() {
        let cli = Cli::parse_from(["statement2xlsx", "--from", "2024-11-03", "x.pdf"]);
        let output = statement();
        let filter = build_filter(&cli, &output).unwrap();
        assert_eq!(
            filter.date_range,
            Some((
                NaiveDate::from_ymd_opt(2024, 11, 3).unwrap(),
                NaiveDate::from_ymd_opt(2024, 11, 5).unwrap()
            ))
        );
        assert_eq!(output.records.filter(&filter).len(), 1);
    }

    #[test]
    fn bars_scale_to_largest() {
        let counts = vec![("Expense".to_string(), 10), ("Income".to_string(), 1)];
        let lines = bar_chart(&counts, 20);
        assert_eq!(lines[0].matches('█').count(), 20);
        assert_eq!(lines[1].matches('█').count(), 2);
    }
}
