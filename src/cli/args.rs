use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tablesync",
    version,
    about = "URL-synchronized table state engine",
    long_about = "tablesync loads one page of a server-backed table, with its sort, filters and pagination kept in sync with a URL query string.\n\nExamples:\n  tablesync --base-url http://localhost:5000\n  tablesync --query 'search=name:Jo&sort=age:desc&page=2&limit=10'\n  tablesync --filter name:Jo --filter email:gmail --sort age:asc --limit 20\n  tablesync --query 'page=3' --next --serialize-only\n\nTip: Use --config to persist the base URL and default page size."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase verbosity (-v, -vv, -vvv)."
    )]
    pub verbose: u8,

    #[arg(
        long = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'o',
        long = "format",
        visible_alias = "output-format",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Output format: text or json."
    )]
    pub output_format: Option<String>,

    #[arg(
        short = 'S',
        long = "serialize-only",
        help_heading = "Output",
        help = "Print the resulting URL without contacting the server."
    )]
    pub serialize_only: bool,

    #[arg(
        short = 'b',
        long = "base-url",
        value_name = "URL",
        help_heading = "Server",
        help = "Data server base URL (rows are loaded from <URL>/users)."
    )]
    pub base_url: Option<String>,

    #[arg(
        long = "timeout",
        value_name = "SECONDS",
        help_heading = "Server",
        help = "Request timeout in seconds."
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'C',
        long = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.tablesync/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 'q',
        long = "query",
        value_name = "QUERY",
        help_heading = "Input",
        help = "Initial URL query string, e.g. 'search=name:Jo&page=2'."
    )]
    pub query: Option<String>,

    #[arg(
        short = 's',
        long = "sort",
        value_name = "COL:asc|desc",
        help_heading = "Table",
        help = "Sort by a column; 'none' clears the sort."
    )]
    pub sort: Option<String>,

    #[arg(
        short = 'f',
        long = "filter",
        value_name = "COL:VALUE",
        action = ArgAction::Append,
        help_heading = "Table",
        help = "Filter a column (repeatable); an empty value clears it."
    )]
    pub filter: Vec<String>,

    #[arg(
        short = 'p',
        long = "page",
        value_name = "N",
        help_heading = "Table",
        help = "One-based page number."
    )]
    pub page: Option<usize>,

    #[arg(
        short = 'l',
        long = "limit",
        visible_alias = "page-size",
        value_name = "N",
        help_heading = "Table",
        help = "Rows per page."
    )]
    pub limit: Option<usize>,

    #[arg(
        long = "next",
        help_heading = "Table",
        help = "After loading, move to the next page and load it."
    )]
    pub next: bool,

    #[arg(
        long = "prev",
        visible_alias = "previous",
        help_heading = "Table",
        help = "After loading, move to the previous page and load it."
    )]
    pub previous: bool,

    #[arg(
        long = "debounce-ms",
        value_name = "MS",
        help_heading = "Table",
        help = "Quiet period before filter input is applied."
    )]
    pub debounce_ms: Option<u64>,

    #[arg(
        long = "reset-page-on-filter",
        num_args = 0..=1,
        default_missing_value = "true",
        help_heading = "Table",
        help = "Return to the first page whenever a filter changes."
    )]
    pub reset_page_on_filter: Option<bool>,
}
