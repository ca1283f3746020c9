use crate::cli::args::CliArgs;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(raw) = args.sort.as_deref() {
        crate::utils::parse_sort_arg(raw).map_err(|e| format!("invalid --sort '{raw}': {e}"))?;
    }
    for raw in args.filter.iter() {
        crate::utils::parse_filter_arg(raw)
            .map_err(|e| format!("invalid --filter '{raw}': {e}"))?;
    }
    if let Some(page) = args.page {
        crate::utils::parse_positive(page, "page")?;
    }
    if let Some(limit) = args.limit {
        crate::utils::parse_positive(limit, "limit")?;
    }
    if let Some(raw) = args.output_format.as_deref() {
        if crate::output::OutputFormat::parse(raw).is_none() {
            return Err(format!("invalid --format '{raw}', expected text or json"));
        }
    }
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err("invalid timeout, expected positive integer".to_string());
        }
    }
    if args.next && args.previous {
        return Err("use either --next or --prev, not both".to_string());
    }
    Ok(())
}
