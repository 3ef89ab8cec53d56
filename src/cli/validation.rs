use crate::cli::args::CliArgs;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if !args.url.is_empty() && args.url_file.is_some() {
        return Err(
            "please specify a URL (--url) or an input file containing URLs (--url-file), not both"
                .to_string(),
        );
    }
    for url in args.url.iter() {
        if !url.trim().starts_with("http") {
            return Err(format!(
                "invalid URL '{url}', expected the format proto://address:port (https://example.com:443)"
            ));
        }
    }
    if args.threads == Some(0) {
        return Err("invalid threads, expected positive integer".to_string());
    }
    if args.processes == Some(0) {
        return Err("invalid processes, expected positive integer".to_string());
    }
    if args.timeout == Some(0) {
        return Err("invalid timeout, expected positive integer".to_string());
    }
    Ok(())
}
