use std::collections::HashSet;

/// Redirect strings echoed to the console are cut to this many characters.
pub const REDIRECT_DISPLAY_LEN: usize = 35;

const HTTP_PORTS: &[&str] = &[
    "80", "280", "81", "591", "593", "2080", "2480", "3080", "4080", "4567", "5080", "5104",
    "5800", "6080", "7001", "7080", "7777", "8000", "8008", "8042", "8080", "8081", "8082",
    "8088", "8180", "8222", "8280", "8281", "8530", "8887", "9000", "9080", "9090", "16080",
];

const HTTPS_PORTS: &[&str] = &[
    "832", "981", "1311", "7002", "7021", "7023", "7025", "8333", "8531", "8888",
];

// joins a base url and a wordlist segment with exactly one slash between them
pub fn join_url(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}

fn canonical_location(url: &str) -> String {
    let canonical = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => url.to_string(),
    };
    canonical.trim_end_matches('/').to_string()
}

/// Returns the final url when it points somewhere other than the requested
/// one. Trailing slashes and explicit default ports do not count as a move.
pub fn redirect_target(requested: &str, final_url: &str) -> Option<String> {
    if canonical_location(requested) == canonical_location(final_url) {
        None
    } else {
        Some(final_url.to_string())
    }
}

pub fn truncate_redirect(redirect: &str) -> String {
    if redirect.is_empty() {
        return String::new();
    }
    let head: String = redirect.chars().take(REDIRECT_DISPLAY_LEN).collect();
    format!("{head}...")
}

/// Expands one raw target into `scheme://host:port[/path]` urls.
///
/// Bare hosts are tried over both schemes, bare `host:port` pairs pick a
/// scheme from well-known port lists, and urls that already carry a scheme get
/// their default port spelled out.
pub fn normalize_target(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("*.").unwrap_or(trimmed);
    let trimmed = trimmed.trim_end_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return match with_explicit_port(trimmed) {
            Some(url) => vec![url],
            None => vec![trimmed.to_string()],
        };
    }

    let (authority, path) = match trimmed.split_once('/') {
        Some((authority, path)) => (authority, format!("/{}", path)),
        None => (trimmed, String::new()),
    };

    match authority.rsplit_once(':') {
        Some((_, port)) if HTTP_PORTS.contains(&port) => {
            vec![format!("http://{authority}{path}")]
        }
        Some((_, port)) if HTTPS_PORTS.contains(&port) || port.ends_with("43") => {
            vec![format!("https://{authority}{path}")]
        }
        Some(_) => vec![
            format!("http://{authority}{path}"),
            format!("https://{authority}{path}"),
        ],
        None => vec![
            format!("http://{authority}:80{path}"),
            format!("https://{authority}:443{path}"),
        ],
    }
}

fn with_explicit_port(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let port = parsed.port_or_known_default()?;
    let path = parsed.path().trim_end_matches('/');
    let mut out = format!("{}://{}:{}{}", parsed.scheme(), host, port, path);
    if let Some(query) = parsed.query() {
        out.push('?');
        out.push_str(query);
    }
    Some(out)
}

pub fn normalize_targets<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();
    for url in raw.iter().flat_map(|r| normalize_target(r.as_ref())) {
        if seen.insert(url.clone()) {
            out.push(url);
        }
    }
    out
}

/// Cleans raw wordlist lines: trims, drops blanks and `#` comments, and keeps
/// only the first occurrence of each segment. A `#` segment would be sent as a
/// url fragment and only ever request the base url again.
pub fn clean_wordlist<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();
    for line in lines {
        let word = line.as_ref().trim();
        if word.is_empty() || word.starts_with('#') {
            continue;
        }
        if seen.insert(word.to_string()) {
            out.push(word.to_string());
        }
    }
    out
}
