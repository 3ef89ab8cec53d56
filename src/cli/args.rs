use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dirprobe",
    version,
    about = "multi-target web directory discovery scanner",
    long_about = "Dirprobe requests every wordlist entry against every target URL and records the status code, body length and redirect target of each response.\n\nExamples:\n  dirprobe -u http://target.tld:80 -w wordlist.txt\n  dirprobe -U targets.txt -w wordlist.txt -t 10 -p 4 --timeout 5\n  dirprobe -u https://target.tld:443 -w wordlist.txt -x http://127.0.0.1:8080 -v\n\nTip: Use --config to persist scan settings and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "vb",
        visible_alias = "verbose",
        help_heading = "Output",
        help = "Print every probe as it completes."
    )]
    pub verbose: bool,

    #[arg(
        short = 'n',
        long = "nc",
        visible_alias = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'o',
        long = "od",
        visible_alias = "output-dir",
        value_name = "DIR",
        help_heading = "Output",
        help = "Directory for the per-target CSV reports (default: dirprobe_results)."
    )]
    pub output_dir: Option<String>,

    #[arg(
        short = 'u',
        long = "u",
        visible_alias = "url",
        value_name = "URL",
        action = ArgAction::Append,
        help_heading = "Input",
        help = "Target URL formatted proto://addr:port (repeatable)."
    )]
    pub url: Vec<String>,

    #[arg(
        short = 'U',
        long = "uf",
        visible_alias = "url-file",
        value_name = "FILE",
        help_heading = "Input",
        help = "Load target URLs from a file (one per line)."
    )]
    pub url_file: Option<String>,

    #[arg(
        short = 'w',
        long = "wl",
        visible_alias = "wordlist",
        value_name = "FILE",
        help_heading = "Input",
        help = "Wordlist file path (one path segment per line)."
    )]
    pub wordlist: Option<String>,

    #[arg(
        short = 'C',
        long = "cfg",
        visible_alias = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.dirprobe/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 't',
        long = "th",
        visible_alias = "threads",
        value_name = "N",
        help_heading = "Performance",
        help = "Concurrent probes per target (default: 5)."
    )]
    pub threads: Option<usize>,

    #[arg(
        short = 'p',
        long = "pc",
        visible_alias = "processes",
        value_name = "N",
        help_heading = "Performance",
        help = "Targets scanned in parallel (default: one per CPU core)."
    )]
    pub processes: Option<usize>,

    #[arg(
        short = 'T',
        long = "to",
        visible_alias = "timeout",
        value_name = "SECONDS",
        help_heading = "HTTP",
        help = "Per-request timeout in seconds (default: 10)."
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'x',
        long = "px",
        visible_alias = "proxy",
        value_name = "URL",
        help_heading = "HTTP",
        help = "Proxy for both HTTP and HTTPS probes (e.g. http://127.0.0.1:8080)."
    )]
    pub proxy: Option<String>,
}
