use rand::seq::IndexedRandom;

const WIN_EDGE: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/42.0.2311.135 Safari/537.36 Edge/12.246";
const WIN_FIREFOX: &str = "Mozilla/5.0 (Windows NT 10.0; WOW64; rv:40.0) Gecko/20100101 Firefox/43.0";
const WIN_CHROME: &str = "Mozilla/5.0 (Windows NT 6.1; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/63.0.3239.84 Safari/537.36";
const LIN_FIREFOX: &str = "Mozilla/5.0 (X11; Linux i686; rv:30.0) Gecko/20100101 Firefox/42.0";
const MAC_CHROME: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_10_2) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/40.0.2214.38 Safari/537.36";
const MAC_FIREFOX: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:95.0) Gecko/20100101 Firefox/95.0";
const IE: &str = "Mozilla/4.0 (compatible; MSIE 6.0; Windows NT 5.0)";

/// The pool of browser identifiers a probe may present.
pub const USER_AGENTS: [&str; 7] = [
    WIN_EDGE,
    WIN_FIREFOX,
    WIN_CHROME,
    LIN_FIREFOX,
    MAC_CHROME,
    MAC_FIREFOX,
    IE,
];

/// Picks a user agent uniformly at random from [`USER_AGENTS`].
pub fn select() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(MAC_FIREFOX)
}
