use std::sync::OnceLock;

use regex::Regex;

use crate::protocol::tracks::Track;

/// Words that only decorate an upload and say nothing about the recording.
const NOISE_TOKENS: &[&str] = &[
    "official",
    "video",
    "audio",
    "lyrics",
    "lyric",
    "remastered",
    "remaster",
    "hd",
    "hq",
    "4k",
    "mv",
    "visualizer",
    "topic",
];

static BRACKETED: OnceLock<Option<Regex>> = OnceLock::new();
static NON_ALNUM: OnceLock<Option<Regex>> = OnceLock::new();

fn bracketed() -> Option<&'static Regex> {
    BRACKETED
        .get_or_init(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]|\{[^}]*\}").ok())
        .as_ref()
}

fn non_alnum() -> Option<&'static Regex> {
    NON_ALNUM
        .get_or_init(|| Regex::new(r"[^\p{L}\p{N}]+").ok())
        .as_ref()
}

/// Lower-cases `text`, drops bracketed segments and noise words and
/// collapses everything else that is not a letter or digit to one space.
pub fn normalize_text(text: &str) -> String {
    let mut result = text.to_lowercase();

    if let Some(re) = bracketed() {
        result = re.replace_all(&result, " ").into_owned();
    }
    if let Some(re) = non_alnum() {
        result = re.replace_all(&result, " ").into_owned();
    }

    result
        .split_whitespace()
        .filter(|word| !NOISE_TOKENS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map_or(url, |(_, rest)| rest)
}

/// `title::author::upstreamId::urlWithoutScheme`.
pub fn fingerprint(track: &Track) -> String {
    format!(
        "{}::{}::{}::{}",
        normalize_text(&track.title),
        normalize_text(&track.author),
        track.upstream_id.as_deref().unwrap_or_default(),
        strip_scheme(&track.url).to_lowercase(),
    )
}

/// Normalized `title::author` part of the fingerprint.
pub fn title_key(track: &Track) -> String {
    format!(
        "{}::{}",
        normalize_text(&track.title),
        normalize_text(&track.author)
    )
}

/// Whether `a` and `b` are the same recording.
///
/// Two tracks match on the full fingerprint, on the normalized
/// title/author pair, on the upstream id or on the url.
pub fn same_track(a: &Track, b: &Track) -> bool {
    if let (Some(x), Some(y)) = (&a.upstream_id, &b.upstream_id) {
        if !x.is_empty() && x == y {
            return true;
        }
    }
    if !a.url.is_empty() && strip_scheme(&a.url).eq_ignore_ascii_case(strip_scheme(&b.url)) {
        return true;
    }

    let key = title_key(a);
    // A title that normalizes to nothing can't be compared meaningfully.
    key != "::" && key == title_key(b)
}

/// Checks `candidate` against the queue and the most recent `window`
/// history entries (newest last).
pub fn is_duplicate<'a, Q, H>(candidate: &Track, queued: Q, history: H, window: usize) -> bool
where
    Q: IntoIterator<Item = &'a Track>,
    H: IntoIterator<Item = &'a Track>,
    H::IntoIter: DoubleEndedIterator,
{
    queued.into_iter().any(|t| same_track(candidate, t))
        || history
            .into_iter()
            .rev()
            .take(window)
            .any(|t| same_track(candidate, t))
}
