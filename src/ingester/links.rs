//! Link extraction, normalization and affiliate rewriting

use crate::types::Platform;
use regex::Regex;
use std::sync::LazyLock;
use url::{form_urlencoded, Url};

/// Shopping domains accepted without configuration
pub const DEFAULT_DOMAINS: &[&str] = &[
    "amazon.in",
    "amzn.to",
    "flipkart.com",
    "fkrt.co",
    "fkrt.it",
    "myntra.com",
    "ajio.com",
];

/// Query keys dropped during normalization (compared lowercase)
const TRACKING_PARAMS: &[&str] = &[
    "ref", "ref_", "refrid", "cmpid", "campaign", "source", "src", "affid", "fbclid",
    "gclid", "tag",
];

const TRACKING_PREFIXES: &[&str] = &["utm_", "affextparam"];

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s<>]+").expect("valid url regex"));

static AMAZON_ASIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/(?:dp|gp/product|gp/aw/d)/([A-Z0-9]{10})(?:[/?]|$)")
        .expect("valid asin regex")
});

static FLIPKART_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/p/([A-Za-z0-9]+)").expect("valid flipkart regex"));

static MYNTRA_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d{5,})(?:/buy)?/?$").expect("valid myntra regex"));

static AJIO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/p/([A-Za-z0-9_]+)").expect("valid ajio regex"));

/// All `http(s)://` links in `text`, with trailing punctuation trimmed
pub fn extract_urls(text: &str) -> Vec<&str> {
    URL_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '}', '*', '"', '\'']))
        .filter(|u| !u.is_empty())
        .collect()
}

pub fn has_link(text: &str) -> bool {
    URL_RE.is_match(text)
}

/// `text` with every link removed
pub fn strip_urls(text: &str) -> String {
    URL_RE.replace_all(text, "").into_owned()
}

/// Exact domain or any subdomain of it
pub fn host_allowed(host: &str, domains: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    domains.iter().any(|d| {
        let d = d.trim().to_ascii_lowercase();
        !d.is_empty() && (host == d || host.ends_with(&format!(".{}", d)))
    })
}

/// Parse `raw` and keep it only when its host is on the allow-list
pub fn parse_allowed(raw: &str, domains: &[String]) -> Option<Url> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    host_allowed(host, domains).then_some(url)
}

fn is_tracking(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    TRACKING_PARAMS.contains(&key.as_str())
        || TRACKING_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Remove tracking parameters and the fragment, sort what remains.
///
/// Kept parameters stay byte-for-byte as they appeared in the input. Amazon
/// product links carry nothing but tracking in the query, so the whole query
/// is dropped for them.
pub fn normalize(url: &Url, platform: Platform) -> Url {
    let mut kept: Vec<&str> = match platform {
        Platform::Amazon => Vec::new(),
        _ => query_segments(url)
            .filter(|seg| !is_tracking(&segment_key(seg)))
            .collect(),
    };
    kept.sort_unstable();

    let mut normalized = url.clone();
    normalized.set_fragment(None);
    set_segments(&mut normalized, &kept);
    normalized
}

/// Replace any `tag` parameter with the configured affiliate tag
pub fn with_affiliate_tag(url: &Url, tag: &str) -> Url {
    let encoded: String = form_urlencoded::byte_serialize(tag.as_bytes()).collect();
    let tag_segment = format!("tag={}", encoded);

    let mut segments: Vec<&str> = query_segments(url)
        .filter(|seg| !segment_key(seg).eq_ignore_ascii_case("tag"))
        .collect();
    segments.push(&tag_segment);

    let mut tagged = url.clone();
    set_segments(&mut tagged, &segments);
    tagged
}

/// Raw `key=value` segments of the query, empty ones skipped
fn query_segments(url: &Url) -> impl Iterator<Item = &str> {
    url.query()
        .unwrap_or_default()
        .split('&')
        .filter(|seg| !seg.is_empty())
}

/// Decoded key of a raw query segment
fn segment_key(segment: &str) -> String {
    form_urlencoded::parse(segment.as_bytes())
        .next()
        .map(|(k, _)| k.into_owned())
        .unwrap_or_default()
}

fn set_segments(url: &mut Url, segments: &[&str]) {
    if segments.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&segments.join("&")));
    }
}

/// Platform-scoped product identifier, used as a dedup key
pub fn product_id(url: &Url, platform: Platform) -> Option<String> {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let path = url.path();
    let short_code = || {
        let code = path.trim_matches('/');
        (!code.is_empty() && !code.contains('/')).then(|| code.to_string())
    };

    let id = match platform {
        Platform::Amazon => {
            if host.ends_with("amzn.to") {
                short_code().map(|c| format!("amzn.to/{}", c))
            } else {
                AMAZON_ASIN_RE
                    .captures(path)
                    .map(|c| c[1].to_ascii_uppercase())
            }
        }
        Platform::Flipkart => {
            if host.starts_with("fkrt.") || host.contains(".fkrt.") {
                short_code().map(|c| format!("fkrt/{}", c))
            } else {
                url.query_pairs()
                    .find(|(k, _)| k == "pid")
                    .map(|(_, v)| v.into_owned())
                    .or_else(|| FLIPKART_PATH_RE.captures(path).map(|c| c[1].to_string()))
            }
        }
        Platform::Myntra => MYNTRA_ID_RE.captures(path).map(|c| c[1].to_string()),
        Platform::Ajio => AJIO_ID_RE.captures(path).map(|c| c[1].to_string()),
        Platform::Other => None,
    }?;

    Some(format!("{}:{}", platform, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains() -> Vec<String> {
        DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_extract_urls_trims_punctuation() {
        let urls = extract_urls("Buy now (https://amzn.to/3xYz). Also https://fkrt.co/abc,");
        assert_eq!(urls, vec!["https://amzn.to/3xYz", "https://fkrt.co/abc"]);
    }

    #[test]
    fn test_host_allowed_matches_subdomains_only() {
        let d = domains();
        assert!(host_allowed("www.amazon.in", &d));
        assert!(host_allowed("amzn.to", &d));
        assert!(host_allowed("dl.flipkart.com", &d));
        assert!(!host_allowed("notamazon.in.evil.com", &d));
        assert!(!host_allowed("example.com", &d));
    }

    #[test]
    fn test_normalize_strips_tracking_and_sorts() {
        let url = Url::parse(
            "https://www.flipkart.com/item/p/itm123?utm_source=tg&pid=ABC&cmpid=x&lid=9#top",
        )
        .unwrap();
        let normalized = normalize(&url, Platform::Flipkart);
        assert_eq!(
            normalized.as_str(),
            "https://www.flipkart.com/item/p/itm123?lid=9&pid=ABC"
        );
    }

    #[test]
    fn test_normalize_keeps_raw_query_segments() {
        let url = Url::parse("https://www.ajio.com/s/p/460?q=a%20b&flag&utm_source=x&name=c+d").unwrap();
        assert_eq!(
            normalize(&url, Platform::Ajio).as_str(),
            "https://www.ajio.com/s/p/460?flag&name=c+d&q=a%20b"
        );
    }

    #[test]
    fn test_normalize_drops_amazon_query() {
        let url = Url::parse("https://www.amazon.in/dp/B0TESTXXXX?tag=old-20&th=1&psc=1").unwrap();
        assert_eq!(
            normalize(&url, Platform::Amazon).as_str(),
            "https://www.amazon.in/dp/B0TESTXXXX"
        );
    }

    #[test]
    fn test_with_affiliate_tag_replaces_existing() {
        let url = Url::parse("https://www.amazon.in/dp/B0TESTXXXX?tag=old-20&tag=older-21").unwrap();
        let tagged = with_affiliate_tag(&url, "mine-21");
        assert_eq!(tagged.as_str(), "https://www.amazon.in/dp/B0TESTXXXX?tag=mine-21");
    }

    #[test]
    fn test_product_ids() {
        let asin = Url::parse("https://www.amazon.in/Some-Thing/dp/b0abcdefgh/ref=x").unwrap();
        assert_eq!(
            product_id(&asin, Platform::Amazon),
            Some("amazon:B0ABCDEFGH".to_string())
        );

        let short = Url::parse("https://amzn.to/3AbCdEf").unwrap();
        assert_eq!(
            product_id(&short, Platform::Amazon),
            Some("amazon:amzn.to/3AbCdEf".to_string())
        );

        let fk = Url::parse("https://www.flipkart.com/x/p/itmabc?pid=MOBG123").unwrap();
        assert_eq!(
            product_id(&fk, Platform::Flipkart),
            Some("flipkart:MOBG123".to_string())
        );

        let myntra = Url::parse("https://www.myntra.com/tshirts/brand/name/12345678/buy").unwrap();
        assert_eq!(
            product_id(&myntra, Platform::Myntra),
            Some("myntra:12345678".to_string())
        );

        let home = Url::parse("https://www.amazon.in/").unwrap();
        assert_eq!(product_id(&home, Platform::Amazon), None);
    }
}
