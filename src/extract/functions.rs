//! The pluggable extraction functions: one regex-driven classifier per
//! name, run over a decompressed HTML body.

use std::io::Read;

use flate2::read::GzDecoder;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::model::FetchResult;

pub const ALLOWED_FUNCTIONS: &[&str] = &[
    "error",
    "ip",
    "raw_html",
    "headers",
    "html",
    "generator",
    "server",
    "title",
    "links",
    "regexmatch",
    "scripts",
    "poweredby",
    "hiddenwp",
    "phpinfo",
    "indexof",
    "adminpanel",
    "s3bucket",
    "max",
];

/// Fixed keyword set for `--function=max`.
const MAX_KEYWORDS: &[&str] = &[
    "phpmyadmin",
    "phpldapadmin",
    "tivoli",
    "nas",
    "san",
    "sap",
    "torrent",
    "router",
    "switch",
    "webcam",
    "scada",
    "plc",
    "nvr",
    "storage",
    "ipmi",
    "firewall",
    "grafana",
    "prometheus",
    "dashboard",
    "kubernetes",
    "swagger",
    "jira",
    "redmine",
    "confluence",
    "mantis",
    "nagios",
    "icinga",
];

const DELIMITER: &str = "==================================================";

fn ci_multiline(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .expect("built-in extraction patterns are always valid regexes")
}

static TITLE_RE: Lazy<Regex> = Lazy::new(|| ci_multiline(r"<title>(.*?)</title>"));
static GENERATOR_RE: Lazy<Regex> =
    Lazy::new(|| ci_multiline(r#"<meta name="generator" content="(.*?)" />"#));
static LINKS_RE: Lazy<Regex> = Lazy::new(|| ci_multiline(r#"href=["'].*?["']"#));
static SCRIPTS_RE: Lazy<Regex> = Lazy::new(|| ci_multiline(r"<script>.*?<script>"));
static HIDDENWP_RE: Lazy<Regex> = Lazy::new(|| ci_multiline(r"wp-content"));
static PHPINFO_RE: Lazy<Regex> = Lazy::new(|| ci_multiline(r"/phpinfo\.php"));
static INDEXOF_TITLE_RE: Lazy<Regex> = Lazy::new(|| ci_multiline(r"<title>Index of /</title>"));
static INDEXOF_LINKS_RE: Lazy<Regex> = Lazy::new(|| ci_multiline(r#"href=["']/.*?["']"#));
static ADMINPANEL_RE: Lazy<Regex> = Lazy::new(|| ci_multiline(r"(admin|login)"));
static S3BUCKET_RE: Lazy<Regex> = Lazy::new(|| {
    ci_multiline(r"(https?://[^.]+\.s3\.amazonaws\.com/|https?://s3\.amazonaws\.com/[^/]+/)")
});
static MAX_KEYWORD_RE: Lazy<Regex> =
    Lazy::new(|| ci_multiline(&format!("({})", MAX_KEYWORDS.join("|"))));

/// Gzip-decodes `body` when `headers` advertise `Content-Encoding: gzip`.
/// Any other encoding, or no encoding header at all, yields no HTML — the
/// fetcher always requests gzip, so there is nothing else worth decoding.
fn decode_html(headers: &[(String, String)], body: &[u8]) -> Option<String> {
    let encoding = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-encoding"))
        .map(|(_, v)| v.as_str());

    match encoding {
        Some(enc) if enc.eq_ignore_ascii_case("gzip") => gunzip(body).ok().map(|bytes| {
            String::from_utf8(bytes).unwrap_or_else(|e| {
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            })
        }),
        _ => None,
    }
}

fn gunzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(body);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

fn first_title(html: &str) -> Option<&str> {
    TITLE_RE.captures(html).map(|c| c.get(1).unwrap().as_str())
}

/// Applies one extraction function to a single record, appending any
/// matched lines to `out`.
pub fn apply(function: &str, regex: Option<&Regex>, record: &FetchResult, out: &mut String) {
    if function == "error" {
        let tag = record.error.as_deref().unwrap_or("");
        out.push_str(&format!("{tag}\t{}\n", record.url));
        return;
    }

    if record.http_code != 200 {
        return;
    }

    let url = record.url.as_str();

    match function {
        "ip" => {
            let ip = record.ip.as_deref().unwrap_or("");
            out.push_str(&format!("{ip}\t{url}\n"));
            return;
        }
        "raw_html" => {
            out.push_str(DELIMITER);
            out.push('\n');
            out.push_str(url);
            out.push('\n');
            out.push_str(&String::from_utf8_lossy(&record.body));
            out.push('\n');
            return;
        }
        "headers" => {
            out.push_str(DELIMITER);
            out.push('\n');
            out.push_str(url);
            out.push('\n');
            out.push_str(&format!("{:#?}\n", record.headers));
            return;
        }
        "poweredby" => {
            if let Some((_, v)) = record
                .headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("x-powered-by"))
            {
                out.push_str(&format!("{v}\t{url}\n"));
            }
            return;
        }
        "server" => {
            if let Some((_, v)) = record
                .headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("server"))
            {
                if !v.is_empty() {
                    out.push_str(&format!("{v}\t{url}\n"));
                }
            }
            return;
        }
        _ => {}
    }

    let Some(html) = decode_html(&record.headers, &record.body) else {
        return;
    };

    match function {
        "html" => {
            out.push_str(DELIMITER);
            out.push('\n');
            out.push_str(url);
            out.push('\n');
            out.push_str(&html);
            out.push('\n');
        }
        "generator" => {
            if let Some(c) = GENERATOR_RE.captures(&html) {
                out.push_str(&format!("{}\t{url}\n", c.get(1).unwrap().as_str()));
            }
        }
        "title" => {
            if let Some(title) = first_title(&html) {
                out.push_str(&format!("{url}\t{title}\n"));
            }
        }
        "links" => {
            let mut matches: Vec<&str> = LINKS_RE.find_iter(&html).map(|m| m.as_str()).collect();
            matches.sort_unstable();
            matches.dedup();
            if !matches.is_empty() {
                out.push_str(DELIMITER);
                out.push('\n');
                out.push_str(url);
                out.push('\n');
                out.push_str(&matches.join("\n"));
                out.push('\n');
            }
        }
        "scripts" => {
            let matches: Vec<&str> = SCRIPTS_RE.find_iter(&html).map(|m| m.as_str()).collect();
            if !matches.is_empty() {
                out.push_str(DELIMITER);
                out.push('\n');
                out.push_str(url);
                out.push('\n');
                out.push_str(url);
                out.push('\n');
                out.push_str(&matches.join("\n"));
                out.push('\n');
            }
        }
        "hiddenwp" => {
            if HIDDENWP_RE.is_match(&html) {
                out.push_str(url);
                out.push('\n');
            }
        }
        "phpinfo" => {
            if PHPINFO_RE.is_match(&html) {
                out.push_str(url);
                out.push('\n');
            }
        }
        "indexof" => {
            if INDEXOF_TITLE_RE.is_match(&html) {
                let mut matches: Vec<&str> = INDEXOF_LINKS_RE
                    .find_iter(&html)
                    .map(|m| m.as_str())
                    .collect();
                matches.sort_unstable();
                matches.dedup();
                if !matches.is_empty() {
                    out.push_str(url);
                    out.push('\n');
                    out.push('\t');
                    out.push_str(&matches.join("\n\t"));
                    out.push('\n');
                }
            }
        }
        "adminpanel" => {
            if let Some(title) = first_title(&html) {
                if ADMINPANEL_RE.is_match(title) {
                    out.push_str(&format!("{url}\t{title}\n"));
                }
            }
        }
        "s3bucket" => {
            let mut buckets: Vec<&str> = S3BUCKET_RE
                .captures_iter(&html)
                .map(|c| c.get(1).unwrap().as_str())
                .collect();
            buckets.sort_unstable();
            buckets.dedup();
            for bucket in buckets {
                out.push_str(&format!("{url}\t{bucket}\n"));
            }
        }
        "max" => {
            if let Some(title) = first_title(&html) {
                if MAX_KEYWORD_RE.is_match(title) {
                    out.push_str(&format!("{url}\t{title}\n"));
                }
            }
        }
        "regexmatch" => {
            if let Some(re) = regex {
                let matches: Vec<&str> = re.find_iter(&html).map(|m| m.as_str()).collect();
                if !matches.is_empty() {
                    out.push_str(url);
                    out.push('\n');
                    out.push_str(&format!("{matches:?}\n"));
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn gzip_bytes(data: &[u8]) -> Vec<u8> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn record(headers: Vec<(&str, &str)>, body: Vec<u8>) -> FetchResult {
        FetchResult {
            created_at: chrono::Utc::now(),
            url: "http://example.test".to_string(),
            body,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            http_code: 200,
            size: 0,
            speed: 0.0,
            ip: Some("1.2.3.4".to_string()),
            port: Some(80),
            redirects: 0,
            error: None,
        }
    }

    #[test]
    fn title_requires_gzip_content_encoding() {
        let r = record(vec![], b"<title>Hello</title>".to_vec());
        let mut out = String::new();
        apply("title", None, &r, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn title_and_generator_decode_gzip_body() {
        let html = br#"<title>Hi</title><meta name="generator" content="G" />"#;
        let r = record(vec![("Content-Encoding", "gzip")], gzip_bytes(html));

        let mut out = String::new();
        apply("title", None, &r, &mut out);
        assert_eq!(out, "http://example.test\tHi\n");

        let mut out = String::new();
        apply("generator", None, &r, &mut out);
        assert_eq!(out, "G\thttp://example.test\n");
    }

    #[test]
    fn server_fires_on_any_200_regardless_of_content_encoding() {
        let r = record(vec![("Server", "nginx")], b"plain body, no gzip".to_vec());
        let mut out = String::new();
        apply("server", None, &r, &mut out);
        assert_eq!(out, "nginx\thttp://example.test\n");
    }

    #[test]
    fn scripts_emits_the_url_twice_around_the_matches() {
        let html = b"<script>a</script><script><script>b</script><script>";
        let r = record(vec![("Content-Encoding", "gzip")], gzip_bytes(html));
        let mut out = String::new();
        apply("scripts", None, &r, &mut out);
        assert!(out.starts_with(&format!(
            "{DELIMITER}\nhttp://example.test\nhttp://example.test\n"
        )));
    }

    #[test]
    fn max_matches_any_keyword_once() {
        let html = b"<title>Grafana login</title>";
        let r = record(vec![("Content-Encoding", "gzip")], gzip_bytes(html));
        let mut out = String::new();
        apply("max", None, &r, &mut out);
        assert_eq!(out, "http://example.test\tGrafana login\n");
    }

    #[test]
    fn error_function_ignores_http_code() {
        let mut r = record(vec![], Vec::new());
        r.http_code = 0;
        r.error = Some("(timeout)".to_string());
        let mut out = String::new();
        apply("error", None, &r, &mut out);
        assert_eq!(out, "(timeout)\thttp://example.test\n");
    }

    #[test]
    fn s3bucket_deduplicates_matches() {
        let html = b"x https://bucket.s3.amazonaws.com/ y https://bucket.s3.amazonaws.com/ z";
        let r = record(vec![("Content-Encoding", "gzip")], gzip_bytes(html));
        let mut out = String::new();
        apply("s3bucket", None, &r, &mut out);
        assert_eq!(out, "http://example.test\thttps://bucket.s3.amazonaws.com/\n");
    }
}
