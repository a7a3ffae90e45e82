// src/extract.rs
//! Value extraction: turns fetched venue content into an occupancy count.
//!
//! Extraction never fails loudly. Anything that cannot be turned into a
//! number degrades to [`NoValue`], which the poll loop treats as "skip this
//! tick". The no-data sentinel is *not* a failure: it normalizes to `0`.

use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker some venues return when no live count is available.
pub const DEFAULT_NO_DATA_SENTINEL: &str = "—";

/// Separator between current and maximum count, e.g. `"33 von 80"`.
pub const DEFAULT_SEPARATOR: &str = " von ";

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

/// How a venue's raw content is turned into a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Body is the bare count (or the no-data sentinel).
    RawNumeric,
    /// Body is an HTML page; the count is the left operand of `separator`
    /// inside the first element matching `selector`.
    SelectorScrape {
        selector: String,
        #[serde(default = "default_separator")]
        separator: String,
    },
}

impl ExtractionMethod {
    pub fn selector_scrape(selector: impl Into<String>) -> Self {
        Self::SelectorScrape {
            selector: selector.into(),
            separator: default_separator(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::RawNumeric => "raw_numeric",
            Self::SelectorScrape { .. } => "selector_scrape",
        }
    }
}

/// Why a tick produced no reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoValue {
    #[error("content is not a number: {0:?}")]
    NotNumeric(String),
    #[error("no element matches selector {0:?}")]
    SelectorMissing(String),
    #[error("invalid CSS selector {0:?}")]
    InvalidSelector(String),
    #[error("unexpected text format: {0:?}")]
    BadFormat(String),
}

/// Extractor carrying the configured no-data sentinel.
#[derive(Debug, Clone)]
pub struct Extractor {
    sentinel: String,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_NO_DATA_SENTINEL)
    }
}

impl Extractor {
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into(),
        }
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    pub fn extract(&self, raw: &str, method: &ExtractionMethod) -> Result<u64, NoValue> {
        match method {
            ExtractionMethod::RawNumeric => self.raw_numeric(raw),
            ExtractionMethod::SelectorScrape {
                selector,
                separator,
            } => scrape(raw, selector, separator),
        }
    }

    fn raw_numeric(&self, raw: &str) -> Result<u64, NoValue> {
        let decoded = html_escape::decode_html_entities(raw);
        let trimmed = decoded.trim();
        if trimmed == self.sentinel {
            return Ok(0);
        }
        trimmed
            .parse::<u64>()
            .map_err(|_| NoValue::NotNumeric(trimmed.to_string()))
    }
}

/// Extract with the default sentinel.
pub fn extract(raw: &str, method: &ExtractionMethod) -> Result<u64, NoValue> {
    Extractor::default().extract(raw, method)
}

/// Check that a selector compiles; used when validating configuration.
pub fn validate_selector(selector: &str) -> Result<(), NoValue> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|_| NoValue::InvalidSelector(selector.to_string()))
}

fn scrape(html: &str, selector: &str, separator: &str) -> Result<u64, NoValue> {
    let sel =
        Selector::parse(selector).map_err(|_| NoValue::InvalidSelector(selector.to_string()))?;
    let doc = Html::parse_document(html);
    let element = doc
        .select(&sel)
        .next()
        .ok_or_else(|| NoValue::SelectorMissing(selector.to_string()))?;

    let text = collapse_ws(&element.text().collect::<String>());
    tracing::debug!(text = %text, "scraped element text");
    parse_left_operand(&text, separator)
}

/// Parse the count in front of `separator` (`"42 von 80"` -> 42).
pub fn parse_left_operand(text: &str, separator: &str) -> Result<u64, NoValue> {
    let left = match text.split_once(separator) {
        Some((left, _)) => left,
        None => text,
    }
    .trim();

    if left.is_empty() || !left.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NoValue::BadFormat(text.to_string()));
    }
    left.parse::<u64>()
        .map_err(|_| NoValue::BadFormat(text.to_string()))
}

fn collapse_ws(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    re_ws.replace_all(s, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <div class="go-stop-display">
          <div class="go-stop-display_header">Auslastung</div>
          <div class="go-stop-display_footer">
             42 von 80
          </div>
        </div>
    </body></html>"#;

    #[test]
    fn sentinel_normalizes_to_zero() {
        assert_eq!(extract("—", &ExtractionMethod::RawNumeric), Ok(0));
        assert_eq!(extract("  —\n", &ExtractionMethod::RawNumeric), Ok(0));
        assert_eq!(extract("&mdash;", &ExtractionMethod::RawNumeric), Ok(0));
    }

    #[test]
    fn raw_numeric_parses_trimmed_integers() {
        for n in [0u64, 1, 7, 42, 999, 123_456, u32::MAX as u64] {
            let body = format!(" {n}\r\n");
            assert_eq!(extract(&body, &ExtractionMethod::RawNumeric), Ok(n));
        }
    }

    #[test]
    fn raw_numeric_rejects_garbage() {
        for body in ["", "abc", "12.5", "-3", "12 Personen"] {
            assert!(
                matches!(
                    extract(body, &ExtractionMethod::RawNumeric),
                    Err(NoValue::NotNumeric(_))
                ),
                "{body:?} should be NoValue"
            );
        }
    }

    #[test]
    fn custom_sentinel_is_honoured() {
        let ex = Extractor::new("n/a");
        assert_eq!(ex.extract("n/a", &ExtractionMethod::RawNumeric), Ok(0));
        assert!(ex.extract("—", &ExtractionMethod::RawNumeric).is_err());
    }

    #[test]
    fn scrape_reads_left_operand() {
        let m = ExtractionMethod::selector_scrape(".go-stop-display_footer");
        assert_eq!(extract(PAGE, &m), Ok(42));
    }

    #[test]
    fn scrape_handles_nested_markup() {
        let page = r#"<div class="c"><span>17</span> von <span>80</span></div>"#;
        let m = ExtractionMethod::selector_scrape(".c");
        assert_eq!(extract(page, &m), Ok(17));
    }

    #[test]
    fn scrape_missing_element_is_no_value() {
        let m = ExtractionMethod::selector_scrape(".does-not-exist");
        assert_eq!(
            extract(PAGE, &m),
            Err(NoValue::SelectorMissing(".does-not-exist".into()))
        );
    }

    #[test]
    fn scrape_invalid_selector_is_no_value() {
        let m = ExtractionMethod::selector_scrape("[[[");
        assert!(matches!(extract(PAGE, &m), Err(NoValue::InvalidSelector(_))));
        assert!(validate_selector("[[[").is_err());
        assert!(validate_selector(".ok").is_ok());
    }

    #[test]
    fn left_operand_parsing() {
        assert_eq!(parse_left_operand("42 von 80", " von "), Ok(42));
        assert_eq!(parse_left_operand("42", " von "), Ok(42));
        assert!(parse_left_operand("von 80", " von ").is_err());
        assert!(parse_left_operand("viele von 80", " von ").is_err());
        assert!(parse_left_operand("", " von ").is_err());
    }

    #[test]
    fn method_deserializes_from_tagged_toml() {
        #[derive(Deserialize)]
        struct Wrap {
            extraction: ExtractionMethod,
        }
        let w: Wrap = toml::from_str(
            r#"
[extraction]
kind = "selector_scrape"
selector = ".x"
"#,
        )
        .unwrap();
        assert_eq!(w.extraction, ExtractionMethod::selector_scrape(".x"));

        let w: Wrap = toml::from_str("extraction = { kind = \"raw_numeric\" }").unwrap();
        assert_eq!(w.extraction, ExtractionMethod::RawNumeric);
    }
}
