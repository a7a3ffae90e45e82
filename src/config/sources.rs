// src/config/sources.rs
use anyhow::{anyhow, bail, Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::extract::{validate_selector, ExtractionMethod};

pub const ENV_SOURCES_PATH: &str = "POLLER_SOURCES_PATH";

/// One polled venue. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub name: String,
    pub fetch_target: Url,
    pub extraction: ExtractionMethod,
    /// Worksheet inside the destination log.
    pub partition: String,
    /// Env var holding this source's interval override.
    pub interval_env: String,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: String,
    fetch_target: String,
    extraction: ExtractionMethod,
    partition: Option<String>,
    interval_env: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    sources: Vec<RawSource>,
}

impl SourceDescriptor {
    pub fn new(
        name: impl Into<String>,
        fetch_target: &str,
        extraction: ExtractionMethod,
    ) -> Result<Self> {
        let name = name.into();
        let fetch_target = Url::parse(fetch_target)
            .with_context(|| format!("source {name}: invalid fetch_target {fetch_target:?}"))?;
        Ok(Self {
            partition: name.clone(),
            interval_env: default_interval_env(&name),
            name,
            fetch_target,
            extraction,
        })
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    pub fn with_interval_env(mut self, var: impl Into<String>) -> Self {
        self.interval_env = var.into();
        self
    }

    fn from_raw(raw: RawSource) -> Result<Self> {
        let name = raw.name.trim().to_string();
        if name.is_empty() {
            bail!("source with empty name");
        }
        let mut sd = Self::new(name, raw.fetch_target.trim(), raw.extraction)?;
        if let Some(p) = raw.partition.map(|p| p.trim().to_string()) {
            sd.partition = p;
        }
        if let Some(v) = raw.interval_env.map(|v| v.trim().to_string()) {
            sd.interval_env = v;
        }
        Ok(sd)
    }

    fn validate(&self) -> Result<()> {
        if self.partition.is_empty() {
            bail!("source {}: empty partition", self.name);
        }
        if self.interval_env.is_empty() {
            bail!("source {}: empty interval_env", self.name);
        }
        if !matches!(self.fetch_target.scheme(), "http" | "https") {
            bail!(
                "source {}: unsupported scheme {}",
                self.name,
                self.fetch_target.scheme()
            );
        }
        if let ExtractionMethod::SelectorScrape {
            selector,
            separator,
        } = &self.extraction
        {
            validate_selector(selector).with_context(|| format!("source {}", self.name))?;
            if separator.is_empty() {
                bail!("source {}: empty separator", self.name);
            }
        }
        Ok(())
    }
}

/// `"Unisport Bern"` -> `CHECK_INTERVAL_UNISPORT_BERN`.
pub fn default_interval_env(name: &str) -> String {
    let mut out = String::from("CHECK_INTERVAL_");
    let mut last_us = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_uppercase());
            last_us = false;
        } else if !last_us {
            out.push('_');
            last_us = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Venues known out of the box.
pub fn builtin_sources() -> Vec<SourceDescriptor> {
    let fitnesspark = SourceDescriptor {
        name: "Fitnesspark-Bern".to_string(),
        fetch_target: Url::parse(
            "https://www.fitnesspark.ch/wp/wp-admin/admin-ajax.php?action=single_park_update_visitors&park_id=856&location_id=105&location_name=FP_Bern_City",
        )
        .expect("static url"),
        extraction: ExtractionMethod::RawNumeric,
        partition: "Fitnesspark-Bern".to_string(),
        interval_env: "CHECK_INTERVAL".to_string(),
    };
    let unisport = SourceDescriptor {
        name: "Unisport-Zssw".to_string(),
        fetch_target: Url::parse(
            "https://www.zssw.unibe.ch/usp/zms/templates/crowdmonitoring/_display-spaces-zssw.php",
        )
        .expect("static url"),
        extraction: ExtractionMethod::selector_scrape(".go-stop-display_footer"),
        partition: "Unisport-Zssw".to_string(),
        interval_env: "CHECK_INTERVAL_UNISPORT_BERN".to_string(),
    };
    vec![fitnesspark, unisport]
}

/// Load sources from an explicit path. Supports TOML or JSON formats.
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceDescriptor>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
        .with_context(|| format!("parsing sources from {}", path.display()))
}

/// Load sources using env var + fallbacks:
/// 1) $POLLER_SOURCES_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
/// 4) built-in venues
pub fn load_sources_default() -> Result<Vec<SourceDescriptor>> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        } else {
            return Err(anyhow!("{ENV_SOURCES_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    Ok(builtin_sources())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceDescriptor>> {
    let raw: SourcesFile = if hint_ext == "json" {
        serde_json::from_str(s)?
    } else {
        match toml::from_str(s) {
            Ok(v) => v,
            Err(toml_err) => serde_json::from_str(s).map_err(|_| toml_err)?,
        }
    };
    let sources = raw
        .sources
        .into_iter()
        .map(SourceDescriptor::from_raw)
        .collect::<Result<Vec<_>>>()?;
    validate_all(&sources)?;
    Ok(sources)
}

/// Per-source checks plus uniqueness of names and partitions.
pub fn validate_all(sources: &[SourceDescriptor]) -> Result<()> {
    if sources.is_empty() {
        bail!("no sources configured");
    }
    let mut names = BTreeSet::new();
    let mut partitions = BTreeSet::new();
    for s in sources {
        s.validate()?;
        if !names.insert(s.name.as_str()) {
            bail!("duplicate source name {}", s.name);
        }
        if !partitions.insert(s.partition.as_str()) {
            bail!("duplicate partition {}", s.partition);
        }
    }
    Ok(())
}

/// Narrow `all` to the named sources, preserving the requested order.
pub fn select(all: Vec<SourceDescriptor>, names: &[String]) -> Result<Vec<SourceDescriptor>> {
    if names.is_empty() {
        return Ok(all);
    }
    names
        .iter()
        .map(|n| {
            all.iter()
                .find(|s| s.name.eq_ignore_ascii_case(n.trim()))
                .cloned()
                .ok_or_else(|| anyhow!("unknown source {n:?}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
[[sources]]
name = "Fitnesspark-Bern"
fetch_target = "https://example.test/visitors"
interval_env = "CHECK_INTERVAL"
extraction = { kind = "raw_numeric" }

[[sources]]
name = "Unisport Bern"
fetch_target = "https://example.test/display.php"
partition = "Unisport-Zssw"
[sources.extraction]
kind = "selector_scrape"
selector = ".go-stop-display_footer"
"#;

    #[test]
    fn toml_sources_parse_with_defaults() {
        let v = parse_sources(TOML, "toml").unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].partition, "Fitnesspark-Bern");
        assert_eq!(v[0].interval_env, "CHECK_INTERVAL");
        assert_eq!(v[1].partition, "Unisport-Zssw");
        assert_eq!(v[1].interval_env, "CHECK_INTERVAL_UNISPORT_BERN");
        assert_eq!(
            v[1].extraction,
            ExtractionMethod::selector_scrape(".go-stop-display_footer")
        );
    }

    #[test]
    fn json_sources_parse() {
        let json = r#"{"sources":[{"name":"A","fetch_target":"http://a.test/","extraction":{"kind":"raw_numeric"}}]}"#;
        let v = parse_sources(json, "json").unwrap();
        assert_eq!(v[0].name, "A");
        assert_eq!(v[0].interval_env, "CHECK_INTERVAL_A");
    }

    #[test]
    fn duplicate_names_rejected() {
        let json = r#"{"sources":[
            {"name":"A","fetch_target":"http://a.test/","extraction":{"kind":"raw_numeric"}},
            {"name":"A","fetch_target":"http://b.test/","partition":"B","extraction":{"kind":"raw_numeric"}}
        ]}"#;
        assert!(parse_sources(json, "json").is_err());
    }

    #[test]
    fn bad_selector_and_url_rejected() {
        let bad_sel = r#"{"sources":[{"name":"A","fetch_target":"http://a.test/","extraction":{"kind":"selector_scrape","selector":"[["}}]}"#;
        assert!(parse_sources(bad_sel, "json").is_err());
        let bad_url = r#"{"sources":[{"name":"A","fetch_target":"not a url","extraction":{"kind":"raw_numeric"}}]}"#;
        assert!(parse_sources(bad_url, "json").is_err());
        let ftp = r#"{"sources":[{"name":"A","fetch_target":"ftp://a.test/","extraction":{"kind":"raw_numeric"}}]}"#;
        assert!(parse_sources(ftp, "json").is_err());
    }

    #[test]
    fn interval_env_names_are_derived() {
        assert_eq!(default_interval_env("Unisport Bern"), "CHECK_INTERVAL_UNISPORT_BERN");
        assert_eq!(default_interval_env("Fitnesspark-Bern"), "CHECK_INTERVAL_FITNESSPARK_BERN");
        assert_eq!(default_interval_env("--x--"), "CHECK_INTERVAL_X");
    }

    #[test]
    fn builtin_sources_are_valid() {
        let b = builtin_sources();
        validate_all(&b).unwrap();
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn select_by_name_case_insensitive() {
        let picked = select(builtin_sources(), &["unisport-zssw".to_string()]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name, "Unisport-Zssw");
        assert!(select(builtin_sources(), &["nope".to_string()]).is_err());
        assert_eq!(select(builtin_sources(), &[]).unwrap().len(), 2);
    }
}
