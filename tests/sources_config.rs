// tests/sources_config.rs
use occupancy_poller::config::sources::{builtin_sources, ENV_SOURCES_PATH};
use occupancy_poller::config::{load_sources_default, load_sources_from};
use occupancy_poller::extract::ExtractionMethod;
use std::{env, fs};

#[test]
fn parse_toml_and_json_paths() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("sources.toml");
    fs::write(
        &p_toml,
        r#"
[[sources]]
name = " Hallenbad "
fetch_target = "https://pool.example.test/count"
extraction = { kind = "raw_numeric" }
"#,
    )
    .unwrap();
    let v = load_sources_from(&p_toml).unwrap();
    assert_eq!(v.len(), 1);
    assert_eq!(v[0].name, "Hallenbad");
    assert_eq!(v[0].partition, "Hallenbad");
    assert_eq!(v[0].interval_env, "CHECK_INTERVAL_HALLENBAD");

    let p_json = dir.path().join("sources.json");
    fs::write(
        &p_json,
        r##"{"sources":[{"name":"Kletterhalle","fetch_target":"https://climb.example.test/",
            "extraction":{"kind":"selector_scrape","selector":"#count","separator":" / "}}]}"##,
    )
    .unwrap();
    let vj = load_sources_from(&p_json).unwrap();
    assert_eq!(
        vj[0].extraction,
        ExtractionMethod::SelectorScrape {
            selector: "#count".into(),
            separator: " / ".into()
        }
    );
}

#[test]
fn empty_source_list_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("sources.toml");
    fs::write(&p, "sources = []\n").unwrap();
    let err = load_sources_from(&p).unwrap_err();
    assert!(format!("{err:#}").contains("no sources configured"), "{err:#}");
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // Isolate CWD so the repo's own config/ is not picked up.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();

    env::remove_var(ENV_SOURCES_PATH);

    // 1) nothing on disk -> built-in venues
    let v = load_sources_default().unwrap();
    assert_eq!(v, builtin_sources());

    // 2) fallback JSON in ./config/
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(
        cfg_dir.join("sources.json"),
        r#"{"sources":[{"name":"J","fetch_target":"http://j.test/","extraction":{"kind":"raw_numeric"}}]}"#,
    )
    .unwrap();
    assert_eq!(load_sources_default().unwrap()[0].name, "J");

    // 3) TOML wins over JSON
    fs::write(
        cfg_dir.join("sources.toml"),
        r#"
[[sources]]
name = "T"
fetch_target = "http://t.test/"
extraction = { kind = "raw_numeric" }
"#,
    )
    .unwrap();
    assert_eq!(load_sources_default().unwrap()[0].name, "T");

    // 4) env var wins over everything
    let p_env = tmp.path().join("elsewhere.json");
    fs::write(
        &p_env,
        r#"{"sources":[{"name":"E","fetch_target":"http://e.test/","extraction":{"kind":"raw_numeric"}}]}"#,
    )
    .unwrap();
    env::set_var(ENV_SOURCES_PATH, p_env.display().to_string());
    assert_eq!(load_sources_default().unwrap()[0].name, "E");

    // 5) env var pointing nowhere is an error, not a silent fallback
    env::set_var(ENV_SOURCES_PATH, tmp.path().join("missing.toml").display().to_string());
    assert!(load_sources_default().is_err());

    env::remove_var(ENV_SOURCES_PATH);
    env::set_current_dir(&old).unwrap();
}
