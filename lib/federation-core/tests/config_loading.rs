//! Exercises the file-reading half of config loading (§6) that the in-module unit tests in
//! `config.rs` skip by going through `from_str` directly.

use federation_core::config::FederationMembers;
use federation_core::EngineConfig;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_toml(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("tempfile creation");
    write!(file, "{contents}").expect("write config file");
    file
}

#[test]
fn loads_federation_members_from_a_file() {
    let file = write_toml(
        r#"
        [[member]]
        id = "dbpedia"
        name = "DBpedia"
        type = "SparqlEndpoint"
        location = "https://dbpedia.org/sparql"

        [[member]]
        id = "swdf"
        name = "SemanticWebDogFood"
        type = "SparqlEndpoint"
        location = "https://data.semanticweb.org/sparql"
        "#,
    );
    let members = FederationMembers::load(file.path()).expect("loading the members file");
    assert_eq!(members.members.len(), 2);
    assert_eq!(members.members[0].id, "dbpedia");
    assert_eq!(members.members[1].id, "swdf");
}

#[test]
fn missing_members_file_is_an_io_error() {
    let result = FederationMembers::load(std::path::Path::new("/no/such/path/members.toml"));
    assert!(matches!(result, Err(federation_core::ConfigError::Io { .. })));
}

#[test]
fn malformed_members_file_is_a_toml_error() {
    let file = write_toml("not valid toml [[[");
    let result = FederationMembers::load(file.path());
    assert!(matches!(result, Err(federation_core::ConfigError::Toml { .. })));
}

#[test]
fn loads_engine_config_overrides_from_a_file() {
    let file = write_toml(
        r#"
        join_worker_threads = 4
        union_worker_threads = 2
        bound_join_block_size = 20
        enable_monitoring = true
        "#,
    );
    let config = EngineConfig::load(file.path()).expect("loading the engine config file");
    assert_eq!(config.join_worker_threads, 4);
    assert_eq!(config.union_worker_threads, 2);
    assert_eq!(config.bound_join_block_size, 20);
    assert!(config.enable_monitoring);
    // Fields the file doesn't mention still fall back to the engine's compiled-in defaults.
    assert_eq!(config.shutdown_grace_period_secs, EngineConfig::default().shutdown_grace_period_secs);
}
