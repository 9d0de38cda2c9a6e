//! End-to-end checks of the `fedsparql` binary's argument and config-loading surface (§6). These
//! stop short of exercising a real remote endpoint — that is covered by
//! `federation-core`'s own integration tests against mock HTTP fixtures — and instead pin down
//! the CLI's own error handling: bad flags, missing files, malformed TOML.

use assert_cmd::Command;
use predicates::str::contains;
use std::io::Write;
use tempfile::NamedTempFile;

fn members_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("tempfile creation");
    write!(file, "{contents}").expect("write members file");
    file
}

#[test]
fn rejects_neither_query_nor_query_file() {
    let members = members_file(
        r#"
        [[member]]
        id = "local"
        name = "Local store"
        type = "NativeStore"
        "#,
    );
    Command::cargo_bin("fedsparql")
        .unwrap()
        .args(["-d", members.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("exactly one of --query or --query-file"));
}

#[test]
fn rejects_both_query_and_query_file() {
    let members = members_file(
        r#"
        [[member]]
        id = "local"
        name = "Local store"
        type = "NativeStore"
        "#,
    );
    Command::cargo_bin("fedsparql")
        .unwrap()
        .args(["-d", members.path().to_str().unwrap(), "-q", "SELECT * WHERE { ?s ?p ?o }", "-Q", "/nonexistent"])
        .assert()
        .failure();
}

#[test]
fn reports_a_missing_members_file() {
    Command::cargo_bin("fedsparql")
        .unwrap()
        .args(["-d", "/no/such/members.toml", "-q", "SELECT * WHERE { ?s ?p ?o }"])
        .assert()
        .failure()
        .stderr(contains("loading federation members"));
}

#[test]
fn reports_malformed_members_toml() {
    let members = members_file("this is not valid toml [[[");
    Command::cargo_bin("fedsparql")
        .unwrap()
        .args(["-d", members.path().to_str().unwrap(), "-q", "SELECT * WHERE { ?s ?p ?o }"])
        .assert()
        .failure()
        .stderr(contains("loading federation members"));
}

#[test]
fn reports_a_malformed_query() {
    let members = members_file(
        r#"
        [[member]]
        id = "local"
        name = "Local store"
        type = "NativeStore"
        "#,
    );
    Command::cargo_bin("fedsparql")
        .unwrap()
        .args(["-d", members.path().to_str().unwrap(), "-q", "NOT A SPARQL QUERY"])
        .assert()
        .failure()
        .stderr(contains("preparing query"));
}

#[test]
fn reports_an_unplannable_query_form() {
    let members = members_file(
        r#"
        [[member]]
        id = "local"
        name = "Local store"
        type = "NativeStore"
        "#,
    );
    Command::cargo_bin("fedsparql")
        .unwrap()
        .args(["-d", members.path().to_str().unwrap(), "-q", "ASK { ?s ?p ?o }"])
        .assert()
        .failure()
        .stderr(contains("preparing query"));
}

#[test]
fn reports_a_local_member_missing_its_evaluator() {
    // `NativeStore`/`RemoteRepository` members need a `LocalEvaluator` supplied by the embedding
    // application; the bare CLI has none to offer, so registering one must fail loudly rather
    // than silently dropping the member from the federation.
    let members = members_file(
        r#"
        [[member]]
        id = "local"
        name = "Local store"
        type = "NativeStore"
        "#,
    );
    Command::cargo_bin("fedsparql")
        .unwrap()
        .args(["-d", members.path().to_str().unwrap(), "-q", "SELECT * WHERE { ?s ?p ?o }"])
        .assert()
        .failure()
        .stderr(contains("registering federation member"));
}
