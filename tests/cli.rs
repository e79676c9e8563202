//! End-to-end runs of the binary against a snapshot store.

mod common;

use common::{sample_catalog, store_row, Workspace};
use serde_json::json;

#[test]
fn init_writes_stub_and_refuses_to_overwrite() {
    let ws = Workspace::new();
    let first = ws.run(&["init", "--config", "sync.json"]);
    assert!(first.success, "init failed: {}", first.stderr);
    let config = ws.read_json("sync.json");
    assert_eq!(config["schema_version"], 1);
    assert_eq!(config["sync_field"], "sync");

    let second = ws.run(&["init", "--config", "sync.json"]);
    assert!(!second.success);
    assert!(second.stderr.contains("already exists"), "{}", second.stderr);

    let forced = ws.run(&["init", "--config", "sync.json", "--force"]);
    assert!(forced.success, "{}", forced.stderr);
}

#[test]
fn flatten_and_reconstruct_work_offline() {
    let ws = Workspace::new();
    ws.write_json("catalog.json", &sample_catalog());

    let flat = ws.run(&["flatten", "--catalog", "catalog.json", "--out", "tables.json"]);
    assert!(flat.success, "flatten failed: {}", flat.stderr);
    let tables = ws.read_json("tables.json");
    let offers = tables["offers"].as_array().expect("offers");
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0]["reward_type"], json!({"select": "percent"}));
    assert_eq!(tables["windows"].as_array().map(Vec::len), Some(3));

    let rebuilt = ws.run(&["reconstruct", "--records", "tables.json"]);
    assert!(rebuilt.success, "reconstruct failed: {}", rebuilt.stderr);
    let output: serde_json::Value = serde_json::from_str(&rebuilt.stdout).expect("json output");
    assert_eq!(output["patches"]["modules"]["offerX"]["rate"], 4);
    assert_eq!(
        output["patches"]["campaigns"]["spring"]["period_policy"]["mode"],
        "composite"
    );
}

#[test]
fn push_edit_pull_round_trip() {
    let ws = Workspace::new();
    ws.write_json("catalog.json", &sample_catalog());
    let common = ["--catalog", "catalog.json", "--store-file", "store.json"];

    let mut push = vec!["push"];
    push.extend(common);
    let pushed = ws.run(&push);
    assert!(pushed.success, "push failed: {}", pushed.stderr);
    assert!(pushed.stdout.contains("pushed"), "{}", pushed.stdout);

    // Edit the offer as an editor would and tick its sync box.
    let mut store = ws.read_json("store.json");
    let row = store_row(&mut store, "offers", "offer_id", "offerX");
    row["fields"]["reward_value"] = json!({"number": 7.0});
    row["fields"]["sync"] = json!({"checkbox": true});
    ws.write_json("store.json", &store);

    let mut pull = vec!["pull", "--acknowledge"];
    pull.extend(common);
    let pulled = ws.run(&pull);
    assert!(pulled.success, "pull failed: {}", pulled.stderr);
    assert!(pulled.stdout.contains("pulled 1 rows"), "{}", pulled.stdout);

    let catalog = ws.read_json("catalog.json");
    assert_eq!(catalog["modules"]["offerX"]["rate"], 7.0);
    assert_eq!(catalog["modules"]["offerX"]["match"], json!(["dining"]));

    let mut store = ws.read_json("store.json");
    let row = store_row(&mut store, "offers", "offer_id", "offerX");
    assert_eq!(row["fields"]["sync"], json!({"checkbox": false}));
}

#[test]
fn dry_run_pull_writes_patches_only() {
    let ws = Workspace::new();
    ws.write_json("catalog.json", &sample_catalog());
    let common = ["--catalog", "catalog.json", "--store-file", "store.json"];
    let mut push = vec!["push"];
    push.extend(common);
    assert!(ws.run(&push).success);

    let mut store = ws.read_json("store.json");
    let row = store_row(&mut store, "categories", "category_key", "dining");
    row["fields"]["label"] = json!({"text": "Restaurants"});
    row["fields"]["sync"] = json!({"checkbox": true});
    ws.write_json("store.json", &store);

    let mut pull = vec!["pull", "--dry-run", "--patches-out", "patches.json"];
    pull.extend(common);
    let pulled = ws.run(&pull);
    assert!(pulled.success, "pull failed: {}", pulled.stderr);

    let patches = ws.read_json("patches.json");
    assert_eq!(patches["categories"]["dining"]["label"], "Restaurants");
    let catalog = ws.read_json("catalog.json");
    assert_eq!(catalog["categories"]["dining"]["label"], "Dining");
}

#[test]
fn explicit_missing_config_fails() {
    let ws = Workspace::new();
    ws.write_json("catalog.json", &sample_catalog());
    let run = ws.run(&[
        "push",
        "--config",
        "missing.json",
        "--catalog",
        "catalog.json",
        "--store-file",
        "store.json",
    ]);
    assert!(!run.success);
    assert!(run.stderr.contains("does not exist"), "{}", run.stderr);
}
