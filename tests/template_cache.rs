//! Directory-backed template cache tests
//!
//! These tests verify that:
//! 1. Templates load lazily from a directory, sorted by id
//! 2. Parameterized templates stay header-only until compiled
//! 3. Broken files and foreign extensions are skipped
//! 4. Reload picks up files added after the first load
//! 5. Concurrent first access, reloads and compiles never see a partial cache

use std::fs;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use flowsim::{CacheState, CompileOptions, ParamMap, ServiceConfig, TemplateService};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const CHECKOUT: &str = include_str!("../templates/checkout-service.yaml");
const PMF_DEMAND: &str = include_str!("../templates/pmf-demand.yaml");
const BACKLOG: &str = include_str!("../templates/backlog-queue.yaml");

const BROKEN: &str = "\
schemaVersion: 1
generator: flowsim
metadata:
  title: Missing its id
  version: 1.0.0
";

fn write(dir: &Path, name: &str, text: &str) {
    fs::write(dir.join(name), text).expect("Failed to write template");
}

fn template_dir() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    write(dir.path(), "checkout-service.yaml", CHECKOUT);
    write(dir.path(), "pmf-demand.yml", PMF_DEMAND);
    write(dir.path(), "backlog-queue.YAML", BACKLOG);
    write(dir.path(), "broken.yaml", BROKEN);
    write(dir.path(), "notes.txt", "not a template");
    dir
}

fn service(dir: &TempDir) -> TemplateService {
    TemplateService::new(ServiceConfig::new(dir.path()))
}

// =============================================================================
// LOADING
// =============================================================================

#[test]
fn test_list_templates() {
    let dir = template_dir();
    let templates = service(&dir).list_templates().expect("Failed to list");

    let listed: Vec<_> = templates
        .iter()
        .map(|t| (t.id.as_str(), t.source.as_str(), t.state))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("backlog-queue", "backlog-queue.YAML", CacheState::HeaderOnly),
            ("checkout-service", "checkout-service.yaml", CacheState::HeaderOnly),
            ("pmf-demand", "pmf-demand.yml", CacheState::Strict),
        ]
    );
}

#[test]
fn test_header_fields_without_substitution() {
    let dir = template_dir();
    let svc = service(&dir);

    let backlog = svc.get_template("backlog-queue").expect("Failed to get");
    assert_eq!(backlog.header.title, "Backlog queue");
    assert_eq!(backlog.header.version, "0.3.0");
    assert_eq!(backlog.header.tags, vec!["queue", "daily"]);
    assert_eq!(
        backlog.header.description.as_deref(),
        Some("Queue fed by a daily arrival pattern and drained at a fixed hourly capacity.")
    );
    let rng = backlog.header.rng.expect("rng header");
    assert_eq!(rng.kind.as_deref(), Some("pcg32"));

    assert!(svc.strict_template("backlog-queue").unwrap().is_none());
    let pmf = svc
        .strict_template("pmf-demand")
        .unwrap()
        .expect("strict template");
    assert_eq!(pmf.grid.bins, 3);
}

#[test]
fn test_unknown_id() {
    let dir = template_dir();
    let svc = service(&dir);
    assert!(svc.get_template("broken").unwrap_err().is_not_found());
    assert!(svc.strict_template("nope").unwrap_err().is_not_found());
}

#[test]
fn test_missing_directory() {
    let dir = TempDir::new().unwrap();
    let svc = TemplateService::new(ServiceConfig::new(dir.path().join("absent")));
    let err = svc.list_templates().unwrap_err();
    assert!(err.to_string().contains("absent"));
}

#[test]
fn test_duplicate_id_keeps_first_file() {
    let dir = template_dir();
    let copy = CHECKOUT.replace("title: Checkout service", "title: Second copy");
    write(dir.path(), "zz-checkout.yaml", &copy);

    let summary = service(&dir)
        .get_template("checkout-service")
        .expect("Failed to get");
    assert_eq!(summary.source, "checkout-service.yaml");
    assert_eq!(summary.header.title, "Checkout service");
}

// =============================================================================
// RELOAD AND COMPILE
// =============================================================================

#[test]
fn test_reload_picks_up_new_files() {
    let dir = template_dir();
    let svc = service(&dir);
    assert_eq!(svc.list_templates().unwrap().len(), 3);

    let extra = PMF_DEMAND.replace("id: pmf-demand", "id: pmf-demand-night");
    write(dir.path(), "pmf-demand-night.yaml", &extra);
    // Still cached
    assert_eq!(svc.list_templates().unwrap().len(), 3);

    svc.reload();
    let ids: Vec<_> = svc
        .list_templates()
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(
        ids,
        vec!["backlog-queue", "checkout-service", "pmf-demand", "pmf-demand-night"]
    );
}

#[test]
fn test_compile_from_directory() {
    let dir = template_dir();
    let svc = service(&dir);
    let model = svc
        .compile("checkout-service", &ParamMap::new(), &CompileOptions::default())
        .expect("Failed to compile");

    assert_eq!(model.artifact.provenance.source, "checkout-service.yaml");
    assert_eq!(model.artifact.provenance.template_id, "checkout-service");
    assert_eq!(model.artifact.provenance.template_version, "1.0.0");

    // Compiling does not upgrade the cached entry
    assert_eq!(
        svc.get_template("checkout-service").unwrap().state,
        CacheState::HeaderOnly
    );
}

#[test]
fn test_summary_serializes_state() {
    let dir = template_dir();
    let summary = service(&dir).get_template("pmf-demand").unwrap();
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["state"], "strict");
    assert_eq!(json["id"], "pmf-demand");
}

// =============================================================================
// CONCURRENCY
// =============================================================================

const BULK: usize = 400;

fn bulk_dir() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for i in 0..BULK {
        let text = PMF_DEMAND.replace("id: pmf-demand", &format!("id: bulk-{:04}", i));
        write(dir.path(), &format!("bulk-{:04}.yaml", i), &text);
    }
    dir
}

#[test]
fn test_reload_during_scan_leaves_full_cache() {
    let dir = bulk_dir();
    let svc = Arc::new(service(&dir));

    for delay_us in [0u64, 50, 200, 1_000, 5_000] {
        svc.reload();
        let reader = {
            let svc = Arc::clone(&svc);
            thread::spawn(move || svc.list_templates().map(|t| t.len()))
        };
        thread::sleep(Duration::from_micros(delay_us));
        svc.reload();

        let seen = reader.join().expect("reader panicked").expect("Failed to list");
        assert_eq!(seen, BULK, "listing during reload (delay {}us)", delay_us);
        assert_eq!(svc.list_templates().unwrap().len(), BULK);
    }
}

#[test]
fn test_concurrent_first_access_scans_once() {
    let dir = bulk_dir();
    let svc = Arc::new(service(&dir));
    let start = Arc::new(Barrier::new(8));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let svc = Arc::clone(&svc);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                svc.list_templates().expect("Failed to list")
            })
        })
        .collect();

    for worker in workers {
        let listed = worker.join().expect("worker panicked");
        assert_eq!(listed.len(), BULK);
        assert!(listed.iter().all(|t| t.state == CacheState::Strict));
    }
}

#[test]
fn test_parallel_compiles_agree() {
    let dir = template_dir();
    let svc = Arc::new(service(&dir));
    let at = chrono::DateTime::parse_from_rfc3339("2025-02-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let options = CompileOptions::default().at(at);
    let start = Arc::new(Barrier::new(6));

    let workers: Vec<_> = (0..6)
        .map(|i| {
            let svc = Arc::clone(&svc);
            let start = Arc::clone(&start);
            let options = options.clone();
            thread::spawn(move || {
                start.wait();
                let id = if i % 2 == 0 { "checkout-service" } else { "pmf-demand" };
                let model = svc
                    .compile(id, &ParamMap::new(), &options)
                    .expect("Failed to compile");
                (id, model.yaml)
            })
        })
        .collect();

    let results: Vec<_> = workers
        .into_iter()
        .map(|w| w.join().expect("worker panicked"))
        .collect();
    for (id, yaml) in &results {
        let expected = svc
            .compile(id, &ParamMap::new(), &options)
            .expect("Failed to compile")
            .yaml;
        assert_eq!(yaml, &expected);
    }
}
