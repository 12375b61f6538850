use fileserver::config::{AcceptPolicy, Config};
use std::collections::HashMap;
use std::path::PathBuf;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_config_defaults() {
    let cfg = Config::load_from(lookup(&[])).unwrap();
    assert_eq!(cfg.listen_addr, "0.0.0.0:8888");
    assert_eq!(cfg.workers, 4);
    assert_eq!(cfg.serve_dir, PathBuf::from("filedir"));
    assert_eq!(cfg.template_path, PathBuf::from("html/filelist.html"));
    assert_eq!(cfg.accept_policy, AcceptPolicy::Single);
    assert!(cfg.cache.enabled);
    assert_eq!(cfg.cache.project_id, 65);
    assert_eq!(cfg.cache.capacity, 1024);
}

#[test]
fn test_config_env_overrides() {
    let cfg = Config::load_from(lookup(&[
        ("LISTEN", "127.0.0.1:3000"),
        ("WORKERS", "8"),
        ("SERVE_DIR", "/srv/files"),
        ("TEMPLATE", "/srv/list.html"),
    ]))
    .unwrap();
    assert_eq!(cfg.listen_addr, "127.0.0.1:3000");
    assert_eq!(cfg.workers, 8);
    assert_eq!(cfg.serve_dir, PathBuf::from("/srv/files"));
    assert_eq!(cfg.template_path, PathBuf::from("/srv/list.html"));
}

#[test]
fn test_config_rejects_bad_worker_count() {
    assert!(Config::load_from(lookup(&[("WORKERS", "many")])).is_err());
    assert!(Config::load_from(lookup(&[("WORKERS", "0")])).is_err());
}

#[test]
fn test_config_from_yaml() {
    let cfg = Config::from_yaml_str(
        "listen_addr: 127.0.0.1:9000\nworkers: 2\naccept_policy: drain\ncache:\n  enabled: false\n",
    )
    .unwrap();
    assert_eq!(cfg.listen_addr, "127.0.0.1:9000");
    assert_eq!(cfg.workers, 2);
    assert_eq!(cfg.accept_policy, AcceptPolicy::Drain);
    assert!(!cfg.cache.enabled);
    assert_eq!(cfg.serve_dir, PathBuf::from("filedir"));
}

#[test]
fn test_config_file_then_env() {
    let path = std::env::temp_dir().join(format!("fileserver-config-{}.yaml", std::process::id()));
    std::fs::write(&path, "listen_addr: 127.0.0.1:9000\nworkers: 2\n").unwrap();

    let path_str = path.to_string_lossy().to_string();
    let cfg = Config::load_from(lookup(&[
        ("FILESERVER_CONFIG", path_str.as_str()),
        ("WORKERS", "6"),
    ]))
    .unwrap();
    assert_eq!(cfg.listen_addr, "127.0.0.1:9000");
    assert_eq!(cfg.workers, 6);

    let _ = std::fs::remove_file(path);
}

#[test]
fn test_config_missing_file_is_an_error() {
    let missing = lookup(&[("FILESERVER_CONFIG", "/nonexistent/fileserver.yaml")]);
    assert!(Config::load_from(missing).is_err());
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::load_from(lookup(&[])).unwrap();
    let cfg2 = cfg1.clone();
    assert_eq!(cfg1.listen_addr, cfg2.listen_addr);
}
