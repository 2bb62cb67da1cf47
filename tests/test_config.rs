use std::collections::HashMap;
use std::io::Write;

use lantern::config::Config;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

#[test]
fn test_config_defaults() {
    let cfg = Config::from_lookup(lookup(&[])).unwrap();
    assert_eq!(cfg, Config::default());
    assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
    assert_eq!(cfg.workers, 8);
    assert_eq!(cfg.backlog, 128);
}

#[test]
fn test_config_custom_address_from_env() {
    let cfg = Config::from_lookup(lookup(&[("LISTEN", "127.0.0.1:3000")])).unwrap();
    assert_eq!(cfg.listen_addr, "127.0.0.1:3000");
    assert_eq!(cfg.workers, 8);
}

#[test]
fn test_config_numeric_overrides() {
    let cfg = Config::from_lookup(lookup(&[("WORKERS", "2"), ("BACKLOG", "16")])).unwrap();
    assert_eq!(cfg.workers, 2);
    assert_eq!(cfg.backlog, 16);
}

#[test]
fn test_config_rejects_bad_numbers() {
    let err = Config::from_lookup(lookup(&[("WORKERS", "many")])).unwrap_err();
    assert!(err.to_string().contains("WORKERS"));

    assert!(Config::from_lookup(lookup(&[("BACKLOG", "-")])).is_err());
}

#[test]
fn test_config_validation() {
    assert!(Config::from_lookup(lookup(&[("WORKERS", "0")])).is_err());
    assert!(Config::from_lookup(lookup(&[("BACKLOG", "0")])).is_err());
    assert!(Config::from_lookup(lookup(&[("LISTEN", "")])).is_err());
    assert!(Config::default().validate().is_ok());
}

#[test]
fn test_config_from_yaml() {
    let cfg = Config::from_yaml("listen_addr: \"localhost:9898\"\nworkers: 4\n").unwrap();
    assert_eq!(cfg.listen_addr, "localhost:9898");
    assert_eq!(cfg.workers, 4);
    assert_eq!(cfg.backlog, 128);
}

#[test]
fn test_config_yaml_rejects_unknown_keys() {
    assert!(Config::from_yaml("listen: \"x\"\n").is_err());
    assert!(Config::from_yaml("workers: lots\n").is_err());
}

#[test]
fn test_config_file_then_env() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "listen_addr: \"127.0.0.1:7000\"").unwrap();
    writeln!(file, "workers: 3").unwrap();
    let path = file.path().to_str().unwrap().to_owned();

    let cfg = Config::from_lookup(lookup(&[("LANTERN_CONFIG", path.as_str())])).unwrap();
    assert_eq!(cfg.listen_addr, "127.0.0.1:7000");
    assert_eq!(cfg.workers, 3);

    let cfg = Config::from_lookup(lookup(&[("LANTERN_CONFIG", path.as_str()), ("WORKERS", "5")])).unwrap();
    assert_eq!(cfg.listen_addr, "127.0.0.1:7000");
    assert_eq!(cfg.workers, 5);
}

#[test]
fn test_config_missing_file() {
    let err = Config::from_lookup(lookup(&[("LANTERN_CONFIG", "/nonexistent/lantern.yaml")]))
        .unwrap_err();
    assert!(format!("{err:#}").contains("/nonexistent/lantern.yaml"));
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::default();
    let cfg2 = cfg1.clone();
    assert_eq!(cfg1.listen_addr, cfg2.listen_addr);
}
