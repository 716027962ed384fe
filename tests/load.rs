use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use dotenvkit::{Encoding, EnvLoader, Error, TargetEnv, dotenv_values, get_key};

#[test]
fn override_existing_false_skips_existing_values() {
    let dir = make_temp_dir();
    let file = dir.path().join(".env");
    write_file(&file, "A=from_file\nB=2\n");

    let mut loader = EnvLoader::new()
        .path(&file)
        .target(memory(&[("A", "existing")]))
        .override_existing(false);

    let report = loader.load().expect("load should succeed");
    assert_eq!(report.files_read, 1);
    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped_existing, 1);

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("A").expect("A should exist"), "existing");
    assert_eq!(map.get("B").expect("B should exist"), "2");
}

#[test]
fn override_existing_true_replaces_values() {
    let dir = make_temp_dir();
    let file = dir.path().join(".env");
    write_file(&file, "A=from_file\n");

    let mut loader = EnvLoader::new()
        .path(&file)
        .target(memory(&[("A", "existing")]))
        .override_existing(true);

    let report = loader.load().expect("load should succeed");
    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped_existing, 0);

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("A").expect("A should exist"), "from_file");
}

#[test]
fn multi_file_load_uses_last_file_precedence() {
    let dir = make_temp_dir();
    let first = dir.path().join(".env.base");
    let second = dir.path().join(".env.local");
    write_file(&first, "A=base\nB=base\n");
    write_file(&second, "B=local\nC=${A}-local\n");

    let mut loader = EnvLoader::new()
        .paths([first, second])
        .target(TargetEnv::memory());

    let report = loader.load().expect("load should succeed");
    assert_eq!(report.files_read, 2);
    assert_eq!(report.loaded, 3);
    assert_eq!(report.skipped_existing, 0);

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("A").expect("A should exist"), "base");
    assert_eq!(map.get("B").expect("B should exist"), "local");
    assert_eq!(map.get("C").expect("C should exist"), "base-local");
}

#[test]
fn parse_only_keeps_first_seen_order_across_files() {
    let dir = make_temp_dir();
    let first = dir.path().join("one.env");
    let second = dir.path().join("two.env");
    write_file(&first, "Z=1\nA=1\n");
    write_file(&second, "M=2\nZ=2\n");

    let values = EnvLoader::new()
        .paths([&first, &second])
        .target(TargetEnv::memory())
        .parse_only()
        .expect("parse should succeed");

    let pairs: Vec<_> = values.iter().collect();
    assert_eq!(pairs, vec![("Z", "2"), ("A", "1"), ("M", "2")]);
}

#[test]
fn missing_optional_file_is_skipped() {
    let dir = make_temp_dir();
    let real = dir.path().join(".env.real");
    write_file(&real, "A=loaded\n");

    let mut loader = EnvLoader::new()
        .paths([dir.path().join("missing.env"), real])
        .verbose(true)
        .target(TargetEnv::memory());

    let report = loader.load().expect("load should succeed");
    assert_eq!(report.files_read, 1);
    assert_eq!(report.loaded, 1);
}

#[test]
fn missing_required_file_fails() {
    let dir = make_temp_dir();
    let missing = dir.path().join("missing.env");

    let mut loader = EnvLoader::new()
        .path(&missing)
        .required(true)
        .target(TargetEnv::memory());
    let err = loader.load().expect_err("expected missing file error");

    match err {
        Error::FileNotFound { path } => assert_eq!(path, missing),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn malformed_lines_are_skipped() {
    let dir = make_temp_dir();
    let file = dir.path().join(".env");
    write_file(&file, "A=ok\nBAD LINE\nC='unterminated\nD=fine\n");

    let mut loader = EnvLoader::new().path(&file).target(TargetEnv::memory());
    let report = loader.load().expect("load should succeed");
    assert_eq!(report.loaded, 2);

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("A").map(String::as_str), Some("ok"));
    assert_eq!(map.get("D").map(String::as_str), Some("fine"));
}

#[test]
fn interpolation_uses_target_environment_for_missing_values() {
    let dir = make_temp_dir();
    let file = dir.path().join(".env");
    write_file(&file, "OUT=${BASE}/bin\nDEF=${UNSET:-fallback}\n");

    let mut loader = EnvLoader::new()
        .path(&file)
        .target(memory(&[("BASE", "/opt/app")]));
    loader.load().expect("load should succeed");

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("OUT").expect("OUT should exist"), "/opt/app/bin");
    assert_eq!(map.get("DEF").expect("DEF should exist"), "fallback");
}

#[test]
fn interpolation_respects_override_existing_false() {
    let dir = make_temp_dir();
    let file = dir.path().join(".env");
    write_file(&file, "A=file\nB=${A}\n");

    let mut loader = EnvLoader::new()
        .path(&file)
        .target(memory(&[("A", "existing")]))
        .override_existing(false);

    let report = loader.load().expect("load should succeed");
    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped_existing, 1);

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("A").expect("A should exist"), "existing");
    assert_eq!(map.get("B").expect("B should exist"), "existing");
}

#[test]
fn unknown_references_expand_to_empty_and_bare_dollar_is_literal() {
    let dir = make_temp_dir();
    let file = dir.path().join(".env");
    write_file(&file, "A=prefix-${MISSING}-$OTHER-suffix\n");

    let mut loader = EnvLoader::new().path(&file).target(TargetEnv::memory());
    loader.load().expect("load should succeed");

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("A").expect("A should exist"), "prefix--$OTHER-suffix");
}

#[test]
fn latin1_file_loads_with_matching_encoding() {
    let dir = make_temp_dir();
    let file = dir.path().join(".env");
    std::fs::write(&file, b"A=caf\xe9\n").expect("failed to write test file");

    let values = EnvLoader::new()
        .path(&file)
        .encoding(Encoding::Latin1)
        .target(TargetEnv::memory())
        .parse_only()
        .expect("parse should succeed");
    assert_eq!(values.get("A"), Some("café"));

    let err = EnvLoader::new()
        .path(&file)
        .target(TargetEnv::memory())
        .parse_only()
        .expect_err("utf-8 decoding should fail");
    assert!(matches!(err, Error::InvalidEncoding(_)));
}

#[test]
fn search_upward_true_finds_parent_file() {
    let dir = make_temp_dir();
    let parent = dir.path().join("parent");
    let child = parent.join("child");
    std::fs::create_dir_all(&child).expect("failed to create child dir");
    write_file(&parent.join(".env.upward"), "A=upward\n");

    let (report, target) = with_current_dir(&child, || {
        let mut loader = EnvLoader::new()
            .path(".env.upward")
            .search_upward(true)
            .target(TargetEnv::memory());
        let report = loader.load().expect("load should succeed");
        (report, loader.into_target())
    });

    assert_eq!(report.files_read, 1);
    assert_eq!(report.loaded, 1);
    let map = target.as_memory().expect("memory target");
    assert_eq!(map.get("A").expect("A should exist"), "upward");
}

#[test]
fn search_upward_false_does_not_walk_parents() {
    let dir = make_temp_dir();
    let parent = dir.path().join("parent");
    let child = parent.join("child");
    std::fs::create_dir_all(&child).expect("failed to create child dir");
    write_file(&parent.join(".env.upward"), "A=upward\n");

    let err = with_current_dir(&child, || {
        let mut loader = EnvLoader::new()
            .path(".env.upward")
            .required(true)
            .target(TargetEnv::memory());
        loader.load().expect_err("expected missing file error")
    });

    assert!(matches!(err, Error::FileNotFound { .. }));
}

#[test]
fn dotenv_values_on_missing_file_is_empty() {
    let dir = make_temp_dir();
    let values =
        dotenv_values(dir.path().join("nope.env"), true, Encoding::Utf8).expect("values");
    assert!(values.is_empty());
}

#[test]
fn dotenv_values_decodes_requested_encoding() {
    let dir = make_temp_dir();
    let file = dir.path().join(".env");
    std::fs::write(&file, b"NAME=caf\xe9\nGREETING=${NAME} cr\xe8me\n")
        .expect("failed to write test file");

    let values = dotenv_values(&file, true, Encoding::Latin1).expect("latin-1 values");
    assert_eq!(values.get("NAME"), Some("café"));
    assert_eq!(values.get("GREETING"), Some("café crème"));

    let err = dotenv_values(&file, true, Encoding::Utf8).expect_err("utf-8 decoding should fail");
    assert!(matches!(err, Error::InvalidEncoding(_)));
}

#[test]
fn get_key_distinguishes_missing_file_and_key() {
    let dir = make_temp_dir();
    let file = dir.path().join(".env");
    write_file(&file, "A=1\nB=${A}2\nNOVALUE\n");

    assert_eq!(
        get_key(&file, "B", Encoding::Utf8).expect("get"),
        Some("12".to_owned())
    );
    assert_eq!(get_key(&file, "C", Encoding::Utf8).expect("get"), None);
    assert_eq!(get_key(&file, "NOVALUE", Encoding::Utf8).expect("get"), None);

    let err = get_key(dir.path().join("nope.env"), "A", Encoding::Utf8).expect_err("missing");
    assert!(matches!(err, Error::FileNotFound { .. }));
}

#[cfg(unix)]
#[test]
fn reads_from_named_pipe() {
    use std::process::Command;

    let dir = make_temp_dir();
    let fifo = dir.path().join(".env");
    let status = Command::new("mkfifo")
        .arg(&fifo)
        .status()
        .expect("failed to run mkfifo");
    assert!(status.success());

    let writer_path = fifo.clone();
    let writer = std::thread::spawn(move || {
        std::fs::write(writer_path, "a=b\n").expect("failed to write to fifo");
    });

    let values = dotenv_values(&fifo, true, Encoding::Utf8).expect("values");
    writer.join().expect("writer thread panicked");
    assert_eq!(values.get("a"), Some("b"));
}

fn memory(pairs: &[(&str, &str)]) -> TargetEnv {
    TargetEnv::from_memory(
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn make_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("failed to create temp dir")
}

fn write_file(path: &Path, content: &str) {
    std::fs::write(path, content).expect("failed to write test file");
}

fn with_current_dir<R>(dir: &Path, f: impl FnOnce() -> R) -> R {
    let _lock = cwd_lock().lock().expect("cwd lock should not be poisoned");
    let _guard = CurrentDirGuard::enter(dir);
    f()
}

fn cwd_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

struct CurrentDirGuard {
    original: PathBuf,
}

impl CurrentDirGuard {
    fn enter(dir: &Path) -> Self {
        let original = std::env::current_dir().expect("failed to read current dir");
        std::env::set_current_dir(dir).expect("failed to set current dir");
        Self { original }
    }
}

impl Drop for CurrentDirGuard {
    fn drop(&mut self) {
        std::env::set_current_dir(&self.original).expect("failed to restore current dir");
    }
}
