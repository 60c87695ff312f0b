//! Build orchestrator tests: dependency graphing, staleness, and the
//! transpile pipeline. These run with `stop_at_transpile` so no C
//! compiler is needed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tomo::build::{BuildOptions, Builder, Staleness};
use tomo::emit::CEmitter;
use tomo::hashing::Table;

fn transpile_options() -> BuildOptions {
    BuildOptions {
        quiet: true,
        stop_at_transpile: true,
        ..BuildOptions::default()
    }
}

fn write_source(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.canonicalize().unwrap()
}

fn graph(builder: &Builder, root: &Path) -> (Table<PathBuf, Staleness>, Table<String, ()>) {
    let mut to_compile = Table::new();
    let mut to_link = Table::new();
    builder.build_dependency_graph(root, &mut to_compile, &mut to_link).unwrap();
    (to_compile, to_link)
}

#[test]
fn dependency_graph_has_no_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "c.tm", "func util() pass\n");
    // c is reachable both directly and through b:
    write_source(dir.path(), "b.tm", "use ./c.tm\nfunc helper() pass\n");
    let a_tm = write_source(
        dir.path(),
        "a.tm",
        "use ./b.tm\nuse ./c.tm\nfunc main() pass\n",
    );

    let emitter = CEmitter;
    let builder = Builder::new(transpile_options(), &emitter);
    let (to_compile, _) = graph(&builder, &a_tm);

    assert_eq!(to_compile.len(), 3);
    let mut names: Vec<String> = to_compile
        .keys()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(names, ["a.tm", "b.tm", "c.tm"]);
}

#[test]
fn dependency_cycles_terminate() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "b.tm", "use ./a.tm\nfunc b() pass\n");
    let a_tm = write_source(dir.path(), "a.tm", "use ./b.tm\nfunc a() pass\n");

    let emitter = CEmitter;
    let builder = Builder::new(transpile_options(), &emitter);
    let (to_compile, _) = graph(&builder, &a_tm);
    assert_eq!(to_compile.len(), 2);
}

#[test]
fn shared_object_uses_become_link_flags() {
    let dir = tempfile::tempdir().unwrap();
    let a_tm = write_source(dir.path(), "a.tm", "use -lcurl\nfunc main() pass\n");

    let emitter = CEmitter;
    let builder = Builder::new(transpile_options(), &emitter);
    let (_, to_link) = graph(&builder, &a_tm);
    let links: Vec<&String> = to_link.keys().collect();
    assert_eq!(links, [&"-lcurl".to_string()]);
}

#[test]
fn missing_local_dependency_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let a_tm = write_source(dir.path(), "a.tm", "use ./nope.tm\nfunc main() pass\n");

    let emitter = CEmitter;
    let builder = Builder::new(transpile_options(), &emitter);
    let mut to_compile = Table::new();
    let mut to_link = Table::new();
    assert!(builder
        .build_dependency_graph(&a_tm, &mut to_compile, &mut to_link)
        .is_err());
}

#[test]
fn transpile_writes_header_and_source() {
    let dir = tempfile::tempdir().unwrap();
    let a_tm = write_source(dir.path(), "a.tm", "func main() pass\n");

    let emitter = CEmitter;
    let builder = Builder::new(transpile_options(), &emitter);
    builder.compile_files(&[a_tm.clone()]).unwrap();

    let build_dir = dir.path().join(".build");
    assert!(build_dir.join("a.tm.h").is_file());
    assert!(build_dir.join("a.tm.c").is_file());
    assert!(build_dir.join("a.tm.id").is_file());

    // The C source carries the entry-point shim for main:
    let c_code = std::fs::read_to_string(build_dir.join("a.tm.c")).unwrap();
    assert!(c_code.contains("parse_and_run$"), "{c_code}");
    let id = std::fs::read_to_string(build_dir.join("a.tm.id")).unwrap();
    assert!(c_code.contains(&format!("{id}$main")), "{c_code}");
}

#[test]
fn unchanged_sources_are_not_retranspiled() {
    let dir = tempfile::tempdir().unwrap();
    let a_tm = write_source(dir.path(), "a.tm", "func main() pass\n");

    let emitter = CEmitter;
    let builder = Builder::new(transpile_options(), &emitter);
    builder.compile_files(&[a_tm.clone()]).unwrap();

    // Plant a marker: if the second run rewrites the outputs, the
    // marker disappears.
    let c_file = dir.path().join(".build/a.tm.c");
    let h_file = dir.path().join(".build/a.tm.h");
    let mut c_code = std::fs::read_to_string(&c_file).unwrap();
    c_code.push_str("/* marker */\n");
    std::fs::write(&c_file, &c_code).unwrap();
    let mut h_code = std::fs::read_to_string(&h_file).unwrap();
    h_code.push_str("/* marker */\n");
    std::fs::write(&h_file, &h_code).unwrap();

    builder.compile_files(&[a_tm.clone()]).unwrap();
    assert!(std::fs::read_to_string(&c_file).unwrap().contains("/* marker */"));
    assert!(std::fs::read_to_string(&h_file).unwrap().contains("/* marker */"));
}

#[test]
fn touching_a_dependency_makes_both_stale() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "b.tm", "func helper() pass\n");
    let a_tm = write_source(dir.path(), "a.tm", "use ./b.tm\nfunc main() pass\n");
    let b_tm = dir.path().join("b.tm").canonicalize().unwrap();

    let emitter = CEmitter;
    let builder = Builder::new(transpile_options(), &emitter);
    builder.compile_files(&[a_tm.clone()]).unwrap();

    // Clean state: nothing to re-transpile.
    let (to_compile, _) = graph(&builder, &a_tm);
    for (path, staleness) in to_compile.iter() {
        assert!(!staleness.h, "{} header should be fresh", path.display());
        assert!(!staleness.c, "{} source should be fresh", path.display());
    }

    // Touch the dependency (same content, newer mtime):
    std::thread::sleep(Duration::from_millis(1100));
    std::fs::write(&b_tm, "func helper() pass\n").unwrap();

    let (to_compile, _) = graph(&builder, &a_tm);
    for (path, staleness) in to_compile.iter() {
        assert!(
            staleness.c,
            "{} should be stale after touching b.tm",
            path.display()
        );
    }

    // Re-transpiling clears the staleness again:
    builder.compile_files(&[a_tm.clone()]).unwrap();
    let (to_compile, _) = graph(&builder, &a_tm);
    for (path, staleness) in to_compile.iter() {
        assert!(!staleness.c, "{} should be fresh again", path.display());
    }
}

#[test]
fn config_changes_invalidate_objects() {
    let dir = tempfile::tempdir().unwrap();
    let a_tm = write_source(dir.path(), "a.tm", "func main() pass\n");

    let emitter = CEmitter;
    let builder = Builder::new(transpile_options(), &emitter);
    builder.compile_files(&[a_tm.clone()]).unwrap();

    // No .config has been written yet (no object compile), so the
    // config always reads as outdated:
    assert!(builder.is_config_outdated(&a_tm).unwrap());

    // Simulate the object step writing the current summary:
    let config_file = dir.path().join(".build/a.tm.config");
    std::fs::write(&config_file, builder.options.config_summary()).unwrap();
    assert!(!builder.is_config_outdated(&a_tm).unwrap());

    // A different optimization level changes the summary:
    let changed = Builder::new(
        BuildOptions { optimization: "3".to_string(), ..transpile_options() },
        &emitter,
    );
    assert!(changed.is_config_outdated(&a_tm).unwrap());
}

#[test]
fn header_regeneration_marks_objects_stale() {
    let dir = tempfile::tempdir().unwrap();
    let a_tm = write_source(dir.path(), "a.tm", "func main() pass\n");

    let emitter = CEmitter;
    let builder = Builder::new(transpile_options(), &emitter);
    let (to_compile, _) = graph(&builder, &a_tm);
    let (_, staleness) = to_compile.iter().next().unwrap();
    assert!(staleness.h && staleness.c && staleness.o);
}

#[test]
fn after_a_build_outputs_are_not_older_than_sources() {
    let dir = tempfile::tempdir().unwrap();
    let a_tm = write_source(dir.path(), "a.tm", "func main() pass\n");

    let emitter = CEmitter;
    let builder = Builder::new(transpile_options(), &emitter);
    builder.compile_files(&[a_tm.clone()]).unwrap();

    let mtime = |p: &Path| std::fs::metadata(p).unwrap().modified().unwrap();
    let build_dir = dir.path().join(".build");
    assert!(mtime(&build_dir.join("a.tm.h")) >= mtime(&a_tm));
    assert!(mtime(&build_dir.join("a.tm.c")) >= mtime(&a_tm));
}
