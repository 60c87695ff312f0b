//! Per-file build layout, identities, staleness, and the dependency
//! graph over `use` statements.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rand::Rng;

use crate::ast::{AstNode, UseKind};
use crate::build::{io_err, library, BuildError, BuildResult, Builder};
use crate::hashing::Table;

/// Which build artifacts of a file must be regenerated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Staleness {
    pub h: bool,
    pub c: bool,
    pub o: bool,
}

impl<'e> Builder<'e> {
    /// `dirname(P)/.build/basename(P)<extension>`, creating the
    /// `.build` directory as needed.
    pub fn build_file(&self, path: &Path, extension: &str) -> BuildResult<PathBuf> {
        let parent = path.parent().unwrap_or(Path::new("."));
        let build_dir = parent.join(".build");
        if !build_dir.is_dir() {
            std::fs::create_dir_all(&build_dir)
                .map_err(io_err(format!("Could not make .build directory in {}", parent.display())))?;
        }
        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(build_dir.join(format!("{base}{extension}")))
    }

    /// The stable per-file identity: an alphanumeric prefix of the
    /// basename plus 8 random alphanumeric characters, generated once
    /// and stored in `P.id`.
    pub fn ensure_identity(&self, path: &Path) -> BuildResult<String> {
        let id_file = self.build_file(path, ".id")?;
        if let Ok(existing) = std::fs::read_to_string(&id_file) {
            let existing = existing.trim().to_string();
            if !existing.is_empty() {
                return Ok(existing);
            }
        }

        const ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..8)
            .map(|_| ID_CHARS[rng.gen_range(0..ID_CHARS.len())] as char)
            .collect();

        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let prefix: String = base
            .chars()
            .take_while(|&c| c != '.')
            .filter(|&c| c.is_ascii_alphanumeric() || c == '_')
            .collect();

        let identity = format!("{prefix}_{suffix}");
        std::fs::write(&id_file, &identity)
            .map_err(io_err(format!("Could not write identity file: {}", id_file.display())))?;
        Ok(identity)
    }

    fn mtime(path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    /// Is `target` older than `relative_to` (or older than the
    /// compiler itself)? A missing target is stale; a missing
    /// `relative_to` is an error unless `ignore_missing`.
    pub fn is_stale(&self, target: &Path, relative_to: &Path, ignore_missing: bool) -> BuildResult<bool> {
        let target_mtime = match Builder::mtime(target) {
            Some(mtime) => mtime,
            None => return Ok(!ignore_missing),
        };

        if let Some(compiler_mtime) = self.compiler_mtime {
            if target_mtime < compiler_mtime {
                return Ok(true);
            }
        }

        match Builder::mtime(relative_to) {
            Some(relative_mtime) => Ok(target_mtime < relative_mtime),
            None => {
                if ignore_missing {
                    Ok(false)
                } else {
                    Err(BuildError::Other(format!("File doesn't exist: {}", relative_to.display())))
                }
            }
        }
    }

    pub fn is_stale_for_any(
        &self,
        target: &Path,
        relative_to: &[PathBuf],
        ignore_missing: bool,
    ) -> BuildResult<bool> {
        for r in relative_to {
            if self.is_stale(target, r, ignore_missing)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Does `P.config` match the current compiler configuration?
    pub fn is_config_outdated(&self, path: &Path) -> BuildResult<bool> {
        let config_file = self.build_file(path, ".config")?;
        match std::fs::read_to_string(&config_file) {
            Ok(config) => Ok(config != self.config_summary),
            Err(_) => Ok(true),
        }
    }

    fn initial_staleness(&self, path: &Path) -> BuildResult<Staleness> {
        let modules_ini = path.with_file_name("modules.ini");
        let h_file = self.build_file(path, ".h")?;
        let c_file = self.build_file(path, ".c")?;
        let o_file = self.build_file(path, ".o")?;
        let id_file = self.build_file(path, ".id")?;

        // A missing identity file means a fresh identity (and fresh
        // mangled symbols), so everything downstream is stale:
        let id_missing = !id_file.exists();
        let mut staleness = Staleness {
            h: id_missing
                || self.is_stale(&h_file, &modules_ini, true)?
                || self.is_stale(&h_file, path, false)?
                || self.is_stale(&h_file, &id_file, true)?,
            c: id_missing
                || self.is_stale(&c_file, &modules_ini, true)?
                || self.is_stale(&c_file, path, false)?
                || self.is_stale(&c_file, &id_file, true)?,
            o: false,
        };
        staleness.o = staleness.c
            || staleness.h
            || self.is_stale(&o_file, &c_file, false)?
            || self.is_stale(&o_file, &h_file, false)?;
        Ok(staleness)
    }

    /// Recursively add `path` and everything it `use`s to the compile
    /// and link tables. Local dependencies make their importer stale
    /// when they are newer than its outputs.
    pub fn build_dependency_graph(
        &self,
        path: &Path,
        to_compile: &mut Table<PathBuf, Staleness>,
        to_link: &mut Table<String, ()>,
    ) -> BuildResult<()> {
        if to_compile.contains_key(&path.to_path_buf()) {
            return Ok(());
        }

        let mut staleness = self.initial_staleness(path)?;
        to_compile.set(path.to_path_buf(), staleness);

        let ast = self.parse(path)?;
        let statements = match &ast.node {
            AstNode::Block(statements) => statements.clone(),
            _ => vec![],
        };
        for stmt in &statements {
            let (use_path, what) = match &stmt.node {
                AstNode::Use { path, what, .. } => (path.clone(), *what),
                _ => continue,
            };
            match what {
                UseKind::Local => {
                    let parent = path.parent().unwrap_or(Path::new("."));
                    let dep_tm = library::resolve_relative(&use_path, parent);
                    if !dep_tm.is_file() {
                        return Err(BuildError::Other(format!(
                            "Not a valid file: {}",
                            dep_tm.display()
                        )));
                    }
                    if self.is_stale(&self.build_file(path, ".h")?, &dep_tm, false)? {
                        staleness.h = true;
                    }
                    if self.is_stale(&self.build_file(path, ".c")?, &dep_tm, false)? {
                        staleness.c = true;
                    }
                    if staleness.c || staleness.h {
                        staleness.o = true;
                    }
                    to_compile.set(path.to_path_buf(), staleness);
                    self.build_dependency_graph(&dep_tm, to_compile, to_link)?;
                }
                UseKind::Module => {
                    let module_dir = library::find_module_dir(&self.options, &use_path)
                        .ok_or_else(|| {
                            BuildError::Other(format!("Could not find installed module: {use_path}"))
                        })?;
                    let full_name = module_dir
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| use_path.clone());
                    let lib = format!(
                        "-Wl,-rpath,'{0}' '{0}/lib{1}{2}'",
                        module_dir.display(),
                        full_name,
                        library::SHARED_SUFFIX,
                    );
                    to_link.set(lib, ());
                    for child in library::module_sources(&module_dir)? {
                        self.build_dependency_graph(&child, to_compile, to_link)?;
                    }
                }
                UseKind::SharedObject => {
                    to_link.set(use_path, ());
                }
                UseKind::Asm | UseKind::CCode => {
                    let parent = path.parent().unwrap_or(Path::new("."));
                    let input = parent.join(&use_path);
                    to_link.set(input.display().to_string(), ());
                }
                UseKind::Header => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildOptions;
    use crate::emit::CEmitter;

    fn builder() -> Builder<'static> {
        Builder::new(BuildOptions { quiet: true, ..BuildOptions::default() }, &CEmitter)
    }

    #[test]
    fn build_files_live_in_a_dot_build_directory() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("prog.tm");
        std::fs::write(&src, "x := 1\n").unwrap();
        let b = builder();
        let h = b.build_file(&src, ".h").unwrap();
        assert_eq!(h, dir.path().join(".build/prog.tm.h"));
        assert!(dir.path().join(".build").is_dir());
    }

    #[test]
    fn identity_is_stable_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("mod.tm");
        std::fs::write(&src, "x := 1\n").unwrap();
        let b = builder();
        let first = b.ensure_identity(&src).unwrap();
        let second = b.ensure_identity(&src).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("mod_"), "{first}");
        assert_eq!(first.len(), "mod_".len() + 8);
    }

    #[test]
    fn missing_outputs_are_stale() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.tm");
        std::fs::write(&src, "x := 1\n").unwrap();
        let b = builder();
        b.ensure_identity(&src).unwrap();
        let staleness = b.initial_staleness(&src).unwrap();
        assert!(staleness.h && staleness.c && staleness.o);
    }
}
