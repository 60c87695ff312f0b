//! Library building, the versioned install layout, uninstall, and the
//! installed-program runner.
//!
//! A library is a directory of `.tm` files. Its version comes from the
//! first `## ` heading of `CHANGES.md` (default `v0.0`); the shared
//! object is `lib<name>_<version>.so` and the installed copy lives at
//! `<prefix>/share/tomo_<VERSION>/installed/<name>_<version>/`.

use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::build::{io_err, BuildError, BuildOptions, BuildResult, Builder};

#[cfg(target_os = "macos")]
pub const SHARED_SUFFIX: &str = ".dylib";
#[cfg(not(target_os = "macos"))]
pub const SHARED_SUFFIX: &str = ".so";

/// The version of a library directory: the first `## ` heading in its
/// `CHANGES.md`, defaulting to `v0.0`.
pub fn library_version(lib_dir: &Path) -> String {
    let changes = match std::fs::read_to_string(lib_dir.join("CHANGES.md")) {
        Ok(changes) => changes,
        Err(_) => return "v0.0".to_string(),
    };
    let heading = Regex::new(r"(?m)^## +(.+?) *$").expect("version regex is valid");
    heading
        .captures(&changes)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "v0.0".to_string())
}

/// `~/`-expansion plus relative resolution against a base directory.
/// With `$HOME` unset, a leading `~` is left as-is.
pub fn resolve_relative(path: &str, base: &Path) -> PathBuf {
    let expanded = match path.strip_prefix("~/") {
        Some(rest) => match std::env::var_os("HOME") {
            Some(home) if !home.is_empty() => PathBuf::from(home).join(rest),
            _ => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    };
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };
    joined.canonicalize().unwrap_or(joined)
}

/// The source files of a library/module directory: `*.tm` not starting
/// with `.`, `_`, or a digit.
pub fn module_sources(dir: &Path) -> BuildResult<Vec<PathBuf>> {
    let mut sources = Vec::new();
    let entries = std::fs::read_dir(dir)
        .map_err(io_err(format!("Not a valid directory: {}", dir.display())))?;
    for entry in entries {
        let entry = entry.map_err(io_err(format!("Could not read directory: {}", dir.display())))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.ends_with(".tm") {
            continue;
        }
        if name.starts_with(['.', '_']) || name.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        sources.push(entry.path());
    }
    sources.sort();
    Ok(sources)
}

/// Locate an installed module directory by name: an exact match, a
/// `name@version` request, or the newest `name_<version>` directory.
pub fn find_module_dir(options: &BuildOptions, name: &str) -> Option<PathBuf> {
    let root = options.installed_root();
    let (name, version) = match name.split_once('@') {
        Some((name, version)) => (name, Some(version)),
        None => (name, None),
    };

    if let Some(version) = version {
        let dir = root.join(format!("{name}_{version}"));
        return dir.is_dir().then_some(dir);
    }

    let exact = root.join(name);
    if exact.is_dir() {
        return Some(exact);
    }

    let prefix = format!("{name}_");
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(&root)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .map(|e| e.path())
        .collect();
    candidates.sort();
    candidates.pop()
}

impl<'e> Builder<'e> {
    /// Compile a library directory's sources and link the versioned
    /// shared object.
    pub fn build_library(&self, lib_dir: &Path) -> BuildResult<()> {
        let lib_dir = lib_dir
            .canonicalize()
            .map_err(io_err(format!("Not a valid directory: {}", lib_dir.display())))?;
        let lib_name = lib_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| BuildError::Other(format!("Not a valid directory: {}", lib_dir.display())))?;

        let tm_files = module_sources(&lib_dir)?;
        if tm_files.is_empty() {
            return Err(BuildError::Other(format!(
                "There are no .tm source files in {}",
                lib_dir.display()
            )));
        }
        let (object_files, extra_ldlibs) = self.compile_files(&tm_files)?;
        if self.options.stop_at_transpile || self.options.stop_at_obj {
            return Ok(());
        }

        let version_suffix = format!("_{}", library_version(&lib_dir));
        let shared_lib = lib_dir.join(format!("lib{lib_name}{version_suffix}{SHARED_SUFFIX}"));
        if !self.is_stale_for_any(&shared_lib, &object_files, false)? {
            self.whisper(format_args!("Unchanged: {}", shared_lib.display()));
            return Ok(());
        }

        let opts = &self.options;
        let soname_flag = if cfg!(target_os = "macos") {
            format!("-Wl,-install_name,@rpath/'lib{lib_name}{version_suffix}{SHARED_SUFFIX}'")
        } else {
            format!("-Wl,-soname,'lib{lib_name}{version_suffix}{SHARED_SUFFIX}'")
        };
        let objects: Vec<String> =
            object_files.iter().map(|o| format!("'{}'", o.display())).collect();
        self.run_shell(&format!(
            "{} -O{} {} {} {} {} {} -shared {} -o '{}'",
            opts.cc,
            opts.optimization,
            opts.cflags,
            opts.ldflags,
            opts.ldlibs,
            extra_ldlibs.join(" "),
            soname_flag,
            objects.join(" "),
            shared_lib.display(),
        ))?;
        self.announce(format_args!("Compiled library:\t{}", shared_lib.display()));
        Ok(())
    }

    /// Copy a built library (sources, `.build`, and shared object)
    /// into the install tree. Retries through `sudo`/`doas` as the
    /// prefix owner when a direct copy is denied.
    pub fn install_library(&self, lib_dir: &Path) -> BuildResult<()> {
        let lib_dir = lib_dir
            .canonicalize()
            .map_err(io_err(format!("Not a valid directory: {}", lib_dir.display())))?;
        let lib_name = lib_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| BuildError::Other(format!("Not a valid directory: {}", lib_dir.display())))?;
        let version_suffix = format!("_{}", library_version(&lib_dir));
        let dest = self.options.installed_root().join(format!("{lib_name}{version_suffix}"));

        if dest != lib_dir {
            self.whisper(format_args!("Clearing out any pre-existing version of {lib_name}"));
            match self.copy_tree(&lib_dir, &dest) {
                Ok(()) => {}
                Err(BuildError::Io { error, .. })
                    if error.kind() == std::io::ErrorKind::PermissionDenied =>
                {
                    self.install_as_owner(&lib_dir, &dest)?;
                }
                Err(e) => return Err(e),
            }
        }

        // If debugedit is available, remap the debug source paths to
        // the installed location; failures here are silent.
        let _ = std::process::Command::new("debugedit")
            .arg("-b")
            .arg(&lib_dir)
            .arg("-d")
            .arg(&dest)
            .arg(dest.join(format!("lib{lib_name}{version_suffix}{SHARED_SUFFIX}")))
            .status();

        println!(
            "Installed {lib_name} to {}",
            self.options.installed_root().join(format!("{lib_name}{version_suffix}")).display()
        );
        Ok(())
    }

    fn copy_tree(&self, from: &Path, to: &Path) -> BuildResult<()> {
        if to.exists() {
            std::fs::remove_dir_all(to)
                .map_err(io_err(format!("Could not remove {}", to.display())))?;
        }
        for entry in WalkDir::new(from) {
            let entry = entry.map_err(|e| BuildError::Other(format!("Could not walk {}: {e}", from.display())))?;
            let relative = entry
                .path()
                .strip_prefix(from)
                .map_err(|_| BuildError::Other("walked outside the source tree".to_string()))?;
            let target = to.join(relative);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)
                    .map_err(io_err(format!("Could not create {}", target.display())))?;
            } else {
                std::fs::copy(entry.path(), &target)
                    .map_err(io_err(format!("Could not copy to {}", target.display())))?;
            }
        }
        Ok(())
    }

    /// `sudo -u <owner>`/`doas -u <owner>` fallback when the prefix is
    /// owned by someone else.
    fn install_as_owner(&self, lib_dir: &Path, dest: &Path) -> BuildResult<()> {
        let owner = prefix_owner(&self.options.prefix);
        let sudo = if which("doas") { "doas" } else { "sudo" };
        let as_owner = match &owner {
            Some(owner) => format!("{sudo} -u '{owner}' "),
            None => String::new(),
        };
        self.run_shell(&format!("{as_owner}rm -rf '{}'", dest.display()))?;
        self.run_shell(&format!("{as_owner}mkdir -p '{}'", dest.display()))?;
        self.run_shell(&format!(
            "{as_owner}cp -r '{}'/. '{}/'",
            lib_dir.display(),
            dest.display()
        ))?;
        Ok(())
    }

    /// Remove an installed library by name (any installed version).
    pub fn uninstall_library(&self, name: &str) -> BuildResult<()> {
        let root = self.options.installed_root();
        let mut removed = false;
        let entries = match std::fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(_) => return Err(BuildError::Other(format!("Nothing is installed in {}", root.display()))),
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let entry_name = entry.file_name().to_string_lossy().to_string();
            if entry_name == name || entry_name.starts_with(&format!("{name}_")) {
                match std::fs::remove_dir_all(entry.path()) {
                    Ok(()) => {}
                    Err(error) if error.kind() == std::io::ErrorKind::PermissionDenied => {
                        let owner = prefix_owner(&self.options.prefix);
                        let sudo = if which("doas") { "doas" } else { "sudo" };
                        let as_owner = match &owner {
                            Some(owner) => format!("{sudo} -u '{owner}' "),
                            None => String::new(),
                        };
                        self.run_shell(&format!("{as_owner}rm -rf '{}'", entry.path().display()))?;
                    }
                    Err(error) => {
                        return Err(io_err(format!("Could not remove {}", entry.path().display()))(error))
                    }
                }
                println!("Uninstalled {entry_name}");
                removed = true;
            }
        }
        if !removed {
            return Err(BuildError::Other(format!("This library is not installed: {name}")));
        }
        Ok(())
    }

    /// Exec an installed program by name (Unix: replaces this
    /// process).
    pub fn run_installed(&self, name: &str, args: &[String]) -> BuildResult<()> {
        if name.contains(['/', ';', '$']) {
            return Err(BuildError::Other(format!("This is not an installed tomo program: {name}")));
        }
        let dir = find_module_dir(&self.options, name)
            .ok_or_else(|| BuildError::Other(format!("This is not an installed tomo program: {name}")))?;
        let program = dir.join(name);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            let error = std::process::Command::new(&program).args(args).exec();
            Err(io_err(format!("Could not execute program: {}", program.display()))(error))
        }
        #[cfg(not(unix))]
        {
            let status = std::process::Command::new(&program)
                .args(args)
                .status()
                .map_err(io_err(format!("Could not execute program: {}", program.display())))?;
            std::process::exit(status.code().unwrap_or(1));
        }
    }
}

fn which(program: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(program).is_file())
        })
        .unwrap_or(false)
}

/// The user name owning the prefix directory. Resolved through the
/// `stat` utility; uid-to-name lookup has no portable std interface.
fn prefix_owner(prefix: &Path) -> Option<String> {
    let output = std::process::Command::new("stat")
        .arg(if cfg!(target_os = "macos") { "-f%Su" } else { "-c%U" })
        .arg(prefix)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let owner = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!owner.is_empty()).then_some(owner)
}
