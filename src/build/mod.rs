//! The build orchestrator: per-file staleness tracking, dependency
//! graphing over `use` statements, parallel object compilation, and
//! executable/shared-library linking.
//!
//! Every source file `P` gets a `dirname(P)/.build/` directory holding
//! its stable identity (`P.id`), the emitted header and C source
//! (`P.h`, `P.c`), the object file (`P.o`), and a record of the
//! compiler configuration that produced them (`P.config`). Staleness
//! is three bits per file: header, C source, and object.
//!
//! Header generation runs sequentially (the module environment is
//! shared); object compilation fans out over a worker pool, with each
//! job re-parsing from the process-wide cache and spawning the C
//! compiler as a child process.

pub mod graph;
pub mod library;

use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use rayon::prelude::*;

use crate::ast::Ast;
use crate::emit::{main_symbol, Emitter, ModuleEnv};
use crate::hashing::Table;
use crate::parser::{self, ParseError};
use crate::sourcefile::use_color;

pub use graph::Staleness;

/// The version string baked into install paths and sonames.
pub const TOMO_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

#[derive(Debug)]
pub enum BuildError {
    Io { context: String, error: std::io::Error },
    Parse(ParseError),
    Emit(crate::emit::EmitError),
    Command { command: String, status: Option<i32> },
    Other(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Io { context, error } => write!(f, "{context}: {error}"),
            BuildError::Parse(e) => write!(f, "{e}"),
            BuildError::Emit(e) => write!(f, "{e}"),
            BuildError::Command { command, status } => match status {
                Some(code) => write!(f, "Command failed with status {code}: {command}"),
                None => write!(f, "Command was killed by a signal: {command}"),
            },
            BuildError::Other(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<ParseError> for BuildError {
    fn from(e: ParseError) -> BuildError {
        BuildError::Parse(e)
    }
}

impl From<crate::emit::EmitError> for BuildError {
    fn from(e: crate::emit::EmitError) -> BuildError {
        BuildError::Emit(e)
    }
}

pub(crate) fn io_err(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> BuildError {
    let context = context.into();
    move |error| BuildError::Io { context, error }
}

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub cc: String,
    pub cflags: String,
    pub ldflags: String,
    pub ldlibs: String,
    pub optimization: String,
    pub verbose: bool,
    pub quiet: bool,
    pub force_rebuild: bool,
    pub source_mapping: bool,
    pub stop_at_transpile: bool,
    pub stop_at_obj: bool,
    pub show_codegen: Option<String>,
    pub prefix: PathBuf,
}

impl Default for BuildOptions {
    fn default() -> BuildOptions {
        BuildOptions {
            cc: std::env::var("CC").unwrap_or_else(|_| "cc".to_string()),
            cflags: "-fPIC -ggdb -fdollars-in-identifiers".to_string(),
            ldflags: String::new(),
            ldlibs: "-lm".to_string(),
            optimization: "2".to_string(),
            verbose: false,
            quiet: true,
            force_rebuild: false,
            source_mapping: true,
            stop_at_transpile: false,
            stop_at_obj: false,
            show_codegen: None,
            prefix: std::env::var_os("TOMO_PREFIX")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/usr/local")),
        }
    }
}

impl BuildOptions {
    /// The flag summary stored in `P.config`; any change forces
    /// recompilation of every `.c`.
    pub fn config_summary(&self) -> String {
        format!("{} {} -O{}", self.cc, self.cflags, self.optimization)
    }

    pub fn installed_root(&self) -> PathBuf {
        self.prefix.join(format!("share/tomo_{TOMO_VERSION}/installed"))
    }
}

pub struct Builder<'e> {
    pub options: BuildOptions,
    pub(crate) emitter: &'e dyn Emitter,
    pub(crate) config_summary: String,
    pub(crate) compiler_mtime: Option<SystemTime>,
}

impl<'e> Builder<'e> {
    pub fn new(options: BuildOptions, emitter: &'e dyn Emitter) -> Builder<'e> {
        let compiler_mtime = if cfg!(target_os = "linux") {
            std::env::current_exe()
                .and_then(|exe| std::fs::metadata(exe))
                .and_then(|m| m.modified())
                .ok()
        } else {
            None
        };
        Builder {
            config_summary: options.config_summary(),
            options,
            emitter,
            compiler_mtime,
        }
    }

    pub(crate) fn whisper(&self, message: impl fmt::Display) {
        if self.options.verbose {
            if use_color() {
                eprintln!("\x1b[2m{message}\x1b[m");
            } else {
                eprintln!("{message}");
            }
        }
    }

    pub(crate) fn announce(&self, message: impl fmt::Display) {
        if !self.options.quiet {
            println!("{message}");
        }
    }

    /// Run a shell command, failing on a nonzero exit.
    pub(crate) fn run_shell(&self, command: &str) -> BuildResult<()> {
        if self.options.verbose {
            if use_color() {
                eprintln!("\x1b[34;1m{command}\x1b[m");
            } else {
                eprintln!("{command}");
            }
        }
        let status = Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .status()
            .map_err(io_err(format!("Failed to run command: {command}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(BuildError::Command { command: command.to_string(), status: status.code() })
        }
    }

    pub(crate) fn show_codegen(&self, path: &Path) {
        if let Some(cmd) = &self.options.show_codegen {
            let _ = self.run_shell(&format!("{cmd} <'{}'", path.display()));
        }
    }

    pub(crate) fn module_env(&self, path: &Path) -> BuildResult<ModuleEnv> {
        Ok(ModuleEnv {
            file_id: self.ensure_identity(path)?,
            source_mapping: self.options.source_mapping,
        })
    }

    pub(crate) fn parse(&self, path: &Path) -> BuildResult<std::sync::Arc<Ast>> {
        Ok(parser::parse_file(&path.display().to_string())?)
    }

    /// Transpile and compile a set of root files plus their transitive
    /// local dependencies. Returns the object files and extra link
    /// flags, in dependency-discovery order.
    pub fn compile_files(&self, files: &[PathBuf]) -> BuildResult<(Vec<PathBuf>, Vec<String>)> {
        let mut to_compile: Table<PathBuf, Staleness> = Table::new();
        let mut to_link: Table<String, ()> = Table::new();
        for file in files {
            if file.extension().and_then(|e| e.to_str()) != Some("tm") {
                return Err(BuildError::Other(format!("Not a valid .tm file: {}", file.display())));
            }
            if !file.is_file() {
                return Err(BuildError::Other(format!("Couldn't find file: {}", file.display())));
            }
            self.build_dependency_graph(file, &mut to_compile, &mut to_link)?;
        }

        // Make sure every file has a stable identity before anything
        // is emitted (the identity participates in mangling):
        for (path, _) in to_compile.iter() {
            self.ensure_identity(path)?;
        }

        // Header phase, sequential. A regenerated header makes the
        // downstream object stale:
        let mut staleness_updates: Vec<(PathBuf, Staleness)> = Vec::new();
        for (path, staleness) in to_compile.iter() {
            if staleness.h || self.options.force_rebuild {
                self.transpile_header(path)?;
                let mut updated = *staleness;
                updated.o = true;
                staleness_updates.push((path.clone(), updated));
            } else {
                self.whisper(format_args!("Unchanged: {}", self.build_file(path, ".h")?.display()));
                self.show_codegen(&self.build_file(path, ".h")?);
            }
        }
        for (path, staleness) in staleness_updates {
            to_compile.set(path, staleness);
        }

        // Compile phase, parallel:
        let jobs: Vec<(PathBuf, Staleness)> =
            to_compile.iter().map(|(p, s)| (p.clone(), *s)).collect();
        jobs.par_iter().try_for_each(|(path, staleness)| -> BuildResult<()> {
            let config_outdated = self.is_config_outdated(path)?;
            if !self.options.force_rebuild
                && !staleness.c
                && !staleness.h
                && !staleness.o
                && !config_outdated
            {
                self.whisper(format_args!("Unchanged: {}", self.build_file(path, ".c")?.display()));
                self.show_codegen(&self.build_file(path, ".c")?);
                self.whisper(format_args!("Unchanged: {}", self.build_file(path, ".o")?.display()));
                return Ok(());
            }
            if self.options.force_rebuild || staleness.c {
                self.transpile_code(path)?;
            } else {
                self.whisper(format_args!("Unchanged: {}", self.build_file(path, ".c")?.display()));
            }
            if !self.options.stop_at_transpile {
                self.compile_object_file(path)?;
            }
            Ok(())
        })?;

        let mut object_files = Vec::new();
        for (path, _) in to_compile.iter() {
            object_files.push(self.build_file(path, ".o")?);
        }
        let extra_ldlibs: Vec<String> = to_link.keys().cloned().collect();
        Ok((object_files, extra_ldlibs))
    }

    /// Emit the header for one module.
    pub fn transpile_header(&self, path: &Path) -> BuildResult<()> {
        let h_filename = self.build_file(path, ".h")?;
        let ast = self.parse(path)?;
        let env = self.module_env(path)?;
        let header = self.emitter.compile_file_header(&env, path, &ast)?;
        std::fs::write(&h_filename, header)
            .map_err(io_err(format!("Failed to write header file: {}", h_filename.display())))?;
        self.announce(format_args!("Transpiled header:\t{}", h_filename.display()));
        self.show_codegen(&h_filename);
        Ok(())
    }

    /// Emit the C source for one module, appending the entry-point
    /// shim when the module defines `main`.
    pub fn transpile_code(&self, path: &Path) -> BuildResult<()> {
        let c_filename = self.build_file(path, ".c")?;
        let ast = self.parse(path)?;
        let env = self.module_env(path)?;
        let mut code = self.emitter.compile_file(&env, &ast)?;

        let version = library::library_version(path.parent().unwrap_or(Path::new(".")));
        if let Some(main) = main_symbol(&env, &ast) {
            code.push_str(&format!(
                "\nint parse_and_run${main}(int argc, char *argv[]) {{\n{}{}return 0;\n}}\n",
                if env.source_mapping { "#line 1\n" } else { "" },
                self.emitter.compile_cli_arg_call(&env, &main, &version)?,
            ));
        }

        std::fs::write(&c_filename, code)
            .map_err(io_err(format!("Failed to write C file: {}", c_filename.display())))?;
        self.announce(format_args!("Transpiled code:\t{}", c_filename.display()));
        self.show_codegen(&c_filename);
        Ok(())
    }

    /// Run the C compiler on one module's emitted source.
    pub fn compile_object_file(&self, path: &Path) -> BuildResult<()> {
        let obj_file = self.build_file(path, ".o")?;
        let c_file = self.build_file(path, ".c")?;
        let opts = &self.options;
        self.run_shell(&format!(
            "{} {} -O{} -c '{}' -o '{}'",
            opts.cc,
            opts.cflags,
            opts.optimization,
            c_file.display(),
            obj_file.display(),
        ))?;
        let config_file = self.build_file(path, ".config")?;
        std::fs::write(&config_file, &self.config_summary)
            .map_err(io_err(format!("Failed to write config file: {}", config_file.display())))?;
        self.announce(format_args!("Compiled object:\t{}", obj_file.display()));
        Ok(())
    }

    /// Link an executable for `path`: a small stub `main` calling the
    /// module's entry-point shim, linked with every object file.
    pub fn compile_executable(
        &self,
        path: &Path,
        exe_path: &Path,
        object_files: &[PathBuf],
        extra_ldlibs: &[String],
    ) -> BuildResult<PathBuf> {
        let ast = self.parse(path)?;
        let env = self.module_env(path)?;
        let main = main_symbol(&env, &ast).ok_or_else(|| {
            BuildError::Other(format!(
                "No main() function has been defined for {}, so it can't be run!",
                path.display()
            ))
        })?;

        let fresh = !self.options.force_rebuild
            && exe_path.is_file()
            && !self.is_config_outdated(path)?
            && !self.is_stale_for_any(exe_path, object_files, false)?
            && !self.is_stale(exe_path, &path.with_file_name("modules.ini"), true)?;
        if fresh {
            self.whisper(format_args!("Unchanged: {}", exe_path.display()));
            return Ok(exe_path.to_path_buf());
        }

        let stub = format!(
            "extern int parse_and_run${main}(int argc, char *argv[]);\n\
             __attribute__ ((noinline))\n\
             int main(int argc, char *argv[]) {{\n\
             \treturn parse_and_run${main}(argc, argv);\n\
             }}\n"
        );
        let stub_path = self.build_file(path, ".main.c")?;
        let mut stub_file = std::fs::File::create(&stub_path)
            .map_err(io_err(format!("Failed to write stub file: {}", stub_path.display())))?;
        stub_file
            .write_all(stub.as_bytes())
            .map_err(io_err(format!("Failed to write stub file: {}", stub_path.display())))?;

        let opts = &self.options;
        let objects: Vec<String> =
            object_files.iter().map(|o| format!("'{}'", o.display())).collect();
        self.run_shell(&format!(
            "{} {} -O{} {} {} {} {} '{}' -o '{}'",
            opts.cc,
            opts.cflags,
            opts.optimization,
            opts.ldflags,
            opts.ldlibs,
            extra_ldlibs.join(" "),
            objects.join(" "),
            stub_path.display(),
            exe_path.display(),
        ))?;
        self.announce(format_args!("Compiled executable:\t{}", exe_path.display()));
        Ok(exe_path.to_path_buf())
    }

    /// Compile a root file and link its executable; returns the
    /// executable path.
    pub fn build_executable(&self, path: &Path, exe_path: &Path) -> BuildResult<PathBuf> {
        let (object_files, extra_ldlibs) = self.compile_files(std::slice::from_ref(&path.to_path_buf()))?;
        self.compile_executable(path, exe_path, &object_files, &extra_ldlibs)
    }
}

/// Resolve a command-line source argument: a directory `D` becomes
/// `D/D.tm`, and the result is made absolute.
pub fn resolve_source_argument(path: &Path) -> BuildResult<PathBuf> {
    let mut path = path.to_path_buf();
    if path.is_dir() {
        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        path = path.join(format!("{base}.tm"));
    }
    if !path.exists() {
        return Err(BuildError::Other(format!("File not found: {}", path.display())));
    }
    path.canonicalize()
        .map_err(io_err(format!("Could not resolve path: {}", path.display())))
}

/// Report a build failure in red and exit with status 1.
pub fn fail_with(error: &BuildError) -> ! {
    if let BuildError::Parse(e) = error {
        e.report();
    } else if use_color() {
        eprintln!("\x1b[31;1m{error}\x1b[m");
    } else {
        eprintln!("{error}");
    }
    std::process::exit(1)
}
