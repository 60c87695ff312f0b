//! The `tomo` command-line driver: compile, run, build libraries,
//! install, and uninstall.

use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};

use tomo::ast::debug::ast_to_xml;
use tomo::build::{
    fail_with, resolve_source_argument, BuildError, BuildOptions, Builder, TOMO_VERSION,
};
use tomo::emit::CEmitter;
use tomo::parser;

fn cli() -> Command {
    Command::new("tomo")
        .about("A compiler for the Tomo programming language")
        .version(TOMO_VERSION)
        .arg(Arg::new("files").help("Source files to compile (a directory D means D/D.tm)").num_args(0..))
        .arg(
            Arg::new("args")
                .help("Arguments passed to the compiled program")
                .last(true)
                .num_args(0..),
        )
        .arg(Arg::new("transpile").short('t').long("transpile").action(ArgAction::SetTrue)
            .help("Stop after writing the .c and .h files"))
        .arg(Arg::new("compile-obj").short('c').long("compile-obj").action(ArgAction::SetTrue)
            .help("Stop after producing object files"))
        .arg(Arg::new("compile-exe").short('e').long("compile-exe").action(ArgAction::SetTrue)
            .help("Produce an executable but do not run it"))
        .arg(Arg::new("library").short('L').long("library").value_name("PATH")
            .action(ArgAction::Append).help("Build a library rooted at PATH"))
        .arg(Arg::new("uninstall").short('u').long("uninstall").value_name("NAME")
            .action(ArgAction::Append).help("Remove the installed library NAME"))
        .arg(Arg::new("install").short('I').long("install").action(ArgAction::SetTrue)
            .help("After building, install to the standard prefix"))
        .arg(Arg::new("optimization").short('O').long("optimization").value_name("N")
            .default_value("2").help("C optimization level"))
        .arg(Arg::new("show-codegen").short('C').long("show-codegen").value_name("CMD")
            .help("Pipe emitted .h and .c files through CMD for display"))
        .arg(Arg::new("force-rebuild").short('f').long("force-rebuild").action(ArgAction::SetTrue)
            .help("Ignore staleness and rebuild everything"))
        .arg(Arg::new("source-mapping").short('m').long("source-mapping").value_name("BOOL")
            .value_parser(clap::builder::BoolishValueParser::new()).default_value("true")
            .help("Emit #line directives"))
        .arg(Arg::new("verbose").short('v').long("verbose").action(ArgAction::SetTrue))
        .arg(Arg::new("quiet").short('q').long("quiet").action(ArgAction::SetTrue))
        .arg(Arg::new("parse").short('p').long("parse").action(ArgAction::SetTrue)
            .help("Show the parse tree and stop"))
        .arg(Arg::new("prefix").long("prefix").action(ArgAction::SetTrue)
            .help("Print the install prefix and exit"))
        .arg(Arg::new("run").short('r').long("run").value_name("NAME")
            .help("Execute an installed program by name"))
}

fn main() {
    let matches = cli().get_matches();

    let program_args: Vec<String> = matches
        .get_many::<String>("args")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();

    let mut options = BuildOptions {
        verbose: matches.get_flag("verbose"),
        quiet: matches.get_flag("quiet") || !matches.get_flag("verbose"),
        force_rebuild: matches.get_flag("force-rebuild"),
        source_mapping: matches.get_one::<bool>("source-mapping").copied().unwrap_or(true),
        stop_at_transpile: matches.get_flag("transpile"),
        stop_at_obj: matches.get_flag("compile-obj"),
        optimization: matches.get_one::<String>("optimization").cloned().unwrap_or_else(|| "2".to_string()),
        show_codegen: matches.get_one::<String>("show-codegen").cloned(),
        ..BuildOptions::default()
    };
    if options.show_codegen.as_deref() == Some("pretty") {
        options.show_codegen =
            Some("{ sed '/^#line/d;/^$/d' | indent -o /dev/stdout | bat -l c -P; }".to_string());
    }

    if matches.get_flag("prefix") {
        println!("{}", options.prefix.display());
        return;
    }

    let emitter = CEmitter;
    let builder = Builder::new(options, &emitter);

    if let Some(name) = matches.get_one::<String>("run") {
        if let Err(e) = builder.run_installed(name, &program_args) {
            fail_with(&e);
        }
        return;
    }

    for name in matches.get_many::<String>("uninstall").into_iter().flatten() {
        if let Err(e) = builder.uninstall_library(name) {
            fail_with(&e);
        }
    }

    for lib in matches.get_many::<String>("library").into_iter().flatten() {
        let lib_dir = PathBuf::from(lib);
        if let Err(e) = builder.build_library(&lib_dir) {
            fail_with(&e);
        }
        if matches.get_flag("install") {
            if let Err(e) = builder.install_library(&lib_dir) {
                fail_with(&e);
            }
        }
    }

    let file_args: Vec<String> = matches
        .get_many::<String>("files")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();

    let did_library_work = matches.get_many::<String>("uninstall").is_some()
        || matches.get_many::<String>("library").is_some();
    if file_args.is_empty() {
        if did_library_work {
            return;
        }
        eprintln!("No files provided!\n");
        let _ = cli().print_help();
        std::process::exit(1);
    }

    let mut files = Vec::new();
    for arg in &file_args {
        match resolve_source_argument(&PathBuf::from(arg)) {
            Ok(path) => files.push(path),
            Err(e) => fail_with(&e),
        }
    }

    if matches.get_flag("parse") {
        for path in &files {
            match parser::parse_file(&path.display().to_string()) {
                Ok(ast) => println!("{}", ast_to_xml(&ast)),
                Err(e) => {
                    e.report();
                    std::process::exit(1);
                }
            }
        }
        return;
    }

    if let Err(e) = builder.compile_files(&files) {
        fail_with(&e);
    }
    if builder.options.stop_at_transpile || builder.options.stop_at_obj {
        return;
    }

    let compile_exe = matches.get_flag("compile-exe");
    for path in &files {
        let exe_path = if compile_exe {
            path.with_extension("")
        } else {
            match builder.build_file(&path.with_extension(""), "") {
                Ok(p) => p,
                Err(e) => fail_with(&e),
            }
        };
        let exe = match builder.build_executable(path, &exe_path) {
            Ok(exe) => exe,
            Err(e) => fail_with(&e),
        };

        if compile_exe {
            if matches.get_flag("install") {
                let bin = builder.options.prefix.join("bin");
                let target = bin.join(exe.file_name().unwrap_or_default());
                if let Err(error) = std::fs::copy(&exe, &target) {
                    fail_with(&BuildError::Io {
                        context: format!("Could not install {}", target.display()),
                        error,
                    });
                }
            }
            continue;
        }

        run_program(&exe, &program_args);
    }
}

#[cfg(unix)]
fn run_program(exe: &std::path::Path, args: &[String]) {
    use std::os::unix::process::CommandExt;
    let error = std::process::Command::new(exe).args(args).exec();
    eprintln!("Could not execute program: {}: {error}", exe.display());
    std::process::exit(1);
}

#[cfg(not(unix))]
fn run_program(exe: &std::path::Path, args: &[String]) {
    match std::process::Command::new(exe).args(args).status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(error) => {
            eprintln!("Could not execute program: {}: {error}", exe.display());
            std::process::exit(1);
        }
    }
}
