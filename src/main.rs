use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process;

use keel::codegen::ModuleIr;
use keel::diagnostic::{render_diagnostics, Diagnostic};
use keel::manifest::Manifest;

#[derive(Parser)]
#[command(
    name = "keel",
    version,
    about = "Keel module compiler: manifests in, contract assembly out"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile module manifests to deploy assembly
    Build {
        /// Input manifest files (.json)
        manifests: Vec<PathBuf>,
        /// Output directory (default: next to each manifest)
        #[arg(short, long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
        /// Emit runtime assembly instead of deploy assembly
        #[arg(long)]
        runtime: bool,
        /// Print assembly to stdout instead of writing files
        #[arg(long)]
        print: bool,
    },
    /// Validate manifests without writing artifacts
    Check {
        /// Input manifest files (.json)
        manifests: Vec<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Build {
            manifests,
            out_dir,
            runtime,
            print,
        } => cmd_build(manifests, out_dir, runtime, print),
        Command::Check { manifests } => cmd_check(manifests),
    }
}

/// Filename, embedded source if the manifest carried one, and the errors.
type Failure = (String, Option<String>, Vec<Diagnostic>);

fn compile_manifest(path: &Path) -> Result<(Manifest, ModuleIr), Failure> {
    let manifest =
        Manifest::load(path).map_err(|diags| (path.display().to_string(), None, diags))?;
    match manifest.compile() {
        Ok(ir) => Ok((manifest, ir)),
        Err(diags) => {
            let source = manifest.source.clone();
            Err((manifest.source_file.clone(), source, diags))
        }
    }
}

// --- keel build ---

fn cmd_build(manifests: Vec<PathBuf>, out_dir: Option<PathBuf>, runtime: bool, print: bool) {
    if manifests.is_empty() {
        eprintln!("error: no manifests given");
        process::exit(1);
    }
    if let Some(ref dir) = out_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("error: cannot create directory '{}': {}", dir.display(), e);
            process::exit(1);
        }
    }

    // Modules are independent, so compile them in parallel. Rendering
    // and writing stay on this thread to keep output in input order.
    let compiled: Vec<_> = manifests
        .par_iter()
        .map(|path| compile_manifest(path))
        .collect();

    let mut failed = false;
    for (path, outcome) in manifests.iter().zip(compiled) {
        match outcome {
            Ok((manifest, ir)) => {
                let node = if runtime { &ir.runtime } else { &ir.deploy };
                if print {
                    println!("{}", node.pretty());
                    continue;
                }
                let out_path = artifact_path(path, out_dir.as_deref(), runtime);
                let text = format!("{}\n", node.pretty());
                if let Err(e) = std::fs::write(&out_path, &text) {
                    eprintln!("error: cannot write '{}': {}", out_path.display(), e);
                    failed = true;
                    continue;
                }
                eprintln!("Compiled {} -> {}", manifest.contract, out_path.display());
            }
            Err((filename, source, diags)) => {
                render_diagnostics(&diags, &filename, source.as_deref());
                failed = true;
            }
        }
    }
    if failed {
        process::exit(1);
    }
}

fn artifact_path(input: &Path, out_dir: Option<&Path>, runtime: bool) -> PathBuf {
    let ext = if runtime { "runtime.ir" } else { "ir" };
    let base = input.with_extension(ext);
    match (out_dir, base.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => base,
    }
}

// --- keel check ---

fn cmd_check(manifests: Vec<PathBuf>) {
    if manifests.is_empty() {
        eprintln!("error: no manifests given");
        process::exit(1);
    }

    let compiled: Vec<_> = manifests
        .par_iter()
        .map(|path| compile_manifest(path))
        .collect();

    let mut failed = false;
    for (path, outcome) in manifests.iter().zip(compiled) {
        match outcome {
            Ok(_) => eprintln!("OK: {}", path.display()),
            Err((filename, source, diags)) => {
                render_diagnostics(&diags, &filename, source.as_deref());
                failed = true;
            }
        }
    }
    if failed {
        process::exit(1);
    }
}
