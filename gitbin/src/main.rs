mod expand;
mod logging;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gitbin_core::{Action, FilesystemBinstore, GitBin, GitRepo, Layout, Outcome};
use output::{InitOutput, OutputWriter};
use std::path::Path;
use std::process::ExitCode;

/// git-bin - keep large binary files out of git history
#[derive(Parser)]
#[command(name = "git-bin")]
#[command(
    about = "Store binary files in a content-addressed binstore and track symlinks to them",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Report what happens to each path
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Trace every filesystem and git step
    #[arg(short, long, global = true)]
    debug: bool,

    /// Link through .git/binstore (layout of older git-bin versions)
    #[arg(short = 'C', long, global = true)]
    compat: bool,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create this repository's binstore, or show the existing one
    Init,

    /// Move binary files into the binstore and stage links to them
    Add {
        /// Files or directories to add
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Replace binstore links with writable copies
    Edit {
        /// Links or directories to edit
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Unstage paths, restoring real files for freshly added binaries
    Reset {
        /// Paths to unstage
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Discard unstaged changes, keeping a copy of content the binstore lacks
    #[command(alias = "checkout--")]
    Checkout {
        /// Paths to restore
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.debug);

    let output = OutputWriter::new(cli.json);
    match run(&cli, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output.write_error(&e, 1, cli.verbose || cli.debug);
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli, output: &OutputWriter) -> Result<()> {
    let layout = if cli.compat {
        Layout::Compat
    } else {
        Layout::Direct
    };
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    let gitbin = GitBin::init(&cwd, layout).context("Failed to open the binstore")?;

    match &cli.command {
        Commands::Init => cmd_init(&gitbin, output),
        Commands::Add { paths } => {
            let paths = expand::expand_all(paths)?;
            let outcomes = gitbin.add(&paths).context("git bin add failed")?;
            report(output, "add", &outcomes, &cwd)
        }
        Commands::Edit { paths } => {
            let paths = expand::expand_all(paths)?;
            let outcomes = gitbin.edit(&paths).context("git bin edit failed")?;
            report(output, "edit", &outcomes, &cwd)
        }
        Commands::Reset { paths } => {
            let paths = expand::expand_all(paths)?;
            let outcomes = gitbin.reset(&paths).context("git bin reset failed")?;
            report(output, "reset", &outcomes, &cwd)
        }
        Commands::Checkout { paths } => {
            let paths = expand::expand_all(paths)?;
            let outcomes = gitbin
                .checkout_dashdash(&paths)
                .context("git bin checkout -- failed")?;
            report(output, "checkout --", &outcomes, &cwd)
        }
    }
}

fn cmd_init(gitbin: &GitBin<GitRepo, FilesystemBinstore>, output: &OutputWriter) -> Result<()> {
    let config = gitbin.store().config();
    let data = InitOutput {
        success: true,
        result_code: 0,
        root: config.root.display().to_string(),
        link_root: config.link_root.display().to_string(),
        algorithm: config.algorithm.as_str().to_string(),
    };
    output.write(&data, || {
        format!(
            "binstore at {}\nalgorithm: {}\n",
            config.root.display(),
            config.algorithm.as_str()
        )
    })
}

/// Print outcomes; any per-path failure fails the command.
fn report(output: &OutputWriter, command: &str, outcomes: &[Outcome], cwd: &Path) -> Result<()> {
    output.write_outcomes(command, outcomes, cwd)?;

    let failed = outcomes
        .iter()
        .filter(|o| matches!(o.action, Action::Failed { .. }))
        .count();
    if failed > 0 {
        anyhow::bail!("{} path(s) could not be processed", failed);
    }
    Ok(())
}
