//! dexon CLI: inspect and drive the incremental dex pipeline of a project.
//!
//! Provides `dexon merge` to write `classes*.dex` again from the stored
//! compiled types, `dexon plan` for a dry run of the incremental filter, and
//! `dexon deps` to print the dependency state recorded by the last build.

#![warn(missing_docs)]

mod deps;
mod merge;
mod pipeline;
mod plan;

use std::io::IsTerminal;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// dexon, an ahead-of-time Java to Dalvik toolchain.
#[derive(Parser, Debug)]
#[command(name = "dexon", version, about = "dexon dex toolchain")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (info-level) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Path to a `dexon.toml` file or the directory holding it.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write classes*.dex again from the compiled types of earlier builds.
    Merge(MergeArgs),
    /// Show which sources the next build would compile, and why.
    Plan(PlanArgs),
    /// Print the dependency state recorded by the last build.
    Deps(DepsArgs),
}

/// Arguments for `dexon merge`.
#[derive(Parser, Debug)]
pub struct MergeArgs {
    /// Output format for the summary and diagnostics.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for `dexon plan`.
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Source files or directories (searched for `.java` files). Defaults to
    /// `src` under the project root.
    pub sources: Vec<String>,

    /// Output format for the plan and diagnostics.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for `dexon deps`.
#[derive(Parser, Debug)]
pub struct DepsArgs {
    /// Only show these types (descriptors such as `Lcom/example/App;`).
    #[arg(short, long = "type", num_args = 1..)]
    pub types: Vec<String>,

    /// Show the types that must be recompiled when a type changes instead
    /// of what each type depends on.
    #[arg(long)]
    pub reverse: bool,

    /// Also list the types defined by each source file.
    #[arg(long)]
    pub files: bool,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from terminal capabilities.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to log at info level.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Optional path to the configuration file or project directory.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    pipeline::init_tracing(cli.verbose);

    let color = match cli.color {
        ColorChoice::Auto => std::io::stderr().is_terminal(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        color,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Merge(ref args) => merge::run(args, &global),
        Command::Plan(ref args) => plan::run(args, &global),
        Command::Deps(ref args) => deps::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_merge_default() {
        let cli = Cli::parse_from(["dexon", "merge"]);
        match cli.command {
            Command::Merge(ref args) => assert_eq!(args.format, ReportFormat::Text),
            _ => panic!("expected Merge command"),
        }
    }

    #[test]
    fn parse_plan_with_sources() {
        let cli = Cli::parse_from(["dexon", "plan", "src/main", "Extra.java", "-f", "json"]);
        match cli.command {
            Command::Plan(ref args) => {
                assert_eq!(args.sources, vec!["src/main", "Extra.java"]);
                assert_eq!(args.format, ReportFormat::Json);
            }
            _ => panic!("expected Plan command"),
        }
    }

    #[test]
    fn parse_plan_default() {
        let cli = Cli::parse_from(["dexon", "plan"]);
        match cli.command {
            Command::Plan(ref args) => assert!(args.sources.is_empty()),
            _ => panic!("expected Plan command"),
        }
    }

    #[test]
    fn parse_deps_with_args() {
        let cli = Cli::parse_from([
            "dexon",
            "deps",
            "--type",
            "LA;",
            "LB;",
            "--reverse",
            "--files",
        ]);
        match cli.command {
            Command::Deps(ref args) => {
                assert_eq!(args.types, vec!["LA;", "LB;"]);
                assert!(args.reverse);
                assert!(args.files);
                assert_eq!(args.format, ReportFormat::Text);
            }
            _ => panic!("expected Deps command"),
        }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from(["dexon", "--quiet", "--color", "never", "merge"]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
        assert_eq!(cli.color, ColorChoice::Never);
    }

    #[test]
    fn parse_verbose_after_subcommand() {
        let cli = Cli::parse_from(["dexon", "deps", "--verbose"]);
        assert!(cli.verbose);
    }

    #[test]
    fn parse_config_path() {
        let cli = Cli::parse_from(["dexon", "--config", "/path/to/dexon.toml", "plan"]);
        assert_eq!(cli.config.as_deref(), Some("/path/to/dexon.toml"));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["dexon", "compile"]).is_err());
    }
}
