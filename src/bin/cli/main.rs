//! CLI tool for jarpatch record editing.

mod commands;
mod exit_codes;
mod output;

use clap::{ArgAction, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use jarpatch::RecordType;
use jarpatch::patch::DEFAULT_PROFILE_DIR;

use exit_codes::ExitCode;

/// Edit records inside packaged game archives
#[derive(Parser)]
#[command(name = "jarpatch")]
#[command(author, version, about = "Edit records inside packaged game archives", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    /// Profile directory holding the patch log and rollback copies
    #[arg(long, default_value = DEFAULT_PROFILE_DIR, global = true)]
    profile: PathBuf,

    /// How record containers are decoded
    #[arg(long, value_enum, default_value = "process", global = true)]
    codec: CodecKind,

    /// Game jar for the Java helper (falls back to the built-in location)
    #[arg(long, env = "DOT_JAR_PATH", global = true)]
    game_jar: Option<PathBuf>,

    /// Helper timeout in seconds (0 waits forever)
    #[arg(long, default_value = "120", global = true)]
    timeout: u64,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List record identifiers (alias: l)
    #[command(alias = "l")]
    List {
        /// Archive to read
        archive: PathBuf,

        /// Record type
        #[arg(short = 't', long = "type", default_value = "Loadouts", value_parser = parse_record_type)]
        record_type: RecordType,
    },

    /// Print a record
    Show {
        /// Archive to read
        archive: PathBuf,

        /// Record identifier
        key: String,

        /// Record type
        #[arg(short = 't', long = "type", default_value = "Loadouts", value_parser = parse_record_type)]
        record_type: RecordType,
    },

    /// Replace a record and log the edit
    Set {
        /// Archive to edit
        archive: PathBuf,

        /// Record identifier
        key: String,

        /// JSON file with the new record (stdin if omitted or "-")
        #[arg(short = 'i', long)]
        input: Option<PathBuf>,

        /// Record type
        #[arg(short = 't', long = "type", default_value = "Loadouts", value_parser = parse_record_type)]
        record_type: RecordType,
    },

    /// Put a record back to its value when first listed
    Restore {
        /// Archive to edit
        archive: PathBuf,

        /// Record identifier
        key: String,

        /// Record type
        #[arg(short = 't', long = "type", default_value = "Loadouts", value_parser = parse_record_type)]
        record_type: RecordType,
    },

    /// Restore one record type's container from the backup
    RestoreType {
        /// Archive to edit
        archive: PathBuf,

        /// Record type
        #[arg(short = 't', long = "type", default_value = "Loadouts", value_parser = parse_record_type)]
        record_type: RecordType,
    },

    /// Replace the archive with its backup
    RestoreAll {
        /// Archive to restore
        archive: PathBuf,
    },

    /// Replay the patch log onto the archive
    Reapply {
        /// Archive to edit
        archive: PathBuf,

        /// Apply patches even if the record changed under the log
        #[arg(long)]
        overwrite: bool,
    },

    /// Show the patch log
    Log,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum CodecKind {
    /// Run the Java helper
    Process,
    /// Containers hold plain JSON arrays
    Json,
}

fn parse_record_type(s: &str) -> Result<RecordType, String> {
    s.parse().map_err(|e: jarpatch::Error| e.to_string())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ctx = commands::Context {
        format: cli.format,
        profile: cli.profile,
        codec: cli.codec,
        game_jar: cli.game_jar,
        timeout: cli.timeout,
    };

    let exit_code = match cli.command {
        Commands::List {
            archive,
            record_type,
        } => commands::list(&ctx, &archive, record_type),

        Commands::Show {
            archive,
            key,
            record_type,
        } => commands::show(&ctx, &archive, record_type, &key),

        Commands::Set {
            archive,
            key,
            input,
            record_type,
        } => commands::set(&ctx, &archive, record_type, &key, input.as_deref()),

        Commands::Restore {
            archive,
            key,
            record_type,
        } => commands::restore(&ctx, &archive, record_type, &key),

        Commands::RestoreType {
            archive,
            record_type,
        } => commands::restore_type(&ctx, &archive, record_type),

        Commands::RestoreAll { archive } => commands::restore_all(&ctx, &archive),

        Commands::Reapply { archive, overwrite } => commands::reapply(&ctx, &archive, overwrite),

        Commands::Log => commands::show_log(&ctx),

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            ExitCode::Success
        }
    };

    std::process::exit(exit_code.code());
}
