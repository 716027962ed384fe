use std::env;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{self, Command};

use clap::{Parser, Subcommand, ValueEnum};
use dotenvkit::{
    Encoding, EnvLoader, EnvMap, Error, QuoteMode, SetKeyOptions, TargetEnv, UnsetStatus,
    dotenv_values_from_reader, get_key, set_key, unset_key,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Read and edit .env files, or run a command with them loaded
#[derive(Parser, Debug)]
#[command(name = "dotenv", author, version, about, long_about = None)]
struct Cli {
    /// Location of the .env file
    #[arg(short, long, default_value = ".env", global = true)]
    file: PathBuf,

    /// Whether to quote values written by `set`
    #[arg(short, long, value_enum, default_value_t = QuoteArg::Always, global = true)]
    quote: QuoteArg,

    /// Prefix lines written by `set` with `export`
    #[arg(short, long, global = true)]
    export: bool,

    /// Log diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum QuoteArg {
    Always,
    Never,
    Auto,
}

impl From<QuoteArg> for QuoteMode {
    fn from(value: QuoteArg) -> Self {
        match value {
            QuoteArg::Always => QuoteMode::Always,
            QuoteArg::Never => QuoteMode::Never,
            QuoteArg::Auto => QuoteMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum ListFormat {
    #[default]
    Simple,
    Json,
    Shell,
    Export,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Display all the stored key/value pairs
    List {
        #[arg(long, value_enum, default_value_t = ListFormat::Simple)]
        format: ListFormat,
    },
    /// Retrieve the value for the given key
    Get { key: String },
    /// Store the given key/value, creating the file if needed
    Set { key: String, value: String },
    /// Remove the given key
    Unset { key: String },
    /// Run a command with the .env file loaded into its environment
    Run {
        /// Keep existing environment variables instead of the file's values
        #[arg(long)]
        no_override: bool,

        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<OsString>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    process::exit(run(cli));
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> i32 {
    let path = cli.file.as_path();
    match cli.command {
        CliCommand::List { format } => {
            let Ok(file) = File::open(path) else {
                return report_unreadable(path);
            };
            match dotenv_values_from_reader(file, true, Encoding::Utf8) {
                Ok(values) => {
                    print!("{}", render_list(&values, format));
                    0
                }
                Err(err) => fail(&err),
            }
        }
        CliCommand::Get { key } => match get_key(path, &key, Encoding::Utf8) {
            Ok(Some(value)) => {
                println!("{value}");
                0
            }
            Ok(None) => 1,
            Err(Error::FileNotFound { .. }) => report_unreadable(path),
            Err(err) => fail(&err),
        },
        CliCommand::Set { key, value } => {
            if let Err(err) = OpenOptions::new().create(true).append(true).open(path) {
                return fail(&Error::Io(err));
            }
            let options = SetKeyOptions {
                quote_mode: cli.quote.into(),
                export: cli.export,
                encoding: Encoding::Utf8,
            };
            match set_key(path, &key, &value, options) {
                Ok((_, key, value)) => {
                    println!("{key}={value}");
                    0
                }
                Err(err) => fail(&err),
            }
        }
        CliCommand::Unset { key } => match unset_key(path, &key, Encoding::Utf8) {
            Ok((UnsetStatus::Removed, key)) => {
                println!("Successfully removed {key}");
                0
            }
            Ok((UnsetStatus::KeyNotFound, _)) => 1,
            Ok((UnsetStatus::FileMissing, _)) => report_unreadable(path),
            Err(err) => fail(&err),
        },
        CliCommand::Run {
            no_override,
            command,
        } => match execute_run(path, !no_override, &command) {
            Ok(code) => code,
            Err(Error::FileNotFound { .. }) => report_unreadable(path),
            Err(err) => fail(&err),
        },
    }
}

fn execute_run(path: &Path, override_existing: bool, argv: &[OsString]) -> Result<i32, Error> {
    let values = EnvLoader::new()
        .path(path)
        .required(true)
        .override_existing(override_existing)
        .target(TargetEnv::snapshot_process())
        .parse_only()?;

    let Some((program, args)) = argv.split_first() else {
        return Ok(1);
    };
    let mut command = Command::new(program);
    command.args(args);

    for (key, value) in values {
        if !override_existing && env::var_os(&key).is_some() {
            continue;
        }
        command.env(key, value);
    }

    Ok(execute_command(command, program))
}

#[cfg(unix)]
fn execute_command(mut command: Command, program: &OsString) -> i32 {
    let err = command.exec();
    eprintln!("dotenv: failed to execute `{}`: {err}", program.to_string_lossy());
    1
}

#[cfg(not(unix))]
fn execute_command(mut command: Command, program: &OsString) -> i32 {
    match command.status() {
        Ok(status) => status.code().unwrap_or(1),
        Err(err) => {
            eprintln!("dotenv: failed to execute `{}`: {err}", program.to_string_lossy());
            1
        }
    }
}

fn render_list(values: &EnvMap, format: ListFormat) -> String {
    let (prefix, quote) = match format {
        ListFormat::Simple => ("", false),
        ListFormat::Shell => ("", true),
        ListFormat::Export => ("export ", true),
        ListFormat::Json => return render_json(values),
    };

    let mut out = String::new();
    for (key, value) in values.iter() {
        let value = if quote {
            shell_quote(value)
        } else {
            value.to_owned()
        };
        out.push_str(&format!("{prefix}{key}={value}\n"));
    }
    out
}

fn render_json(values: &EnvMap) -> String {
    let object: serde_json::Map<String, serde_json::Value> = values
        .iter()
        .map(|(key, value)| (key.to_owned(), serde_json::Value::String(value.to_owned())))
        .collect();
    let mut out = serde_json::to_string_pretty(&object).unwrap_or_default();
    out.push('\n');
    out
}

/// POSIX shell quoting: safe words pass through, everything else is wrapped
/// in single quotes.
fn shell_quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_owned();
    }
    let safe = value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || "@%+=:,./_-".contains(ch));
    if safe {
        return value.to_owned();
    }
    format!("'{}'", value.replace('\'', r#"'"'"'"#))
}

fn report_unreadable(path: &Path) -> i32 {
    eprintln!("Error opening env file {}", path.display());
    2
}

fn fail(err: &Error) -> i32 {
    eprintln!("dotenv: {err}");
    1
}
