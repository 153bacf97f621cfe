//! kdbx 命令行入口
//!
//! 用法：
//!   kdbx init <file>
//!   kdbx list <file>
//!   kdbx show <file> <entry-uuid> [--reveal]
//!   kdbx add-group <file> <name>
//!   kdbx add-entry <file> --title <title> [--username ..] [--password ..]
//!   kdbx attach <file> <entry-uuid> <path>
//!   kdbx detach <file> <entry-uuid> <index>
//!   kdbx resave <file> [-o <out>]
//!
//! 口令从 KDBX_PASSPHRASE 读取，未设置时在终端提示输入。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use zeroize::Zeroizing;

use kdbx_engine::{Compression, Group, KdbxConfig, KdbxFile, NewEntry};

#[derive(Parser, Debug)]
#[command(name = "kdbx", version, about = "Read and write KeePass 2.x (KDBX 3.x) databases")]
struct Cli {
    /// Database passphrase (prompted for when absent)
    #[arg(long, env = "KDBX_PASSPHRASE", hide_env_values = true, global = true)]
    passphrase: Option<String>,

    /// Trim padding by the last byte only, without checking the other padding bytes
    #[arg(long, global = true)]
    permissive_padding: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "KDBX_LOG", default_value = "warn", global = true)]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new empty database
    Init {
        file: PathBuf,
        /// Key transformation rounds
        #[arg(long)]
        rounds: Option<u64>,
        /// Store the XML payload without gzip
        #[arg(long)]
        no_compression: bool,
    },
    /// List groups and entries
    List { file: PathBuf },
    /// Show one entry
    Show {
        file: PathBuf,
        entry: String,
        /// Print the password in clear text
        #[arg(long)]
        reveal: bool,
    },
    /// Add a group under the root group
    AddGroup { file: PathBuf, name: String },
    /// Add an entry
    AddEntry {
        file: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Target group UUID (defaults to the root group)
        #[arg(long)]
        group: Option<String>,
    },
    /// Attach a file to an entry
    Attach {
        file: PathBuf,
        entry: String,
        path: PathBuf,
        /// Name stored in the database (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove the attachment at `index` from an entry
    Detach {
        file: PathBuf,
        entry: String,
        index: usize,
    },
    /// Decrypt and write the database again
    Resave {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    let mut config = KdbxConfig {
        strict_padding: !cli.permissive_padding,
        ..KdbxConfig::default()
    };
    let passphrase = read_passphrase(cli.passphrase)?;

    match cli.command {
        Command::Init {
            file,
            rounds,
            no_compression,
        } => {
            if let Some(rounds) = rounds {
                config.default_transform_rounds = rounds;
            }
            let mut db = KdbxFile::create_with_config(&file, &passphrase, config)
                .with_context(|| format!("creating {}", file.display()))?;
            if no_compression {
                db.set_compression(Compression::None)?;
                db.save()?;
            }
            println!("created {}", file.display());
        }
        Command::List { file } => {
            let db = open(&file, passphrase, config)?;
            let root = db.database().root_group()?;
            print_group(&root, 0);
        }
        Command::Show {
            file,
            entry,
            reveal,
        } => {
            let db = open(&file, passphrase, config)?;
            let entry = db.database().entry(&entry)?;
            for key in entry.field_keys() {
                let value = entry.field(key).unwrap_or_default();
                if key == kdbx_engine::document::FIELD_PASSWORD && !reveal {
                    println!("{key}: {}", "*".repeat(value.chars().count().min(8)));
                } else {
                    println!("{key}: {value}");
                }
            }
            for (index, attachment) in entry.attachments().iter().enumerate() {
                println!("#{index} {} (binary {})", attachment.filename(), attachment.id()?);
            }
        }
        Command::AddGroup { file, name } => {
            let mut db = open(&file, passphrase, config)?;
            let uuid = db.database_mut().add_group(&name)?;
            db.save()?;
            println!("{uuid}");
        }
        Command::AddEntry {
            file,
            title,
            username,
            password,
            url,
            notes,
            group,
        } => {
            let mut db = open(&file, passphrase, config)?;
            let fields = NewEntry {
                title,
                username,
                password,
                url,
                notes,
            };
            let uuid = match group {
                Some(group) => db.database_mut().add_entry_to(&group, &fields)?,
                None => db.database_mut().add_entry(&fields)?,
            };
            db.save()?;
            println!("{uuid}");
        }
        Command::Attach {
            file,
            entry,
            path,
            name,
        } => {
            let content = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let name = match name {
                Some(name) => name,
                None => file_name(&path)?,
            };
            let mut db = open(&file, passphrase, config)?;
            let id = db.database_mut().attach(&entry, &name, &content)?;
            db.save()?;
            println!("attached {name} as binary {id}");
        }
        Command::Detach { file, entry, index } => {
            let mut db = open(&file, passphrase, config)?;
            db.database_mut().detach(&entry, index)?;
            db.save()?;
        }
        Command::Resave { file, output } => {
            let mut db = open(&file, passphrase, config)?;
            match output {
                Some(out) => db.save_as(&out)?,
                None => db.save()?,
            }
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_passphrase(given: Option<String>) -> Result<Zeroizing<String>> {
    match given {
        Some(p) => Ok(Zeroizing::new(p)),
        None => rpassword::prompt_password("Passphrase: ")
            .map(Zeroizing::new)
            .context("reading passphrase"),
    }
}

fn open(path: &Path, passphrase: Zeroizing<String>, config: KdbxConfig) -> Result<KdbxFile> {
    let pending = KdbxFile::begin_open(path, passphrase, config)
        .with_context(|| format!("opening {}", path.display()))?;
    info!(path = %pending.path().display(), "deriving master key");
    pending
        .finish()
        .with_context(|| format!("opening {}", path.display()))
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}

fn print_group(group: &Group<'_>, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{indent}[{}] {}", group.uuid(), group.title());
    for entry in group.entries() {
        println!("{indent}  {} {} <{}>", entry.uuid(), entry.title(), entry.username());
    }
    for child in group.groups() {
        print_group(&child, depth + 1);
    }
}
