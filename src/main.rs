//! pidgraph CLI: resource lifecycle over RDF named graphs.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use pidgraph::catalog::{Catalog, View};
use pidgraph::config::CatalogConfig;
use pidgraph::pid::PidUri;
use pidgraph::resource::ResourceRequest;

#[derive(Parser)]
#[command(
    name = "pidgraph",
    version,
    about = "Versioned resource lifecycle over RDF named graphs"
)]
struct Cli {
    /// Path to the catalog config (TOML). Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the store data directory from the config.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Person performing the operation.
    #[arg(long, global = true, env = "PIDGRAPH_ACTOR", default_value = "")]
    actor: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file.
    InitConfig {
        /// Destination path.
        #[arg(long, default_value = "pidgraph.toml")]
        path: PathBuf,
    },

    /// Create a draft from a JSON resource request.
    Create {
        /// Path to the JSON request.
        #[arg(long)]
        file: PathBuf,
    },

    /// Replace the draft of an existing resource from a JSON resource request.
    Edit {
        /// Path to the JSON request.
        #[arg(long)]
        file: PathBuf,
    },

    /// Publish the pending draft.
    Publish { pid: String },

    /// Mark a published resource for deletion.
    MarkDeleted { pid: String },

    /// Withdraw a deletion mark.
    UnmarkDeleted { pid: String },

    /// Discard the pending draft.
    DeleteDraft { pid: String },

    /// Permanently remove a resource marked for deletion.
    Purge { pid: String },

    /// Add a typed link between two published resources.
    Link {
        source: String,
        /// Link type IRI or local name.
        link_type: String,
        target: String,
    },

    /// Remove a typed link.
    Unlink {
        source: String,
        link_type: String,
        target: String,
        /// Return the target instead of the source.
        #[arg(long)]
        inverse: bool,
    },

    /// Attach a standalone resource to an existing lineage.
    LinkVersion {
        /// Any member of the lineage.
        existing: String,
        /// The resource to attach.
        new: String,
    },

    /// Print one lifecycle instance of a resource.
    Show {
        pid: String,
        #[arg(long, value_enum, default_value = "latest")]
        view: ViewArg,
    },

    /// Print the version lineage of a resource.
    Versions { pid: String },

    /// Print link history records touching a resource.
    History {
        pid: String,
        /// Restrict to links ending at this PID URI.
        #[arg(long)]
        end: Option<String>,
    },

    /// List revisions, or print one with --number.
    Revisions {
        pid: String,
        #[arg(long)]
        number: Option<u32>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ViewArg {
    Draft,
    Published,
    Latest,
}

impl From<ViewArg> for View {
    fn from(arg: ViewArg) -> Self {
        match arg {
            ViewArg::Draft => View::Draft,
            ViewArg::Published => View::Published,
            ViewArg::Latest => View::Latest,
        }
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::InitConfig { path } = &cli.command {
        CatalogConfig::default().save(path)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => CatalogConfig::load(path)?,
        None => CatalogConfig::default(),
    };
    if cli.data_dir.is_some() {
        config.store.data_dir = cli.data_dir.clone();
    }
    let catalog = Catalog::open(config)?;
    let actor = cli.actor.as_str();

    match cli.command {
        Commands::InitConfig { .. } => {}

        Commands::Create { file } => {
            let request = read_request(&file)?;
            print_json(&catalog.create_resource(&request, actor)?)?;
        }

        Commands::Edit { file } => {
            let request = read_request(&file)?;
            print_json(&catalog.edit_resource(&request, actor)?)?;
        }

        Commands::Publish { pid } => {
            print_json(&catalog.publish_resource(&PidUri::parse(&pid)?, actor)?)?;
        }

        Commands::MarkDeleted { pid } => {
            print_json(&catalog.mark_deleted(&PidUri::parse(&pid)?, actor)?)?;
        }

        Commands::UnmarkDeleted { pid } => {
            print_json(&catalog.unmark_deleted(&PidUri::parse(&pid)?, actor)?)?;
        }

        Commands::DeleteDraft { pid } => {
            match catalog.delete_draft(&PidUri::parse(&pid)?, actor)? {
                Some(published) => print_json(&published)?,
                None => println!("Draft of {pid} deleted; nothing remains."),
            }
        }

        Commands::Purge { pid } => {
            catalog.purge(&PidUri::parse(&pid)?, actor)?;
            println!("Purged {pid}");
        }

        Commands::Link {
            source,
            link_type,
            target,
        } => {
            let source = PidUri::parse(&source)?;
            let target = PidUri::parse(&target)?;
            print_json(&catalog.add_link(&source, &link_type, &target, actor)?)?;
        }

        Commands::Unlink {
            source,
            link_type,
            target,
            inverse,
        } => {
            let source = PidUri::parse(&source)?;
            let target = PidUri::parse(&target)?;
            print_json(&catalog.remove_link(&source, &link_type, &target, inverse, actor)?)?;
        }

        Commands::LinkVersion { existing, new } => {
            let existing = PidUri::parse(&existing)?;
            let new = PidUri::parse(&new)?;
            print_json(&catalog.link_version(&existing, &new, actor)?)?;
        }

        Commands::Show { pid, view } => {
            print_json(&catalog.resource(&PidUri::parse(&pid)?, view.into())?)?;
        }

        Commands::Versions { pid } => {
            let versions = catalog.versions(&PidUri::parse(&pid)?)?;
            if versions.is_empty() {
                println!("{pid} has no version lineage.");
            }
            for v in &versions {
                println!("{:<12} {:<18} {}", v.version, v.lifecycle_status, v.pid_uri);
            }
        }

        Commands::History { pid, end } => {
            let pid = PidUri::parse(&pid)?;
            let records = match end {
                Some(end) => catalog.link_history_between(&pid, &PidUri::parse(&end)?)?,
                None => catalog.link_history(&pid)?,
            };
            print_json(&records)?;
        }

        Commands::Revisions { pid, number } => {
            let pid = PidUri::parse(&pid)?;
            match number {
                Some(n) => print_json(&catalog.revision(&pid, n)?)?,
                None => print_json(&catalog.revisions(&pid)?)?,
            }
        }
    }

    Ok(())
}

fn read_request(path: &Path) -> Result<ResourceRequest> {
    let content = std::fs::read_to_string(path).into_diagnostic()?;
    serde_json::from_str(&content).into_diagnostic()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
