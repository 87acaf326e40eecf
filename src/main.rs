use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use kernkeep::cache::{AptListsSource, CacheSession, CacheSource, PackageCache};
use kernkeep::config::{loader, AppConfig};
use kernkeep::kernel::dispatcher::{action_allowed, group_purge_plan, group_remove_plan, purge_all_plan};
use kernkeep::kernel::manager::occupied_space;
use kernkeep::kernel::support::{bundled_support_table, current_month_index, load_support_table};
use kernkeep::kernel::{group_kernels, load_blacklist, support_status, KernelManager};
use kernkeep::log_collector::get_global_logs_path;
use kernkeep::models::{BlacklistRule, KernelRecord, SupportEntry, Verb};
use kernkeep::system::{self, boot_space, format_size, kernel_changelog};

const FIRST_RUN_WARNING: &str = "\
Installing or removing kernels changes how your system boots.
Keep at least one known-good kernel installed; the running kernel is never removed.";

#[derive(Parser)]
#[command(name = "kernkeep")]
#[command(about = "List, filter and manage installed kernel packages", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/kernkeep/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Do not add header packages to kernel operations
    #[arg(long, global = true)]
    no_headers: bool,

    /// Do not add extra image/modules packages to kernel operations
    #[arg(long, global = true)]
    no_extras: bool,

    /// Install even when /boot is low on space
    #[arg(long, global = true)]
    force: bool,

    /// Write debug messages to the log
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List kernels, newest first
    List {
        /// Include blacklisted kernels
        #[arg(long)]
        all: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Only kernels of this series, e.g. 4.15
        #[arg(long)]
        group: Option<String>,
    },
    /// Summarize kernel series with their support status
    Groups {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Running kernel and disk usage
    Info,
    /// Print the changelog of a kernel, downloading it when not installed
    Changelog { kernel: String },
    /// Install kernels
    Install {
        #[arg(required = true)]
        kernels: Vec<String>,
    },
    /// Remove kernels, keeping their configuration files
    Remove {
        #[arg(required = true)]
        kernels: Vec<String>,
    },
    /// Remove kernels including their configuration files
    Purge {
        #[arg(required = true)]
        kernels: Vec<String>,
    },
    /// Purge every listed kernel except the running one; blacklisted kernels are left alone
    PurgeAll,
    /// Remove every listed installed kernel of a series except the running one
    RemoveGroup { major: String },
    /// Purge every listed kernel of a series except the running one
    PurgeGroup { major: String },
    /// Refresh the package lists
    Refresh,
}

impl Commands {
    fn changes_packages(&self) -> bool {
        !matches!(
            self,
            Commands::List { .. } | Commands::Groups { .. } | Commands::Info | Commands::Changelog { .. }
        )
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => loader::load_or_default(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AppConfig::load(),
    };
    config.validate().context("Invalid configuration")?;

    let logs = get_global_logs_path()
        .map_err(anyhow::Error::msg)
        .and_then(|dir| kernkeep::init_logging(&dir, cli.debug || config.logging.debug).map_err(anyhow::Error::msg));
    let collector = match logs {
        Ok(collector) => Some(collector),
        Err(e) => {
            eprintln!("warning: logging to disk disabled: {}", e);
            None
        }
    };

    if cli.command.changes_packages() && !config.checks.warning_acknowledged {
        eprintln!("{}", FIRST_RUN_WARNING);
        config.checks.warning_acknowledged = true;
        let saved = match &cli.config {
            Some(path) => loader::save_config_to_file(&config, path),
            None => config.save(),
        };
        if let Err(e) = saved {
            log::warn!("[Main] Could not record warning acknowledgement: {}", e);
        }
    }

    if cli.no_headers {
        config.operations.include_headers = false;
    }
    if cli.no_extras {
        config.operations.include_extras = false;
    }

    let result = run(&cli, &config);

    if let Some(collector) = collector {
        if let Err(e) = collector.wait_for_empty() {
            eprintln!("warning: log file may be incomplete: {}", e);
        }
    }
    result
}

fn run(cli: &Cli, config: &AppConfig) -> anyhow::Result<()> {
    let source = AptListsSource::new(
        config.paths.dpkg_status.clone(),
        config.paths.apt_lists.clone(),
        system::debian_arch(),
    );
    let session = CacheSession::open(source).context("Failed to open the package cache")?;
    let mut manager = KernelManager::new(
        session,
        config.installer(),
        config.scan_options(),
        config.selection(),
    );

    match &cli.command {
        Commands::List { all, json, group } => {
            let mut kernels = if *all {
                manager.kernels()?
            } else {
                manager.filtered_kernels(&blacklist(config))?
            };
            if let Some(major) = group {
                kernels.retain(|k| &k.version_major == major);
            }
            if *json {
                println!("{}", serde_json::to_string_pretty(&kernels)?);
            } else {
                print_kernels(&kernels);
            }
        }
        Commands::Groups { json } => {
            let kernels = manager.filtered_kernels(&blacklist(config))?;
            let entries = support_entries(config);
            let groups = group_kernels(&kernels);
            if *json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                for group in groups {
                    println!(
                        "{:<8} {:>3} available {:>3} installed {:>3} downloaded{}  {}",
                        group.version_major,
                        group.available,
                        group.installed,
                        group.downloaded,
                        if group.has_active { " (running)" } else { "" },
                        support_status(&group.version_major, &group.origins, &entries)
                    );
                }
            }
        }
        Commands::Info => {
            let kernels = manager.kernels()?;
            let boot = boot_space(std::path::Path::new("/boot"));
            println!("Running kernel:   {}", system::current_kernel());
            println!("Kernel series:    {}", system::current_kernel_major());
            println!("Kernels on disk:  {}", format_size(occupied_space(&kernels)));
            if boot.is_known() {
                println!(
                    "/boot free:       {} of {}",
                    format_size(boot.free),
                    format_size(boot.total)
                );
            } else {
                println!("/boot free:       unknown");
            }
        }
        Commands::Changelog { kernel } => {
            let snapshot = manager.snapshot();
            if !snapshot.contains(kernel) {
                bail!("{} is not in the package cache", kernel);
            }
            let remote = config.remote_changelog();
            let text = kernel_changelog(&*snapshot, kernel, &config.paths.doc_root, remote.as_ref());
            if text.is_empty() {
                bail!("No changelog found for {}", kernel);
            }
            print!("{}", text);
        }
        Commands::Install { kernels } => act(&mut manager, config, cli.force, kernels, Verb::Install)?,
        Commands::Remove { kernels } => act(&mut manager, config, cli.force, kernels, Verb::Remove)?,
        Commands::Purge { kernels } => act(&mut manager, config, cli.force, kernels, Verb::Purge)?,
        Commands::PurgeAll => {
            let plan = purge_all_plan(&manager.filtered_kernels(&blacklist(config))?);
            perform(&mut manager, &plan, Verb::Purge)?;
        }
        Commands::RemoveGroup { major } => {
            let plan = group_remove_plan(&manager.filtered_kernels(&blacklist(config))?, major);
            perform(&mut manager, &plan, Verb::Remove)?;
        }
        Commands::PurgeGroup { major } => {
            let plan = group_purge_plan(&manager.filtered_kernels(&blacklist(config))?, major);
            perform(&mut manager, &plan, Verb::Purge)?;
        }
        Commands::Refresh => {
            let snapshot = manager.refresh().context("Package list refresh failed")?;
            println!("Package lists refreshed ({} packages)", snapshot.len());
        }
    }

    Ok(())
}

fn blacklist(config: &AppConfig) -> Vec<BlacklistRule> {
    match load_blacklist(&config.paths.user_blacklist, &config.paths.default_blacklist) {
        Ok(rules) => rules,
        Err(e) => {
            log::warn!("[Main] Blacklist not applied: {}", e);
            Vec::new()
        }
    }
}

fn support_entries(config: &AppConfig) -> Vec<SupportEntry> {
    let now = current_month_index();
    match load_support_table(&config.paths.support_table, now) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("[Main] {}; using bundled support table", e);
            bundled_support_table(now)
        }
    }
}

fn print_kernels(kernels: &[KernelRecord]) {
    for k in kernels {
        let state = if k.active {
            "running"
        } else if k.installed {
            "installed"
        } else if k.downloaded {
            "downloaded"
        } else {
            "available"
        };
        println!(
            "{:<10} {:<40} {:<20} {:>10}  {}",
            state,
            k.package,
            k.pkg_version,
            format_size(k.installed_size),
            k.origins_display()
        );
    }
}

/// Single-kernel action with the per-kernel guards applied.
fn act<S: CacheSource>(
    manager: &mut KernelManager<S>,
    config: &AppConfig,
    force: bool,
    requested: &[String],
    verb: Verb,
) -> anyhow::Result<()> {
    let kernels = manager.kernels()?;
    let mut fullnames = Vec::new();

    for name in requested {
        let Some(record) = kernels.iter().find(|k| &k.fullname == name || &k.package == name) else {
            bail!("{} is not a known kernel package", name);
        };
        if action_allowed(record, verb) {
            fullnames.push(record.fullname.clone());
        } else {
            eprintln!("Skipping {}: cannot {} it in its current state", record.package, verb);
        }
    }

    if verb == Verb::Install && !force {
        let boot = boot_space(std::path::Path::new("/boot"));
        if boot.is_low(config.boot.low_space_bytes) {
            bail!(
                "Only {} free on /boot; remove old kernels first or pass --force",
                format_size(boot.free)
            );
        }
    }

    perform(manager, &fullnames, verb)
}

fn perform<S: CacheSource>(
    manager: &mut KernelManager<S>,
    fullnames: &[String],
    verb: Verb,
) -> anyhow::Result<()> {
    if fullnames.is_empty() {
        println!("Nothing to {}", verb);
        return Ok(());
    }

    match manager.perform(fullnames, verb) {
        Ok(_) => {
            println!("{} finished for {} kernel(s)", verb, fullnames.len());
            Ok(())
        }
        Err(e) => bail!("{} failed (status {}): {}", verb, e.status_code(), e),
    }
}
