use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use sqpatch_adapters::{configuration, telemetry, ZiPatchParser};
use sqpatch_core::config::Settings;
use sqpatch_core::entities::{ApplyProgress, CancellationToken, LocalPatch};
use sqpatch_core::ports::ZiPatchApplier;
use sqpatch_core::use_cases::{InstallPatchesUseCase, InstallProgress, InstallStage};
use sqpatch_core::zipatch::{InstallContext, Platform};
use tracing::{error, info, warn};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}";

#[derive(Parser)]
#[command(author, version, about = "Apply ZiPatch files to a game installation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every command that writes to a game installation
#[derive(clap::Args, Clone)]
struct ApplyArgs {
    /// Platform suffix used for sqpack file names (win32, ps3, ps4)
    #[arg(short, long)]
    platform: Option<Platform>,

    /// Log and continue when a delete targets a missing file
    #[arg(long, default_value = "false")]
    ignore_missing: bool,

    /// Record the old-data mismatch tolerance; existing data is never compared, so no apply step reads it
    #[arg(long, default_value = "false")]
    ignore_old_mismatch: bool,

    /// Skip CRC32 verification of each chunk
    #[arg(long, default_value = "false")]
    no_verify: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a single patch file
    Apply {
        /// Patch file to apply
        patch: PathBuf,

        /// Path to game installation (falls back to patch.game_path)
        #[arg(short, long)]
        game_path: Option<PathBuf>,

        #[command(flatten)]
        args: ApplyArgs,
    },

    /// List the chunks of a patch file without applying it
    Inspect {
        patch: PathBuf,

        /// Also print the offset, size and checksum of each chunk
        #[arg(short, long, default_value = "false")]
        verbose: bool,
    },

    /// Check every chunk checksum of a patch file
    Verify { patch: PathBuf },

    /// Apply several patch files in order
    Install {
        /// Path to game installation (falls back to patch.game_path)
        #[arg(short, long)]
        game_path: Option<PathBuf>,

        /// Patch files, oldest first
        #[arg(required = true)]
        patches: Vec<PathBuf>,

        /// Keep patch files after applying
        #[arg(long, default_value = "false")]
        keep_patches: bool,

        /// Skip confirmation prompt
        #[arg(short, long, default_value = "false")]
        yes: bool,

        #[command(flatten)]
        args: ApplyArgs,
    },
}

fn progress_bar(len: u64) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn resolve_game_path(flag: Option<PathBuf>, settings: &Settings) -> anyhow::Result<PathBuf> {
    flag.or_else(|| settings.patch.game_path.clone())
        .context("no game path given; pass --game-path or set patch.game_path")
}

fn install_context(game_path: PathBuf, args: &ApplyArgs, settings: &Settings) -> InstallContext {
    InstallContext::new(game_path)
        .with_platform(args.platform.unwrap_or(settings.patch.platform))
        .with_ignore_missing(args.ignore_missing || settings.patch.ignore_missing)
        .with_ignore_old_mismatch(args.ignore_old_mismatch || settings.patch.ignore_old_mismatch)
}

fn applier(args: &ApplyArgs, settings: &Settings) -> ZiPatchParser {
    let mut patch = settings.patch.clone();
    if args.no_verify {
        patch.verify_checksums = false;
    }
    ZiPatchParser::from_settings(&patch, &settings.store)
}

/// Cancel the token on the first Ctrl-C; the running apply stops between chunks
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current chunk");
            handle.cancel();
        }
    });
    token
}

async fn apply_one(
    patch: &Path,
    context: InstallContext,
    applier: ZiPatchParser,
) -> anyhow::Result<()> {
    let len = std::fs::metadata(patch)
        .with_context(|| format!("cannot read {}", patch.display()))?
        .len();
    let pb = progress_bar(len)?;
    let cancel = cancel_on_ctrl_c();

    let patch_path = patch.to_path_buf();
    let pb_clone = pb.clone();
    let result = tokio::task::spawn_blocking(move || {
        let progress = move |p: ApplyProgress| {
            pb_clone.set_position(p.bytes_processed);
        };
        applier.apply_patch(&patch_path, &context, &cancel, &progress)
    })
    .await
    .context("apply task panicked")?;

    match result {
        Ok(summary) => {
            pb.finish_and_clear();
            println!(
                "Applied {} ({} v{}): {} chunks, {} bytes",
                patch.display(),
                summary.patch_type,
                summary.patch_version,
                summary.chunks_applied,
                summary.bytes_processed
            );
            Ok(())
        }
        Err(e) => {
            pb.abandon();
            error!(error = %e, "failed to apply patch");
            if e.is_corrupt_patch() {
                println!("The patch file is corrupt; download it again.");
            }
            Err(e).with_context(|| format!("applying {}", patch.display()))
        }
    }
}

async fn install_all(
    patches: &[PathBuf],
    context: InstallContext,
    applier: ZiPatchParser,
    keep_patches: bool,
) -> anyhow::Result<()> {
    let local: Vec<LocalPatch> = patches.iter().map(|p| LocalPatch::new(p.clone())).collect();
    let use_case =
        InstallPatchesUseCase::new(Arc::new(applier)).with_keep_patches(keep_patches);
    let cancel = cancel_on_ctrl_c();

    let pb = progress_bar(0)?;
    let pb_clone = pb.clone();
    let progress = move |p: InstallProgress| match &p.stage {
        InstallStage::Verifying {
            patch_index,
            total_patches,
        } => {
            pb_clone.set_message(format!("verifying {}/{}", patch_index, total_patches));
        }
        InstallStage::Applying {
            patch_index,
            total_patches,
            version,
        } => {
            pb_clone.set_length(p.bytes_total);
            pb_clone.set_position(p.bytes_processed);
            pb_clone.set_message(format!("[{}/{}] {}", patch_index, total_patches, version));
        }
        InstallStage::Completed => pb_clone.finish_and_clear(),
        InstallStage::Failed { .. } => pb_clone.abandon(),
    };

    let summaries = use_case
        .install(&local, &context, &cancel, progress)
        .await
        .context("install failed")?;

    pb.finish_and_clear();
    for (patch, summary) in local.iter().zip(&summaries) {
        println!(
            "- {} ({} chunks, {} bytes)",
            patch.version_id, summary.chunks_applied, summary.bytes_processed
        );
    }
    println!("Installed {} patches.", summaries.len());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = match configuration::get_configuration() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to load configuration: {}", e);
            return Err(anyhow::anyhow!("configuration loading failed"));
        }
    };

    let _guard = telemetry::init_subscriber("sqpatch", &settings.log_level);

    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            patch,
            game_path,
            args,
        } => {
            let game_path = resolve_game_path(game_path, &settings)?;
            info!(patch = %patch.display(), game = %game_path.display(), "Applying patch");
            let context = install_context(game_path, &args, &settings);
            apply_one(&patch, context, applier(&args, &settings)).await?;
        }

        Commands::Inspect { patch, verbose } => {
            let parser = ZiPatchParser::without_checksum_verification();
            let frames = parser
                .parse_patch(&patch)
                .with_context(|| format!("reading {}", patch.display()))?;
            for frame in &frames {
                if verbose {
                    let flag = if frame.is_checksum_valid() { "" } else { " (bad crc)" };
                    println!(
                        "{:>10} {:>8} {:08x}{} {}",
                        frame.offset, frame.size, frame.checksum, flag, frame.chunk
                    );
                } else {
                    println!("{}", frame.chunk);
                }
            }
            println!("{} chunks", frames.len());
        }

        Commands::Verify { patch } => {
            let parser = ZiPatchParser::new();
            match parser.parse_patch(&patch) {
                Ok(frames) => println!("OK: {} chunks verified", frames.len()),
                Err(e) => {
                    println!("FAILED: {}", e);
                    return Err(anyhow::anyhow!("patch verification failed"));
                }
            }
        }

        Commands::Install {
            game_path,
            patches,
            keep_patches,
            yes,
            args,
        } => {
            let game_path = resolve_game_path(game_path, &settings)?;

            println!("Patches to install into {}:", game_path.display());
            for patch in &patches {
                println!("  {}", patch.display());
            }

            let confirmed = if yes {
                true
            } else {
                Confirm::new()
                    .with_prompt("Apply these patches?")
                    .default(true)
                    .interact()?
            };

            if !confirmed {
                println!("Cancelled.");
                return Ok(());
            }

            let context = install_context(game_path, &args, &settings);
            install_all(
                &patches,
                context,
                applier(&args, &settings),
                keep_patches || settings.patch.keep_patches,
            )
            .await?;
        }
    }

    Ok(())
}
