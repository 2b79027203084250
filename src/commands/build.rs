//! Build command implementation
//!
//! Builds the rootfs once for every distinct architecture among the selected
//! targets and reports the archive, entrypoint and environment of each.

use anyhow::Result;
use clap::Args;
use std::time::{Duration, Instant};

use unirootfs::cancel::CancelToken;
use unirootfs::config::Config;
use unirootfs::output::{emoji, OutputConfig};
use unirootfs::rootfs::{Orchestrator, RootfsBuild};
use unirootfs::tasktree::RendererKind;

use super::{plan, RootfsArgs};

/// Arguments for the build command
#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub selection: RootfsArgs,

    /// Do not gzip the generated archives
    #[arg(long)]
    pub no_compress: bool,

    /// Abort the build after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Show the builds that would run without running them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Print the result as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

/// Execute the build command
pub fn execute(args: BuildArgs, color_flag: &str, config: &Config) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let start_time = Instant::now();

    let inv = args.selection.resolve()?;
    let compress = inv.compress && !args.no_compress;

    if args.dry_run {
        let orchestrator = Orchestrator::new(&inv.workdir, config);
        let planned = orchestrator.plan(&inv.rootfs, &inv.targets);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&planned)?);
        } else if planned.is_empty() {
            println!("{} Nothing to build", emoji(&out, "ℹ️", "[INFO]"));
        } else {
            println!(
                "{} DRY RUN MODE - No archives will be written",
                emoji(&out, "🔎", "[DRY RUN]")
            );
            println!();
            plan::print_plan(&planned, &inv.targets, &inv.workdir)?;
        }
        return Ok(());
    }

    let cancel = match args.timeout {
        Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    };
    let renderer = out.renderer(RendererKind::from_log_type(config.log.log_type));

    let result = Orchestrator::new(&inv.workdir, config)
        .with_cancel(cancel)
        .with_renderer(renderer)
        .build_rootfs(&inv.rootfs, compress, &inv.targets);

    match result {
        Ok(build) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&build)?);
            } else {
                print_summary(&out, &build, start_time.elapsed());
            }
            Ok(())
        }
        Err(e) => {
            if !args.json {
                println!("{} Rootfs build failed", emoji(&out, "❌", "[FAIL]"));
                println!();
            }
            Err(e.into())
        }
    }
}

fn print_summary(out: &OutputConfig, build: &RootfsBuild, elapsed: Duration) {
    if build.is_empty() {
        println!("{} Nothing to build", emoji(out, "ℹ️", "[INFO]"));
        return;
    }

    println!(
        "{} Built rootfs for {} architecture(s) in {:.2}s",
        emoji(out, "✅", "[OK]"),
        build.architectures.len(),
        elapsed.as_secs_f64()
    );
    for (i, arch) in build.architectures.iter().enumerate() {
        println!("   {}", arch);
        if let Some(cmd) = build.commands.get(i).filter(|c| !c.is_empty()) {
            println!("     cmd: {}", cmd.join(" "));
        }
        if let Some(env) = build.envs.get(i).filter(|e| !e.is_empty()) {
            println!("     env: {}", env.join(" "));
        }
    }
    if let Some(rootfs) = &build.rootfs {
        println!("   Last archive: {}", rootfs.display());
    }
}
