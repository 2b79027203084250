//! # Plan Command Implementation
//!
//! This module implements the `plan` subcommand, which shows the builds a
//! `build` invocation would run: one node per distinct architecture, the
//! targets served by it, and where its archive is written.
//!
//! ## Example
//!
//! ```text
//! /work/app/rootfs.yaml
//! ├─ x86_64 -> .unikraft/build/initramfs-x86_64.cpio
//! │  ├─ qemu
//! │  └─ firecracker
//! └─ arm64 -> .unikraft/build/initramfs-arm64.cpio
//!    └─ rpi
//! ```

use anyhow::Result;
use clap::Args;
use ptree::{print_tree, TreeItem};
use std::path::Path;

use unirootfs::config::Config;
use unirootfs::output::{emoji, OutputConfig};
use unirootfs::rootfs::{Orchestrator, PlannedBuild};
use unirootfs::target::{BuildTarget, Target};

use super::RootfsArgs;

/// Show the per-architecture builds without running them
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub selection: RootfsArgs,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the `plan` command.
pub fn execute(args: PlanArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let inv = args.selection.resolve()?;

    let orchestrator = Orchestrator::new(&inv.workdir, &Config::default());
    let plan = orchestrator.plan(&inv.rootfs, &inv.targets);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    if plan.is_empty() {
        println!("{} Nothing to build", emoji(&out, "ℹ️", "[INFO]"));
        return Ok(());
    }

    print_plan(&plan, &inv.targets, &inv.workdir)
}

/// Print the plan as a tree to stdout.
pub fn print_plan(plan: &[PlannedBuild], targets: &[Target], workdir: &Path) -> Result<()> {
    let root = build_plan_tree(plan, targets, workdir);
    print_tree(&root).map_err(|e| anyhow::anyhow!("Failed to display plan: {}", e))?;
    Ok(())
}

fn build_plan_tree(plan: &[PlannedBuild], targets: &[Target], workdir: &Path) -> TreeNode {
    let label = plan
        .first()
        .map(|p| p.rootfs.display().to_string())
        .unwrap_or_default();

    let children = plan
        .iter()
        .map(|planned| {
            let output = planned.output.strip_prefix(workdir).unwrap_or(&planned.output);
            let children = targets
                .iter()
                .filter(|t| t.architecture() == planned.architecture)
                .map(|t| TreeNode {
                    label: t.name.clone(),
                    children: Vec::new(),
                })
                .collect();
            TreeNode {
                label: format!("{} -> {}", planned.architecture, output.display()),
                children,
            }
        })
        .collect();

    TreeNode { label, children }
}

/// Tree node structure for ptree visualization
#[derive(Clone)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(
        &self,
        f: &mut W,
        _style: &ptree::Style,
    ) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> std::borrow::Cow<'_, [Self::Child]> {
        std::borrow::Cow::Borrowed(&self.children)
    }
}
