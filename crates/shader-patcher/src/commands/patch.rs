use super::{archive_order, GameArgs};
use crate::errors::CliError;
use crate::println_pad;
use crate::utils::{default_output_dir, default_user_config};
use camino::{Utf8Path, Utf8PathBuf};
use colored::Colorize;
use miette::Result;
use sp_patcher::{
    check_output_dir, clean_output_dir, zip_output, DiffRecord, KeepPriorOrder, ModOrderResolver,
    PatchOptions, PatchPipeline, PatchReport, PatchStage, ShaderFamily, TaskOutcome, DIFF_FILE,
};
use sp_vfs::{DataDirectory, ModManagerDirectory};
use std::collections::BTreeSet;

pub struct PatchArgs {
    pub game: GameArgs,
    pub output_dir: Option<String>,
    pub mods_dir: Option<String>,
    pub modlist: Option<String>,
    pub user_config: Option<String>,
    pub archives: bool,
    pub multithread: bool,
    pub zip: bool,
    pub cleanup: bool,
    pub disable_pbr: bool,
    pub disable_complex_material: bool,
    pub disable_parallax: bool,
}

impl PatchArgs {
    fn disabled_families(&self) -> BTreeSet<ShaderFamily> {
        [
            (self.disable_pbr, ShaderFamily::TruePbr),
            (self.disable_complex_material, ShaderFamily::ComplexMaterial),
            (self.disable_parallax, ShaderFamily::VanillaParallax),
        ]
        .into_iter()
        .filter_map(|(disabled, family)| disabled.then_some(family))
        .collect()
    }
}

/// Ranks newly competing mods by their mod manager order.
///
/// Mods already in the prior order keep their place. Newcomers are appended in
/// the manager's order (lowest priority first); mods the manager does not know are
/// appended last in name order.
struct ManagerOrderResolver {
    manager_order: Vec<String>,
}

impl ModOrderResolver for ManagerOrderResolver {
    fn resolve(&self, conflicting: &BTreeSet<String>, prior: &[String]) -> Vec<String> {
        let mut order = prior.to_vec();
        let known = self
            .manager_order
            .iter()
            .filter(|name| conflicting.contains(*name));
        for name in known {
            if !order.contains(name) {
                order.push(name.clone());
            }
        }
        KeepPriorOrder.resolve(conflicting, &order)
    }
}

pub fn patch_meshes(args: PatchArgs) -> Result<()> {
    let game = args.game.locate()?;
    let data_dir = game.data_dir().to_path_buf();
    let output_dir = args
        .output_dir
        .as_ref()
        .map(Utf8PathBuf::from)
        .unwrap_or_else(default_output_dir);
    let user_config = args
        .user_config
        .as_ref()
        .map(Utf8PathBuf::from)
        .or_else(default_user_config);

    println_pad!(
        "{} {}",
        "🎮 Data directory:".bright_blue().bold(),
        data_dir.as_str().bright_cyan().bold()
    );
    println_pad!(
        "{} {}",
        "📁 Output directory:".bright_yellow(),
        output_dir.as_str().bright_white().bold()
    );

    check_output_dir(&output_dir, &data_dir).map_err(CliError::from)?;
    if args.cleanup {
        clean_output_dir(&output_dir, true).map_err(CliError::from)?;
    }

    let manager = load_mod_manager(&args)?;
    let resolver: Box<dyn ModOrderResolver> = match &manager {
        Some(manager) => Box::new(ManagerOrderResolver {
            manager_order: manager.mods().to_vec(),
        }),
        None => Box::new(KeepPriorOrder),
    };
    let directory = mount(&args, &game, data_dir, manager)?;

    let options = PatchOptions {
        parallel: args.multithread,
        disabled: args.disabled_families(),
        user_config,
    };
    let diff = DiffRecord::new();
    let report = PatchPipeline::new(directory, output_dir.clone())
        .with_options(options)
        .with_mod_order_resolver(resolver)
        .with_progress(|progress| {
            if progress.stage != PatchStage::PatchingMeshes {
                tracing::debug!("Stage: {:?}", progress.stage);
            }
        })
        .run(&diff)
        .map_err(CliError::from)?;

    diff.save(&output_dir.join(DIFF_FILE)).map_err(CliError::from)?;
    let packed = if args.zip {
        Some(zip_output(&output_dir).map_err(CliError::from)?)
    } else {
        None
    };

    print_summary(&report, packed.as_deref(), &output_dir);
    Ok(())
}

/// Build the overlay: archives in load order, loose files on top, mod attribution.
fn mount(
    args: &PatchArgs,
    game: &sp_vfs::GameInstall,
    data_dir: Utf8PathBuf,
    manager: Option<ModManagerDirectory>,
) -> Result<DataDirectory> {
    let mut directory = DataDirectory::new(data_dir).map_err(CliError::from)?;
    let order = if args.archives {
        archive_order(game, &directory)?
    } else {
        Vec::new()
    };
    directory
        .populate(&order, args.archives)
        .map_err(CliError::from)?;

    if let Some(manager) = manager {
        directory.set_owners(manager.into_owners());
    }
    Ok(directory)
}

fn load_mod_manager(args: &PatchArgs) -> Result<Option<ModManagerDirectory>> {
    let Some(mods_dir) = &args.mods_dir else {
        return Ok(None);
    };
    let modlist = args.modlist.as_ref().map(Utf8PathBuf::from);
    let manager = ModManagerDirectory::scan(Utf8Path::new(mods_dir), modlist.as_deref())
        .map_err(CliError::from)?;
    tracing::info!("Ranking {} mods from {}", manager.mods().len(), mods_dir);
    Ok(Some(manager))
}

fn print_summary(report: &PatchReport, packed: Option<&Utf8Path>, output_dir: &Utf8Path) {
    let count = |outcome: TaskOutcome| report.outcomes.get(&outcome).copied().unwrap_or(0);

    println_pad!("\n{}", "📊 Summary".bright_magenta().bold());
    println_pad!(
        "   {} {}",
        "Meshes scanned:".bright_white(),
        report.meshes_total.to_string().bright_cyan().bold()
    );
    println_pad!(
        "   {} {}",
        "Meshes patched:".bright_white(),
        report.meshes_patched.to_string().bright_green().bold()
    );
    let warnings = count(TaskOutcome::SuccessWithWarnings);
    if warnings > 0 {
        println_pad!(
            "   {} {}",
            "Completed with warnings:".bright_white(),
            warnings.to_string().bright_yellow().bold()
        );
    }
    let failed = count(TaskOutcome::Failure);
    if failed > 0 {
        println_pad!(
            "   {} {}",
            "Failed:".bright_white(),
            failed.to_string().bright_red().bold()
        );
    }
    if !report.mod_order.is_empty() {
        println_pad!(
            "   {} {}",
            "Mod order:".bright_white(),
            report.mod_order.join(" < ").dimmed()
        );
    }
    println_pad!("   {} {:.2?}", "Elapsed:".bright_white(), report.elapsed);

    match packed {
        Some(zip) => println_pad!(
            "{} {}",
            "✅ Output packed into".bright_green().bold(),
            zip.as_str().bright_white().bold()
        ),
        None => println_pad!(
            "{} {}",
            "✅ Output written to".bright_green().bold(),
            output_dir.as_str().bright_white().bold()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_manager_order_ranks_newcomers() {
        let resolver = ManagerOrderResolver {
            manager_order: names(&["Textures", "Parallax", "Pbr"]),
        };
        let conflicting: BTreeSet<String> =
            ["Pbr", "Textures", "Loose"].into_iter().map(String::from).collect();

        let order = resolver.resolve(&conflicting, &names(&["Parallax"]));
        assert_eq!(order, names(&["Parallax", "Textures", "Pbr", "Loose"]));
    }

    #[test]
    fn test_manager_order_keeps_prior() {
        let resolver = ManagerOrderResolver {
            manager_order: names(&["A", "B"]),
        };
        let conflicting: BTreeSet<String> = ["A", "B"].into_iter().map(String::from).collect();
        let prior = names(&["B", "A"]);
        assert_eq!(resolver.resolve(&conflicting, &prior), prior);
    }
}
