use clap::builder::{styling::AnsiColor, Styles};
use clap::ColorChoice;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use commands::{patch_meshes, print_load_order, GameArgs, LoadOrderArgs, PatchArgs};
use miette::Result;

mod commands;
mod errors;
mod utils;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides this.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Patch mesh shaders to use the installed parallax, complex material and PBR textures
    Patch {
        #[command(flatten)]
        game: GameArgs,

        /// Directory to write patched meshes to
        #[arg(short, long)]
        output_dir: Option<String>,

        /// Mod manager staging folder (one sub-folder per mod) used to rank mods
        #[arg(long)]
        mods_dir: Option<String>,

        /// Mod manager modlist.txt selecting and ordering the mods in --mods-dir
        #[arg(long, requires = "mods_dir")]
        modlist: Option<String>,

        /// User configuration file (defaults to cfg/user.json next to the executable)
        #[arg(long)]
        user_config: Option<String>,

        /// Only read loose files, ignore archives
        #[arg(long)]
        no_archives: bool,

        /// Process meshes one at a time
        #[arg(long)]
        no_multithread: bool,

        /// Leave the output as loose files instead of packing a zip
        #[arg(long)]
        no_zip: bool,

        /// Do not delete the previous output before patching
        #[arg(long)]
        no_cleanup: bool,

        /// Disable the True PBR patcher
        #[arg(long)]
        disable_pbr: bool,

        /// Disable the complex material patcher
        #[arg(long)]
        disable_complex_material: bool,

        /// Disable the vanilla parallax patcher
        #[arg(long)]
        disable_parallax: bool,
    },
    /// Print the archive load order that would be mounted
    LoadOrder {
        #[command(flatten)]
        game: GameArgs,
    },
}

fn parse_args() -> Args {
    // Configure colored/styled help output
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default())
        .placeholder(AnsiColor::Blue.on_default());

    let matches = Args::command()
        .styles(styles)
        .color(ColorChoice::Auto)
        .get_matches();

    Args::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}

fn main() -> Result<()> {
    let args = parse_args();
    utils::init_logging(args.verbose);

    match args.command {
        Commands::Patch {
            game,
            output_dir,
            mods_dir,
            modlist,
            user_config,
            no_archives,
            no_multithread,
            no_zip,
            no_cleanup,
            disable_pbr,
            disable_complex_material,
            disable_parallax,
        } => patch_meshes(PatchArgs {
            game,
            output_dir,
            mods_dir,
            modlist,
            user_config,
            archives: !no_archives,
            multithread: !no_multithread,
            zip: !no_zip,
            cleanup: !no_cleanup,
            disable_pbr,
            disable_complex_material,
            disable_parallax,
        }),
        Commands::LoadOrder { game } => print_load_order(LoadOrderArgs { game }),
    }
}
