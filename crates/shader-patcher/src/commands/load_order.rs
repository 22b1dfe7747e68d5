use super::{archive_order, GameArgs};
use crate::errors::CliError;
use crate::println_pad;
use colored::Colorize;
use miette::Result;
use sp_vfs::DataDirectory;

pub struct LoadOrderArgs {
    pub game: GameArgs,
}

pub fn print_load_order(args: LoadOrderArgs) -> Result<()> {
    let game = args.game.locate()?;
    let directory = DataDirectory::new(game.data_dir().to_path_buf()).map_err(CliError::from)?;
    let order = archive_order(&game, &directory)?;

    println_pad!(
        "{} {}",
        "📚 Archive load order for".bright_blue().bold(),
        game.data_dir().as_str().bright_cyan().bold()
    );
    if order.is_empty() {
        println_pad!("   {}", "(no archives)".dimmed());
    }
    for (index, name) in order.iter().enumerate() {
        println_pad!(
            "   {} {}",
            format!("{:>3}.", index + 1).dimmed(),
            name.bright_white()
        );
    }
    println_pad!(
        "\n{}",
        "Later archives win over earlier ones; loose files win over all archives.".dimmed()
    );
    Ok(())
}
