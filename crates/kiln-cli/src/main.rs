use clap::Parser;
use kiln_cli::{
    cli::{Cli, Command},
    commands, error, logger, ui,
};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    logger::init_logger(cli.verbose, cli.quiet, cli.no_color);
    ui::init_colors();
    if cli.no_color {
        ui::set_colors(false);
    }

    let config = cli.config.as_deref();
    let result = match cli.command {
        Command::Dev(args) => commands::dev_execute(args, config).await,
        Command::Serve(args) => commands::serve_execute(args, config).await,
        Command::Run(args) => commands::run_execute(args, config).await,
        Command::Check(args) => commands::check_execute(args, config).await,
    };

    result.map_err(error::cli_error_to_miette)
}
