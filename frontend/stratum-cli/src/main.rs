mod cli;
mod renderer;

use std::collections::BTreeMap;

use stratum_core::commands::{self, ShowRequest};
use stratum_core::config::manager::{CONFIG_FILE_FLAG, SECRETS_DIR_FLAG};
use stratum_core::ConfigManager;
use tracing::debug;

use crate::renderer::Renderer;

fn main() {
    let args = cli::Cli::parse_args();
    stratum_core::logging::init_tracing(&args.log_level);

    let renderer = Renderer::new(args.output);
    let command = args.command_name();
    if let Err(error) = run(args, &renderer) {
        renderer.render_error(command, &error);
        std::process::exit(error.exit_code());
    }
}

fn run(args: cli::Cli, renderer: &Renderer) -> stratum_core::Result<()> {
    let manager = ConfigManager::new(cli_arguments(&args), &args.workspace, &args.context);
    debug!(workspace = %args.workspace.display(), context = %args.context, "manager ready");

    match args.command {
        cli::Command::Show {
            schema,
            file,
            field,
        } => {
            let request = ShowRequest {
                schema,
                file,
                field,
                ..ShowRequest::default()
            };
            renderer.render_show(&commands::show_report(&manager, &request)?)
        }
        cli::Command::List => renderer.render_list(manager.registry(), manager.options()),
        cli::Command::Init {
            schema,
            path,
            force,
        } => {
            let target = if path.is_absolute() {
                path
            } else {
                args.workspace.join(path)
            };
            let written = commands::init(manager.registry(), &schema, &target, force)?;
            renderer.render_init(&schema, &written)
        }
    }
}

/// `--set` overrides plus the control flags, keyed the way the CLI source
/// expects them.
fn cli_arguments(args: &cli::Cli) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = args.overrides.iter().cloned().collect();
    if let Some(path) = &args.config_file {
        map.insert(CONFIG_FILE_FLAG.to_owned(), path.display().to_string());
    }
    if let Some(path) = &args.secrets_dir {
        map.insert(SECRETS_DIR_FLAG.to_owned(), path.display().to_string());
    }
    map
}
