use anyhow::Context;
use tokio::io::BufReader;

use customrp::app::App;
use customrp::cli::{Cli, HELP_TEXT, run_uninstall};
use customrp::config::{SettingsStore, default_settings_dir};
use customrp::instance::{self, InstanceIdentity, Role};
use customrp::logging;
use customrp::presence::DiscordClientFactory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_lenient(std::env::args_os())?;

    // Neither touches the instance lock
    if cli.wants_help() {
        println!("{}", HELP_TEXT);
        return Ok(());
    }
    if cli.wants_uninstall() {
        let stdin = std::io::stdin();
        run_uninstall(&default_settings_dir(), stdin.lock(), std::io::stdout())?;
        return Ok(());
    }

    let _log_guard = logging::init_logging(&logging::default_log_dir());

    let identity = InstanceIdentity::for_launch(cli.second_instance);
    let role = instance::claim(identity).context("Failed to start")?;

    match role {
        Role::Secondary(secondary) => {
            let request = cli.handoff_request();
            match secondary.hand_off(&request).await {
                Ok(delivered) => {
                    tracing::info!("Handed off to running instance: {:?}", delivered);
                }
                Err(e) => {
                    tracing::error!("Hand-off failed: {}", e);
                    eprintln!("{}", e);
                }
            }
            Ok(())
        }
        Role::Primary(primary) => {
            let mut app = App::new(primary, SettingsStore::user_default(), DiscordClientFactory);
            if let Some(preset) = cli.preset_file() {
                app.import_preset(&preset);
            }
            app.run(BufReader::new(tokio::io::stdin())).await
        }
    }
}
