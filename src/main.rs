//! Console Bridge - remote VNC console over a WebSocket tunnelling proxy
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use console_app::config::{
    default_settings_path, load_settings, load_settings_strict, save_settings,
};
use console_app::BridgeSettings;
use url::Url;

/// Exit code for unusable launch parameters or settings
const EXIT_CONFIG_ERROR: i32 = 2;

/// Console Bridge - open a remote VM console from its console page URL
#[derive(Parser, Debug)]
#[command(name = "console-bridge")]
#[command(about = "Open a remote VM console through a WebSocket tunnelling proxy", long_about = None)]
struct Args {
    /// Console page URL, e.g. https://portal.example.com/console?host=10.0.0.5&port=5901&password=...&serverId=42
    #[arg(value_name = "PAGE_URL")]
    page_url: String,

    /// Settings file (default: <config dir>/console-bridge/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Proxy endpoint path on the page origin
    #[arg(long, value_name = "PATH")]
    proxy_path: Option<String>,

    /// Enable verbose diagnostics
    #[arg(long)]
    verbose: bool,

    /// Disable the fullscreen toggle
    #[arg(long)]
    no_fullscreen: bool,

    /// Write the effective settings (file plus overrides) back to the settings file
    #[arg(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let settings = match resolve_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            report_config_error(&e);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    console_core::logging::init(settings.ui.verbose_diagnostics)?;

    if args.save_config {
        match persist_settings(&args, &settings) {
            Ok(path) => tracing::info!("Saved settings to {}", path.display()),
            Err(e) => {
                report_config_error(&e);
                std::process::exit(EXIT_CONFIG_ERROR);
            }
        }
    }

    let page_url = match Url::parse(&args.page_url) {
        Ok(url) => url,
        Err(e) => {
            eprintln!("❌ Invalid console page URL '{}': {}", args.page_url, e);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    let final_state = match console_bridge::run_headless(&page_url, settings).await {
        Ok(state) => state,
        Err(e) if e.is_fatal() => {
            eprintln!("❌ {e}");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
        Err(e) => return Err(e.into()),
    };

    if console_bridge::is_configuration_error(&final_state) {
        eprintln!("❌ The console link is missing connection parameters (host, port, password, serverId).");
        std::process::exit(EXIT_CONFIG_ERROR);
    }

    Ok(())
}

fn report_config_error(error: &color_eyre::Report) {
    eprintln!("❌ {error}");
    for cause in error.chain().skip(1) {
        eprintln!("   caused by: {cause}");
    }
}

/// Load settings and apply command-line overrides
fn resolve_settings(args: &Args) -> color_eyre::Result<BridgeSettings> {
    let mut settings = match &args.config {
        Some(path) => load_settings_strict(path)
            .wrap_err_with(|| format!("Cannot load settings from {}", path.display()))?,
        None => default_settings_path()
            .map(|path| load_settings(&path))
            .unwrap_or_default(),
    };

    if let Some(proxy_path) = &args.proxy_path {
        settings.proxy.path = proxy_path.clone();
    }
    if args.verbose {
        settings.ui.verbose_diagnostics = true;
    }
    if args.no_fullscreen {
        settings.ui.fullscreen = false;
    }

    Ok(settings)
}

/// Write `settings` to `--config`, or the default settings path
fn persist_settings(args: &Args, settings: &BridgeSettings) -> color_eyre::Result<PathBuf> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => default_settings_path()
            .ok_or_else(|| eyre!("No config directory on this platform; pass --config"))?,
    };
    save_settings(&path, settings)
        .wrap_err_with(|| format!("Cannot save settings to {}", path.display()))?;
    Ok(path)
}
