use clap::Parser;
use tracing_subscriber::EnvFilter;

use bing_wallpaper::bing::BingWallpaper;
use bing_wallpaper::config::{BingConfig, Cli};
use bing_wallpaper::desktop::Gsettings;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli: Cli = Cli::parse();
    let config = BingConfig::load(&cli)?;
    let settings = config.resolve(cli.info);

    let bing = BingWallpaper::new(settings);
    bing.run(&Gsettings).await?;

    Ok(())
}
