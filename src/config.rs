use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use config::Config;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const MAX_INDEX: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    R1024x768,
    R1280x720,
    R1366x768,
    #[default]
    R1920x1080,
    R1920x1200,
}

impl Resolution {
    pub const ALL: [Resolution; 5] = [
        Resolution::R1024x768,
        Resolution::R1280x720,
        Resolution::R1366x768,
        Resolution::R1920x1080,
        Resolution::R1920x1200,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::R1024x768 => "1024x768",
            Resolution::R1280x720 => "1280x720",
            Resolution::R1366x768 => "1366x768",
            Resolution::R1920x1080 => "1920x1080",
            Resolution::R1920x1200 => "1920x1200",
        }
    }
}

/// GNOME `picture-options` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalingMode {
    None,
    Wallpaper,
    Centered,
    Scaled,
    Stretched,
    #[default]
    Zoom,
    Spanned,
}

impl ScalingMode {
    pub const ALL: [ScalingMode; 7] = [
        ScalingMode::None,
        ScalingMode::Wallpaper,
        ScalingMode::Centered,
        ScalingMode::Scaled,
        ScalingMode::Stretched,
        ScalingMode::Zoom,
        ScalingMode::Spanned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScalingMode::None => "none",
            ScalingMode::Wallpaper => "wallpaper",
            ScalingMode::Centered => "centered",
            ScalingMode::Scaled => "scaled",
            ScalingMode::Stretched => "stretched",
            ScalingMode::Zoom => "zoom",
            ScalingMode::Spanned => "spanned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Market {
    EnUs,
    ZhCn,
    JaJp,
    EnAu,
    #[default]
    EnGb,
    DeDe,
    EnNz,
    EnCa,
}

impl Market {
    pub const ALL: [Market; 8] = [
        Market::EnUs,
        Market::ZhCn,
        Market::JaJp,
        Market::EnAu,
        Market::EnGb,
        Market::DeDe,
        Market::EnNz,
        Market::EnCa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::EnUs => "en-US",
            Market::ZhCn => "zh-CN",
            Market::JaJp => "ja-JP",
            Market::EnAu => "en-AU",
            Market::EnGb => "en-GB",
            Market::DeDe => "de-DE",
            Market::EnNz => "en-NZ",
            Market::EnCa => "en-CA",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} {value:?}")]
pub struct InvalidValue {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! allow_list {
    ($ty:ty, $kind:literal) => {
        allow_list!($ty, $kind, []);
    };
    ($ty:ty, $kind:literal, [$($alias:literal => $value:expr),* $(,)?]) => {
        impl FromStr for $ty {
            type Err = InvalidValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($alias) {
                        return Ok($value);
                    }
                )*
                <$ty>::ALL
                    .into_iter()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| InvalidValue {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

allow_list!(Resolution, "resolution");
allow_list!(ScalingMode, "picture option");
// Older setups used the non-standard "en-UK".
allow_list!(Market, "market", ["en-UK" => Market::EnGb]);

/// Values as they come from the config file, environment and flags.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BingConfig {
    pub market: String,
    pub resolution: String,
    pub picture_option: String,
    pub index: u32,
    pub dir: String,
    pub keep: usize,
    pub clean: bool,
    pub retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for BingConfig {
    fn default() -> Self {
        BingConfig {
            market: Market::default().to_string(),
            resolution: Resolution::default().to_string(),
            picture_option: ScalingMode::default().to_string(),
            index: 0,
            dir: default_image_dir().to_string_lossy().into_owned(),
            keep: 10,
            clean: true,
            retries: 5,
            retry_delay_secs: 10,
        }
    }
}

/// Download the Bing image of the day and install it as the GNOME desktop background.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(long, required = false)]
    pub config_path: Option<String>,
    /// 0 = today, 1 = yesterday, ... 7
    #[arg(long)]
    pub index: Option<u32>,
    /// Preferred resolution: 1024x768, 1280x720, 1366x768, 1920x1080, 1920x1200
    #[arg(long)]
    pub res: Option<String>,
    /// none, wallpaper, centered, scaled, stretched, zoom, spanned
    #[arg(long)]
    pub img_opt: Option<String>,
    /// en-US, zh-CN, ja-JP, en-AU, en-GB, de-DE, en-NZ, en-CA
    #[arg(long)]
    pub market: Option<String>,
    /// Image directory
    #[arg(long)]
    pub img_dir: Option<String>,
    /// Number of images kept by the cleanup
    #[arg(long)]
    pub keep: Option<usize>,
    /// Remove the oldest images beyond --keep
    #[arg(long)]
    pub clean: Option<bool>,
    /// Print image meta info only, no download, no clean
    #[arg(long)]
    pub info: bool,
}

/// Resolved, validated settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub market: Market,
    pub resolution: Resolution,
    pub scaling: ScalingMode,
    pub index: u32,
    pub dir: PathBuf,
    pub keep: usize,
    pub clean: bool,
    pub info: bool,
    pub retries: u32,
    pub retry_delay: Duration,
}

pub fn default_image_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join("Pictures").join("BingWallpaper"),
        None => PathBuf::from("BingWallpaper"),
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bing-wallpaper").join("config.toml"))
}

impl BingConfig {
    pub fn load(cli: &Cli) -> anyhow::Result<BingConfig> {
        let config_path = match &cli.config_path {
            Some(path) => Some(PathBuf::from(path)),
            None => default_config_path(),
        };

        let mut builder = Config::builder();
        if let Some(path) = config_path.as_deref().filter(|p| p.exists()) {
            debug!(path = %path.display(), "loading config file");
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("BING_WALLPAPER"))
            .build()
            .with_context(|| match &config_path {
                Some(path) => format!("load config file {}", path.display()),
                None => "load config".to_string(),
            })?;
        let mut config = settings
            .try_deserialize::<BingConfig>()
            .context("invalid config")?;

        config.apply_cli(cli);
        Ok(config)
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(index) = cli.index {
            self.index = index;
        }
        if let Some(res) = &cli.res {
            self.resolution = res.clone();
        }
        if let Some(opt) = &cli.img_opt {
            self.picture_option = opt.clone();
        }
        if let Some(market) = &cli.market {
            self.market = market.clone();
        }
        if let Some(dir) = &cli.img_dir {
            self.dir = dir.clone();
        }
        if let Some(keep) = cli.keep {
            self.keep = keep;
        }
        if let Some(clean) = cli.clean {
            self.clean = clean;
        }
    }

    /// Validates against the allow-lists. Invalid values fall back to their default.
    pub fn resolve(&self, info: bool) -> Settings {
        let index = if self.index > MAX_INDEX {
            warn!("Invalid index {}, fall back to default.", self.index);
            0
        } else {
            self.index
        };
        // Never prune the image that was just set.
        let keep = if self.keep == 0 {
            warn!("Invalid keep 0, keeping 1 image.");
            1
        } else {
            self.keep
        };
        let dir = if self.dir.trim().is_empty() {
            default_image_dir()
        } else {
            PathBuf::from(&self.dir)
        };

        Settings {
            market: or_default(&self.market),
            resolution: or_default(&self.resolution),
            scaling: or_default(&self.picture_option),
            index,
            dir,
            keep,
            clean: self.clean,
            info,
            retries: self.retries.max(1),
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

fn or_default<T>(value: &str) -> T
where
    T: FromStr<Err = InvalidValue> + Default + fmt::Display,
{
    value.parse().unwrap_or_else(|err: InvalidValue| {
        let fallback = T::default();
        warn!("{err}, fall back to {fallback}.");
        fallback
    })
}
