use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use colored::*;
use futures::{Stream, StreamExt};
use indicatif::ProgressBar;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::cleanup;
use crate::config::{Market, Resolution, Settings};
use crate::desktop::{self, DesktopBackdropSetter};
use crate::error::{Error, FetchError, Result};
use crate::probe;

pub const BING_SERVICE: &str = "www.bing.com:443";
const BING_BASE_URL: &str = "https://www.bing.com";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ImageMetadata {
    pub url: String,
    #[serde(rename = "urlBase")]
    pub url_base: String,
    #[serde(rename = "startdate")]
    pub start_date: String,
    #[serde(rename = "enddate")]
    pub end_date: String,
    #[serde(default)]
    pub copyright: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct MetadataResponse {
    #[serde(rename = "image", default)]
    pub images: Vec<ImageMetadata>,
}

impl MetadataResponse {
    pub fn parse(xml: &str) -> Result<MetadataResponse> {
        Ok(quick_xml::de::from_str(xml)?)
    }

    /// The tool only ever asks for, and uses, one image.
    pub fn first(&self) -> Result<&ImageMetadata> {
        self.images.first().ok_or(Error::NoImage)
    }
}

impl ImageMetadata {
    pub fn preferred_url(&self, resolution: Resolution) -> String {
        format!("{}{}_{}.jpg", BING_BASE_URL, self.url_base, resolution)
    }

    pub fn fallback_url(&self) -> String {
        format!("{}{}", BING_BASE_URL, self.url)
    }

    pub fn start_label(&self) -> String {
        date_label(&self.start_date)
    }

    pub fn end_label(&self) -> String {
        date_label(&self.end_date)
    }
}

/// `20240131` -> `Jan 31`. Anything unparsable is shown as is.
pub fn date_label(date: &str) -> String {
    match NaiveDate::parse_from_str(date, "%Y%m%d") {
        Ok(d) => d.format("%b %-d").to_string(),
        Err(_) => date.to_string(),
    }
}

pub fn meta_url(index: u32, market: Market) -> String {
    format!(
        "{}/HPImageArchive.aspx?format=xml&idx={}&n=1&mkt={}",
        BING_BASE_URL, index, market
    )
}

/// Local file name for an image URL.
///
/// Current Bing URLs look like `/th?id=OHR.Name_EN-US123_1920x1080.jpg&rf=...`,
/// older ones like `/az/hprichbg/rb/Name_EN-US123_1920x1080.jpg`.
///
/// Only the final path component is used, so the name always stays inside the image directory.
pub fn file_name_for(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if let Some((_, id)) = parsed.query_pairs().find(|(k, _)| k == "id") {
        if let Some(name) = base_name(&id) {
            return Some(name);
        }
    }
    base_name(parsed.path_segments()?.last()?)
}

fn base_name(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .map(str::to_string)
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, FetchError>> + Send>>;

pub struct Fetched {
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl Fetched {
    pub async fn text(mut self) -> Result<String, FetchError> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url`. A non-2xx status is an error.
    async fn get(&self, url: &str) -> Result<Fetched, FetchError>;
}

pub struct HttpFetcher {
    pub client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        HttpFetcher {
            client: Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<Fetched, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(Fetched {
            content_length: resp.content_length(),
            body: Box::pin(resp.bytes_stream().map(|c| c.map_err(FetchError::from))),
        })
    }
}

pub async fn fetch_metadata<F: Fetcher + ?Sized>(
    fetcher: &F,
    url: &str,
) -> Result<MetadataResponse> {
    let to_err = |source| Error::Fetch {
        url: url.to_string(),
        source,
    };
    let body = fetcher.get(url).await.map_err(to_err)?.text().await.map_err(to_err)?;
    MetadataResponse::parse(&body)
}

/// Downloads the image into `dir`, trying `preferred_url` first.
///
/// A file that already exists under the target name is never fetched again or overwritten.
pub async fn download_image<F: Fetcher + ?Sized>(
    fetcher: &F,
    preferred_url: &str,
    fallback_url: &str,
    dir: &Path,
) -> Result<PathBuf> {
    if let Some(existing) = existing_file(preferred_url, dir).await {
        info!(path = %existing.display(), "image already downloaded");
        return Ok(existing);
    }

    let (url, fetched) = match fetcher.get(preferred_url).await {
        Ok(fetched) => (preferred_url, fetched),
        Err(err) => {
            // The requested resolution is not available, fall back to the default image.
            warn!(url = preferred_url, "preferred resolution unavailable: {err}");
            if let Some(existing) = existing_file(fallback_url, dir).await {
                info!(path = %existing.display(), "image already downloaded");
                return Ok(existing);
            }
            let fetched = fetcher.get(fallback_url).await.map_err(|source| Error::Download {
                url: fallback_url.to_string(),
                source,
            })?;
            (fallback_url, fetched)
        }
    };

    let path = target_path(url, dir)?;
    debug!(url, path = %path.display(), "saving image");
    save(fetched, url, &path).await?;
    Ok(path)
}

fn target_path(url: &str, dir: &Path) -> Result<PathBuf> {
    let name = file_name_for(url).ok_or_else(|| Error::ImageIo {
        path: dir.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("no file name in {url}"),
        ),
    })?;
    Ok(dir.join(name))
}

async fn existing_file(url: &str, dir: &Path) -> Option<PathBuf> {
    let path = target_path(url, dir).ok()?;
    match fs::try_exists(&path).await {
        Ok(true) => Some(path),
        _ => None,
    }
}

async fn save(fetched: Fetched, url: &str, path: &Path) -> Result<()> {
    // create_new: never clobber a file that appeared meanwhile.
    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            info!(path = %path.display(), "image already downloaded");
            return Ok(());
        }
        Err(source) => {
            return Err(Error::ImageIo {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let result = copy_body(fetched, &mut file, url, path).await;
    drop(file);
    if result.is_err() {
        if let Err(err) = fs::remove_file(path).await {
            debug!(path = %path.display(), "remove partial image: {err}");
        }
    }
    result
}

async fn copy_body(
    mut fetched: Fetched,
    file: &mut fs::File,
    url: &str,
    path: &Path,
) -> Result<()> {
    let io_err = |source| Error::ImageIo {
        path: path.to_path_buf(),
        source,
    };
    let bar = match fetched.content_length {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    while let Some(chunk) = fetched.body.next().await {
        let chunk = chunk.map_err(|source| Error::Download {
            url: url.to_string(),
            source,
        })?;
        file.write_all(&chunk).await.map_err(io_err)?;
        bar.inc(chunk.len() as u64);
    }
    file.flush().await.map_err(io_err)?;
    bar.finish_and_clear();
    Ok(())
}

pub struct BingWallpaper<F: Fetcher = HttpFetcher> {
    pub settings: Settings,
    pub fetcher: F,
}

impl BingWallpaper<HttpFetcher> {
    pub fn new(settings: Settings) -> Self {
        BingWallpaper {
            settings,
            fetcher: HttpFetcher::new(),
        }
    }
}

impl<F: Fetcher> BingWallpaper<F> {
    pub fn with_fetcher(settings: Settings, fetcher: F) -> Self {
        BingWallpaper { settings, fetcher }
    }

    pub async fn run(&self, setter: &dyn DesktopBackdropSetter) -> Result<()> {
        let settings = &self.settings;

        probe::verify_reachable(BING_SERVICE, settings.retries, settings.retry_delay).await?;
        self.install(setter).await
    }

    /// Everything after the reachability probe.
    pub async fn install(&self, setter: &dyn DesktopBackdropSetter) -> Result<()> {
        let settings = &self.settings;

        let meta = fetch_metadata(&self.fetcher, &meta_url(settings.index, settings.market)).await?;
        let image = meta.first()?;

        println!("{} {}", "Title:".bold(), image.copyright);
        println!(
            "{} {} {} {}",
            "From:".bold(),
            image.start_label().cyan(),
            "until:".bold(),
            image.end_label().cyan()
        );

        if settings.info {
            return Ok(());
        }

        fs::create_dir_all(&settings.dir)
            .await
            .map_err(|source| Error::CreateDir {
                path: settings.dir.clone(),
                source,
            })?;

        let path = download_image(
            &self.fetcher,
            &image.preferred_url(settings.resolution),
            &image.fallback_url(),
            &settings.dir,
        )
        .await?;
        let path = std::path::absolute(&path).unwrap_or(path);
        println!("{} {}", "Image:".bold(), path.display().to_string().green());

        desktop::apply_background(setter, &path, settings.scaling)?;

        if settings.clean {
            let report = cleanup::prune(&settings.dir, settings.keep)?;
            for name in &report.deleted {
                println!("cleanup images: deleted {}", name.yellow());
            }
        }
        Ok(())
    }
}
