//! Desktop background backends.

use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context};
use tracing::debug;

use crate::config::ScalingMode;
use crate::error::{ApplyStep, Error, Result};

/// Something that can show an image as the desktop background.
pub trait DesktopBackdropSetter {
    fn set_image(&self, path: &Path) -> anyhow::Result<()>;
    fn set_mode(&self, mode: ScalingMode) -> anyhow::Result<()>;
}

/// Sets the image, then the scaling mode. A failed mode leaves the image in place.
pub fn apply_background(
    setter: &dyn DesktopBackdropSetter,
    path: &Path,
    mode: ScalingMode,
) -> Result<()> {
    setter.set_image(path).map_err(|source| Error::Apply {
        step: ApplyStep::Image,
        source,
    })?;
    setter.set_mode(mode).map_err(|source| Error::Apply {
        step: ApplyStep::Mode,
        source,
    })?;
    Ok(())
}

/// GNOME, through the `gsettings` CLI.
#[derive(Debug, Clone, Default)]
pub struct Gsettings;

const BACKGROUND_SCHEMA: &str = "org.gnome.desktop.background";
const SCREENSAVER_SCHEMA: &str = "org.gnome.desktop.screensaver";

fn file_uri(path: &Path) -> anyhow::Result<String> {
    // GNOME expects a file:// URI.
    let s = path
        .to_str()
        .ok_or_else(|| anyhow!("path is not valid UTF-8"))?;
    Ok(format!("file://{s}"))
}

fn gsettings_set(schema: &str, key: &str, value: &str) -> anyhow::Result<()> {
    let status = Command::new("gsettings")
        .args(["set", schema, key, value])
        .status()
        .with_context(|| format!("run gsettings ({key})"))?;
    if !status.success() {
        return Err(anyhow!("gsettings failed ({key}): {status}"));
    }
    Ok(())
}

impl DesktopBackdropSetter for Gsettings {
    fn set_image(&self, path: &Path) -> anyhow::Result<()> {
        let uri = file_uri(path)?;
        gsettings_set(BACKGROUND_SCHEMA, "picture-uri", &uri)?;

        // Dark variant (GNOME 42+) and the lock screen are best-effort.
        for (schema, key) in [
            (BACKGROUND_SCHEMA, "picture-uri-dark"),
            (SCREENSAVER_SCHEMA, "picture-uri"),
        ] {
            if let Err(err) = gsettings_set(schema, key, &uri) {
                debug!("{schema} {key}: {err:#}");
            }
        }
        Ok(())
    }

    fn set_mode(&self, mode: ScalingMode) -> anyhow::Result<()> {
        gsettings_set(BACKGROUND_SCHEMA, "picture-options", mode.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::PathBuf;

    use super::*;

    #[derive(Default)]
    struct FakeSetter {
        fail_mode: bool,
        image: RefCell<Option<PathBuf>>,
        mode: RefCell<Option<ScalingMode>>,
    }

    impl DesktopBackdropSetter for FakeSetter {
        fn set_image(&self, path: &Path) -> anyhow::Result<()> {
            *self.image.borrow_mut() = Some(path.to_path_buf());
            Ok(())
        }

        fn set_mode(&self, mode: ScalingMode) -> anyhow::Result<()> {
            if self.fail_mode {
                return Err(anyhow!("no such key"));
            }
            *self.mode.borrow_mut() = Some(mode);
            Ok(())
        }
    }

    #[test]
    fn applies_image_then_mode() {
        let setter = FakeSetter::default();
        apply_background(&setter, Path::new("/pics/a.jpg"), ScalingMode::Spanned).unwrap();
        assert_eq!(*setter.image.borrow(), Some(PathBuf::from("/pics/a.jpg")));
        assert_eq!(*setter.mode.borrow(), Some(ScalingMode::Spanned));
    }

    #[test]
    fn failed_mode_keeps_image_and_names_the_step() {
        let setter = FakeSetter {
            fail_mode: true,
            ..FakeSetter::default()
        };
        let err =
            apply_background(&setter, Path::new("/pics/a.jpg"), ScalingMode::Zoom).unwrap_err();
        assert!(matches!(err, Error::Apply { step: ApplyStep::Mode, .. }));
        assert_eq!(err.to_string(), "set background options");
        assert!(setter.image.borrow().is_some());
    }

    #[test]
    fn file_uris() {
        assert_eq!(
            file_uri(Path::new("/home/me/Pictures/BingWallpaper/a.jpg")).unwrap(),
            "file:///home/me/Pictures/BingWallpaper/a.jpg"
        );
    }
}
