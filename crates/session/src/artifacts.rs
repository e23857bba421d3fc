//! Session-scoped artifact storage
//!
//! Every session writes into its own directory under the cache root, named
//! by a random UUID. Artifacts are named by a UUID derived from their kind
//! and key material, so the same input always maps to the same file within
//! a session. Files are written under a temporary name and renamed into
//! place once complete.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage, RgbaImage};
use ndarray::Array3;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use geoshift_core::{Error, Result};

const NAMESPACE: Uuid = Uuid::from_u128(0x5c1e_7a44_93d2_4f0b_8e61_2b7d_c0a9_f3e5);

/// What an artifact holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Preview,
    Overlay,
    ChangeMap,
    Mask,
    Report,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Preview => "preview",
            ArtifactKind::Overlay => "overlay",
            ArtifactKind::ChangeMap => "change_map",
            ArtifactKind::Mask => "mask",
            ArtifactKind::Report => "report",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Preview | ArtifactKind::Overlay | ArtifactKind::ChangeMap => "png",
            ArtifactKind::Mask => "tif",
            ArtifactKind::Report => "json",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to a stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArtifactHandle {
    id: Uuid,
    kind: ArtifactKind,
    path: PathBuf,
}

impl ArtifactHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug)]
pub struct ArtifactStore {
    session_id: Uuid,
    dir: PathBuf,
}

impl ArtifactStore {
    /// Create a fresh session directory under `cache_root`.
    pub fn new(cache_root: &Path) -> Result<Self> {
        let session_id = Uuid::new_v4();
        let dir = cache_root.join(session_id.to_string());
        fs::create_dir_all(&dir)?;
        debug!("Artifact store at {}", dir.display());
        Ok(Self { session_id, dir })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Handle for `kind` keyed by `material`; `stem` makes the file name
    /// readable, e.g. `preview_scene_<uuid>.png`.
    pub fn handle(&self, kind: ArtifactKind, stem: &str, material: &[u8]) -> ArtifactHandle {
        let mut key = Vec::with_capacity(material.len() + 16);
        key.extend_from_slice(kind.as_str().as_bytes());
        key.push(0);
        key.extend_from_slice(material);
        let id = Uuid::new_v5(&NAMESPACE, &key);

        let name = format!("{}_{}_{}.{}", kind, sanitize(stem), id.simple(), kind.extension());
        ArtifactHandle {
            id,
            kind,
            path: self.dir.join(name),
        }
    }

    /// Produce an artifact through `write`, which receives a temporary path.
    pub fn write_with<F>(&self, kind: ArtifactKind, stem: &str, material: &[u8], write: F) -> Result<ArtifactHandle>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let handle = self.handle(kind, stem, material);
        let tmp = handle.path.with_extension(format!("{}.tmp", kind.extension()));

        if let Err(e) = write(&tmp) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &handle.path)?;
        debug!("Wrote {} artifact {}", kind, handle.path.display());
        Ok(handle)
    }

    /// Store a `(rows, cols, 4)` image as PNG.
    pub fn write_rgba_png(&self, kind: ArtifactKind, stem: &str, material: &[u8], rgba: &Array3<u8>) -> Result<ArtifactHandle> {
        let (rows, cols, channels) = rgba.dim();
        if channels != 4 {
            return Err(Error::InvalidParameter {
                name: "channels",
                value: channels.to_string(),
                reason: "RGBA image needs 4 channels".into(),
            });
        }
        let img = RgbaImage::from_raw(cols as u32, rows as u32, rgba.iter().copied().collect())
            .ok_or_else(|| Error::InvalidDimensions { width: cols, height: rows })?;
        self.write_with(kind, stem, material, |tmp| Ok(img.save_with_format(tmp, ImageFormat::Png)?))
    }

    /// Store a `(rows, cols, 3)` image as PNG.
    pub fn write_rgb_png(&self, kind: ArtifactKind, stem: &str, material: &[u8], rgb: &Array3<u8>) -> Result<ArtifactHandle> {
        let (rows, cols, channels) = rgb.dim();
        if channels != 3 {
            return Err(Error::InvalidParameter {
                name: "channels",
                value: channels.to_string(),
                reason: "RGB image needs 3 channels".into(),
            });
        }
        let img = RgbImage::from_raw(cols as u32, rows as u32, rgb.iter().copied().collect())
            .ok_or_else(|| Error::InvalidDimensions { width: cols, height: rows })?;
        self.write_with(kind, stem, material, |tmp| Ok(img.save_with_format(tmp, ImageFormat::Png)?))
    }

    /// Store a serializable value as pretty JSON.
    pub fn write_json<T: Serialize>(&self, kind: ArtifactKind, stem: &str, material: &[u8], value: &T) -> Result<ArtifactHandle> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| Error::Other(e.to_string()))?;
        self.write_with(kind, stem, material, |tmp| Ok(fs::write(tmp, &bytes)?))
    }

    /// Remove the session directory and everything in it.
    pub fn purge(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

fn sanitize(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "artifact".into()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_get_separate_directories() {
        let root = tempfile::tempdir().unwrap();
        let a = ArtifactStore::new(root.path()).unwrap();
        let b = ArtifactStore::new(root.path()).unwrap();
        assert_ne!(a.session_id(), b.session_id());
        assert_ne!(a.dir(), b.dir());
        assert!(a.dir().is_dir());
    }

    #[test]
    fn handles_are_content_keyed() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(root.path()).unwrap();

        let h1 = store.handle(ArtifactKind::Preview, "scene", b"key-1");
        let h2 = store.handle(ArtifactKind::Preview, "scene", b"key-1");
        let h3 = store.handle(ArtifactKind::Preview, "scene", b"key-2");
        let h4 = store.handle(ArtifactKind::Overlay, "scene", b"key-1");
        assert_eq!(h1, h2);
        assert_ne!(h1.id(), h3.id());
        assert_ne!(h1.id(), h4.id());

        let name = h1.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("preview_scene_"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn png_written_atomically() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(root.path()).unwrap();
        let rgba = Array3::from_shape_fn((2, 3, 4), |(r, c, ch)| (r * 40 + c * 10 + ch) as u8);

        let handle = store.write_rgba_png(ArtifactKind::Preview, "img a.tif", b"k", &rgba).unwrap();
        assert!(handle.path().exists());
        let leftovers: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let back = image::open(handle.path()).unwrap().to_rgba8();
        assert_eq!(back.dimensions(), (3, 2));
        assert_eq!(back.get_pixel(2, 1).0, [60, 61, 62, 63]);
    }

    #[test]
    fn failed_write_leaves_nothing() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(root.path()).unwrap();
        let result = store.write_with(ArtifactKind::Report, "r", b"k", |_| Err(Error::Other("boom".into())));
        assert!(result.is_err());
        assert_eq!(fs::read_dir(store.dir()).unwrap().count(), 0);
    }

    #[test]
    fn wrong_channel_count_rejected() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(root.path()).unwrap();
        let rgb = Array3::<u8>::zeros((2, 2, 3));
        assert!(store.write_rgba_png(ArtifactKind::Overlay, "x", b"k", &rgb).is_err());
        assert!(store.write_rgb_png(ArtifactKind::ChangeMap, "x", b"k", &rgb).is_ok());
    }

    #[test]
    fn purge_removes_session() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(root.path()).unwrap();
        store.write_json(ArtifactKind::Report, "r", b"k", &vec![1, 2, 3]).unwrap();
        store.purge().unwrap();
        assert!(!store.dir().exists());
    }
}
