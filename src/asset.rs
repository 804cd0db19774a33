//! Layer assets and their transient display references.
//!
//! A [`DisplayHandle`] is the local preview reference of an accepted file
//! (the `blob:` URL a renderer resolves before any upload). Handles are not
//! `Clone`: each one is owned by exactly one asset, and dropping it revokes
//! the reference in its [`HandleRegistry`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::normalize::NormalizedScene;
use crate::validation::{CandidateFile, LayerSlot};

const DISPLAY_URL_PREFIX: &str = "blob:artifact/";

/// Tracks which display references are currently resolvable.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    live: Mutex<HashSet<String>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self) -> MutexGuard<'_, HashSet<String>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Issue a new, unique display handle.
    pub fn issue(self: &Arc<Self>) -> DisplayHandle {
        let url = format!("{}{}", DISPLAY_URL_PREFIX, Uuid::new_v4());
        self.live().insert(url.clone());
        DisplayHandle {
            url,
            registry: Arc::clone(self),
        }
    }

    pub fn is_live(&self, url: &str) -> bool {
        self.live().contains(url)
    }

    pub fn live_count(&self) -> usize {
        self.live().len()
    }

    fn revoke(&self, url: &str) {
        if self.live().remove(url) {
            log::debug!("event=display_revoked display={}", url);
        }
    }
}

/// Owned, revocable preview reference.
#[derive(Debug)]
pub struct DisplayHandle {
    url: String,
    registry: Arc<HandleRegistry>,
}

impl DisplayHandle {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        self.registry.revoke(&self.url);
    }
}

/// A file that passed validation for a slot. Immutable.
#[derive(Debug)]
pub struct ValidatedAsset {
    slot: LayerSlot,
    file: CandidateFile,
    digest: String,
    display: DisplayHandle,
}

impl ValidatedAsset {
    pub(crate) fn new(slot: LayerSlot, file: CandidateFile, digest: String, display: DisplayHandle) -> Self {
        Self { slot, file, digest, display }
    }

    pub fn slot(&self) -> LayerSlot {
        self.slot
    }

    pub fn file_name(&self) -> &str {
        &self.file.name
    }

    pub fn media_type(&self) -> &str {
        &self.file.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.file.bytes
    }

    /// SHA-256 of the file contents, hex encoded.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn display(&self) -> &DisplayHandle {
        &self.display
    }
}

/// The 2D trigger layer.
#[derive(Debug)]
pub struct Asset2D(pub(crate) ValidatedAsset);

impl Asset2D {
    /// Wrap a validated asset. Returns it back if it was validated for the other slot.
    pub fn new(asset: ValidatedAsset) -> Result<Self, ValidatedAsset> {
        match asset.slot {
            LayerSlot::TwoD => Ok(Self(asset)),
            LayerSlot::ThreeD => Err(asset),
        }
    }

    pub fn asset(&self) -> &ValidatedAsset {
        &self.0
    }
}

/// The 3D model layer, together with its normalized scene.
#[derive(Debug)]
pub struct Asset3D {
    pub(crate) asset: ValidatedAsset,
    pub(crate) scene: NormalizedScene,
}

impl Asset3D {
    /// Pair a validated model with its normalized scene.
    /// Returns the asset back if it was validated for the other slot.
    pub fn new(asset: ValidatedAsset, scene: NormalizedScene) -> Result<Self, ValidatedAsset> {
        match asset.slot {
            LayerSlot::ThreeD => Ok(Self { asset, scene }),
            LayerSlot::TwoD => Err(asset),
        }
    }

    pub fn asset(&self) -> &ValidatedAsset {
        &self.asset
    }

    pub fn scene(&self) -> &NormalizedScene {
        &self.scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique_and_revoked_on_drop() {
        let registry = Arc::new(HandleRegistry::new());
        let a = registry.issue();
        let b = registry.issue();
        assert_ne!(a.url(), b.url());
        assert_eq!(registry.live_count(), 2);

        let a_url = a.url().to_string();
        drop(a);
        assert!(!registry.is_live(&a_url));
        assert!(registry.is_live(b.url()));
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn test_asset2d_rejects_model_slot() {
        let registry = Arc::new(HandleRegistry::new());
        let asset = ValidatedAsset::new(
            LayerSlot::ThreeD,
            CandidateFile::new("m.glb", "", vec![]),
            String::new(),
            registry.issue(),
        );
        let back = Asset2D::new(asset).unwrap_err();
        assert_eq!(back.file_name(), "m.glb");
    }
}
