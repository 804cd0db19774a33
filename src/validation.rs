//! Validation System - Layer Slot Gatekeeping
//!
//! Rules produce structured violations.
//! The validator turns violations into a rejection, or into a display handle.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::{HandleRegistry, ValidatedAsset};
use crate::hashing::sha256_hex;

/// Extensions the 3D slot accepts. This list is authoritative.
pub const MODEL_EXTENSIONS: [&str; 2] = ["glb", "gltf"];

/// Filter advertised by the 2D file picker.
pub const PICKER_FILTER_2D: &str = "image/*";

/// Filter advertised by the 3D file picker.
///
/// Lists `.fbx`, which [`ModelExtensionRule`] rejects.
// TODO: drop `.fbx` here once the picker widget reads MODEL_EXTENSIONS directly.
pub const PICKER_FILTER_3D: &str = ".glb,.gltf,.fbx";

/// The two layer slots of a composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerSlot {
    #[serde(rename = "2d")]
    TwoD,
    #[serde(rename = "3d")]
    ThreeD,
}

impl LayerSlot {
    /// Filter string the file picker advertises for this slot.
    pub fn picker_filter(self) -> &'static str {
        match self {
            LayerSlot::TwoD => PICKER_FILTER_2D,
            LayerSlot::ThreeD => PICKER_FILTER_3D,
        }
    }
}

impl fmt::Display for LayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerSlot::TwoD => f.write_str("2d"),
            LayerSlot::ThreeD => f.write_str("3d"),
        }
    }
}

/// A file the user picked for a slot, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub name: String,
    /// Declared media type, e.g. `image/png`. Empty when the platform did not know it.
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl CandidateFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Lowercased text after the last `.` of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub remediation: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("not an image")]
    NotAnImage { violations: Vec<ValidationViolation> },

    #[error("unsupported 3D format")]
    UnsupportedModelFormat { violations: Vec<ValidationViolation> },
}

impl ValidationError {
    pub fn slot(&self) -> LayerSlot {
        match self {
            ValidationError::NotAnImage { .. } => LayerSlot::TwoD,
            ValidationError::UnsupportedModelFormat { .. } => LayerSlot::ThreeD,
        }
    }

    pub fn violations(&self) -> &[ValidationViolation] {
        match self {
            ValidationError::NotAnImage { violations }
            | ValidationError::UnsupportedModelFormat { violations } => violations,
        }
    }

    /// Message for a blocking alert.
    pub fn user_message(&self) -> &'static str {
        match self {
            ValidationError::NotAnImage { .. } => "Only image files can be used as a 2D trigger",
            ValidationError::UnsupportedModelFormat { .. } => "Only .glb or .gltf files are supported",
        }
    }
}

/// Validation rule trait - produces violations
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn slot(&self) -> LayerSlot;
    fn validate(&self, file: &CandidateFile) -> Vec<ValidationViolation>;
}

// --- Concrete Rules ---

pub struct ImageMediaTypeRule;

impl ValidationRule for ImageMediaTypeRule {
    fn name(&self) -> &'static str { "image_media_type" }

    fn slot(&self) -> LayerSlot { LayerSlot::TwoD }

    fn validate(&self, file: &CandidateFile) -> Vec<ValidationViolation> {
        let media_type = file.media_type.trim().to_ascii_lowercase();
        let is_image = media_type
            .split_once('/')
            .map_or(false, |(top, sub)| top == "image" && !sub.is_empty());

        if is_image {
            return vec![];
        }

        vec![ValidationViolation {
            rule: self.name().to_string(),
            message: "not an image".to_string(),
            expected: Some(PICKER_FILTER_2D.to_string()),
            actual: Some(if media_type.is_empty() { "unknown".to_string() } else { media_type }),
            remediation: vec!["Pick a PNG, JPEG or other image file".to_string()],
        }]
    }
}

pub struct ModelExtensionRule;

impl ValidationRule for ModelExtensionRule {
    fn name(&self) -> &'static str { "model_extension" }

    fn slot(&self) -> LayerSlot { LayerSlot::ThreeD }

    fn validate(&self, file: &CandidateFile) -> Vec<ValidationViolation> {
        let extension = file.extension();
        let accepted = extension
            .as_deref()
            .map_or(false, |ext| MODEL_EXTENSIONS.contains(&ext));

        if accepted {
            return vec![];
        }

        vec![ValidationViolation {
            rule: self.name().to_string(),
            message: "unsupported 3D format".to_string(),
            expected: Some(MODEL_EXTENSIONS.join(", ")),
            actual: Some(extension.unwrap_or_else(|| "none".to_string())),
            remediation: vec!["Export the model as .glb or .gltf".to_string()],
        }]
    }
}

/// Validator orchestrates rules and mints display handles for accepted files
pub struct AssetValidator {
    rules: Vec<Box<dyn ValidationRule>>,
    registry: Arc<HandleRegistry>,
}

impl AssetValidator {
    pub fn new(registry: Arc<HandleRegistry>) -> Self {
        Self {
            rules: vec![
                Box::new(ImageMediaTypeRule),
                Box::new(ModelExtensionRule),
            ],
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// Check `file` against every rule for `slot`.
    pub fn check(&self, file: &CandidateFile, slot: LayerSlot) -> Vec<ValidationViolation> {
        self.rules
            .iter()
            .filter(|rule| rule.slot() == slot)
            .flat_map(|rule| rule.validate(file))
            .collect()
    }

    /// Validate `file` for `slot`. No network I/O happens here.
    ///
    /// On success the returned asset owns a freshly issued display handle that
    /// a renderer can resolve for live preview.
    pub fn validate(&self, file: CandidateFile, slot: LayerSlot) -> Result<ValidatedAsset, ValidationError> {
        let violations = self.check(&file, slot);

        if !violations.is_empty() {
            log::warn!(
                "event=asset_rejected slot={} file={} rules={}",
                slot,
                file.name,
                violations.iter().map(|v| v.rule.as_str()).collect::<Vec<_>>().join(",")
            );
            return Err(match slot {
                LayerSlot::TwoD => ValidationError::NotAnImage { violations },
                LayerSlot::ThreeD => ValidationError::UnsupportedModelFormat { violations },
            });
        }

        let digest = sha256_hex(&file.bytes);
        let display = self.registry.issue();

        log::info!(
            "event=asset_accepted slot={} file={} size={} sha256={} display={}",
            slot,
            file.name,
            file.bytes.len(),
            digest,
            display.url()
        );

        Ok(ValidatedAsset::new(slot, file, digest, display))
    }
}

impl Default for AssetValidator {
    fn default() -> Self {
        Self::new(Arc::new(HandleRegistry::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, media_type: &str) -> CandidateFile {
        CandidateFile::new(name, media_type, vec![1, 2, 3])
    }

    #[test]
    fn test_non_image_media_types_rejected() {
        let validator = AssetValidator::default();
        for media_type in ["", "text/plain", "application/pdf", "model/gltf-binary", "video/mp4", "image/", "imagepng"] {
            let result = validator.validate(file("trigger.png", media_type), LayerSlot::TwoD);
            let err = result.unwrap_err();
            assert_eq!(err.to_string(), "not an image", "media type {:?}", media_type);
            assert_eq!(err.violations()[0].rule, "image_media_type");
        }
    }

    #[test]
    fn test_any_image_media_type_accepted() {
        let validator = AssetValidator::default();
        for media_type in ["image/png", "image/jpeg", "IMAGE/WEBP", "image/svg+xml"] {
            assert!(validator.validate(file("x.bin", media_type), LayerSlot::TwoD).is_ok());
        }
    }

    #[test]
    fn test_model_whitelist() {
        let validator = AssetValidator::default();
        for name in ["model.glb", "model.gltf", "MODEL.GLB", "a.b.gltf"] {
            assert!(validator.validate(file(name, ""), LayerSlot::ThreeD).is_ok(), "{}", name);
        }
        for name in ["model.fbx", "model.obj", "model", "model.", "glb", "model.glb.zip"] {
            let err = validator.validate(file(name, "model/gltf-binary"), LayerSlot::ThreeD).unwrap_err();
            assert_eq!(err.to_string(), "unsupported 3D format", "{}", name);
        }
    }

    #[test]
    fn test_picker_advertises_more_than_validation_accepts() {
        assert!(LayerSlot::ThreeD.picker_filter().contains(".fbx"));
        assert!(!MODEL_EXTENSIONS.contains(&"fbx"));
    }

    #[test]
    fn test_rules_only_apply_to_their_slot() {
        let validator = AssetValidator::default();
        // A model file with an image media type passes the 3D gate on extension alone
        assert!(validator.check(&file("m.glb", "image/png"), LayerSlot::ThreeD).is_empty());
        // and a .glb name does not help a non-image in the 2D slot
        assert_eq!(validator.check(&file("m.glb", "model/gltf-binary"), LayerSlot::TwoD).len(), 1);
    }

    #[test]
    fn test_accepted_asset_gets_live_display_handle() {
        let validator = AssetValidator::default();
        let asset = validator.validate(file("t.png", "image/png"), LayerSlot::TwoD).unwrap();
        assert!(asset.display().url().starts_with("blob:"));
        assert!(validator.registry().is_live(asset.display().url()));
        assert_eq!(asset.digest(), sha256_hex(&[1, 2, 3]));
    }
}
