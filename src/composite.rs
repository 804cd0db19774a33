//! Artifact Composite - One Trigger, One Model
//!
//! A composite is complete only when both layers are set. Only complete
//! composites can be turned into a [`TransferForm`].

use serde::Serialize;
use thiserror::Error;

use crate::asset::{Asset2D, Asset3D, ValidatedAsset};
use crate::hashing::compute_manifest_hash;
use crate::normalize::NormalizedScene;
use crate::transform::Transform;
use crate::validation::LayerSlot;

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("Incomplete composite: missing {} layer", missing_list(.missing))]
    Incomplete { missing: Vec<LayerSlot> },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn missing_list(missing: &[LayerSlot]) -> String {
    missing.iter().map(LayerSlot::to_string).collect::<Vec<_>>().join(" and ")
}

impl CompositeError {
    /// Message for a blocking alert.
    pub fn user_message(&self) -> &'static str {
        match self {
            CompositeError::Incomplete { .. } => "Please add 2D and 3D layers before saving",
            CompositeError::Serialization(_) => "Could not prepare the artifact for upload",
        }
    }
}

/// One binary field of the multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl FilePart {
    fn from_asset(asset: &ValidatedAsset) -> Self {
        Self {
            file_name: asset.file_name().to_string(),
            media_type: asset.media_type().to_string(),
            bytes: asset.bytes().to_vec(),
        }
    }
}

/// Serializable summary of a transfer form, hashed into its fingerprint.
#[derive(Debug, Serialize)]
struct TransferManifest<'a> {
    image_sha256: &'a str,
    model_sha256: &'a str,
    transform: Transform,
}

/// Snapshot of a complete composite, ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferForm {
    pub image: FilePart,
    pub model: FilePart,
    pub transform: Transform,
    /// SHA-256 of the canonical manifest (asset digests + transform).
    pub fingerprint: String,
}

#[derive(Debug, Default)]
pub struct ArtifactComposite {
    layer_2d: Option<Asset2D>,
    layer_3d: Option<Asset3D>,
    transform: Transform,
}

impl ArtifactComposite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the trigger layer. A previous trigger is released.
    pub fn set_layer_2d(&mut self, asset: Asset2D) {
        if let Some(previous) = self.layer_2d.replace(asset) {
            log::debug!("event=layer_replaced slot=2d released={}", previous.asset().display().url());
        }
    }

    /// Replace the model layer. A previous model is released.
    pub fn set_layer_3d(&mut self, asset: Asset3D) {
        if let Some(previous) = self.layer_3d.replace(asset) {
            log::debug!("event=layer_replaced slot=3d released={}", previous.asset().display().url());
        }
    }

    /// Release the model layer, e.g. after a replacement failed to load.
    pub fn clear_layer_3d(&mut self) {
        self.layer_3d = None;
    }

    pub fn layer_2d(&self) -> Option<&Asset2D> {
        self.layer_2d.as_ref()
    }

    pub fn layer_3d(&self) -> Option<&Asset3D> {
        self.layer_3d.as_ref()
    }

    pub fn scene(&self) -> Option<&NormalizedScene> {
        self.layer_3d.as_ref().map(Asset3D::scene)
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn missing_slots(&self) -> Vec<LayerSlot> {
        let mut missing = Vec::new();
        if self.layer_2d.is_none() {
            missing.push(LayerSlot::TwoD);
        }
        if self.layer_3d.is_none() {
            missing.push(LayerSlot::ThreeD);
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.layer_2d.is_some() && self.layer_3d.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.layer_2d.is_none() && self.layer_3d.is_none()
    }

    /// Release both layers and restore the identity transform.
    pub fn reset(&mut self) {
        self.layer_2d = None;
        self.layer_3d = None;
        self.transform = Transform::default();
    }

    pub fn to_transfer_form(&self) -> Result<TransferForm, CompositeError> {
        let (Some(image), Some(model)) = (&self.layer_2d, &self.layer_3d) else {
            return Err(CompositeError::Incomplete { missing: self.missing_slots() });
        };

        let fingerprint = compute_manifest_hash(&TransferManifest {
            image_sha256: image.asset().digest(),
            model_sha256: model.asset().digest(),
            transform: self.transform,
        })?;

        Ok(TransferForm {
            image: FilePart::from_asset(image.asset()),
            model: FilePart::from_asset(model.asset()),
            transform: self.transform,
            fingerprint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::ModelNormalizer;
    use crate::validation::{AssetValidator, CandidateFile};

    const TRIANGLE_GLTF: &str = r#"{
        "asset": {"version": "2.0"},
        "scene": 0,
        "scenes": [{"nodes": [0]}],
        "nodes": [{"mesh": 0}],
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
        "accessors": [{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                       "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}],
        "bufferViews": [{"buffer": 0, "byteLength": 36}],
        "buffers": [{"byteLength": 36,
                     "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"}]
    }"#;

    fn image(validator: &AssetValidator, name: &str) -> Asset2D {
        let asset = validator
            .validate(CandidateFile::new(name, "image/png", name.as_bytes().to_vec()), LayerSlot::TwoD)
            .unwrap();
        Asset2D::new(asset).unwrap()
    }

    fn model(validator: &AssetValidator) -> Asset3D {
        let bytes = TRIANGLE_GLTF.as_bytes().to_vec();
        let scene = ModelNormalizer::new().load(&bytes).unwrap();
        let asset = validator
            .validate(CandidateFile::new("model.gltf", "model/gltf+json", bytes), LayerSlot::ThreeD)
            .unwrap();
        Asset3D::new(asset, scene).unwrap()
    }

    #[test]
    fn test_complete_only_with_both_layers() {
        let validator = AssetValidator::default();
        let mut composite = ArtifactComposite::new();
        assert!(!composite.is_complete());
        assert_eq!(composite.missing_slots(), vec![LayerSlot::TwoD, LayerSlot::ThreeD]);

        composite.set_layer_2d(image(&validator, "a.png"));
        assert!(!composite.is_complete());
        assert_eq!(composite.missing_slots(), vec![LayerSlot::ThreeD]);

        composite.set_layer_3d(model(&validator));
        assert!(composite.is_complete());

        composite.reset();
        assert!(!composite.is_complete());
        assert!(composite.is_empty());
        assert!(composite.transform().is_identity());
    }

    #[test]
    fn test_replacing_a_layer_revokes_the_previous_handle() {
        let validator = AssetValidator::default();
        let mut composite = ArtifactComposite::new();

        composite.set_layer_2d(image(&validator, "first.png"));
        let first_url = composite.layer_2d().unwrap().asset().display().url().to_string();

        composite.set_layer_2d(image(&validator, "second.png"));
        let second_url = composite.layer_2d().unwrap().asset().display().url().to_string();

        assert!(!validator.registry().is_live(&first_url));
        assert!(validator.registry().is_live(&second_url));
        assert_eq!(validator.registry().live_count(), 1);

        composite.reset();
        assert_eq!(validator.registry().live_count(), 0);
    }

    #[test]
    fn test_transfer_form_requires_complete_composite() {
        let validator = AssetValidator::default();
        let mut composite = ArtifactComposite::new();
        composite.set_layer_3d(model(&validator));

        let err = composite.to_transfer_form().unwrap_err();
        assert!(matches!(err, CompositeError::Incomplete { ref missing } if missing == &vec![LayerSlot::TwoD]));
        assert_eq!(err.to_string(), "Incomplete composite: missing 2d layer");
    }

    #[test]
    fn test_transfer_form_carries_files_and_identity_transform() {
        let validator = AssetValidator::default();
        let mut composite = ArtifactComposite::new();
        composite.set_layer_2d(image(&validator, "trigger.png"));
        composite.set_layer_3d(model(&validator));

        let form = composite.to_transfer_form().unwrap();
        assert_eq!(form.image.file_name, "trigger.png");
        assert_eq!(form.image.bytes, b"trigger.png".to_vec());
        assert_eq!(form.model.file_name, "model.gltf");
        assert!(form.transform.is_identity());
        assert_eq!(form.fingerprint.len(), 64);

        // Same content, same fingerprint
        assert_eq!(composite.to_transfer_form().unwrap().fingerprint, form.fingerprint);
    }
}
