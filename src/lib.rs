//! ARtifact Core - AR Artifact Composition Engine
//!
//! # The Five Rules (Non-Negotiable)
//! 1. One Trigger, One Model
//! 2. Validation Gates Every Layer
//! 3. Every Scene Is Normalized The Same Way
//! 4. Only Complete Composites Leave The Editor
//! 5. Stale Results Never Touch A Newer Session

pub mod asset;
pub mod composite;
pub mod config;
pub mod gateway;
pub mod hashing;
pub mod normalize;
pub mod session;
pub mod transform;
pub mod validation;

pub use asset::{Asset2D, Asset3D, DisplayHandle, HandleRegistry, ValidatedAsset};
pub use composite::{ArtifactComposite, CompositeError, FilePart, TransferForm};
pub use config::{ConfigError, EditorConfig};
pub use gateway::{ArtifactBackend, Draft, DraftId, HttpBackend, MemoryBackend, PublishReceipt, TransportError};
pub use hashing::{canonical_json, compute_manifest_hash, sha256_hex};
pub use normalize::{Aabb, ModelNormalizer, NormalizedScene, Placement, SceneGraph, SceneLoadError};
pub use session::{Completion, DraftPreview, EditorError, EditorSession, LivePreview, Mode, SubmissionKind, SubmissionTicket};
pub use transform::Transform;
pub use validation::{AssetValidator, CandidateFile, LayerSlot, ValidationError, ValidationViolation};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
