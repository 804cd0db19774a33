//! Model Normalization - Canonical Reference Frame
//!
//! Every loaded 3D scene is recentred on its bounding box and given the same
//! uniform scale, so models authored at arbitrary sizes and origins preview
//! inside a predictable viewing volume.
//!
//! Bounds are measured on the scene content only, never on the placement the
//! normalizer itself applies. Normalizing twice therefore yields the same
//! placement, and the scale never compounds.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneLoadError {
    #[error("Malformed model container: {0}")]
    Parse(#[from] gltf::Error),

    #[error("Model contains no scene")]
    NoScene,

    #[error("Mesh {mesh} has a primitive without POSITION data")]
    MissingPositions { mesh: usize },

    #[error("Mesh {mesh} has POSITION data without min/max bounds")]
    MissingBounds { mesh: usize },

    #[error("Node {node} is reachable more than once; node graph must be a tree")]
    NodeCycle { node: usize },
}

/// Axis-aligned bounding box. An empty box has `min > max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
        max: Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&mut self, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        self.extend(other.min);
        self.extend(other.max);
    }

    /// Center of the box; the origin for an empty box.
    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            (self.min + self.max) * 0.5
        }
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Bounds of this box after `matrix` is applied to all eight corners.
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let mut out = Aabb::EMPTY;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.extend(matrix.transform_point3(corner));
        }
        out
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Root placement applied on top of the scene: scale about the origin, then translate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub translation: Vec3,
    pub scale: f32,
}

impl Placement {
    pub const IDENTITY: Placement = Placement {
        translation: Vec3::ZERO,
        scale: 1.0,
    };

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_translation(self.translation) * Mat4::from_scale(Vec3::splat(self.scale))
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: Option<String>,
    /// Local transform relative to the parent node.
    pub local: Mat4,
    /// Bounds of each mesh primitive attached to this node, in node space.
    pub mesh_bounds: Vec<Aabb>,
    pub children: Vec<usize>,
}

impl SceneNode {
    pub fn new(local: Mat4) -> Self {
        Self {
            name: None,
            local,
            mesh_bounds: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// A loaded scene graph plus the root placement the normalizer controls.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneGraph {
    pub nodes: Vec<SceneNode>,
    pub roots: Vec<usize>,
    pub placement: Placement,
}

impl SceneGraph {
    pub fn new(nodes: Vec<SceneNode>, roots: Vec<usize>) -> Self {
        Self {
            nodes,
            roots,
            placement: Placement::IDENTITY,
        }
    }

    /// Parse a GLB or glTF container. Only the JSON document is read: bounds
    /// come from the POSITION accessors' min/max, so external buffers are not needed.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SceneLoadError> {
        let gltf = gltf::Gltf::from_slice(bytes)?;
        let document = &gltf.document;

        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or(SceneLoadError::NoScene)?;

        let mut nodes = Vec::with_capacity(document.nodes().len());
        for node in document.nodes() {
            let mut scene_node = SceneNode::new(Mat4::from_cols_array_2d(&node.transform().matrix()));
            scene_node.name = node.name().map(str::to_string);
            scene_node.children = node.children().map(|child| child.index()).collect();

            if let Some(mesh) = node.mesh() {
                for primitive in mesh.primitives() {
                    scene_node.mesh_bounds.push(primitive_bounds(mesh.index(), &primitive)?);
                }
            }
            nodes.push(scene_node);
        }

        let roots = scene.nodes().map(|node| node.index()).collect();
        let graph = Self::new(nodes, roots);
        graph.content_bounds()?;
        Ok(graph)
    }

    /// Bounds of all meshes with node transforms applied, excluding the placement.
    pub fn content_bounds(&self) -> Result<Aabb, SceneLoadError> {
        let mut bounds = Aabb::EMPTY;
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<(usize, Mat4)> = self.roots.iter().map(|&root| (root, Mat4::IDENTITY)).collect();

        while let Some((index, parent)) = stack.pop() {
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            if std::mem::replace(&mut visited[index], true) {
                return Err(SceneLoadError::NodeCycle { node: index });
            }

            let world = parent * node.local;
            for mesh in &node.mesh_bounds {
                bounds.union(&mesh.transformed(&world));
            }
            stack.extend(node.children.iter().map(|&child| (child, world)));
        }

        Ok(bounds)
    }

    /// Bounds as rendered, placement included.
    pub fn world_bounds(&self) -> Result<Aabb, SceneLoadError> {
        Ok(self.content_bounds()?.transformed(&self.placement.matrix()))
    }
}

fn primitive_bounds(mesh: usize, primitive: &gltf::Primitive<'_>) -> Result<Aabb, SceneLoadError> {
    let accessor = primitive
        .get(&gltf::Semantic::Positions)
        .ok_or(SceneLoadError::MissingPositions { mesh })?;

    let corner = |value: Option<serde_json::Value>| value.and_then(|v| serde_json::from_value::<[f32; 3]>(v).ok());

    match (corner(accessor.min()), corner(accessor.max())) {
        (Some(min), Some(max)) => Ok(Aabb::new(Vec3::from(min), Vec3::from(max))),
        _ => Err(SceneLoadError::MissingBounds { mesh }),
    }
}

/// A scene that went through [`ModelNormalizer::normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedScene {
    graph: SceneGraph,
    source_bounds: Aabb,
}

impl NormalizedScene {
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn placement(&self) -> Placement {
        self.graph.placement
    }

    /// Bounds of the content before placement.
    pub fn source_bounds(&self) -> Aabb {
        self.source_bounds
    }

    /// Bounds after placement; centred on the origin.
    pub fn bounds(&self) -> Aabb {
        self.source_bounds.transformed(&self.graph.placement.matrix())
    }
}

/// Recentres and rescales loaded scenes.
#[derive(Debug, Clone, Copy)]
pub struct ModelNormalizer {
    scale: f32,
}

impl ModelNormalizer {
    /// Uniform scale applied to every model, whatever its authored size.
    pub const CANONICAL_SCALE: f32 = 0.8;

    pub fn new() -> Self {
        Self { scale: Self::CANONICAL_SCALE }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Set the placement of `scene` so its bounding-box centre lands on the
    /// origin at the canonical scale. Returns the placement that was set.
    pub fn normalize(&self, scene: &mut SceneGraph) -> Result<Placement, SceneLoadError> {
        let bounds = scene.content_bounds()?;
        let center = bounds.center();

        scene.placement = Placement {
            translation: -center * self.scale,
            scale: self.scale,
        };

        log::debug!(
            "event=scene_normalized nodes={} center={:?} size={:?} scale={}",
            scene.nodes.len(),
            center,
            bounds.size(),
            self.scale
        );

        Ok(scene.placement)
    }

    /// Load a model container and normalize it. Nothing is normalized if loading fails.
    pub fn load(&self, bytes: &[u8]) -> Result<NormalizedScene, SceneLoadError> {
        let mut graph = SceneGraph::from_slice(bytes)?;
        self.normalize(&mut graph)?;
        let source_bounds = graph.content_bounds()?;
        Ok(NormalizedScene { graph, source_bounds })
    }
}

impl Default for ModelNormalizer {
    fn default() -> Self {
        Self::new()
    }
}
