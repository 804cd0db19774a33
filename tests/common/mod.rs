//! Shared fixtures for the contract tests.

#![allow(dead_code)]

use artifact_core::CandidateFile;

/// glTF document with one triangle mesh under a translated node.
/// World bounds: min (9, -1, -1), max (11, 3, 1), centre (10, 1, 0).
pub const OFFSET_MODEL_JSON: &str = r#"{
    "asset": {"version": "2.0"},
    "scene": 0,
    "scenes": [{"nodes": [0]}],
    "nodes": [{"name": "root", "translation": [10.0, 0.0, 0.0], "children": [1]},
              {"name": "mesh", "mesh": 0}],
    "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
    "accessors": [{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                   "min": [-1.0, -1.0, -1.0], "max": [1.0, 3.0, 1.0]}],
    "bufferViews": [{"buffer": 0, "byteLength": 36}],
    "buffers": [{"byteLength": 36}]
}"#;

/// Pack a glTF JSON document and a zeroed 36-byte buffer into a GLB container.
pub fn glb(json: &str) -> Vec<u8> {
    let mut json_chunk = json.as_bytes().to_vec();
    while json_chunk.len() % 4 != 0 {
        json_chunk.push(b' ');
    }
    let bin_chunk = vec![0u8; 36];

    let total = 12 + 8 + json_chunk.len() + 8 + bin_chunk.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());

    out.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&0x4E4F_534Au32.to_le_bytes());
    out.extend_from_slice(&json_chunk);

    out.extend_from_slice(&(bin_chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&0x004E_4942u32.to_le_bytes());
    out.extend_from_slice(&bin_chunk);
    out
}

pub fn image_file(name: &str) -> CandidateFile {
    CandidateFile::new(name, "image/png", vec![0x89, b'P', b'N', b'G'])
}

pub fn model_file(name: &str) -> CandidateFile {
    CandidateFile::new(name, "model/gltf-binary", glb(OFFSET_MODEL_JSON))
}
