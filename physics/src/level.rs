//! Raw level geometry handed to the collision world.
//!
//! Meshes arrive as flat buffers, the way a model loader would serialize them:
//! `vertices` holds xyz triplets and `indices` (when present) holds triangle
//! corners. A mesh without indices is read as consecutive triangles.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("failed to read level file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse level file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelMesh {
    pub vertices: Vec<f32>,
    #[serde(default)]
    pub indices: Option<Vec<u32>>,
}

impl LevelMesh {
    /// Two triangles spanning the corners `a, b, c, d` in order.
    pub fn quad(a: [f32; 3], b: [f32; 3], c: [f32; 3], d: [f32; 3]) -> Self {
        Self {
            vertices: [a, b, c, d].concat(),
            indices: Some(vec![0, 1, 2, 0, 2, 3]),
        }
    }

    pub fn cuboid(center: [f32; 3], half_extents: [f32; 3]) -> Self {
        let [cx, cy, cz] = center;
        let [hx, hy, hz] = half_extents;

        let mut vertices = Vec::with_capacity(24);
        for (sx, sy, sz) in [
            (-1.0, -1.0, -1.0),
            (1.0, -1.0, -1.0),
            (1.0, 1.0, -1.0),
            (-1.0, 1.0, -1.0),
            (-1.0, -1.0, 1.0),
            (1.0, -1.0, 1.0),
            (1.0, 1.0, 1.0),
            (-1.0, 1.0, 1.0),
        ] {
            vertices.extend_from_slice(&[cx + sx * hx, cy + sy * hy, cz + sz * hz]);
        }

        let indices = vec![
            0, 2, 1, 0, 3, 2, // back
            4, 5, 6, 4, 6, 7, // front
            0, 4, 7, 0, 7, 3, // left
            1, 2, 6, 1, 6, 5, // right
            3, 7, 6, 3, 6, 2, // top
            0, 1, 5, 0, 5, 4, // bottom
        ];

        Self {
            vertices,
            indices: Some(indices),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Level {
    pub meshes: Vec<LevelMesh>,
}

impl Level {
    pub fn from_json(text: &str) -> Result<Self, LevelError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, LevelError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Small built-in arena: a floor, a low step, a walkable ramp and a wall.
    pub fn demo() -> Self {
        let half = 50.0;
        Self {
            meshes: vec![
                LevelMesh::quad(
                    [-half, 0.0, -half],
                    [-half, 0.0, half],
                    [half, 0.0, half],
                    [half, 0.0, -half],
                ),
                LevelMesh::cuboid([6.0, 0.25, 0.0], [2.0, 0.25, 2.0]),
                LevelMesh::quad(
                    [-4.0, 0.0, -10.0],
                    [4.0, 0.0, -10.0],
                    [4.0, 3.0, -18.0],
                    [-4.0, 3.0, -18.0],
                ),
                LevelMesh::cuboid([0.0, 3.0, -25.0], [10.0, 3.0, 0.5]),
            ],
        }
    }
}
