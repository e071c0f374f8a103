// SPDX-License-Identifier: CEPL-1.0
//! Flattened scene handed over by the scene loader. The engine only reads
//! it: vertex/index arrays, a node tree and material/texture tables.

use bytemuck::{Pod, Zeroable};
use lumen_math::Mat4;
use thiserror::Error;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

/// Tightly packed RGBA8 pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl TextureData {
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for _ in 0..count {
            pixels.extend_from_slice(&rgba);
        }
        Self {
            pixels,
            width,
            height,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Material {
    pub name: String,
    /// Index into `Scene::textures`; `None` samples plain white.
    pub base_color: Option<usize>,
    /// Index into `Scene::textures`; `None` clears the normal-map flag.
    pub normal_map: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Primitive {
    pub first_index: u32,
    pub index_count: u32,
    /// Index into `Scene::materials`.
    pub material: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub primitives: Vec<Primitive>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawNode {
    pub name: String,
    /// Transform relative to the parent node.
    pub transform: Mat4,
    pub mesh: Option<Mesh>,
    pub children: Vec<DrawNode>,
}

impl DrawNode {
    pub fn new(name: impl Into<String>, transform: Mat4) -> Self {
        Self {
            name: name.into(),
            transform,
            mesh: None,
            children: Vec::new(),
        }
    }

    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_child(mut self, child: DrawNode) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("scene has no geometry")]
    Empty,
    #[error("index {index} at position {position} is out of range for {vertices} vertices")]
    IndexOutOfRange {
        position: usize,
        index: u32,
        vertices: usize,
    },
    #[error("primitive in node '{node}' covers indices {first}..{end} but only {available} exist")]
    PrimitiveOutOfRange {
        node: String,
        first: u32,
        end: u64,
        available: usize,
    },
    #[error("primitive in node '{node}' references missing material {material}")]
    MissingMaterial { node: String, material: usize },
    #[error("material '{material}' references missing texture {texture}")]
    MissingTexture { material: String, texture: usize },
    #[error("texture {texture} is {width}x{height} but holds {len} bytes")]
    TextureSize {
        texture: usize,
        width: u32,
        height: u32,
        len: usize,
    },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scene {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub roots: Vec<DrawNode>,
    pub materials: Vec<Material>,
    pub textures: Vec<TextureData>,
}

impl Scene {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    pub fn primitive_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&DrawNode> = self.roots.iter().collect();
        while let Some(node) = stack.pop() {
            if let Some(mesh) = &node.mesh {
                count += mesh.primitives.len();
            }
            stack.extend(node.children.iter());
        }
        count
    }

    /// Reject anything that would make the GPU read out of bounds.
    pub fn validate(&self) -> Result<(), SceneError> {
        if self.is_empty() {
            return Err(SceneError::Empty);
        }

        let vertices = self.vertices.len();
        if let Some((position, &index)) = self
            .indices
            .iter()
            .enumerate()
            .find(|&(_, &i)| i as usize >= vertices)
        {
            return Err(SceneError::IndexOutOfRange {
                position,
                index,
                vertices,
            });
        }

        for (texture, t) in self.textures.iter().enumerate() {
            if t.width == 0 || t.height == 0 || t.pixels.len() != t.byte_size() {
                return Err(SceneError::TextureSize {
                    texture,
                    width: t.width,
                    height: t.height,
                    len: t.pixels.len(),
                });
            }
        }

        for m in &self.materials {
            for texture in [m.base_color, m.normal_map].into_iter().flatten() {
                if texture >= self.textures.len() {
                    return Err(SceneError::MissingTexture {
                        material: m.name.clone(),
                        texture,
                    });
                }
            }
        }

        let mut stack: Vec<&DrawNode> = self.roots.iter().collect();
        while let Some(node) = stack.pop() {
            for p in node.mesh.iter().flat_map(|m| m.primitives.iter()) {
                let end = p.first_index as u64 + p.index_count as u64;
                if end > self.indices.len() as u64 {
                    return Err(SceneError::PrimitiveOutOfRange {
                        node: node.name.clone(),
                        first: p.first_index,
                        end,
                        available: self.indices.len(),
                    });
                }
                if p.material >= self.materials.len() {
                    return Err(SceneError::MissingMaterial {
                        node: node.name.clone(),
                        material: p.material,
                    });
                }
            }
            stack.extend(node.children.iter());
        }
        Ok(())
    }
}
