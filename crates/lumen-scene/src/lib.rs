// SPDX-License-Identifier: CEPL-1.0
//! Scene loading for lumen: Wavefront OBJ geometry, image textures and a
//! built-in demo scene, all flattened into a [`lumen_render::Scene`].

mod demo;
mod obj;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lumen_core::FailureClass;
use lumen_render::{Scene, SceneError, TextureData};
use thiserror::Error;
use tracing::info;

pub use demo::{checker, demo_scene};
pub use obj::load_obj;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to parse OBJ '{}': {source}", path.display())]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },
    #[error("failed to decode image '{}': {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("'{}' contains no triangles", path.display())]
    NoGeometry { path: PathBuf },
    #[error(transparent)]
    Invalid(#[from] SceneError),
}

/// Classification probe for [`lumen_core::classify`].
pub fn failure_class(err: &(dyn std::error::Error + 'static)) -> Option<FailureClass> {
    if err.is::<LoadError>() || err.is::<SceneError>() {
        Some(FailureClass::Scene)
    } else {
        None
    }
}

/// Decode any supported image file into tightly packed RGBA8.
pub fn load_texture(path: impl AsRef<Path>) -> Result<TextureData, LoadError> {
    let path = path.as_ref();
    let rgba = image::open(path)
        .map_err(|source| LoadError::Image {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    info!(path = %path.display(), width, height, "texture loaded");
    Ok(TextureData {
        pixels: rgba.into_raw(),
        width,
        height,
    })
}

/// Add `texture` to the scene and make it every material's base colour.
pub fn override_base_color(scene: &mut Scene, texture: TextureData) {
    let index = scene.textures.len();
    scene.textures.push(texture);
    for material in &mut scene.materials {
        material.base_color = Some(index);
    }
}

/// Resolve the scene named on the command line. No scene path means the
/// demo scene; a texture path replaces every base colour.
pub fn load(scene: Option<&Path>, texture: Option<&Path>) -> Result<Scene> {
    let mut loaded = match scene {
        Some(path) => {
            load_obj(path).with_context(|| format!("loading scene {}", path.display()))?
        }
        None => demo_scene(),
    };
    if let Some(path) = texture {
        let data =
            load_texture(path).with_context(|| format!("loading texture {}", path.display()))?;
        override_base_color(&mut loaded, data);
    }
    loaded.validate().map_err(LoadError::from)?;
    info!(
        vertices = loaded.vertices.len(),
        indices = loaded.indices.len(),
        primitives = loaded.primitive_count(),
        textures = loaded.textures.len(),
        "scene ready"
    );
    Ok(loaded)
}

#[cfg(test)]
pub(crate) fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("lumen-scene-{}-{name}", std::process::id()))
}
