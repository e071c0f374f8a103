// SPDX-License-Identifier: CEPL-1.0
use std::path::Path;

use lumen_math::Mat4;
use lumen_render::{DrawNode, Material, Mesh, Primitive, Scene, Vertex};
use tracing::{debug, info, warn};

use crate::{load_texture, LoadError};

/// Load an OBJ file. Every object becomes one root node with a single
/// primitive; `mtllib` textures are resolved next to the OBJ file. A
/// material whose texture cannot be decoded keeps a plain base colour.
pub fn load_obj(path: impl AsRef<Path>) -> Result<Scene, LoadError> {
    let path = path.as_ref();
    let options = tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ..Default::default()
    };
    let (models, materials) = tobj::load_obj(path, &options).map_err(|source| LoadError::Obj {
        path: path.to_path_buf(),
        source,
    })?;
    let materials = materials.unwrap_or_else(|e| {
        warn!(path = %path.display(), "material library not loaded: {e}");
        Vec::new()
    });

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut scene = Scene::default();
    let mut diffuse = Vec::with_capacity(materials.len());
    for m in &materials {
        let base_color = m
            .diffuse_texture
            .as_deref()
            .and_then(|file| texture_slot(&mut scene, base_dir, file));
        let normal_map = m
            .normal_texture
            .as_deref()
            .and_then(|file| texture_slot(&mut scene, base_dir, file));
        scene.materials.push(Material {
            name: m.name.clone(),
            base_color,
            normal_map,
        });
        diffuse.push(m.diffuse.unwrap_or([1.0; 3]));
    }

    let mut fallback = None;
    for model in &models {
        let mesh = &model.mesh;
        if mesh.indices.is_empty() {
            debug!(name = %model.name, "skipping object without faces");
            continue;
        }
        let material = match mesh.material_id.filter(|&id| id < scene.materials.len()) {
            Some(id) => id,
            None => *fallback.get_or_insert_with(|| {
                scene.materials.push(Material {
                    name: "default".into(),
                    ..Material::default()
                });
                diffuse.push([1.0; 3]);
                scene.materials.len() - 1
            }),
        };

        let base = scene.vertices.len() as u32;
        let first_index = scene.indices.len() as u32;
        append_vertices(&mut scene.vertices, mesh, diffuse[material]);
        scene.indices.extend(mesh.indices.iter().map(|&i| base + i));

        scene.roots.push(
            DrawNode::new(model.name.clone(), Mat4::IDENTITY).with_mesh(Mesh {
                primitives: vec![Primitive {
                    first_index,
                    index_count: mesh.indices.len() as u32,
                    material,
                }],
            }),
        );
    }

    if scene.is_empty() {
        return Err(LoadError::NoGeometry {
            path: path.to_path_buf(),
        });
    }
    info!(
        path = %path.display(),
        objects = scene.roots.len(),
        vertices = scene.vertices.len(),
        materials = scene.materials.len(),
        "obj loaded"
    );
    Ok(scene)
}

fn texture_slot(scene: &mut Scene, dir: &Path, file: &str) -> Option<usize> {
    match load_texture(dir.join(file)) {
        Ok(texture) => {
            scene.textures.push(texture);
            Some(scene.textures.len() - 1)
        }
        Err(e) => {
            warn!("{e}; using the fallback texture");
            None
        }
    }
}

fn append_vertices(out: &mut Vec<Vertex>, mesh: &tobj::Mesh, tint: [f32; 3]) {
    let count = mesh.positions.len() / 3;
    let has_normals = mesh.normals.len() == count * 3;
    let has_uvs = mesh.texcoords.len() == count * 2;
    let has_colors = mesh.vertex_color.len() == count * 3;
    out.reserve(count);
    for i in 0..count {
        out.push(Vertex {
            position: triple(&mesh.positions, i),
            normal: if has_normals {
                triple(&mesh.normals, i)
            } else {
                [0.0, 1.0, 0.0]
            },
            color: if has_colors {
                triple(&mesh.vertex_color, i)
            } else {
                tint
            },
            // OBJ puts v = 0 at the bottom of the image.
            uv: if has_uvs {
                [mesh.texcoords[i * 2], 1.0 - mesh.texcoords[i * 2 + 1]]
            } else {
                [0.0, 0.0]
            },
        });
    }
}

fn triple(v: &[f32], i: usize) -> [f32; 3] {
    [v[i * 3], v[i * 3 + 1], v[i * 3 + 2]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scratch_path;

    fn write(name: &str, body: &str) -> std::path::PathBuf {
        let path = scratch_path(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn quad_is_triangulated() {
        let path = write(
            "quad.obj",
            "o quad\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n",
        );
        let scene = load_obj(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(scene.vertices.len(), 4);
        assert_eq!(scene.indices.len(), 6);
        assert!(scene.indices.iter().all(|&i| i < 4));
        assert_eq!(scene.roots.len(), 1);
        assert_eq!(scene.materials.len(), 1);
        assert_eq!(scene.validate(), Ok(()));
    }

    #[test]
    fn objects_get_consecutive_index_ranges() {
        let path = write(
            "pair.obj",
            "o a\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n\
             o b\nv 0 0 1\nv 1 0 1\nv 0 1 1\nf 4 5 6\n",
        );
        let scene = load_obj(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let prims: Vec<Primitive> = scene
            .roots
            .iter()
            .map(|n| n.mesh.as_ref().unwrap().primitives[0])
            .collect();
        assert_eq!(prims.len(), 2);
        assert_eq!((prims[0].first_index, prims[0].index_count), (0, 3));
        assert_eq!((prims[1].first_index, prims[1].index_count), (3, 3));
        assert_eq!(prims[0].material, prims[1].material);
        let second: Vec<u32> = scene.indices[3..].to_vec();
        assert!(second.iter().all(|&i| (3..6).contains(&i)));
        assert_eq!(scene.validate(), Ok(()));
    }

    #[test]
    fn texcoords_are_flipped_and_normals_kept() {
        let path = write(
            "uv.obj",
            "v 0 0 0\nv 1 0 0\nv 0 1 0\n\
             vt 0 0\nvt 1 0\nvt 0 1\n\
             vn 0 0 1\n\
             f 1/1/1 2/2/1 3/3/1\n",
        );
        let scene = load_obj(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let top = scene
            .vertices
            .iter()
            .find(|v| v.position == [0.0, 1.0, 0.0])
            .unwrap();
        assert_eq!(top.uv, [0.0, 0.0]);
        assert_eq!(top.normal, [0.0, 0.0, 1.0]);
        let origin = scene
            .vertices
            .iter()
            .find(|v| v.position == [0.0, 0.0, 0.0])
            .unwrap();
        assert_eq!(origin.uv, [0.0, 1.0]);
    }

    #[test]
    fn file_without_faces_has_no_geometry() {
        let path = write("points.obj", "v 0 0 0\nv 1 0 0\n");
        let err = load_obj(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, LoadError::NoGeometry { .. }));
    }

    #[test]
    fn missing_file_reports_the_path() {
        let path = scratch_path("missing.obj");
        let err = load_obj(&path).unwrap_err();
        assert!(matches!(err, LoadError::Obj { .. }));
        assert!(err.to_string().contains("missing.obj"));
    }
}
