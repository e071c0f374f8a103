// SPDX-License-Identifier: CEPL-1.0
use lumen_math::{Mat4, Vec3};
use lumen_render::{DrawNode, Material, Mesh, Primitive, Scene, TextureData, Vertex};

/// Two-colour checkerboard, `cell` pixels per square.
pub fn checker(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> TextureData {
    let cell = cell.max(1);
    let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
    for y in 0..size {
        for x in 0..size {
            let odd = (x / cell + y / cell) % 2 == 1;
            pixels.extend_from_slice(if odd { &b } else { &a });
        }
    }
    TextureData {
        pixels,
        width: size,
        height: size,
    }
}

/// A checkered floor with a cube resting on it and a smaller cube
/// stacked on top as a child node. Used when no scene file is given.
pub fn demo_scene() -> Scene {
    let mut scene = Scene {
        textures: vec![
            checker(256, 32, [200, 200, 200, 255], [90, 90, 100, 255]),
            TextureData::solid(4, 4, [220, 120, 60, 255]),
        ],
        materials: vec![
            Material {
                name: "floor".into(),
                base_color: Some(0),
                normal_map: None,
            },
            Material {
                name: "crate".into(),
                base_color: Some(1),
                normal_map: None,
            },
        ],
        ..Scene::default()
    };

    let floor = push_quad(&mut scene, 6.0, 0);
    let cube = push_cube(&mut scene, 1);

    // Child transform is relative to the cube's centre.
    let top_transform =
        Mat4::from_translation(Vec3::new(0.0, 0.75, 0.0)) * Mat4::from_scale(Vec3::splat(0.5));
    let top = DrawNode::new("top", top_transform).with_mesh(cube.clone());
    let body = DrawNode::new("cube", Mat4::from_translation(Vec3::new(0.0, 0.5, 0.0)))
        .with_mesh(cube)
        .with_child(top);
    scene.roots.push(DrawNode::new("floor", Mat4::IDENTITY).with_mesh(floor));
    scene.roots.push(body);
    scene
}

fn vertex(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Vertex {
    Vertex {
        position,
        normal,
        color: [1.0; 3],
        uv,
    }
}

fn push_quad(scene: &mut Scene, half: f32, material: usize) -> Mesh {
    let base = scene.vertices.len() as u32;
    let first_index = scene.indices.len() as u32;
    let up = [0.0, 1.0, 0.0];
    let tiles = half;
    scene.vertices.extend([
        vertex([-half, 0.0, half], up, [0.0, tiles]),
        vertex([half, 0.0, half], up, [tiles, tiles]),
        vertex([half, 0.0, -half], up, [tiles, 0.0]),
        vertex([-half, 0.0, -half], up, [0.0, 0.0]),
    ]);
    scene
        .indices
        .extend([0, 1, 2, 2, 3, 0].into_iter().map(|i| base + i));
    Mesh {
        primitives: vec![Primitive {
            first_index,
            index_count: 6,
            material,
        }],
    }
}

/// Unit cube centred on the origin, four vertices per face.
fn push_cube(scene: &mut Scene, material: usize) -> Mesh {
    let first_index = scene.indices.len() as u32;
    let faces = [
        (Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_X, Vec3::Z),
        (Vec3::Y, Vec3::X),
        (Vec3::NEG_Y, Vec3::X),
        (Vec3::Z, Vec3::X),
        (Vec3::NEG_Z, Vec3::NEG_X),
    ];
    for (normal, tangent) in faces {
        let bitangent = normal.cross(tangent);
        let base = scene.vertices.len() as u32;
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        for (u, v) in corners {
            let p = (normal + tangent * u + bitangent * v) * 0.5;
            scene.vertices.push(vertex(
                p.to_array(),
                normal.to_array(),
                [(u + 1.0) * 0.5, (1.0 - v) * 0.5],
            ));
        }
        scene
            .indices
            .extend([0, 1, 2, 2, 3, 0].into_iter().map(|i| base + i));
    }
    Mesh {
        primitives: vec![Primitive {
            first_index,
            index_count: 36,
            material,
        }],
    }
}
