use crate::data_structures::model::Model;

/**
 * Flattens the meshes of an OBJ file into one indexed triangle list.
 *
 * Indices of later meshes are offset by the vertices already emitted so the
 * result can be drawn with a single indexed call. If any mesh lacks normals
 * the normals of the whole model are recomputed, since a partial set would
 * not line up with the positions.
 */
pub fn merge_meshes(name: impl Into<String>, models: &[tobj::Model]) -> Model {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut tex_coords = Vec::new();
    let mut indices = Vec::new();
    let mut has_all_normals = true;

    for m in models {
        let mesh = &m.mesh;
        let base = positions.len() as u32;
        let vertex_count = mesh.positions.len() / 3;

        positions.extend(
            mesh.positions
                .chunks_exact(3)
                .map(|p| [p[0], p[1], p[2]]),
        );
        if mesh.normals.len() == mesh.positions.len() {
            normals.extend(mesh.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]));
        } else {
            has_all_normals = false;
        }
        tex_coords.extend((0..vertex_count).map(|i| {
            [
                mesh.texcoords.get(i * 2).map_or(0.0, |f| *f),
                1.0 - mesh.texcoords.get(i * 2 + 1).map_or(0.0, |f| *f),
            ]
        }));

        let out_of_range = mesh.indices.iter().any(|&i| i as usize >= vertex_count);
        if out_of_range {
            log::warn!(
                "Mesh {} references vertices it does not define and was skipped.",
                m.name
            );
            positions.truncate(base as usize);
            tex_coords.truncate(base as usize);
            if has_all_normals {
                normals.truncate(base as usize);
            }
            continue;
        }
        indices.extend(mesh.indices.iter().map(|&i| i + base));
    }

    let mut model = Model::new(name, positions, normals, tex_coords, indices);
    if !has_all_normals {
        model.compute_normals();
    }
    model
}
