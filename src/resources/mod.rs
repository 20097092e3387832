use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use crate::{
    data_structures::model::Model,
    error::{RenderError, Result},
};

/**
 * This module contains all logic for loading meshes and shader sources from external files.
 */
pub mod mesh;
pub mod shader;

/// Environment variable pointing at an asset directory that overrides the defaults.
pub const ASSETS_ENV: &str = "DUAL_RENDER_ASSETS";

static ASSET_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Makes `dir` the first asset directory searched. Only the first call wins.
pub fn set_asset_root(dir: impl Into<PathBuf>) -> bool {
    ASSET_ROOT.set(dir.into()).is_ok()
}

/// Resolves `file_name` against the asset directories.
///
/// Lookup order: the directory given to [`set_asset_root`],
/// `$DUAL_RENDER_ASSETS`, `./assets`, then the copy build.rs places next to
/// the build output. Absolute paths and paths that already exist are returned
/// unchanged.
pub fn asset_path(file_name: impl AsRef<Path>) -> PathBuf {
    let file_name = file_name.as_ref();
    if file_name.is_absolute() || file_name.exists() {
        return file_name.to_path_buf();
    }
    let mut roots = Vec::new();
    if let Some(dir) = ASSET_ROOT.get() {
        roots.push(dir.clone());
    }
    if let Some(dir) = std::env::var_os(ASSETS_ENV) {
        roots.push(PathBuf::from(dir));
    }
    roots.push(Path::new("./").join("assets"));
    if let Some(out_dir) = option_env!("OUT_DIR") {
        roots.push(Path::new(out_dir).join("assets"));
    }
    roots.push(Path::new(env!("CARGO_MANIFEST_DIR")).join("assets"));

    roots
        .iter()
        .map(|root| root.join(file_name))
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| Path::new("./").join("assets").join(file_name))
}

pub fn load_string(file_name: impl AsRef<Path>) -> Result<String> {
    let path = asset_path(file_name);
    std::fs::read_to_string(&path).map_err(|source| RenderError::Io { path, source })
}

/// Loads every mesh of an OBJ file into a single [`Model`].
///
/// Missing normals are computed from the triangles.
pub fn load_model(file_name: impl AsRef<Path>) -> Result<Model> {
    let path = asset_path(file_name);
    let (models, _materials) = tobj::load_obj(
        &path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|source| RenderError::ModelLoad {
        path: path.clone(),
        source,
    })?;

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let model = mesh::merge_meshes(name, &models);
    if model.positions.is_empty() {
        log::warn!("Model {} contains no geometry.", path.display());
    }
    Ok(model)
}
