//! Local filesystem storage for uploaded scene files.
//!
//! Every project owns one directory under the storage root, named by its
//! UUID, holding a single `scene.<ext>` file. Paths handed to and returned
//! from this module are relative to the root so they can be stored in the
//! database unchanged if the root moves.

use std::io;
use std::path::{Component, Path, PathBuf};

use aat_core::types::ProjectId;

/// File extensions accepted for scene uploads.
pub const SUPPORTED_SCENE_EXTENSIONS: &[&str] = &["gltf", "glb"];

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct BlobStorage {
    root: PathBuf,
}

impl BlobStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Relative path the scene for `project_id` is stored at.
    pub fn scene_path(project_id: ProjectId, ext: &str) -> String {
        format!("{project_id}/scene.{ext}")
    }

    /// Write `data` to `relative`, creating parent directories as needed.
    pub async fn write(&self, relative: &str, data: &[u8]) -> io::Result<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await
    }

    /// Read the blob at `relative`. Returns `Ok(None)` if it does not exist.
    pub async fn read(&self, relative: &str) -> io::Result<Option<Vec<u8>>> {
        let path = self.resolve(relative)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove a project's directory and everything in it. Missing is fine.
    pub async fn remove_project(&self, project_id: ProjectId) -> io::Result<()> {
        match tokio::fs::remove_dir_all(self.root.join(project_id.to_string())).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Join `relative` onto the root, refusing anything that could escape it.
    fn resolve(&self, relative: &str) -> io::Result<PathBuf> {
        let rel = Path::new(relative);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if relative.is_empty() || escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid blob path: {relative}"),
            ));
        }
        Ok(self.root.join(rel))
    }
}

/// Lower-cased extension of `file_name` if it is a supported scene format.
pub fn scene_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    SUPPORTED_SCENE_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_extension_accepts_gltf_and_glb() {
        assert_eq!(scene_extension("tower.GLB").as_deref(), Some("glb"));
        assert_eq!(scene_extension("a.b.gltf").as_deref(), Some("gltf"));
        assert_eq!(scene_extension("scene.obj"), None);
        assert_eq!(scene_extension("no_extension"), None);
    }

    #[tokio::test]
    async fn write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = BlobStorage::new(dir.path());
        let project_id = ProjectId::new_v4();
        let rel = BlobStorage::scene_path(project_id, "glb");

        storage.write(&rel, b"glTF").await.unwrap();
        assert_eq!(storage.read(&rel).await.unwrap().as_deref(), Some(&b"glTF"[..]));

        storage.remove_project(project_id).await.unwrap();
        assert_eq!(storage.read(&rel).await.unwrap(), None);

        // Removing again is a no-op.
        storage.remove_project(project_id).await.unwrap();
    }

    #[tokio::test]
    async fn paths_outside_root_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = BlobStorage::new(dir.path());

        let err = storage.read("../etc/passwd").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        let err = storage.write("/abs/path", b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
