//! File-attachment collaborator: the `FileProcessor` seam plus a local
//! filesystem implementation and a no-op stand-in.

use crate::definition::FieldType;
use crate::entity::Entity;
use crate::error::CrudError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// One incoming file from a create/edit form.
#[derive(Clone, Debug)]
pub struct FileUpload {
    pub filename: String,
    pub content: Vec<u8>,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        FileUpload {
            filename: filename.into(),
            content,
        }
    }
}

/// A stored file handed back for rendering/download.
#[derive(Clone, Debug)]
pub struct FileDownload {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Storage backend for attached files. The data layer decides which
/// operations are needed; implementations own the bytes.
#[async_trait]
pub trait FileProcessor: Send + Sync {
    /// Store a new file for the field; returns the stored filename.
    async fn create_file(
        &self,
        upload: &FileUpload,
        entity: &Entity,
        field: &str,
    ) -> Result<String, CrudError>;

    /// Replace the field's stored file; returns the stored filename.
    async fn update_file(
        &self,
        upload: &FileUpload,
        entity: &Entity,
        field: &str,
    ) -> Result<String, CrudError>;

    /// Remove the field's stored file, if any.
    async fn delete_file(&self, entity: &Entity, field: &str) -> Result<(), CrudError>;

    /// Load the field's stored file for download.
    async fn render_file(&self, entity: &Entity, field: &str) -> Result<FileDownload, CrudError>;
}

/// Stores files on the local filesystem under
/// `base/<field path>/<entity>/<id>/<field>/<filename>`.
pub struct LocalFileProcessor {
    base: PathBuf,
}

impl LocalFileProcessor {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        LocalFileProcessor { base: base.into() }
    }

    fn field_dir(&self, entity: &Entity, field: &str) -> Result<PathBuf, CrudError> {
        let id = entity
            .id()
            .and_then(|v| v.as_i64())
            .ok_or(CrudError::MissingId)?;
        let definition = entity.definition();
        let field_path = match definition.field(field).map(|f| &f.field_type) {
            Some(FieldType::File { path }) => path.clone(),
            _ => return Err(CrudError::UnknownField(field.to_string())),
        };
        Ok(self
            .base
            .join(field_path)
            .join(&definition.name)
            .join(id.to_string())
            .join(field))
    }
}

/// Strip any directory components from a client-supplied filename.
fn safe_filename(filename: &str) -> Result<&str, CrudError> {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| *n != "." && *n != "..")
        .ok_or_else(|| CrudError::NoFile(filename.to_string()))
}

#[async_trait]
impl FileProcessor for LocalFileProcessor {
    async fn create_file(
        &self,
        upload: &FileUpload,
        entity: &Entity,
        field: &str,
    ) -> Result<String, CrudError> {
        let dir = self.field_dir(entity, field)?;
        let name = safe_filename(&upload.filename)?;
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(name), &upload.content).await?;
        Ok(name.to_string())
    }

    async fn update_file(
        &self,
        upload: &FileUpload,
        entity: &Entity,
        field: &str,
    ) -> Result<String, CrudError> {
        // previous file may have a different name, clear the field dir first
        self.delete_file(entity, field).await?;
        self.create_file(upload, entity, field).await
    }

    async fn delete_file(&self, entity: &Entity, field: &str) -> Result<(), CrudError> {
        let dir = self.field_dir(entity, field)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn render_file(&self, entity: &Entity, field: &str) -> Result<FileDownload, CrudError> {
        let stored = entity.get(field);
        let filename = stored
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CrudError::NoFile(field.to_string()))?
            .to_string();
        let dir = self.field_dir(entity, field)?;
        let name = safe_filename(&filename)?;
        let content = tokio::fs::read(dir.join(name)).await?;
        Ok(FileDownload {
            filename,
            content,
        })
    }
}

/// For hosts without attachments and for tests: accepts everything, stores
/// nothing, and has nothing to render.
pub struct NoopFileProcessor;

#[async_trait]
impl FileProcessor for NoopFileProcessor {
    async fn create_file(
        &self,
        upload: &FileUpload,
        _entity: &Entity,
        _field: &str,
    ) -> Result<String, CrudError> {
        Ok(upload.filename.clone())
    }

    async fn update_file(
        &self,
        upload: &FileUpload,
        _entity: &Entity,
        _field: &str,
    ) -> Result<String, CrudError> {
        Ok(upload.filename.clone())
    }

    async fn delete_file(&self, _entity: &Entity, _field: &str) -> Result<(), CrudError> {
        Ok(())
    }

    async fn render_file(&self, _entity: &Entity, field: &str) -> Result<FileDownload, CrudError> {
        Err(CrudError::NoFile(field.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::load_str;

    fn book_with_cover() -> Entity {
        let defs = load_str(
            r#"
book:
  table: book
  fields:
    title:
      type: text
    cover:
      type: file
      path: uploads
"#,
        )
        .unwrap();
        let mut entity = Entity::new(defs["book"].clone());
        entity.set("id", 1);
        entity
    }

    #[tokio::test]
    async fn create_render_delete_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let processor = LocalFileProcessor::new(tmp.path());
        let mut entity = book_with_cover();

        let upload = FileUpload::new("test.xml", b"<x/>".to_vec());
        let stored = processor.create_file(&upload, &entity, "cover").await.unwrap();
        assert_eq!(stored, "test.xml");
        entity.set("cover", stored);

        let rendered = processor.render_file(&entity, "cover").await.unwrap();
        assert_eq!(rendered.content, b"<x/>");

        processor.delete_file(&entity, "cover").await.unwrap();
        assert!(processor.render_file(&entity, "cover").await.is_err());
    }

    #[tokio::test]
    async fn update_replaces_previous_file() {
        let tmp = tempfile::tempdir().unwrap();
        let processor = LocalFileProcessor::new(tmp.path());
        let mut entity = book_with_cover();

        let first = FileUpload::new("a.txt", b"one".to_vec());
        entity.set("cover", processor.create_file(&first, &entity, "cover").await.unwrap());

        let second = FileUpload::new("b.txt", b"two".to_vec());
        let stored = processor.update_file(&second, &entity, "cover").await.unwrap();
        entity.set("cover", stored);

        let rendered = processor.render_file(&entity, "cover").await.unwrap();
        assert_eq!(rendered.filename, "b.txt");
        assert_eq!(rendered.content, b"two");
        // the old file is gone with its directory
        let old = tmp
            .path()
            .join("uploads")
            .join("book")
            .join("1")
            .join("cover")
            .join("a.txt");
        assert!(!old.exists());
    }

    #[tokio::test]
    async fn rejects_path_traversal_in_filenames() {
        let tmp = tempfile::tempdir().unwrap();
        let processor = LocalFileProcessor::new(tmp.path());
        let entity = book_with_cover();
        let upload = FileUpload::new("../../evil.sh", b"#!".to_vec());
        let stored = processor.create_file(&upload, &entity, "cover").await.unwrap();
        assert_eq!(stored, "evil.sh");
        assert!(!tmp.path().parent().unwrap().join("evil.sh").exists());
    }

    #[tokio::test]
    async fn missing_file_renders_as_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let processor = LocalFileProcessor::new(tmp.path());
        let entity = book_with_cover();
        assert!(matches!(
            processor.render_file(&entity, "cover").await,
            Err(CrudError::NoFile(_))
        ));
    }
}
