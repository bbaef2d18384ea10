use async_trait::async_trait;

use crate::error::AppError;
use crate::models::document::{Document, Node};

/// An image picked in the editor, ready to upload.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Uploads an image and returns the URL it is served from.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload_image(&self, file: ImageFile) -> Result<String, AppError>;
}

/// Upload `file` and append an image node pointing at it.
///
/// The document is left untouched when the upload fails.
pub async fn insert_uploaded_image(
    uploader: &dyn ImageUploader,
    document: &mut Document,
    file: ImageFile,
    alt: Option<String>,
) -> Result<String, AppError> {
    let url = uploader.upload_image(file).await?;
    document.push(Node::image(url.clone(), alt));
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;
    use crate::models::document::NodeKind;

    struct FixedUploader(Result<String, UploadError>);

    #[async_trait]
    impl ImageUploader for FixedUploader {
        async fn upload_image(&self, _file: ImageFile) -> Result<String, AppError> {
            self.0.clone().map_err(AppError::from)
        }
    }

    fn cat() -> ImageFile {
        ImageFile {
            file_name: "cat.png".into(),
            content_type: "image/png".into(),
            data: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn test_inserts_image_on_success() {
        let uploader = FixedUploader(Ok("/api/images/1-cat.png".into()));
        let mut doc = Document::new(vec![Node::paragraph(vec![Node::text("Look")])]);

        let url = insert_uploaded_image(&uploader, &mut doc, cat(), Some("A cat".into()))
            .await
            .unwrap();

        assert_eq!(url, "/api/images/1-cat.png");
        assert_eq!(doc.children.len(), 2);
        assert_eq!(doc.children[1].kind(), NodeKind::Image);
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_document_unchanged() {
        let uploader = FixedUploader(Err(UploadError::TooLarge { max_bytes: 2 }));
        let mut doc = Document::new(vec![Node::paragraph(vec![Node::text("Look")])]);
        let before = doc.clone();

        let err = insert_uploaded_image(&uploader, &mut doc, cat(), None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "FILE_TOO_LARGE");
        assert_eq!(doc, before);
    }
}
