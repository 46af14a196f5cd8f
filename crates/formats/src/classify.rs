//! Upload triage and routing.
//!
//! Classification is a pure function over the file name and content:
//! vector text formats are parsed in full on the spot, raster formats are
//! passed through untouched for server-side merging, and anything else is
//! rejected before any operation starts.

use crate::vector_document::{DocumentError, VectorDocument};

/// Raw upload as handed over by the user, immutable once received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UploadClass {
    /// Vector boundary data (`.kml`, `.geojson`), parsed client-side.
    VectorText,
    /// Raster elevation data (`.tif`, `.tiff`), merged server-side.
    RasterImage,
    Unrecognized,
}

pub fn upload_class(name: &str) -> UploadClass {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "kml" | "geojson" => UploadClass::VectorText,
        "tif" | "tiff" => UploadClass::RasterImage,
        _ => UploadClass::Unrecognized,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedUpload {
    Vector(VectorDocument),
    Raster { name: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    UnrecognizedExtension { name: String },
    Parse(DocumentError),
}

impl std::fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifyError::UnrecognizedExtension { name } => {
                write!(f, "unsupported file type: {name}")
            }
            ClassifyError::Parse(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ClassifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClassifyError::UnrecognizedExtension { .. } => None,
            ClassifyError::Parse(err) => Some(err),
        }
    }
}

/// Classify an upload and, for vector formats, parse it in full.
///
/// KML arrives here too; vector content must be a JSON feature document
/// (KML conversion is the backend's job), so non-JSON KML fails as a parse
/// error rather than producing a partial document.
pub fn classify_upload(file: UploadedFile) -> Result<ClassifiedUpload, ClassifyError> {
    match upload_class(&file.name) {
        UploadClass::Unrecognized => {
            Err(ClassifyError::UnrecognizedExtension { name: file.name })
        }
        UploadClass::RasterImage => Ok(ClassifiedUpload::Raster {
            name: file.name,
            bytes: file.bytes,
        }),
        UploadClass::VectorText => {
            let text = String::from_utf8_lossy(&file.bytes);
            let doc =
                VectorDocument::from_geojson_str(&text).map_err(ClassifyError::Parse)?;
            Ok(ClassifiedUpload::Vector(doc))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ClassifiedUpload, ClassifyError, UploadClass, UploadedFile, classify_upload,
        upload_class,
    };

    #[test]
    fn triage_by_extension() {
        assert_eq!(upload_class("zones.geojson"), UploadClass::VectorText);
        assert_eq!(upload_class("border.KML"), UploadClass::VectorText);
        assert_eq!(upload_class("dem_tile.tif"), UploadClass::RasterImage);
        assert_eq!(upload_class("dem_tile.TIFF"), UploadClass::RasterImage);
        assert_eq!(upload_class("notes.txt"), UploadClass::Unrecognized);
        assert_eq!(upload_class("no_extension"), UploadClass::Unrecognized);
    }

    #[test]
    fn vector_upload_is_parsed_in_full() {
        let payload = r#"{"type": "FeatureCollection", "features": []}"#;
        let file = UploadedFile::new("empty.geojson", payload.as_bytes().to_vec());
        match classify_upload(file).expect("classify") {
            ClassifiedUpload::Vector(doc) => assert!(doc.is_empty()),
            other => panic!("expected vector document, got {other:?}"),
        }
    }

    #[test]
    fn raster_upload_passes_bytes_through() {
        let file = UploadedFile::new("tile.tif", vec![0x49, 0x49, 0x2a, 0x00]);
        match classify_upload(file).expect("classify") {
            ClassifiedUpload::Raster { name, bytes } => {
                assert_eq!(name, "tile.tif");
                assert_eq!(bytes.len(), 4);
            }
            other => panic!("expected raster passthrough, got {other:?}"),
        }
    }

    #[test]
    fn malformed_vector_yields_parse_error() {
        let file = UploadedFile::new("broken.geojson", b"<kml/>".to_vec());
        let err = classify_upload(file).unwrap_err();
        assert!(matches!(err, ClassifyError::Parse(_)));
    }

    #[test]
    fn unknown_extension_is_rejected_up_front() {
        let file = UploadedFile::new("archive.zip", Vec::new());
        let err = classify_upload(file).unwrap_err();
        assert!(matches!(err, ClassifyError::UnrecognizedExtension { .. }));
    }
}
