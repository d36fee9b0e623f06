//! Product image import: mapping rules, resize utility and the typed view of a
//! mapped image.

use std::collections::BTreeMap;
use std::io::Cursor;

use base64::engine::general_purpose;
use base64::Engine;
use futures::future::{self, FutureExt};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use crate::error::AppError;
use crate::mapper::{MapContext, MapFuture, Mapper, MappingRule};
use crate::models::{FieldSet, FieldValue, ImageImportType, LocalId, Model, RemoteRecord};
use crate::ports::{BindingStore, ImageResizer};

/// Model every imported image is attached to.
pub const OWNER_MODEL: &str = "product.template";

/// Builds the product image mapper.
pub fn product_image_mapper<S: BindingStore>() -> Result<Mapper<S>, AppError> {
    Mapper::new(
        Model::ProductImage,
        vec![
            MappingRule {
                name: "from_template",
                keys: &["owner_id", "name"],
                apply: from_template::<S>,
            },
            MappingRule {
                name: "backend_id",
                keys: &["backend_id"],
                apply: backend_id::<S>,
            },
            MappingRule {
                name: "extension",
                keys: &["extension"],
                apply: extension::<S>,
            },
            MappingRule {
                name: "image_url",
                keys: &["url", "file_db_store"],
                apply: image_url::<S>,
            },
            MappingRule {
                name: "filename",
                keys: &["filename"],
                apply: filename::<S>,
            },
            MappingRule {
                name: "storage",
                keys: &["storage"],
                apply: storage::<S>,
            },
            MappingRule {
                name: "owner_model",
                keys: &["owner_model"],
                apply: owner_model::<S>,
            },
        ],
    )
}

fn fields<const N: usize>(pairs: [(&str, FieldValue); N]) -> FieldSet {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Owner template and display name. The template must already be imported.
fn from_template<'a, S: BindingStore>(
    record: &'a RemoteRecord,
    ctx: &'a MapContext<'a, S>,
) -> MapFuture<'a> {
    async move {
        let template_id = record.remote_id("id_product")?;
        let image_id = record.remote_id("id_image")?;
        let template = ctx
            .binder_for(Model::ProductTemplate)
            .to_record(template_id)
            .await?
            .ok_or(AppError::MissingBinding {
                model: Model::ProductTemplate,
                remote_id: template_id,
            })?;
        Ok(fields([
            ("owner_id", FieldValue::Int(template.id)),
            ("name", format!("{}_{}", template.name, image_id).into()),
        ]))
    }
    .boxed_local()
}

fn backend_id<'a, S>(_record: &'a RemoteRecord, ctx: &'a MapContext<'a, S>) -> MapFuture<'a> {
    future::ready(Ok(fields([("backend_id", FieldValue::Int(ctx.backend.id))]))).boxed_local()
}

fn extension<'a, S>(record: &'a RemoteRecord, _ctx: &'a MapContext<'a, S>) -> MapFuture<'a> {
    let result = record
        .str_field("type")
        .map(|mime| fields([("extension", extension_for_mime(mime).into())]));
    future::ready(result).boxed_local()
}

/// `url` or `file_db_store`, depending on the backend's import mode.
fn image_url<'a, S>(record: &'a RemoteRecord, ctx: &'a MapContext<'a, S>) -> MapFuture<'a> {
    let result = match ctx.backend.import_image_type {
        ImageImportType::Url => record
            .str_field("full_public_url")
            .map(|url| fields([("url", url.into())])),
        ImageImportType::Db => image_payload(record, ctx.backend.resize_images, ctx.resizer)
            .map(|data| fields([("file_db_store", FieldValue::Bytes(data))])),
    };
    future::ready(result).boxed_local()
}

fn image_payload(
    record: &RemoteRecord,
    resize: bool,
    resizer: &dyn ImageResizer,
) -> Result<Vec<u8>, AppError> {
    let encoded = record.str_field("content")?;
    let data = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::InvalidField {
            field: "content".to_string(),
            reason: e.to_string(),
        })?;
    if !resize {
        return Ok(data);
    }
    resizer
        .resize(&data)?
        .take(ImageVariant::Medium)
        .ok_or_else(|| AppError::ImageResize("resizer returned no medium variant".to_string()))
}

// Stored name always ends in .jpg, whatever the actual type.
fn filename<'a, S>(record: &'a RemoteRecord, _ctx: &'a MapContext<'a, S>) -> MapFuture<'a> {
    let result = record
        .remote_id("id_image")
        .map(|id| fields([("filename", format!("{}.jpg", id).into())]));
    future::ready(result).boxed_local()
}

fn storage<'a, S>(_record: &'a RemoteRecord, ctx: &'a MapContext<'a, S>) -> MapFuture<'a> {
    let mode = ctx.backend.import_image_type.as_str();
    future::ready(Ok(fields([("storage", mode.into())]))).boxed_local()
}

fn owner_model<'a, S>(_record: &'a RemoteRecord, _ctx: &'a MapContext<'a, S>) -> MapFuture<'a> {
    future::ready(Ok(fields([("owner_model", OWNER_MODEL.into())]))).boxed_local()
}

/// File extension, with leading dot, for a MIME type. `None` when unknown.
pub fn extension_for_mime(mime: &str) -> Option<String> {
    ImageFormat::from_mime_type(mime.trim())
        .and_then(|format| format.extensions_str().first().copied())
        .map(|ext| format!(".{}", ext))
}

/// Named outputs of an [`ImageResizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImageVariant {
    Big,
    Medium,
    Small,
}

/// Resized variants keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResizedImages(BTreeMap<ImageVariant, Vec<u8>>);

impl ResizedImages {
    pub fn insert(&mut self, variant: ImageVariant, data: Vec<u8>) {
        self.0.insert(variant, data);
    }

    pub fn get(&self, variant: ImageVariant) -> Option<&[u8]> {
        self.0.get(&variant).map(Vec::as_slice)
    }

    pub fn take(mut self, variant: ImageVariant) -> Option<Vec<u8>> {
        self.0.remove(&variant)
    }
}

/// Aspect-preserving resizer producing `big` and `medium` variants.
///
/// JPEG input stays JPEG; every other format is re-encoded as PNG.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailResizer {
    pub big: u32,
    pub medium: u32,
}

impl Default for ThumbnailResizer {
    fn default() -> Self {
        Self {
            big: 1024,
            medium: 128,
        }
    }
}

impl ImageResizer for ThumbnailResizer {
    fn resize(&self, data: &[u8]) -> Result<ResizedImages, AppError> {
        let format =
            image::guess_format(data).map_err(|e| AppError::ImageResize(e.to_string()))?;
        let img = image::load_from_memory_with_format(data, format)
            .map_err(|e| AppError::ImageResize(e.to_string()))?;

        let mut out = ResizedImages::default();
        for (variant, side) in [(ImageVariant::Big, self.big), (ImageVariant::Medium, self.medium)] {
            let resized = if img.width() <= side && img.height() <= side {
                img.clone()
            } else {
                img.resize(side, side, FilterType::Lanczos3)
            };
            out.insert(variant, encode(resized, format)?);
        }
        Ok(out)
    }
}

fn encode(img: DynamicImage, source: ImageFormat) -> Result<Vec<u8>, AppError> {
    let (img, format) = match source {
        ImageFormat::Jpeg => (DynamicImage::ImageRgb8(img.to_rgb8()), ImageFormat::Jpeg),
        _ => (img, ImageFormat::Png),
    };
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, format)
        .map_err(|e| AppError::ImageResize(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// Typed view of a mapped product image, as stores persist it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub owner_id: LocalId,
    pub owner_model: String,
    pub name: String,
    pub extension: Option<String>,
    pub url: Option<String>,
    pub file_db_store: Option<Vec<u8>>,
    pub filename: String,
    pub storage: String,
}

impl TryFrom<&FieldSet> for ImageAttachment {
    type Error = AppError;

    fn try_from(fields: &FieldSet) -> Result<Self, Self::Error> {
        let text = |key: &str| -> Result<String, AppError> {
            fields
                .get(key)
                .and_then(FieldValue::as_text)
                .map(str::to_string)
                .ok_or_else(|| AppError::InvalidField {
                    field: key.to_string(),
                    reason: "missing or not text".to_string(),
                })
        };
        let optional_text = |key: &str| fields.get(key).and_then(FieldValue::as_text).map(str::to_string);

        let owner_id = fields
            .get("owner_id")
            .and_then(FieldValue::as_int)
            .ok_or_else(|| AppError::InvalidField {
                field: "owner_id".to_string(),
                reason: "missing or not an id".to_string(),
            })?;
        let file_db_store = match fields.get("file_db_store") {
            Some(FieldValue::Bytes(data)) => Some(data.clone()),
            _ => None,
        };

        Ok(Self {
            owner_id,
            owner_model: text("owner_model")?,
            name: text("name")?,
            extension: optional_text("extension"),
            url: optional_text("url"),
            file_db_store,
            filename: text("filename")?,
            storage: text("storage")?,
        })
    }
}
