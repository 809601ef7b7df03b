//! Gallery create / delete / edit

use super::operations::{CREATE_GALLERY, DELETE_GALLERY, UPDATE_GALLERY_INFO};
use super::{surface, user_record, GALLERY_TYPENAME};
use crate::error::{ClientError, ClientResult, ValidationError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use vitrine_mutation::{
    decode_payload, entity, on_success, DomainError, Environment, ErrorContext, ErrorMessage,
    MutationConfig, MutationError, OptimisticResponse, PayloadVariant, ToastPolicy,
};
use vitrine_store::{DataId, Updater};

/// Longest gallery description accepted, in characters
pub const MAX_DESCRIPTION_LEN: usize = 600;

const GALLERIES: &str = "galleries";

#[derive(Debug, Deserialize)]
struct GalleryRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum CreateResult {
    CreateGalleryPayload { gallery: GalleryRef },
    ErrInvalidInput(ErrorMessage),
    ErrNotAuthorized(ErrorMessage),
}

impl PayloadVariant for CreateResult {
    type Ok = String;

    fn into_result(self) -> Result<String, DomainError> {
        match self {
            Self::CreateGalleryPayload { gallery } => Ok(gallery.id),
            Self::ErrInvalidInput(err) => Err(DomainError::InvalidInput(err.message)),
            Self::ErrNotAuthorized(err) => Err(DomainError::NotAuthorized(err.message)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum DeleteResult {
    DeleteGalleryPayload {},
    ErrGalleryNotFound(ErrorMessage),
    ErrNotAuthorized(ErrorMessage),
}

impl PayloadVariant for DeleteResult {
    type Ok = ();

    fn into_result(self) -> Result<(), DomainError> {
        match self {
            Self::DeleteGalleryPayload {} => Ok(()),
            Self::ErrGalleryNotFound(err) => Err(DomainError::GalleryNotFound(err.message)),
            Self::ErrNotAuthorized(err) => Err(DomainError::NotAuthorized(err.message)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum UpdateInfoResult {
    UpdateGalleryInfoPayload {},
    ErrInvalidInput(ErrorMessage),
    ErrNotAuthorized(ErrorMessage),
}

impl PayloadVariant for UpdateInfoResult {
    type Ok = ();

    fn into_result(self) -> Result<(), DomainError> {
        match self {
            Self::UpdateGalleryInfoPayload {} => Ok(()),
            Self::ErrInvalidInput(err) => Err(DomainError::InvalidInput(err.message)),
            Self::ErrNotAuthorized(err) => Err(DomainError::NotAuthorized(err.message)),
        }
    }
}

/// Check a description against [`MAX_DESCRIPTION_LEN`]
///
/// # Errors
/// Returns `ValidationError::DescriptionTooLong` when over the limit
pub fn validate_description(description: &str) -> Result<(), ValidationError> {
    let len = description.chars().count();
    if len > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::DescriptionTooLong {
            len,
            max: MAX_DESCRIPTION_LEN,
        });
    }
    Ok(())
}

/// Create a gallery owned by `owner_user_id`; returns the new gallery id
///
/// The new gallery is appended to the owner's gallery list once the server
/// assigns its id. Nothing is shown optimistically.
///
/// # Errors
/// Returns validation errors before sending, then the rejection or typed
/// error variant
pub async fn create_gallery(
    environment: &Environment,
    owner_user_id: &str,
    name: &str,
    description: &str,
) -> ClientResult<String> {
    validate_description(description)?;

    let owner = user_record(owner_user_id);
    let updater: Updater = Arc::new(move |proxy, data| {
        let Some(id) = data
            .pointer("/createGallery/gallery/id")
            .and_then(Value::as_str)
        else {
            return;
        };
        let gallery = DataId::entity(GALLERY_TYPENAME, id);
        let mut galleries = proxy.get_linked_records(&owner, GALLERIES);
        if !galleries.contains(&gallery) {
            galleries.push(gallery);
            proxy.set_linked_records(&owner, GALLERIES, galleries);
        }
    });

    let context = ErrorContext::new(CREATE_GALLERY.name)
        .with_tag("userId", owner_user_id)
        .with_toast(ToastPolicy::ErrorText);
    let config = MutationConfig::new(
        CREATE_GALLERY,
        json!({ "input": { "name": name, "description": description } }),
    )
    .with_updater(on_success::<CreateResult>("createGallery", updater))
    .with_context(context.clone());
    let data = environment.commit_mutation(config).await?;
    decode_payload::<CreateResult>(&data, "createGallery")
        .map_err(|err| surface(environment, &context, err))
}

/// Delete a gallery and drop it from the owner's list
///
/// # Errors
/// Returns the rejection or typed error variant; the gallery reappears if
/// the delete fails
pub async fn delete_gallery(
    environment: &Environment,
    gallery_id: &str,
    owner_user_id: &str,
) -> ClientResult<()> {
    let owner = user_record(owner_user_id);
    let gallery = DataId::entity(GALLERY_TYPENAME, gallery_id);
    let updater: Updater = Arc::new(move |proxy, _data| {
        let galleries: Vec<DataId> = proxy
            .get_linked_records(&owner, GALLERIES)
            .into_iter()
            .filter(|link| link != &gallery)
            .collect();
        proxy.set_linked_records(&owner, GALLERIES, galleries);
        proxy.delete(&gallery);
    });

    let context = ErrorContext::new(DELETE_GALLERY.name)
        .with_tag("galleryId", gallery_id)
        .with_toast(ToastPolicy::Message("Unable to delete gallery".to_string()));
    let config = MutationConfig::new(DELETE_GALLERY, json!({ "galleryId": gallery_id }))
        .with_optimistic_updater(Arc::clone(&updater))
        .with_updater(on_success::<DeleteResult>("deleteGallery", updater))
        .with_context(context.clone());
    let data = environment.commit_mutation(config).await?;
    decode_payload::<DeleteResult>(&data, "deleteGallery")
        .map_err(|err| surface(environment, &context, err))
}

/// Edit a gallery's name and/or description
///
/// The description is checked locally first. An `ErrInvalidInput` from the
/// server on a description edit is reported as
/// `ValidationError::DescriptionTooLong` as well, since the server counts
/// length differently for some inputs.
///
/// # Errors
/// Returns validation errors, the rejection, or the typed error variant
pub async fn update_gallery_info(
    environment: &Environment,
    gallery_id: &str,
    name: Option<&str>,
    description: Option<&str>,
) -> ClientResult<()> {
    if let Some(description) = description {
        validate_description(description)?;
    }

    let mut gallery = entity(GALLERY_TYPENAME, gallery_id);
    let mut input = json!({ "id": gallery_id });
    if let Some(name) = name {
        gallery = gallery.with("name", name);
        input["name"] = json!(name);
    }
    if let Some(description) = description {
        gallery = gallery.with("description", description);
        input["description"] = json!(description);
    }

    let context = ErrorContext::new(UPDATE_GALLERY_INFO.name)
        .with_tag("galleryId", gallery_id)
        .with_toast(ToastPolicy::ErrorText);
    let config = MutationConfig::new(UPDATE_GALLERY_INFO, json!({ "input": input }))
        .with_optimistic_response(
            OptimisticResponse::payload("updateGalleryInfo", "UpdateGalleryInfoPayload")
                .entity("gallery", gallery),
        )
        .with_context(context.clone());
    let data = environment.commit_mutation(config).await?;

    match decode_payload::<UpdateInfoResult>(&data, "updateGalleryInfo") {
        Ok(()) => Ok(()),
        Err(MutationError::Domain(DomainError::InvalidInput(message)))
            if description.is_some() && message.to_lowercase().contains("description") =>
        {
            let len = description.map_or(0, |text| text.chars().count());
            let error = ValidationError::DescriptionTooLong {
                len,
                max: MAX_DESCRIPTION_LEN,
            };
            environment.router().report(&error, &context);
            Err(ClientError::Validation(error))
        }
        Err(err) => Err(surface(environment, &context, err)),
    }
}
