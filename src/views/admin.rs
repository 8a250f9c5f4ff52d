//! Admin and contact-form mutations.
//!
//! Every mutation validates its input, writes through the gateway,
//! invalidates the keys it affects and reports the outcome as a toast.

use std::path::Path;

use bytes::Bytes;
use happylife_types::{
    AboutInput, AboutUs, Blog, BlogInput, ContactInput, ContactMessage, Donation, DonationInput,
    Event, EventInput, MarkRead, Payload, Record,
};
use metrics::counter;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    queries::roots,
    routes::{AdminSection, Route},
};
use crate::{
    cache::QueryKey,
    context::AppContext,
    domain::{Validate, validation::validate_credentials},
    error::AppError,
    gateway::{Bucket, StoredObject},
};

/// A picked image file waiting to be uploaded.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub name: String,
    pub bytes: Bytes,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub async fn read(path: &Path) -> Result<Self, std::io::Error> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        Ok(Self::new(name, bytes))
    }
}

/// A collection managed from an admin table with create, edit and delete.
pub trait AdminResource: Record {
    type Input: Payload + Validate + Clone;

    /// Capitalized name used in toasts ("Donation created").
    const LABEL: &'static str;
    const BUCKET: Bucket;

    fn set_image(input: &mut Self::Input, url: String);

    /// Root of the list keys (public and admin).
    fn list_root() -> QueryKey;

    /// Root of the single-record keys.
    fn detail_root() -> QueryKey;
}

impl AdminResource for Donation {
    type Input = DonationInput;
    const LABEL: &'static str = "Donation";
    const BUCKET: Bucket = Bucket::Donations;

    fn set_image(input: &mut DonationInput, url: String) {
        input.image_url = Some(url);
    }

    fn list_root() -> QueryKey {
        roots::donations()
    }

    fn detail_root() -> QueryKey {
        roots::donation()
    }
}

impl AdminResource for Event {
    type Input = EventInput;
    const LABEL: &'static str = "Event";
    const BUCKET: Bucket = Bucket::Events;

    fn set_image(input: &mut EventInput, url: String) {
        input.image_url = Some(url);
    }

    fn list_root() -> QueryKey {
        roots::events()
    }

    fn detail_root() -> QueryKey {
        roots::event()
    }
}

impl AdminResource for Blog {
    type Input = BlogInput;
    const LABEL: &'static str = "Blog";
    const BUCKET: Bucket = Bucket::Blogs;

    fn set_image(input: &mut BlogInput, url: String) {
        input.image_url = Some(url);
    }

    fn list_root() -> QueryKey {
        roots::blogs()
    }

    fn detail_root() -> QueryKey {
        roots::blog()
    }
}

const CONTACT_FAILED: &str = "Failed to send message. Please try again.";

fn record_outcome(collection: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("happylife_mutation_total", "collection" => collection, "outcome" => outcome)
        .increment(1);
}

/// Mutation flows behind the admin pages, the login form and the contact form.
#[derive(Clone)]
pub struct AdminActions {
    context: AppContext,
}

impl AdminActions {
    pub fn new(context: AppContext) -> Self {
        Self { context }
    }

    fn invalidate(&self, keys: &[QueryKey]) {
        for key in keys {
            self.context.cache().invalidate(key);
        }
    }

    async fn upload(&self, bucket: Bucket, image: ImageFile) -> Result<String, AppError> {
        let object = StoredObject::new(bucket, &image.name, image.bytes, OffsetDateTime::now_utc());
        Ok(self.context.records().upload(object).await?)
    }

    /// Create (`id` is `None`) or update a record, uploading `image` first.
    pub async fn save<R: AdminResource>(
        &self,
        id: Option<Uuid>,
        input: R::Input,
        image: Option<ImageFile>,
    ) -> Result<R, AppError> {
        let result = self.try_save::<R>(id, input, image).await;
        let table = R::COLLECTION.table();
        match &result {
            Ok(record) => {
                self.invalidate(&[R::list_root(), R::detail_root(), roots::dashboard()]);
                let verb = if id.is_some() { "updated" } else { "created" };
                info!(collection = table, id = %record.id(), verb, "Record saved");
                self.context
                    .notifications()
                    .success("Success", format!("{} {verb}", R::LABEL));
            }
            Err(err) => {
                warn!(collection = table, error = %err, "Save failed");
                self.context.notifications().failure(
                    &err.to_string(),
                    &format!("Failed to save {}", R::LABEL.to_lowercase()),
                );
            }
        }
        record_outcome(table, result.is_ok());
        result
    }

    async fn try_save<R: AdminResource>(
        &self,
        id: Option<Uuid>,
        mut input: R::Input,
        image: Option<ImageFile>,
    ) -> Result<R, AppError> {
        input.validate()?;
        if let Some(image) = image {
            let url = self.upload(R::BUCKET, image).await?;
            R::set_image(&mut input, url);
        }
        let records = self.context.records();
        let record = match id {
            Some(id) => records.update::<R, _>(id, &input).await?,
            None => records.insert::<R, _>(&input).await?,
        };
        Ok(record)
    }

    pub async fn delete<R: AdminResource>(&self, id: Uuid) -> Result<(), AppError> {
        let result = self.context.records().delete::<R>(id).await;
        let table = R::COLLECTION.table();
        match &result {
            Ok(()) => {
                self.invalidate(&[R::list_root(), R::detail_root(), roots::dashboard()]);
                info!(collection = table, %id, "Record deleted");
                self.context
                    .notifications()
                    .success("Success", format!("{} deleted", R::LABEL));
            }
            Err(err) => {
                warn!(collection = table, %id, error = %err, "Delete failed");
                self.context.notifications().failure(
                    &err.to_string(),
                    &format!("Failed to delete {}", R::LABEL.to_lowercase()),
                );
            }
        }
        record_outcome(table, result.is_ok());
        Ok(result?)
    }

    /// Update the about row, or create it when none exists yet.
    pub async fn save_about(
        &self,
        existing: Option<Uuid>,
        mut input: AboutInput,
        image: Option<ImageFile>,
    ) -> Result<AboutUs, AppError> {
        let result = async {
            input.validate()?;
            if let Some(image) = image {
                input.image_url = Some(self.upload(Bucket::About, image).await?);
            }
            let records = self.context.records();
            let row = match existing {
                Some(id) => records.update::<AboutUs, _>(id, &input).await?,
                None => records.insert::<AboutUs, _>(&input).await?,
            };
            Ok::<_, AppError>(row)
        }
        .await;

        match &result {
            Ok(_) => {
                self.invalidate(&[roots::about()]);
                self.context
                    .notifications()
                    .success("Success", "About Us page updated successfully");
            }
            Err(err) => {
                warn!(error = %err, "About update failed");
                self.context
                    .notifications()
                    .failure(&err.to_string(), "Failed to update About Us page");
            }
        }
        record_outcome(AboutUs::COLLECTION.table(), result.is_ok());
        result
    }

    /// Flag a message as read. Succeeds silently.
    pub async fn mark_read(&self, id: Uuid) -> Result<ContactMessage, AppError> {
        let result = self
            .context
            .records()
            .update::<ContactMessage, _>(id, &MarkRead { is_read: true })
            .await;
        match &result {
            Ok(_) => self.invalidate(&[roots::messages(), roots::dashboard()]),
            Err(err) => {
                warn!(%id, error = %err, "Mark read failed");
                self.context
                    .notifications()
                    .failure(&err.to_string(), "Failed to update message");
            }
        }
        record_outcome(ContactMessage::COLLECTION.table(), result.is_ok());
        Ok(result?)
    }

    pub async fn delete_message(&self, id: Uuid) -> Result<(), AppError> {
        let result = self.context.records().delete::<ContactMessage>(id).await;
        match &result {
            Ok(()) => {
                self.invalidate(&[roots::messages(), roots::dashboard()]);
                self.context
                    .notifications()
                    .success("Success", "Message deleted");
            }
            Err(err) => {
                warn!(%id, error = %err, "Message delete failed");
                self.context
                    .notifications()
                    .failure(&err.to_string(), "Failed to delete message");
            }
        }
        record_outcome(ContactMessage::COLLECTION.table(), result.is_ok());
        Ok(result?)
    }

    /// Public contact form. Anyone may submit; the stored row is not read back.
    pub async fn submit_contact(&self, input: ContactInput) -> Result<(), AppError> {
        let result = self.try_submit_contact(&input).await;
        match &result {
            Ok(()) => {
                info!(email = %input.email, "Contact message sent");
                self.context.notifications().success(
                    "Message Sent!",
                    "We'll get back to you as soon as possible.",
                );
            }
            Err(AppError::Domain(err)) => {
                warn!(error = %err, "Contact form rejected");
                self.context
                    .notifications()
                    .failure(&err.to_string(), CONTACT_FAILED);
            }
            Err(err) => {
                warn!(error = %err, "Contact message failed");
                self.context.notifications().failure("", CONTACT_FAILED);
            }
        }
        record_outcome(ContactMessage::COLLECTION.table(), result.is_ok());
        result
    }

    async fn try_submit_contact(&self, input: &ContactInput) -> Result<(), AppError> {
        input.validate()?;
        Ok(self.context.records().submit(input).await?)
    }

    /// Sign in and return where the login form navigates next.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Route, AppError> {
        let result = match validate_credentials(email, password) {
            Ok(()) => self
                .context
                .session()
                .sign_in(email, password)
                .await
                .map_err(AppError::from),
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(_) => {
                self.context
                    .notifications()
                    .success("Welcome back!", "Successfully signed in.");
                Ok(Route::Admin(AdminSection::Dashboard))
            }
            Err(err) => {
                warn!(error = %err, "Sign-in failed");
                self.context
                    .notifications()
                    .failure(&err.to_string(), "Authentication failed");
                Err(err)
            }
        }
    }

    /// Sign out and return the login route. Local state is cleared even if
    /// the backend call fails.
    pub async fn sign_out(&self) -> Route {
        if let Err(err) = self.context.session().sign_out().await {
            warn!(error = %err, "Sign-out did not reach the backend");
        }
        self.context
            .notifications()
            .success("Signed out", "You have been successfully signed out.");
        Route::Login
    }
}
