use async_trait::async_trait;

use crate::forms::AttachmentForm;
use crate::models::*;

#[cfg(feature = "inmem-store")]
pub mod inmem;
#[cfg(feature = "postgres-store")]
pub mod pg;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    /// Delete refused; lists the non-empty protected collections.
    #[error("protected by {0:?}")] Protected(Vec<&'static str>),
    /// A submitted foreign key does not point at an active row.
    #[error("invalid choice for {0}")] InvalidChoice(&'static str),
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Base CRUD shared by every listed entity.
#[async_trait]
pub trait EntityRepo<T: Entity>: Send + Sync {
    /// Active rows, filtered, sorted and paginated.
    async fn list(&self, params: &ListParams, filter: &T::Filter) -> RepoResult<Page<T>>;
    /// Every active row matching `filter`, in id order.
    async fn all(&self, filter: &T::Filter) -> RepoResult<Vec<T>>;
    async fn get(&self, id: Id) -> RepoResult<T>;
    async fn create(&self, form: &T::Form) -> RepoResult<T>;
    async fn update(&self, id: Id, form: &T::Form) -> RepoResult<T>;
    /// Soft delete with cascades; refused while protected children exist.
    async fn delete(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait FeatureValueRepo: Send + Sync {
    async fn list_feature_values(&self, artwork_id: Id) -> RepoResult<Vec<FeaturesValue>>;
    async fn get_feature_value(&self, artwork_id: Id, feature_id: Id) -> RepoResult<Option<FeaturesValue>>;
    /// Inserts the value when absent, updates it otherwise.
    async fn set_feature_value(&self, artwork_id: Id, feature_id: Id, value: Option<String>) -> RepoResult<FeaturesValue>;
}

#[async_trait]
pub trait ArtworkTagRepo: Send + Sync {
    async fn list_artwork_tags(&self, artwork_id: Id) -> RepoResult<Vec<Tag>>;
    async fn add_tag(&self, artwork_id: Id, tag_id: Id) -> RepoResult<()>;
    async fn remove_tag(&self, artwork_id: Id, tag_id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait AttachmentRepo: Send + Sync {
    /// Active attachments of an artwork ordered by sequence.
    async fn list_attachments(&self, artwork_id: Id) -> RepoResult<Vec<Attachment>>;
    async fn get_attachment(&self, id: Id) -> RepoResult<Attachment>;
    /// Allocates the next sequence number and file name for the artwork.
    async fn create_attachment(&self, new: NewAttachment) -> RepoResult<Attachment>;
    /// Records the final object name and content hash once stored.
    async fn finish_attachment(&self, id: Id, name: &str, hash: &str) -> RepoResult<Attachment>;
    /// Applies the edit form; a main-image flag clears it on siblings.
    async fn update_attachment(&self, id: Id, form: &AttachmentForm) -> RepoResult<Attachment>;
    /// Removes the row and returns it.
    async fn remove_attachment(&self, id: Id) -> RepoResult<Attachment>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn list_users(&self, params: &ListParams) -> RepoResult<Page<User>>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    /// Conflict when the name is taken by an active user.
    async fn create_user(&self, name: &str, password_hash: &str) -> RepoResult<User>;
    /// User and password hash for login.
    async fn find_credentials(&self, name: &str) -> RepoResult<Option<(User, String)>>;
    async fn delete_user(&self, id: Id) -> RepoResult<()>;
    async fn count_users(&self) -> RepoResult<u64>;
}

pub trait Repo:
    EntityRepo<ArtworkType>
    + EntityRepo<Feature>
    + EntityRepo<Artwork>
    + EntityRepo<Tag>
    + EntityRepo<Client>
    + EntityRepo<Status>
    + EntityRepo<Offer>
    + FeatureValueRepo
    + ArtworkTagRepo
    + AttachmentRepo
    + UserRepo
{
}

impl<T> Repo for T where
    T: EntityRepo<ArtworkType>
        + EntityRepo<Feature>
        + EntityRepo<Artwork>
        + EntityRepo<Tag>
        + EntityRepo<Client>
        + EntityRepo<Status>
        + EntityRepo<Offer>
        + FeatureValueRepo
        + ArtworkTagRepo
        + AttachmentRepo
        + UserRepo
{
}
