use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::forms::{
    ArtworkForm, ArtworkTypeForm, ClientForm, FeatureForm, OfferForm, StatusForm, TagForm,
};
use crate::media::MediaKind;

pub type Id = i64;

/// Header carried by every persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Record {
    pub id: Id,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(id: Id, now: DateTime<Utc>) -> Self {
        Self { id, name: String::new(), active: true, created_at: now, updated_at: now }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.active = false;
        self.updated_at = now;
    }
}

/// Persisted record kinds that other rows can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    ArtworkType,
    Feature,
    Artwork,
    Tag,
    Client,
    Status,
    Offer,
}

impl Kind {
    /// Table name; doubles as the route segment.
    pub fn table(self) -> &'static str {
        match self {
            Kind::ArtworkType => "artwork_types",
            Kind::Feature => "features",
            Kind::Artwork => "artworks",
            Kind::Tag => "tags",
            Kind::Client => "clients",
            Kind::Status => "statuses",
            Kind::Offer => "offers",
        }
    }
}

/// A parent → children collection. Entities list the collections that block
/// their deletion and the ones that are deactivated along with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    TypeArtworks,
    TypeFeatures,
    FeatureValues,
    ArtworkValues,
    ArtworkAttachments,
    ArtworkOffers,
    ArtworkTags,
    TagArtworks,
    ClientOffers,
    StatusOffers,
}

impl Link {
    /// Collection name reported when a delete is blocked.
    pub fn label(self) -> &'static str {
        match self {
            Link::TypeArtworks | Link::TagArtworks => "artworks",
            Link::TypeFeatures => "features",
            Link::FeatureValues => "values",
            Link::ArtworkValues => "features_values",
            Link::ArtworkAttachments => "files",
            Link::ArtworkOffers | Link::ClientOffers | Link::StatusOffers => "offers",
            Link::ArtworkTags => "tags",
        }
    }

    /// Child table and the column holding the parent id.
    pub fn child(self) -> (&'static str, &'static str) {
        match self {
            Link::TypeArtworks => ("artworks", "type_id"),
            Link::TypeFeatures => ("features", "type_id"),
            Link::FeatureValues => ("features_values", "feature_id"),
            Link::ArtworkValues => ("features_values", "artwork_id"),
            Link::ArtworkAttachments => ("attachments", "artwork_id"),
            Link::ArtworkOffers => ("offers", "artwork_id"),
            Link::ArtworkTags => ("artworks_tags", "artwork_id"),
            Link::TagArtworks => ("artworks_tags", "tag_id"),
            Link::ClientOffers => ("offers", "client_id"),
            Link::StatusOffers => ("offers", "status_id"),
        }
    }

    /// Link-table rows carry no active flag of their own.
    pub fn is_association(self) -> bool {
        matches!(self, Link::ArtworkTags | Link::TagArtworks)
    }
}

/// A foreign key submitted through a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub field: &'static str,
    pub kind: Kind,
    pub id: Id,
}

/// Shared conventions of every listed/edited record type: soft delete,
/// sorted listing, pagination, protected children.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    type Form: DeserializeOwned + validator::Validate + Send + Sync + 'static;
    type Filter: DeserializeOwned + Default + Send + Sync + 'static;

    const KIND: Kind;
    /// Collections that must be empty (active rows only) before delete.
    const PROTECTED: &'static [Link] = &[];
    /// Collections deactivated together with the record.
    const CASCADE: &'static [Link] = &[];

    fn record(&self) -> &Record;
    fn record_mut(&mut self) -> &mut Record;

    fn references(_form: &Self::Form) -> Vec<Reference> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Domain records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ArtworkType {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub record: Record,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Feature {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub record: Record,
    pub type_id: Id,
}

/// Sparse attribute value; unique per (artwork, feature).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct FeaturesValue {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub record: Record,
    pub artwork_id: Id,
    pub feature_id: Id,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Artwork {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub record: Record,
    pub type_id: Id,
    pub author: Option<String>,
    pub year: Option<String>,
    pub buy_price: Option<i32>,
    pub info: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Tag {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub record: Record,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Client {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub record: Record,
    pub phone: String,
    pub birthday: Option<NaiveDate>,
    pub info: Option<String>,
}

/// A stored file of an artwork. `name` is the object key, `path` the bucket.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Attachment {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub record: Record,
    pub artwork_id: Id,
    pub seq: i32,
    pub path: String,
    pub hash: Option<String>,
    pub main_image: bool,
    pub info: Option<String>,
}

impl Attachment {
    /// Object key of a new attachment: `attachment_<artwork>_<seq><ext>`.
    pub fn file_name(artwork_id: Id, seq: i32, extension: &str) -> String {
        format!("attachment_{artwork_id}_{seq}{extension}")
    }

    pub fn kind(&self) -> MediaKind {
        MediaKind::from_file_name(&self.record.name)
    }
}

/// Main image of an artwork: the flagged file, else the first one.
pub fn main_image(files: &[Attachment]) -> Option<&Attachment> {
    files
        .iter()
        .find(|f| f.main_image)
        .or_else(|| files.iter().min_by_key(|f| f.seq))
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Status {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub record: Record,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Offer {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub record: Record,
    pub artwork_id: Id,
    pub client_id: Id,
    pub status_id: Id,
    pub price: Option<i32>,
    pub info: Option<String>,
}

/// Authentication principal.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub record: Record,
}

/// Fields of an attachment row known before the file is processed.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub artwork_id: Id,
    pub extension: String,
    pub path: String,
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Id,
    Name,
    Created,
    Updated,
}

impl SortKey {
    pub fn column(self) -> &'static str {
        match self {
            SortKey::Id => "id",
            SortKey::Name => "name",
            SortKey::Created => "created_at",
            SortKey::Updated => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

pub const MAX_PER_PAGE: u32 = 100;

/// Raw list query string.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(default)]
pub struct ListQuery {
    /// 1-based page number; anything below 1 means the first page.
    pub page: i64,
    pub per_page: Option<u32>,
    /// Case-insensitive name substring.
    pub q: Option<String>,
    pub sort: SortKey,
    pub order: SortOrder,
}

impl ListQuery {
    pub fn resolve(&self, rows_per_page: u32) -> ListParams {
        ListParams {
            page: u32::try_from(self.page.max(1)).unwrap_or(u32::MAX),
            per_page: self.per_page.unwrap_or(rows_per_page).clamp(1, MAX_PER_PAGE),
            q: self.q.as_ref().map(|q| q.trim().to_string()).filter(|q| !q.is_empty()),
            sort: self.sort,
            order: self.order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub page: u32,
    pub per_page: u32,
    pub q: Option<String>,
    pub sort: SortKey,
    pub order: SortOrder,
}

impl ListParams {
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

impl Default for ListParams {
    fn default() -> Self {
        ListQuery::default().resolve(20)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub pages: u64,
    pub has_prev: bool,
    pub has_next: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, params: &ListParams, total: u64) -> Self {
        let per_page = u64::from(params.per_page);
        let pages = total.div_ceil(per_page);
        let page = u64::from(params.page);
        Self {
            items,
            page: params.page,
            per_page: params.per_page,
            total,
            pages,
            has_prev: page > 1,
            has_next: page < pages,
        }
    }

    /// Cuts one page out of a fully filtered and sorted row set.
    pub fn from_rows(rows: Vec<T>, params: &ListParams) -> Self {
        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.per_page as usize)
            .collect();
        Self::new(items, params, total)
    }
}

/// `(id, name)` pair for select inputs.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Choice {
    pub id: Id,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(default)]
pub struct NoFilter {}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(default)]
pub struct FeatureFilter {
    pub type_id: Option<Id>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(default)]
pub struct ArtworkFilter {
    pub type_id: Option<Id>,
    pub tag_id: Option<Id>,
    /// With `value`: exact value match; alone: any non-empty value.
    pub feature_id: Option<Id>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(default)]
pub struct OfferFilter {
    pub artwork_id: Option<Id>,
    pub client_id: Option<Id>,
    pub status_id: Option<Id>,
}

// ---------------------------------------------------------------------------
// Entity wiring
// ---------------------------------------------------------------------------

macro_rules! record_access {
    () => {
        fn record(&self) -> &Record {
            &self.record
        }
        fn record_mut(&mut self) -> &mut Record {
            &mut self.record
        }
    };
}

impl Entity for ArtworkType {
    type Form = ArtworkTypeForm;
    type Filter = NoFilter;
    const KIND: Kind = Kind::ArtworkType;
    const PROTECTED: &'static [Link] = &[Link::TypeArtworks, Link::TypeFeatures];
    record_access!();
}

impl Entity for Feature {
    type Form = FeatureForm;
    type Filter = FeatureFilter;
    const KIND: Kind = Kind::Feature;
    const CASCADE: &'static [Link] = &[Link::FeatureValues];
    record_access!();

    fn references(form: &FeatureForm) -> Vec<Reference> {
        vec![Reference { field: "type_id", kind: Kind::ArtworkType, id: form.type_id }]
    }
}

impl Entity for Artwork {
    type Form = ArtworkForm;
    type Filter = ArtworkFilter;
    const KIND: Kind = Kind::Artwork;
    const PROTECTED: &'static [Link] = &[Link::ArtworkOffers];
    const CASCADE: &'static [Link] =
        &[Link::ArtworkAttachments, Link::ArtworkValues, Link::ArtworkTags];
    record_access!();

    fn references(form: &ArtworkForm) -> Vec<Reference> {
        vec![Reference { field: "type_id", kind: Kind::ArtworkType, id: form.type_id }]
    }
}

impl Entity for Tag {
    type Form = TagForm;
    type Filter = NoFilter;
    const KIND: Kind = Kind::Tag;
    const PROTECTED: &'static [Link] = &[Link::TagArtworks];
    record_access!();
}

impl Entity for Client {
    type Form = ClientForm;
    type Filter = NoFilter;
    const KIND: Kind = Kind::Client;
    const PROTECTED: &'static [Link] = &[Link::ClientOffers];
    record_access!();
}

impl Entity for Status {
    type Form = StatusForm;
    type Filter = NoFilter;
    const KIND: Kind = Kind::Status;
    const PROTECTED: &'static [Link] = &[Link::StatusOffers];
    record_access!();
}

impl Entity for Offer {
    type Form = OfferForm;
    type Filter = OfferFilter;
    const KIND: Kind = Kind::Offer;
    record_access!();

    fn references(form: &OfferForm) -> Vec<Reference> {
        vec![
            Reference { field: "artwork_id", kind: Kind::Artwork, id: form.artwork_id },
            Reference { field: "client_id", kind: Kind::Client, id: form.client_id },
            Reference { field: "status_id", kind: Kind::Status, id: form.status_id },
        ]
    }
}
