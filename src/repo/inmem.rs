//! Lock-guarded in-memory backend with an optional JSON snapshot on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::*;
use crate::forms::{
    ArtworkForm, AttachmentForm, ClientForm, FeatureForm, NameForm, OfferForm,
};

const SNAPSHOT_FILE: &str = "state.json";

#[derive(Clone, Serialize, Deserialize)]
struct StoredUser {
    user: User,
    password_hash: String,
}

#[derive(Default, Serialize, Deserialize)]
pub struct State {
    artwork_types: BTreeMap<Id, ArtworkType>,
    features: BTreeMap<Id, Feature>,
    features_values: BTreeMap<Id, FeaturesValue>,
    artworks: BTreeMap<Id, Artwork>,
    tags: BTreeMap<Id, Tag>,
    clients: BTreeMap<Id, Client>,
    attachments: BTreeMap<Id, Attachment>,
    statuses: BTreeMap<Id, Status>,
    offers: BTreeMap<Id, Offer>,
    /// (artwork_id, tag_id)
    artworks_tags: BTreeSet<(Id, Id)>,
    /// Highest attachment sequence ever handed out per artwork.
    attachment_seq: BTreeMap<Id, i32>,
    users: BTreeMap<Id, StoredUser>,
    next_id: Id,
}

fn live<T: Entity>(rows: &BTreeMap<Id, T>, id: Id) -> bool {
    rows.get(&id).map(|r| r.record().active).unwrap_or(false)
}

impl State {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn exists(&self, kind: Kind, id: Id) -> bool {
        match kind {
            Kind::ArtworkType => live(&self.artwork_types, id),
            Kind::Feature => live(&self.features, id),
            Kind::Artwork => live(&self.artworks, id),
            Kind::Tag => live(&self.tags, id),
            Kind::Client => live(&self.clients, id),
            Kind::Status => live(&self.statuses, id),
            Kind::Offer => live(&self.offers, id),
        }
    }

    /// Active children of `id` in the given collection.
    fn count_link(&self, link: Link, id: Id) -> usize {
        match link {
            Link::TypeArtworks => self.artworks.values().filter(|a| a.record.active && a.type_id == id).count(),
            Link::TypeFeatures => self.features.values().filter(|f| f.record.active && f.type_id == id).count(),
            Link::FeatureValues => self.features_values.values().filter(|v| v.record.active && v.feature_id == id).count(),
            Link::ArtworkValues => self.features_values.values().filter(|v| v.record.active && v.artwork_id == id).count(),
            Link::ArtworkAttachments => self.attachments.values().filter(|f| f.record.active && f.artwork_id == id).count(),
            Link::ArtworkOffers => self.offers.values().filter(|o| o.record.active && o.artwork_id == id).count(),
            Link::ClientOffers => self.offers.values().filter(|o| o.record.active && o.client_id == id).count(),
            Link::StatusOffers => self.offers.values().filter(|o| o.record.active && o.status_id == id).count(),
            Link::ArtworkTags => self
                .artworks_tags
                .iter()
                .filter(|(a, t)| *a == id && live(&self.tags, *t))
                .count(),
            Link::TagArtworks => self
                .artworks_tags
                .iter()
                .filter(|(a, t)| *t == id && live(&self.artworks, *a))
                .count(),
        }
    }

    fn cascade(&mut self, link: Link, id: Id, now: DateTime<Utc>) {
        match link {
            Link::FeatureValues => self
                .features_values
                .values_mut()
                .filter(|v| v.record.active && v.feature_id == id)
                .for_each(|v| v.record.deactivate(now)),
            Link::ArtworkValues => self
                .features_values
                .values_mut()
                .filter(|v| v.record.active && v.artwork_id == id)
                .for_each(|v| v.record.deactivate(now)),
            Link::ArtworkAttachments => self
                .attachments
                .values_mut()
                .filter(|f| f.record.active && f.artwork_id == id)
                .for_each(|f| f.record.deactivate(now)),
            Link::ArtworkTags => self.artworks_tags.retain(|(a, _)| *a != id),
            Link::TagArtworks => self.artworks_tags.retain(|(_, t)| *t != id),
            Link::TypeArtworks
            | Link::TypeFeatures
            | Link::ArtworkOffers
            | Link::ClientOffers
            | Link::StatusOffers => {
                log::warn!("{:?} is not a cascading collection", link);
            }
        }
    }

    fn check_references(&self, refs: &[Reference]) -> RepoResult<()> {
        for r in refs {
            if !self.exists(r.kind, r.id) {
                return Err(RepoError::InvalidChoice(r.field));
            }
        }
        Ok(())
    }
}

/// Per-entity storage hooks for the generic CRUD implementation.
pub trait Stored: Entity {
    fn table(s: &State) -> &BTreeMap<Id, Self>;
    fn table_mut(s: &mut State) -> &mut BTreeMap<Id, Self>;
    fn build(record: Record, form: &Self::Form) -> Self;
    fn apply(&mut self, form: &Self::Form);
    fn matches(&self, _filter: &Self::Filter, _s: &State) -> bool {
        true
    }
}

fn clean(s: &str) -> String {
    s.trim().to_string()
}

macro_rules! named_entity {
    ($ty:ty, $field:ident) => {
        impl Stored for $ty {
            fn table(s: &State) -> &BTreeMap<Id, Self> {
                &s.$field
            }
            fn table_mut(s: &mut State) -> &mut BTreeMap<Id, Self> {
                &mut s.$field
            }
            fn build(mut record: Record, form: &NameForm) -> Self {
                record.name = clean(&form.name);
                Self { record }
            }
            fn apply(&mut self, form: &NameForm) {
                self.record.name = clean(&form.name);
            }
        }
    };
}

named_entity!(ArtworkType, artwork_types);
named_entity!(Tag, tags);
named_entity!(Status, statuses);

impl Stored for Feature {
    fn table(s: &State) -> &BTreeMap<Id, Self> {
        &s.features
    }
    fn table_mut(s: &mut State) -> &mut BTreeMap<Id, Self> {
        &mut s.features
    }
    fn build(mut record: Record, form: &FeatureForm) -> Self {
        record.name = clean(&form.name);
        Self { record, type_id: form.type_id }
    }
    fn apply(&mut self, form: &FeatureForm) {
        self.record.name = clean(&form.name);
        self.type_id = form.type_id;
    }
    fn matches(&self, filter: &FeatureFilter, _s: &State) -> bool {
        filter.type_id.map_or(true, |t| t == self.type_id)
    }
}

impl Stored for Artwork {
    fn table(s: &State) -> &BTreeMap<Id, Self> {
        &s.artworks
    }
    fn table_mut(s: &mut State) -> &mut BTreeMap<Id, Self> {
        &mut s.artworks
    }
    fn build(record: Record, form: &ArtworkForm) -> Self {
        let mut artwork = Self {
            record,
            type_id: 0,
            author: None,
            year: None,
            buy_price: None,
            info: None,
        };
        artwork.apply(form);
        artwork
    }
    fn apply(&mut self, form: &ArtworkForm) {
        self.record.name = clean(&form.name);
        self.type_id = form.type_id;
        self.author = form.author.clone();
        self.year = form.year.clone();
        self.buy_price = form.buy_price();
        self.info = form.info.clone();
    }
    fn matches(&self, filter: &ArtworkFilter, s: &State) -> bool {
        let id = self.record.id;
        if filter.type_id.is_some_and(|t| t != self.type_id) {
            return false;
        }
        if let Some(tag) = filter.tag_id {
            if !s.exists(Kind::Tag, tag) || !s.artworks_tags.contains(&(id, tag)) {
                return false;
            }
        }
        match (filter.feature_id, filter.value.as_deref()) {
            (Some(feature), wanted) => s.features_values.values().any(|v| {
                v.record.active
                    && v.artwork_id == id
                    && v.feature_id == feature
                    && match (wanted, v.value.as_deref()) {
                        (Some(w), Some(have)) => w == have,
                        (None, Some(have)) => !have.is_empty(),
                        (_, None) => false,
                    }
            }),
            (None, _) => true,
        }
    }
}

impl Stored for Client {
    fn table(s: &State) -> &BTreeMap<Id, Self> {
        &s.clients
    }
    fn table_mut(s: &mut State) -> &mut BTreeMap<Id, Self> {
        &mut s.clients
    }
    fn build(record: Record, form: &ClientForm) -> Self {
        let mut client = Self { record, phone: String::new(), birthday: None, info: None };
        client.apply(form);
        client
    }
    fn apply(&mut self, form: &ClientForm) {
        self.record.name = clean(&form.name);
        self.phone = clean(&form.phone);
        self.birthday = form.birthday();
        self.info = form.info.clone();
    }
}

impl Stored for Offer {
    fn table(s: &State) -> &BTreeMap<Id, Self> {
        &s.offers
    }
    fn table_mut(s: &mut State) -> &mut BTreeMap<Id, Self> {
        &mut s.offers
    }
    fn build(record: Record, form: &OfferForm) -> Self {
        let mut offer = Self {
            record,
            artwork_id: 0,
            client_id: 0,
            status_id: 0,
            price: None,
            info: None,
        };
        offer.apply(form);
        offer
    }
    fn apply(&mut self, form: &OfferForm) {
        self.artwork_id = form.artwork_id;
        self.client_id = form.client_id;
        self.status_id = form.status_id;
        self.price = form.price();
        self.info = form.info.clone();
    }
    fn matches(&self, filter: &OfferFilter, _s: &State) -> bool {
        filter.artwork_id.map_or(true, |v| v == self.artwork_id)
            && filter.client_id.map_or(true, |v| v == self.client_id)
            && filter.status_id.map_or(true, |v| v == self.status_id)
    }
}

/// Sorts records in place, `id` ascending breaking ties.
fn sort_records<T>(rows: &mut [T], params: &ListParams, record: impl Fn(&T) -> &Record) {
    rows.sort_by(|a, b| {
        let (a, b) = (record(a), record(b));
        let primary = match params.sort {
            SortKey::Id => a.id.cmp(&b.id),
            SortKey::Name => a.name.cmp(&b.name),
            SortKey::Created => a.created_at.cmp(&b.created_at),
            SortKey::Updated => a.updated_at.cmp(&b.updated_at),
        };
        let primary = match params.order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary.then(a.id.cmp(&b.id))
    });
}

fn name_matches(record: &Record, q: Option<&str>) -> bool {
    match q {
        Some(q) => record.name.to_lowercase().contains(&q.to_lowercase()),
        None => true,
    }
}

#[derive(Clone)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
    snapshot_path: Option<Arc<PathBuf>>,
}

impl InMemRepo {
    /// Ephemeral repository; nothing touches the disk.
    pub fn new() -> Self {
        Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None }
    }

    /// Repository persisted to `<dir>/state.json` after every write.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let path = dir.as_ref().join(SNAPSHOT_FILE);
        let state = Self::load_state_from(&path);
        Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)) }
    }

    fn load_state_from(path: &Path) -> State {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                Ok(s) => {
                    log::info!("loaded snapshot '{}'", path.display());
                    s
                }
                Err(e) => {
                    log::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                    State::default()
                }
            },
            Err(e) => {
                log::info!("no snapshot at '{}' ({e}); starting empty", path.display());
                State::default()
            }
        }
    }

    fn persist(&self) {
        let Some(path) = self.snapshot_path.as_ref() else { return };
        let bytes = match self.state.read() {
            Ok(s) => serde_json::to_vec_pretty(&*s),
            Err(_) => return,
        };
        match bytes {
            Ok(bytes) => {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(path.as_ref(), bytes) {
                    log::warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
            Err(e) => log::warn!("failed to serialize snapshot: {e}"),
        }
    }

    fn view<R>(&self, f: impl FnOnce(&State) -> RepoResult<R>) -> RepoResult<R> {
        let s = self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))?;
        f(&s)
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut State) -> RepoResult<R>) -> RepoResult<R> {
        let out = {
            let mut s = self
                .state
                .write()
                .map_err(|_| RepoError::Internal("state lock poisoned".into()))?;
            f(&mut s)?
        };
        self.persist();
        Ok(out)
    }
}

impl Default for InMemRepo {
    fn default() -> Self {
        Self::new()
    }
}

fn active_row<T: Entity>(rows: &BTreeMap<Id, T>, id: Id) -> RepoResult<&T> {
    rows.get(&id).filter(|r| r.record().active).ok_or(RepoError::NotFound)
}

fn live_attachment(s: &State, id: Id) -> RepoResult<&Attachment> {
    s.attachments.get(&id).filter(|f| f.record.active).ok_or(RepoError::NotFound)
}

#[async_trait]
impl<T: Stored> EntityRepo<T> for InMemRepo {
    async fn list(&self, params: &ListParams, filter: &T::Filter) -> RepoResult<Page<T>> {
        self.view(|s| {
            let mut rows: Vec<T> = T::table(s)
                .values()
                .filter(|r| r.record().active)
                .filter(|r| name_matches(r.record(), params.q.as_deref()))
                .filter(|r| r.matches(filter, s))
                .cloned()
                .collect();
            sort_records(&mut rows, params, |r| r.record());
            Ok(Page::from_rows(rows, params))
        })
    }

    async fn all(&self, filter: &T::Filter) -> RepoResult<Vec<T>> {
        self.view(|s| {
            Ok(T::table(s)
                .values()
                .filter(|r| r.record().active && r.matches(filter, s))
                .cloned()
                .collect())
        })
    }

    async fn get(&self, id: Id) -> RepoResult<T> {
        self.view(|s| active_row(T::table(s), id).cloned())
    }

    async fn create(&self, form: &T::Form) -> RepoResult<T> {
        self.mutate(|s| {
            s.check_references(&T::references(form))?;
            let id = s.next_id();
            let row = T::build(Record::new(id, Utc::now()), form);
            T::table_mut(s).insert(id, row.clone());
            Ok(row)
        })
    }

    async fn update(&self, id: Id, form: &T::Form) -> RepoResult<T> {
        self.mutate(|s| {
            active_row(T::table(s), id)?;
            s.check_references(&T::references(form))?;
            let row = T::table_mut(s).get_mut(&id).ok_or(RepoError::NotFound)?;
            row.apply(form);
            row.record_mut().touch(Utc::now());
            Ok(row.clone())
        })
    }

    async fn delete(&self, id: Id) -> RepoResult<()> {
        self.mutate(|s| {
            active_row(T::table(s), id)?;
            let blocked: Vec<&'static str> = T::PROTECTED
                .iter()
                .filter(|link| s.count_link(**link, id) > 0)
                .map(|link| link.label())
                .collect();
            if !blocked.is_empty() {
                return Err(RepoError::Protected(blocked));
            }
            let now = Utc::now();
            for link in T::CASCADE {
                s.cascade(*link, id, now);
            }
            if let Some(row) = T::table_mut(s).get_mut(&id) {
                row.record_mut().deactivate(now);
            }
            Ok(())
        })
    }
}

#[async_trait]
impl FeatureValueRepo for InMemRepo {
    async fn list_feature_values(&self, artwork_id: Id) -> RepoResult<Vec<FeaturesValue>> {
        self.view(|s| {
            Ok(s.features_values
                .values()
                .filter(|v| v.record.active && v.artwork_id == artwork_id && live(&s.features, v.feature_id))
                .cloned()
                .collect())
        })
    }

    async fn get_feature_value(&self, artwork_id: Id, feature_id: Id) -> RepoResult<Option<FeaturesValue>> {
        self.view(|s| {
            Ok(s.features_values
                .values()
                .find(|v| v.record.active && v.artwork_id == artwork_id && v.feature_id == feature_id)
                .cloned())
        })
    }

    async fn set_feature_value(&self, artwork_id: Id, feature_id: Id, value: Option<String>) -> RepoResult<FeaturesValue> {
        self.mutate(|s| {
            if !s.exists(Kind::Artwork, artwork_id) || !s.exists(Kind::Feature, feature_id) {
                return Err(RepoError::NotFound);
            }
            let now = Utc::now();
            let existing = s
                .features_values
                .values_mut()
                .find(|v| v.artwork_id == artwork_id && v.feature_id == feature_id);
            if let Some(v) = existing {
                v.value = value;
                v.record.active = true;
                v.record.touch(now);
                return Ok(v.clone());
            }
            let id = s.next_id();
            let v = FeaturesValue { record: Record::new(id, now), artwork_id, feature_id, value };
            s.features_values.insert(id, v.clone());
            Ok(v)
        })
    }
}

#[async_trait]
impl ArtworkTagRepo for InMemRepo {
    async fn list_artwork_tags(&self, artwork_id: Id) -> RepoResult<Vec<Tag>> {
        self.view(|s| {
            Ok(s.artworks_tags
                .iter()
                .filter(|(a, _)| *a == artwork_id)
                .filter_map(|(_, t)| s.tags.get(t))
                .filter(|t| t.record.active)
                .cloned()
                .collect())
        })
    }

    async fn add_tag(&self, artwork_id: Id, tag_id: Id) -> RepoResult<()> {
        self.mutate(|s| {
            if !s.exists(Kind::Artwork, artwork_id) {
                return Err(RepoError::NotFound);
            }
            if !s.exists(Kind::Tag, tag_id) {
                return Err(RepoError::InvalidChoice("tag_id"));
            }
            s.artworks_tags.insert((artwork_id, tag_id));
            Ok(())
        })
    }

    async fn remove_tag(&self, artwork_id: Id, tag_id: Id) -> RepoResult<()> {
        self.mutate(|s| {
            if !s.exists(Kind::Artwork, artwork_id) {
                return Err(RepoError::NotFound);
            }
            s.artworks_tags.remove(&(artwork_id, tag_id));
            Ok(())
        })
    }
}

#[async_trait]
impl AttachmentRepo for InMemRepo {
    async fn list_attachments(&self, artwork_id: Id) -> RepoResult<Vec<Attachment>> {
        self.view(|s| {
            let mut files: Vec<Attachment> = s
                .attachments
                .values()
                .filter(|f| f.record.active && f.artwork_id == artwork_id)
                .cloned()
                .collect();
            files.sort_by_key(|f| f.seq);
            Ok(files)
        })
    }

    async fn get_attachment(&self, id: Id) -> RepoResult<Attachment> {
        self.view(|s| live_attachment(s, id).cloned())
    }

    async fn create_attachment(&self, new: NewAttachment) -> RepoResult<Attachment> {
        self.mutate(|s| {
            if !s.exists(Kind::Artwork, new.artwork_id) {
                return Err(RepoError::NotFound);
            }
            let seq = {
                let last = s.attachment_seq.entry(new.artwork_id).or_insert(0);
                *last += 1;
                *last
            };
            let id = s.next_id();
            let mut record = Record::new(id, Utc::now());
            record.name = Attachment::file_name(new.artwork_id, seq, &new.extension);
            let file = Attachment {
                record,
                artwork_id: new.artwork_id,
                seq,
                path: new.path,
                hash: None,
                main_image: false,
                info: None,
            };
            s.attachments.insert(id, file.clone());
            Ok(file)
        })
    }

    async fn finish_attachment(&self, id: Id, name: &str, hash: &str) -> RepoResult<Attachment> {
        self.mutate(|s| {
            let file = s.attachments.get_mut(&id).ok_or(RepoError::NotFound)?;
            file.record.name = name.to_string();
            file.hash = Some(hash.to_string());
            file.record.touch(Utc::now());
            Ok(file.clone())
        })
    }

    async fn update_attachment(&self, id: Id, form: &AttachmentForm) -> RepoResult<Attachment> {
        self.mutate(|s| {
            let artwork_id = live_attachment(s, id)?.artwork_id;
            let now = Utc::now();
            if form.main_image {
                s.attachments
                    .values_mut()
                    .filter(|f| f.artwork_id == artwork_id && f.record.id != id && f.main_image)
                    .for_each(|f| {
                        f.main_image = false;
                        f.record.touch(now);
                    });
            }
            let file = s.attachments.get_mut(&id).ok_or(RepoError::NotFound)?;
            file.main_image = form.main_image;
            file.info = form.info.clone();
            file.record.touch(now);
            Ok(file.clone())
        })
    }

    async fn remove_attachment(&self, id: Id) -> RepoResult<Attachment> {
        self.mutate(|s| {
            live_attachment(s, id)?;
            s.attachments.remove(&id).ok_or(RepoError::NotFound)
        })
    }
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn list_users(&self, params: &ListParams) -> RepoResult<Page<User>> {
        self.view(|s| {
            let mut rows: Vec<User> = s
                .users
                .values()
                .map(|u| &u.user)
                .filter(|u| u.record.active && name_matches(&u.record, params.q.as_deref()))
                .cloned()
                .collect();
            sort_records(&mut rows, params, |u| &u.record);
            Ok(Page::from_rows(rows, params))
        })
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        self.view(|s| {
            s.users
                .get(&id)
                .map(|u| &u.user)
                .filter(|u| u.record.active)
                .cloned()
                .ok_or(RepoError::NotFound)
        })
    }

    async fn create_user(&self, name: &str, password_hash: &str) -> RepoResult<User> {
        self.mutate(|s| {
            let name = name.trim();
            if s.users.values().any(|u| u.user.record.active && u.user.record.name == name) {
                return Err(RepoError::Conflict);
            }
            let id = s.next_id();
            let mut record = Record::new(id, Utc::now());
            record.name = name.to_string();
            let user = User { record };
            s.users.insert(id, StoredUser { user: user.clone(), password_hash: password_hash.to_string() });
            Ok(user)
        })
    }

    async fn find_credentials(&self, name: &str) -> RepoResult<Option<(User, String)>> {
        self.view(|s| {
            Ok(s.users
                .values()
                .find(|u| u.user.record.active && u.user.record.name == name)
                .map(|u| (u.user.clone(), u.password_hash.clone())))
        })
    }

    async fn delete_user(&self, id: Id) -> RepoResult<()> {
        self.mutate(|s| {
            let stored = s
                .users
                .get_mut(&id)
                .filter(|u| u.user.record.active)
                .ok_or(RepoError::NotFound)?;
            stored.user.record.deactivate(Utc::now());
            Ok(())
        })
    }

    async fn count_users(&self) -> RepoResult<u64> {
        self.view(|s| Ok(s.users.values().filter(|u| u.user.record.active).count() as u64))
    }
}
