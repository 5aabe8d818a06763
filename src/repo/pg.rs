//! Postgres backend. Queries are built at runtime; every write runs in a
//! transaction with the touched parent row locked.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, Pool, Postgres, QueryBuilder};

use super::*;
use crate::forms::{ArtworkForm, AttachmentForm, ClientForm, FeatureForm, NameForm, OfferForm};

const RECORD_COLUMNS: &str = "id, name, active, created_at, updated_at";
const FEATURE_COLUMNS: &str = "id, name, active, created_at, updated_at, type_id";
const VALUE_COLUMNS: &str = "id, name, active, created_at, updated_at, artwork_id, feature_id, value";
const ARTWORK_COLUMNS: &str =
    "id, name, active, created_at, updated_at, type_id, author, year, buy_price, info";
const CLIENT_COLUMNS: &str = "id, name, active, created_at, updated_at, phone, birthday, info";
const ATTACHMENT_COLUMNS: &str =
    "id, name, active, created_at, updated_at, artwork_id, seq, path, hash, main_image, info";
const OFFER_COLUMNS: &str =
    "id, name, active, created_at, updated_at, artwork_id, client_id, status_id, price, info";

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23505") => RepoError::Conflict,
            other => RepoError::Internal(other.to_string()),
        }
    }
}

/// Row mapping and write statements of one table.
#[async_trait]
pub trait PgEntity: Entity + for<'r> FromRow<'r, PgRow> {
    const COLUMNS: &'static str;

    /// Appends ` AND ...` conditions for the entity filter.
    fn push_filter(_qb: &mut QueryBuilder<'_, Postgres>, _filter: &Self::Filter) {}

    async fn insert(conn: &mut PgConnection, form: &Self::Form) -> Result<Self, sqlx::Error>;
    async fn update(conn: &mut PgConnection, id: Id, form: &Self::Form) -> Result<Self, sqlx::Error>;
}

macro_rules! pg_named {
    ($ty:ty) => {
        #[async_trait]
        impl PgEntity for $ty {
            const COLUMNS: &'static str = RECORD_COLUMNS;

            async fn insert(conn: &mut PgConnection, form: &NameForm) -> Result<Self, sqlx::Error> {
                let sql = format!(
                    "INSERT INTO {} (name) VALUES ($1) RETURNING {RECORD_COLUMNS}",
                    <$ty as Entity>::KIND.table()
                );
                sqlx::query_as::<_, Self>(&sql).bind(form.name.trim()).fetch_one(&mut *conn).await
            }

            async fn update(conn: &mut PgConnection, id: Id, form: &NameForm) -> Result<Self, sqlx::Error> {
                let sql = format!(
                    "UPDATE {} SET name = $2, updated_at = now() WHERE id = $1 RETURNING {RECORD_COLUMNS}",
                    <$ty as Entity>::KIND.table()
                );
                sqlx::query_as::<_, Self>(&sql)
                    .bind(id)
                    .bind(form.name.trim())
                    .fetch_one(&mut *conn)
                    .await
            }
        }
    };
}

pg_named!(ArtworkType);
pg_named!(Tag);
pg_named!(Status);

#[async_trait]
impl PgEntity for Feature {
    const COLUMNS: &'static str = FEATURE_COLUMNS;

    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &FeatureFilter) {
        if let Some(type_id) = filter.type_id {
            qb.push(" AND type_id = ").push_bind(type_id);
        }
    }

    async fn insert(conn: &mut PgConnection, form: &FeatureForm) -> Result<Self, sqlx::Error> {
        let sql = format!("INSERT INTO features (name, type_id) VALUES ($1, $2) RETURNING {FEATURE_COLUMNS}");
        sqlx::query_as::<_, Self>(&sql)
            .bind(form.name.trim())
            .bind(form.type_id)
            .fetch_one(&mut *conn)
            .await
    }

    async fn update(conn: &mut PgConnection, id: Id, form: &FeatureForm) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "UPDATE features SET name = $2, type_id = $3, updated_at = now() WHERE id = $1 RETURNING {FEATURE_COLUMNS}"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .bind(form.name.trim())
            .bind(form.type_id)
            .fetch_one(&mut *conn)
            .await
    }
}

#[async_trait]
impl PgEntity for Artwork {
    const COLUMNS: &'static str = ARTWORK_COLUMNS;

    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ArtworkFilter) {
        if let Some(type_id) = filter.type_id {
            qb.push(" AND type_id = ").push_bind(type_id);
        }
        if let Some(tag_id) = filter.tag_id {
            qb.push(
                " AND id IN (SELECT l.artwork_id FROM artworks_tags l \
                 JOIN tags t ON t.id = l.tag_id WHERE t.active AND l.tag_id = ",
            )
            .push_bind(tag_id)
            .push(")");
        }
        if let Some(feature_id) = filter.feature_id {
            qb.push(" AND id IN (SELECT artwork_id FROM features_values WHERE active AND feature_id = ")
                .push_bind(feature_id);
            match &filter.value {
                Some(value) => {
                    qb.push(" AND value = ").push_bind(value.clone());
                }
                None => {
                    qb.push(" AND COALESCE(value, '') <> ''");
                }
            }
            qb.push(")");
        }
    }

    async fn insert(conn: &mut PgConnection, form: &ArtworkForm) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "INSERT INTO artworks (name, type_id, author, year, buy_price, info) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {ARTWORK_COLUMNS}"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(form.name.trim())
            .bind(form.type_id)
            .bind(form.author.as_deref())
            .bind(form.year.as_deref())
            .bind(form.buy_price())
            .bind(form.info.as_deref())
            .fetch_one(&mut *conn)
            .await
    }

    async fn update(conn: &mut PgConnection, id: Id, form: &ArtworkForm) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "UPDATE artworks SET name = $2, type_id = $3, author = $4, year = $5, buy_price = $6, \
             info = $7, updated_at = now() WHERE id = $1 RETURNING {ARTWORK_COLUMNS}"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .bind(form.name.trim())
            .bind(form.type_id)
            .bind(form.author.as_deref())
            .bind(form.year.as_deref())
            .bind(form.buy_price())
            .bind(form.info.as_deref())
            .fetch_one(&mut *conn)
            .await
    }
}

#[async_trait]
impl PgEntity for Client {
    const COLUMNS: &'static str = CLIENT_COLUMNS;

    async fn insert(conn: &mut PgConnection, form: &ClientForm) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "INSERT INTO clients (name, phone, birthday, info) VALUES ($1, $2, $3, $4) RETURNING {CLIENT_COLUMNS}"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(form.name.trim())
            .bind(form.phone.trim())
            .bind(form.birthday())
            .bind(form.info.as_deref())
            .fetch_one(&mut *conn)
            .await
    }

    async fn update(conn: &mut PgConnection, id: Id, form: &ClientForm) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "UPDATE clients SET name = $2, phone = $3, birthday = $4, info = $5, updated_at = now() \
             WHERE id = $1 RETURNING {CLIENT_COLUMNS}"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .bind(form.name.trim())
            .bind(form.phone.trim())
            .bind(form.birthday())
            .bind(form.info.as_deref())
            .fetch_one(&mut *conn)
            .await
    }
}

#[async_trait]
impl PgEntity for Offer {
    const COLUMNS: &'static str = OFFER_COLUMNS;

    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &OfferFilter) {
        for (column, value) in [
            ("artwork_id", filter.artwork_id),
            ("client_id", filter.client_id),
            ("status_id", filter.status_id),
        ] {
            if let Some(value) = value {
                qb.push(format!(" AND {column} = ")).push_bind(value);
            }
        }
    }

    async fn insert(conn: &mut PgConnection, form: &OfferForm) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "INSERT INTO offers (artwork_id, client_id, status_id, price, info) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {OFFER_COLUMNS}"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(form.artwork_id)
            .bind(form.client_id)
            .bind(form.status_id)
            .bind(form.price())
            .bind(form.info.as_deref())
            .fetch_one(&mut *conn)
            .await
    }

    async fn update(conn: &mut PgConnection, id: Id, form: &OfferForm) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "UPDATE offers SET artwork_id = $2, client_id = $3, status_id = $4, price = $5, info = $6, \
             updated_at = now() WHERE id = $1 RETURNING {OFFER_COLUMNS}"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .bind(form.artwork_id)
            .bind(form.client_id)
            .bind(form.status_id)
            .bind(form.price())
            .bind(form.info.as_deref())
            .fetch_one(&mut *conn)
            .await
    }
}

fn escape_like(q: &str) -> String {
    q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn push_name_search(qb: &mut QueryBuilder<'_, Postgres>, params: &ListParams) {
    if let Some(q) = &params.q {
        qb.push(" AND name ILIKE ").push_bind(format!("%{}%", escape_like(q)));
    }
}

fn push_order_and_page(qb: &mut QueryBuilder<'_, Postgres>, params: &ListParams) {
    let direction = match params.order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    qb.push(format!(" ORDER BY {} {direction}, id", params.sort.column()))
        .push(" LIMIT ")
        .push_bind(i64::from(params.per_page))
        .push(" OFFSET ")
        .push_bind(params.offset() as i64);
}

/// Active children of `id` in the given collection.
fn count_sql(link: Link) -> String {
    match link {
        Link::TagArtworks => "SELECT COUNT(*) FROM artworks_tags l JOIN artworks a ON a.id = l.artwork_id \
                              WHERE l.tag_id = $1 AND a.active"
            .to_string(),
        Link::ArtworkTags => "SELECT COUNT(*) FROM artworks_tags l JOIN tags t ON t.id = l.tag_id \
                              WHERE l.artwork_id = $1 AND t.active"
            .to_string(),
        _ => {
            let (table, column) = link.child();
            format!("SELECT COUNT(*) FROM {table} WHERE {column} = $1 AND active")
        }
    }
}

fn cascade_sql(link: Link) -> String {
    let (table, column) = link.child();
    if link.is_association() {
        format!("DELETE FROM {table} WHERE {column} = $1")
    } else {
        format!("UPDATE {table} SET active = FALSE, updated_at = now() WHERE {column} = $1 AND active")
    }
}

/// Locks an active row for the rest of the transaction.
async fn lock_active(conn: &mut PgConnection, table: &str, id: Id) -> RepoResult<()> {
    let sql = format!("SELECT id FROM {table} WHERE id = $1 AND active FOR UPDATE");
    sqlx::query_scalar::<_, Id>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|_| ())
        .ok_or(RepoError::NotFound)
}

async fn check_references(conn: &mut PgConnection, refs: &[Reference]) -> RepoResult<()> {
    for r in refs {
        let sql = format!("SELECT id FROM {} WHERE id = $1 AND active FOR SHARE", r.kind.table());
        let found = sqlx::query_scalar::<_, Id>(&sql).bind(r.id).fetch_optional(&mut *conn).await?;
        if found.is_none() {
            return Err(RepoError::InvalidChoice(r.field));
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct PgRepo {
    pool: Pool<Postgres>,
}

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Applies the bundled migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl<T: PgEntity> EntityRepo<T> for PgRepo {
    async fn list(&self, params: &ListParams, filter: &T::Filter) -> RepoResult<Page<T>> {
        let table = T::KIND.table();

        let mut count = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) FROM {table} WHERE active"));
        push_name_search(&mut count, params);
        T::push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut rows = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM {table} WHERE active", T::COLUMNS));
        push_name_search(&mut rows, params);
        T::push_filter(&mut rows, filter);
        push_order_and_page(&mut rows, params);
        let items = rows.build_query_as::<T>().fetch_all(&self.pool).await?;

        Ok(Page::new(items, params, total.max(0) as u64))
    }

    async fn all(&self, filter: &T::Filter) -> RepoResult<Vec<T>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM {} WHERE active",
            T::COLUMNS,
            T::KIND.table()
        ));
        T::push_filter(&mut qb, filter);
        qb.push(" ORDER BY id");
        Ok(qb.build_query_as::<T>().fetch_all(&self.pool).await?)
    }

    async fn get(&self, id: Id) -> RepoResult<T> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1 AND active", T::COLUMNS, T::KIND.table());
        Ok(sqlx::query_as::<_, T>(&sql).bind(id).fetch_one(&self.pool).await?)
    }

    async fn create(&self, form: &T::Form) -> RepoResult<T> {
        let mut tx = self.pool.begin().await?;
        check_references(&mut tx, &T::references(form)).await?;
        let row = T::insert(&mut tx, form).await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn update(&self, id: Id, form: &T::Form) -> RepoResult<T> {
        let mut tx = self.pool.begin().await?;
        lock_active(&mut tx, T::KIND.table(), id).await?;
        check_references(&mut tx, &T::references(form)).await?;
        let row = T::update(&mut tx, id, form).await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn delete(&self, id: Id) -> RepoResult<()> {
        let table = T::KIND.table();
        let mut tx = self.pool.begin().await?;
        lock_active(&mut tx, table, id).await?;

        let mut blocked = Vec::new();
        for link in T::PROTECTED {
            let n: i64 = sqlx::query_scalar(&count_sql(*link)).bind(id).fetch_one(&mut *tx).await?;
            if n > 0 {
                blocked.push(link.label());
            }
        }
        if !blocked.is_empty() {
            return Err(RepoError::Protected(blocked));
        }

        for link in T::CASCADE {
            sqlx::query(&cascade_sql(*link)).bind(id).execute(&mut *tx).await?;
        }
        sqlx::query(&format!("UPDATE {table} SET active = FALSE, updated_at = now() WHERE id = $1"))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl FeatureValueRepo for PgRepo {
    async fn list_feature_values(&self, artwork_id: Id) -> RepoResult<Vec<FeaturesValue>> {
        let sql = format!(
            "SELECT {} FROM features_values v JOIN features f ON f.id = v.feature_id \
             WHERE v.artwork_id = $1 AND v.active AND f.active ORDER BY v.feature_id",
            prefixed("v", VALUE_COLUMNS)
        );
        Ok(sqlx::query_as::<_, FeaturesValue>(&sql).bind(artwork_id).fetch_all(&self.pool).await?)
    }

    async fn get_feature_value(&self, artwork_id: Id, feature_id: Id) -> RepoResult<Option<FeaturesValue>> {
        let sql = format!(
            "SELECT {VALUE_COLUMNS} FROM features_values WHERE artwork_id = $1 AND feature_id = $2 AND active"
        );
        Ok(sqlx::query_as::<_, FeaturesValue>(&sql)
            .bind(artwork_id)
            .bind(feature_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_feature_value(&self, artwork_id: Id, feature_id: Id, value: Option<String>) -> RepoResult<FeaturesValue> {
        let mut tx = self.pool.begin().await?;
        lock_active(&mut tx, "artworks", artwork_id).await?;
        lock_active(&mut tx, "features", feature_id).await?;
        let sql = format!(
            "INSERT INTO features_values (artwork_id, feature_id, value) VALUES ($1, $2, $3) \
             ON CONFLICT (artwork_id, feature_id) \
             DO UPDATE SET value = EXCLUDED.value, active = TRUE, updated_at = now() \
             RETURNING {VALUE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, FeaturesValue>(&sql)
            .bind(artwork_id)
            .bind(feature_id)
            .bind(value)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row)
    }
}

/// `a, b` → `p.a, p.b`
fn prefixed(prefix: &str, columns: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{prefix}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl ArtworkTagRepo for PgRepo {
    async fn list_artwork_tags(&self, artwork_id: Id) -> RepoResult<Vec<Tag>> {
        let sql = format!(
            "SELECT {} FROM tags t JOIN artworks_tags l ON l.tag_id = t.id \
             WHERE l.artwork_id = $1 AND t.active ORDER BY t.id",
            prefixed("t", RECORD_COLUMNS)
        );
        Ok(sqlx::query_as::<_, Tag>(&sql).bind(artwork_id).fetch_all(&self.pool).await?)
    }

    async fn add_tag(&self, artwork_id: Id, tag_id: Id) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_active(&mut tx, "artworks", artwork_id).await?;
        check_references(&mut tx, &[Reference { field: "tag_id", kind: Kind::Tag, id: tag_id }]).await?;
        sqlx::query("INSERT INTO artworks_tags (artwork_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(artwork_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_tag(&self, artwork_id: Id, tag_id: Id) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_active(&mut tx, "artworks", artwork_id).await?;
        sqlx::query("DELETE FROM artworks_tags WHERE artwork_id = $1 AND tag_id = $2")
            .bind(artwork_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl AttachmentRepo for PgRepo {
    async fn list_attachments(&self, artwork_id: Id) -> RepoResult<Vec<Attachment>> {
        let sql = format!("SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE artwork_id = $1 AND active ORDER BY seq");
        Ok(sqlx::query_as::<_, Attachment>(&sql).bind(artwork_id).fetch_all(&self.pool).await?)
    }

    async fn get_attachment(&self, id: Id) -> RepoResult<Attachment> {
        let sql = format!("SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE id = $1 AND active");
        Ok(sqlx::query_as::<_, Attachment>(&sql).bind(id).fetch_one(&self.pool).await?)
    }

    async fn create_attachment(&self, new: NewAttachment) -> RepoResult<Attachment> {
        let mut tx = self.pool.begin().await?;
        let seq: i32 = sqlx::query_scalar(
            "UPDATE artworks SET attachment_seq = attachment_seq + 1 \
             WHERE id = $1 AND active RETURNING attachment_seq",
        )
        .bind(new.artwork_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepoError::NotFound)?;

        let sql = format!(
            "INSERT INTO attachments (name, artwork_id, seq, path) VALUES ($1, $2, $3, $4) \
             RETURNING {ATTACHMENT_COLUMNS}"
        );
        let file = sqlx::query_as::<_, Attachment>(&sql)
            .bind(Attachment::file_name(new.artwork_id, seq, &new.extension))
            .bind(new.artwork_id)
            .bind(seq)
            .bind(&new.path)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(file)
    }

    async fn finish_attachment(&self, id: Id, name: &str, hash: &str) -> RepoResult<Attachment> {
        let sql = format!(
            "UPDATE attachments SET name = $2, hash = $3, updated_at = now() WHERE id = $1 \
             RETURNING {ATTACHMENT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Attachment>(&sql)
            .bind(id)
            .bind(name)
            .bind(hash)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_attachment(&self, id: Id, form: &AttachmentForm) -> RepoResult<Attachment> {
        let mut tx = self.pool.begin().await?;
        let artwork_id: Id = sqlx::query_scalar("SELECT artwork_id FROM attachments WHERE id = $1 AND active")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepoError::NotFound)?;
        // serialises concurrent main-image edits of one artwork
        lock_active(&mut tx, "artworks", artwork_id).await?;

        if form.main_image {
            sqlx::query(
                "UPDATE attachments SET main_image = FALSE, updated_at = now() \
                 WHERE artwork_id = $1 AND id <> $2 AND main_image",
            )
            .bind(artwork_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        let sql = format!(
            "UPDATE attachments SET main_image = $2, info = $3, updated_at = now() WHERE id = $1 \
             RETURNING {ATTACHMENT_COLUMNS}"
        );
        let file = sqlx::query_as::<_, Attachment>(&sql)
            .bind(id)
            .bind(form.main_image)
            .bind(form.info.as_deref())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(file)
    }

    async fn remove_attachment(&self, id: Id) -> RepoResult<Attachment> {
        let sql = format!("DELETE FROM attachments WHERE id = $1 AND active RETURNING {ATTACHMENT_COLUMNS}");
        Ok(sqlx::query_as::<_, Attachment>(&sql).bind(id).fetch_one(&self.pool).await?)
    }
}

#[derive(FromRow)]
struct Credentials {
    #[sqlx(flatten)]
    user: User,
    password_hash: String,
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn list_users(&self, params: &ListParams) -> RepoResult<Page<User>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users WHERE active");
        push_name_search(&mut count, params);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut rows = QueryBuilder::<Postgres>::new(format!("SELECT {RECORD_COLUMNS} FROM users WHERE active"));
        push_name_search(&mut rows, params);
        push_order_and_page(&mut rows, params);
        let items = rows.build_query_as::<User>().fetch_all(&self.pool).await?;
        Ok(Page::new(items, params, total.max(0) as u64))
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM users WHERE id = $1 AND active");
        Ok(sqlx::query_as::<_, User>(&sql).bind(id).fetch_one(&self.pool).await?)
    }

    async fn create_user(&self, name: &str, password_hash: &str) -> RepoResult<User> {
        let sql = format!("INSERT INTO users (name, password_hash) VALUES ($1, $2) RETURNING {RECORD_COLUMNS}");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(name.trim())
            .bind(password_hash)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn find_credentials(&self, name: &str) -> RepoResult<Option<(User, String)>> {
        let sql = format!("SELECT {RECORD_COLUMNS}, password_hash FROM users WHERE name = $1 AND active");
        let found = sqlx::query_as::<_, Credentials>(&sql).bind(name).fetch_optional(&self.pool).await?;
        Ok(found.map(|c| (c.user, c.password_hash)))
    }

    async fn delete_user(&self, id: Id) -> RepoResult<()> {
        let done = sqlx::query("UPDATE users SET active = FALSE, updated_at = now() WHERE id = $1 AND active")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn count_users(&self) -> RepoResult<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE active").fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }
}
