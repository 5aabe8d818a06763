#![cfg(feature = "postgres-store")]

use gallery::forms::{ArtworkForm, NameForm};
use gallery::models::{Artwork, ArtworkType, ListParams, NewAttachment, NoFilter, Tag};
use gallery::repo::pg::PgRepo;
use gallery::repo::{AttachmentRepo, EntityRepo, RepoError};

/// Connects to `DATABASE_URL`; `None` skips the test.
async fn repo() -> Option<PgRepo> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = sqlx::postgres::PgPoolOptions::new().max_connections(2).connect(&url).await.ok()?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.expect("migrations apply");
    Some(repo)
}

#[tokio::test]
async fn pg_soft_delete_and_sequence() {
    let Some(r) = repo().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let tag = EntityRepo::<Tag>::create(&r, &NameForm { name: "pg-tag".into() }).await.unwrap();
    EntityRepo::<Tag>::delete(&r, tag.record.id).await.unwrap();
    assert!(matches!(EntityRepo::<Tag>::get(&r, tag.record.id).await, Err(RepoError::NotFound)));
    let page = EntityRepo::<Tag>::list(&r, &ListParams::default(), &NoFilter {}).await.unwrap();
    assert!(page.items.iter().all(|t| t.record.id != tag.record.id));

    let kind = EntityRepo::<ArtworkType>::create(&r, &NameForm { name: "pg-type".into() }).await.unwrap();
    let form = ArtworkForm { type_id: kind.record.id, name: "pg-artwork".into(), ..Default::default() };
    let artwork = EntityRepo::<Artwork>::create(&r, &form).await.unwrap();
    let new = || NewAttachment { artwork_id: artwork.record.id, extension: ".png".into(), path: "bucket".into() };
    let first = r.create_attachment(new()).await.unwrap();
    r.remove_attachment(first.record.id).await.unwrap();
    let second = r.create_attachment(new()).await.unwrap();
    assert_eq!(second.seq, first.seq + 1);

    match EntityRepo::<ArtworkType>::delete(&r, kind.record.id).await {
        Err(RepoError::Protected(blocked)) => assert_eq!(blocked, vec!["artworks"]),
        other => panic!("expected protected, got {other:?}"),
    }
}
