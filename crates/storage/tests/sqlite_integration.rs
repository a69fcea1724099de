use std::collections::BTreeMap;

use chrono::Duration;
use gather_core::answers::AnswerValue;
use gather_core::catalog::Catalog;
use gather_core::geo::{DEFAULT_CELL_PRECISION, GeoPoint};
use gather_core::model::{Experience, ExperienceId, Profile, QuestionId, UserId};
use gather_core::progress::compute_progress;
use gather_core::time::fixed_now;
use storage::repository::{
    ExperienceRecord, ExperienceRepository, ProfileRecord, ProfileRepository, StorageError,
};
use storage::sqlite::SqliteRepository;

fn build_profile(user: &str, catalog: &Catalog) -> Profile {
    let profile = Profile::new(UserId::new(user), "Asha", Some("hello".into()), fixed_now())
        .unwrap()
        .with_location(Some(GeoPoint::new(19.076, 72.8777).unwrap()), fixed_now());

    let merged = profile
        .answers()
        .merge(
            catalog,
            BTreeMap::from([
                (
                    QuestionId::new("home_town"),
                    AnswerValue::Text("Mumbai".to_owned()),
                ),
                (
                    QuestionId::new("languages"),
                    AnswerValue::Options(vec!["Hindi".to_owned(), "English".to_owned()]),
                ),
            ]),
        )
        .unwrap();
    profile.with_answers(merged, fixed_now())
}

fn build_experience(title: &str, lat: f64, lon: f64) -> Experience {
    let location = GeoPoint::new(lat, lon).unwrap();
    let cell = location.cell(DEFAULT_CELL_PRECISION).unwrap();
    Experience::new(
        ExperienceId::generate(),
        UserId::new("host"),
        title,
        None,
        location,
        cell,
        fixed_now() + Duration::days(2),
        Some(8),
        fixed_now(),
    )
    .unwrap()
}

#[tokio::test]
async fn sqlite_profile_roundtrip_with_answers_and_snapshot() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_profile?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let catalog = Catalog::builtin();
    let profile = build_profile("u1", &catalog);
    let report = compute_progress(&catalog, profile.answers());
    let record = ProfileRecord::from_profile(&profile, Some(report.clone()));
    repo.upsert_profile(&record).await.unwrap();

    let fetched = repo
        .get_profile(&UserId::new("u1"))
        .await
        .unwrap()
        .expect("stored profile");
    assert_eq!(fetched.progress, Some(report));
    let roundtripped = fetched.into_profile(&catalog).unwrap();
    assert_eq!(roundtripped, profile);
}

#[tokio::test]
async fn sqlite_conditional_update_guards_concurrent_merges() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_cas?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let catalog = Catalog::builtin();
    let profile = build_profile("u1", &catalog);
    let record = ProfileRecord::from_profile(&profile, None);
    repo.upsert_profile(&record).await.unwrap();

    let seen_at = record.updated_at;
    let mut winner = record.clone();
    winner.updated_at = seen_at + Duration::seconds(10);
    repo.update_profile(&winner, seen_at).await.unwrap();

    let mut loser = record.clone();
    loser.updated_at = seen_at + Duration::seconds(20);
    let err = repo.update_profile(&loser, seen_at).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let missing = ProfileRecord::from_profile(&build_profile("ghost", &catalog), None);
    let err = repo.update_profile(&missing, seen_at).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_delete_profile() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_delete?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let catalog = Catalog::builtin();
    let record = ProfileRecord::from_profile(&build_profile("u1", &catalog), None);
    repo.upsert_profile(&record).await.unwrap();

    repo.delete_profile(&UserId::new("u1")).await.unwrap();
    assert!(repo.get_profile(&UserId::new("u1")).await.unwrap().is_none());

    let err = repo.delete_profile(&UserId::new("u1")).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_cell_filter_and_interests() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_cells?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let near = build_experience("Street food walk", 19.076, 72.8777);
    let also_near = build_experience("Harbour photowalk", 19.0761, 72.8778);
    let far = build_experience("Louvre tour", 48.8583, 2.2945);
    for exp in [&near, &also_near, &far] {
        repo.insert_experience(&ExperienceRecord::from_experience(exp))
            .await
            .unwrap();
    }

    repo.add_interest(near.id(), &UserId::new("guest"), fixed_now())
        .await
        .unwrap();
    // duplicate registration is a no-op
    repo.add_interest(near.id(), &UserId::new("guest"), fixed_now())
        .await
        .unwrap();

    let cells: Vec<_> = GeoPoint::new(19.076, 72.8777)
        .unwrap()
        .neighbor_cells(DEFAULT_CELL_PRECISION)
        .unwrap()
        .into_iter()
        .collect();
    let found = repo.list_by_cells(&cells, 10).await.unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|r| r.id != far.id()));

    let near_record = found.iter().find(|r| r.id == near.id()).unwrap();
    assert_eq!(near_record.interested.len(), 1);

    repo.remove_interest(near.id(), &UserId::new("guest"))
        .await
        .unwrap();
    let fetched = repo.get_experience(near.id()).await.unwrap().unwrap();
    assert!(fetched.interested.is_empty());
    assert_eq!(fetched.into_experience().unwrap().title(), "Street food walk");
}

#[tokio::test]
async fn sqlite_add_interest_enforces_capacity_at_the_write() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_capacity?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let location = GeoPoint::new(19.076, 72.8777).unwrap();
    let cell = location.cell(DEFAULT_CELL_PRECISION).unwrap();
    let one_seat = Experience::new(
        ExperienceId::generate(),
        UserId::new("host"),
        "Chai tasting",
        None,
        location,
        cell.clone(),
        fixed_now() + Duration::days(1),
        Some(1),
        fixed_now(),
    )
    .unwrap();
    repo.insert_experience(&ExperienceRecord::from_experience(&one_seat))
        .await
        .unwrap();

    repo.add_interest(one_seat.id(), &UserId::new("a"), fixed_now())
        .await
        .unwrap();

    // a writer who read an empty guest list still cannot take a second seat
    let err = repo
        .add_interest(one_seat.id(), &UserId::new("b"), fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    // re-adding the seated guest stays idempotent at capacity
    repo.add_interest(one_seat.id(), &UserId::new("a"), fixed_now())
        .await
        .unwrap();
    let fetched = repo.get_experience(one_seat.id()).await.unwrap().unwrap();
    assert_eq!(fetched.interested.len(), 1);

    // no cap means no capacity guard
    let open = Experience::new(
        ExperienceId::generate(),
        UserId::new("host"),
        "Harbour photowalk",
        None,
        location,
        cell,
        fixed_now() + Duration::days(1),
        None,
        fixed_now(),
    )
    .unwrap();
    repo.insert_experience(&ExperienceRecord::from_experience(&open))
        .await
        .unwrap();
    for guest in ["a", "b", "c"] {
        repo.add_interest(open.id(), &UserId::new(guest), fixed_now())
            .await
            .unwrap();
    }
    let fetched = repo.get_experience(open.id()).await.unwrap().unwrap();
    assert_eq!(fetched.interested.len(), 3);
}

#[tokio::test]
async fn sqlite_duplicate_experience_id_conflicts() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_dup?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let record = ExperienceRecord::from_experience(&build_experience("Walk", 0.0, 0.0));
    repo.insert_experience(&record).await.unwrap();
    let err = repo.insert_experience(&record).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let err = repo
        .add_interest(ExperienceId::generate(), &UserId::new("x"), fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}
