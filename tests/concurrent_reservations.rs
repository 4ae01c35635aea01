use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use tokio_test::assert_ok;

use flexdesk::config::OfficeDirectory;
use flexdesk::engine::{Engine, EngineError};
use flexdesk::model::{CellState, Period, RequestedPeriod};
use flexdesk::session::Session;
use flexdesk::store::InMemorySheetStore;

const AQUARIUM: &str = "Aquarium";
static ROSTER: [&str; 6] = ["Aquali", "Carapuce", "Hank", "Némo", "Polochon", "Tamatoa"];

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
}

fn session(name: &str) -> Session {
    Session::authenticated(Some(name.into()))
}

async fn seeded() -> Arc<Engine> {
    let engine = Engine::new(Arc::new(InMemorySheetStore::new()), OfficeDirectory::builtin())
        .pinned_to(d(3));
    assert_ok!(engine.seed_office(&session("admin"), AQUARIUM, d(3), 5, false).await);
    Arc::new(engine)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_reservations_on_distinct_desks_all_land() {
    let engine = seeded().await;

    let handles = ROSTER.iter().enumerate().map(|(i, desk)| {
        let engine = engine.clone();
        let occupant = format!("user{i}");
        tokio::spawn(async move {
            engine
                .reserve(&session(&occupant), AQUARIUM, d(4), RequestedPeriod::Day, desk, &occupant)
                .await
        })
    });
    for result in join_all(handles).await {
        assert_ok!(result.unwrap());
    }

    let view = assert_ok!(
        engine
            .query_availability(&session("viewer"), AQUARIUM, d(4), 1, None)
            .await
    );
    for (i, desk) in ROSTER.iter().enumerate() {
        for period in Period::ALL {
            assert_eq!(
                view.cell(d(4), period, desk),
                Some(&CellState::Reserved(format!("user{i}"))),
                "{desk} {period} lost its reservation"
            );
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_for_one_cell_has_exactly_one_winner() {
    let engine = seeded().await;

    let handles = (0..16).map(|i| {
        let engine = engine.clone();
        let occupant = format!("user{i}");
        tokio::spawn(async move {
            engine
                .reserve(&session(&occupant), AQUARIUM, d(5), RequestedPeriod::Morning, "Hank", &occupant)
                .await
        })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, EngineError::Conflict(cells) if cells.len() == 1))
    );

    let view = assert_ok!(
        engine
            .query_availability(&session("viewer"), AQUARIUM, d(5), 1, Some(Period::Morning))
            .await
    );
    assert!(matches!(
        view.cell(d(5), Period::Morning, "Hank"),
        Some(CellState::Reserved(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_day_and_half_day_requests_never_split() {
    let engine = seeded().await;

    let day = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .reserve(&session("Alice"), AQUARIUM, d(6), RequestedPeriod::Day, "Némo", "Alice")
                .await
        })
    };
    let afternoon = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .reserve(&session("Carl"), AQUARIUM, d(6), RequestedPeriod::Afternoon, "Némo", "Carl")
                .await
        })
    };
    let day = day.await.unwrap();
    let afternoon = afternoon.await.unwrap();
    assert!(day.is_ok() != afternoon.is_ok());

    let view = assert_ok!(
        engine
            .query_availability(&session("viewer"), AQUARIUM, d(6), 1, None)
            .await
    );
    let morning = view.cell(d(6), Period::Morning, "Némo").cloned();
    if day.is_ok() {
        assert_eq!(morning, Some(CellState::Reserved("Alice".into())));
    } else {
        // Alice lost; her morning must still be free.
        assert_eq!(morning, Some(CellState::Available));
    }
}
