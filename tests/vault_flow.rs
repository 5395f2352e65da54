use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use moonthread::commands::{AppState, SettingsUpdate};
use moonthread::credentials::MemoryCredentialStore;
use moonthread::crypto::KdfParams;
use moonthread::models::{PeriodStatus, RegularityLabel};
use moonthread::storage::{Vault, VAULT_FILE_NAME};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// App whose "today" can be moved by the test.
fn app_at(dir: &std::path::Path, today: Arc<Mutex<NaiveDate>>) -> AppState {
    let vault = Vault::new(dir.join(VAULT_FILE_NAME), KdfParams::new(8, 1, 1));
    AppState::new(vault, Box::new(MemoryCredentialStore::new()))
        .with_clock(move || *today.lock().unwrap())
}

#[test]
fn a_few_months_of_logging() {
    let dir = tempfile::tempdir().unwrap();
    let today = Arc::new(Mutex::new(date("2024-01-01")));
    let app = app_at(dir.path(), today.clone());
    app.setup("correct horse", false).unwrap();

    for (start, end) in [
        ("2024-01-01", "2024-01-05"),
        ("2024-01-29", "2024-02-02"),
        ("2024-02-26", "2024-03-01"),
    ] {
        *today.lock().unwrap() = date(start);
        let record = app.toggle_period().unwrap();
        assert!(record.is_active());

        *today.lock().unwrap() = date(end);
        let record = app.toggle_period().unwrap();
        assert_eq!(record.duration_days(), Some(5));
    }

    *today.lock().unwrap() = date("2024-03-10");
    let stats = app.get_stats().unwrap();
    assert_eq!(stats.average_cycle_length, Some(28.0));
    assert_eq!(stats.average_period_length, Some(5.0));
    assert_eq!(stats.predicted_next_start, Some(date("2024-03-25")));
    assert_eq!(
        app.get_status().unwrap(),
        PeriodStatus::Upcoming { in_days: 15 }
    );

    let metrics = app.get_metrics(Some(2024)).unwrap();
    assert_eq!(metrics.regularity_score, Some(100.0));
    assert_eq!(metrics.regularity_label, RegularityLabel::VeryRegular);
    assert_eq!(metrics.monthly_days[0].days, 8);
    assert_eq!(metrics.monthly_days[1].days, 6);
    assert_eq!(metrics.monthly_days[2].days, 1);
    assert!(metrics.forecast.contains(&date("2024-03-25")));
    assert!(metrics.forecast.contains(&date("2024-03-29")));
    assert!(!metrics.forecast.contains(&date("2024-03-30")));

    // the record set survives a lock/unlock cycle
    app.lock().unwrap();
    assert!(app.unlock("correct horse").unwrap());
    assert_eq!(app.list_periods().unwrap().len(), 3);
}

#[test]
fn reopening_the_vault_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let today = Arc::new(Mutex::new(date("2024-03-03")));

    {
        let app = app_at(dir.path(), today.clone());
        app.setup("pass", false).unwrap();
        app.import_data(
            r#"[
                {"id": 10, "start_date": "2024-02-02", "end_date": "2024-02-06T00:00:00Z"},
                {"id": 11, "start_date": "2024-03-01", "end_date": null}
            ]"#,
        )
        .unwrap();
        app.update_settings(SettingsUpdate {
            forecast_horizon_cycles: Some(2),
            ..SettingsUpdate::default()
        })
        .unwrap();
    }

    let app = app_at(dir.path(), today);
    assert!(app.is_setup());
    assert!(app.unlock("pass").unwrap());

    let periods = app.list_periods().unwrap();
    assert_eq!(periods.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 1]);

    let dashboard = app.dashboard().unwrap();
    assert_eq!(dashboard.status, PeriodStatus::Active { day: 3 });
    // rest of the current period plus two projected cycles of five days
    assert_eq!(dashboard.metrics.forecast.len(), 2 + 5 + 5);
}
