//! simplr maintain / badge / reminders / search implementations.
//!
//! These read the file-backed OS state under `<data_dir>/os/` directly.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::badge::active_count;
use crate::cli::{short_id, Globals, Session};
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::platform::file::{FileBadge, FileReminders, FileSearchIndex};
use crate::reminder::ReminderRequest;
use crate::search::{self, SearchItem};

#[derive(Serialize)]
struct MaintainReport {
    profile: String,
    removed: Vec<String>,
    reindexed: usize,
    badge: u32,
}

#[derive(Serialize)]
struct BadgeReport {
    profile: String,
    shown: Option<u32>,
    expected: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct ReminderView {
    #[serde(flatten)]
    request: ReminderRequest,
    in_profile: bool,
}

#[derive(Serialize)]
struct RemindersReport {
    profile: String,
    reminders: Vec<ReminderView>,
}

#[derive(Serialize)]
struct SearchReport {
    query: String,
    results: Vec<SearchItem>,
}

pub async fn run_maintain(globals: Globals) -> Result<()> {
    let mut session = Session::open(&globals)?;
    let orchestrator = &mut session.orchestrator;
    let report = orchestrator.run_maintenance()?;
    let repair = orchestrator.repair_categories()?;
    orchestrator.reindex_all();
    orchestrator.settle().await;
    let badge = orchestrator.update_badge_now().await;

    let mut human = HumanOutput::new(format!(
        "simplr maintain: {} expired task(s) removed",
        report.removed.len()
    ));
    human.push_summary("reindexed", orchestrator.tasks().len().to_string());
    human.push_summary("badge", badge.to_string());
    if repair.categories_fixed > 0 {
        human.push_summary("categories repaired", repair.categories_fixed.to_string());
    }
    for id in &report.removed {
        human.push_detail(format!("removed {}", short_id(id)));
    }

    let data = MaintainReport {
        profile: orchestrator.profile().to_string(),
        removed: report.removed,
        reindexed: orchestrator.tasks().len(),
        badge,
    };
    emit_success(session.output, "maintain", &data, Some(&human))?;
    session.finish().await
}

pub async fn run_badge_show(globals: Globals) -> Result<()> {
    let session = Session::open(&globals)?;
    let record = FileBadge::new(session.storage.clone()).current();
    let expected = active_count(session.orchestrator.tasks(), &Local::now());

    let report = BadgeReport {
        profile: session.orchestrator.profile().to_string(),
        shown: record.map(|record| record.count),
        expected,
        updated_at: record.map(|record| record.updated_at),
    };

    let mut human = HumanOutput::new(format!(
        "simplr badge: {}",
        report
            .shown
            .map(|count| count.to_string())
            .unwrap_or_else(|| "not set".to_string())
    ));
    human.push_summary("expected", expected.to_string());
    if report.shown != Some(expected) {
        human.push_warning("badge is stale".to_string());
        human.push_next_step("simplr badge refresh");
    }

    emit_success(session.output, "badge show", &report, Some(&human))?;
    session.finish().await
}

pub async fn run_badge_refresh(globals: Globals) -> Result<()> {
    let session = Session::open(&globals)?;
    let count = session.orchestrator.refresh_badge().await;
    let record = FileBadge::new(session.storage.clone()).current();

    let report = BadgeReport {
        profile: session.orchestrator.profile().to_string(),
        shown: record.map(|record| record.count),
        expected: count,
        updated_at: record.map(|record| record.updated_at),
    };
    let mut human = HumanOutput::new(format!("simplr badge refresh: {count}"));
    if report.shown != Some(count) {
        human.push_warning("badge write failed; see RUST_LOG=simplr=debug".to_string());
    }

    emit_success(session.output, "badge refresh", &report, Some(&human))?;
    session.finish().await
}

pub async fn run_reminders(globals: Globals) -> Result<()> {
    let session = Session::open(&globals)?;
    let mut pending = FileReminders::new(session.storage.clone()).pending();
    pending.sort_by_key(|request| request.fire_at);

    let reminders: Vec<ReminderView> = pending
        .into_iter()
        .map(|request| ReminderView {
            in_profile: session.orchestrator.task(&request.id).is_ok(),
            request,
        })
        .collect();

    let mut human = HumanOutput::new(format!("simplr reminders: {} pending", reminders.len()));
    for view in &reminders {
        let scope = if view.in_profile { "" } else { " (other profile)" };
        human.push_detail(format!(
            "{} · {} ({}){scope}",
            view.request.fire_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            view.request.title,
            short_id(&view.request.id)
        ));
    }

    let data = RemindersReport {
        profile: session.orchestrator.profile().to_string(),
        reminders,
    };
    emit_success(session.output, "reminders", &data, Some(&human))?;
    session.finish().await
}

pub async fn run_search(query: String, globals: Globals) -> Result<()> {
    let session = Session::open(&globals)?;
    let items = FileSearchIndex::new(session.storage.clone()).items();
    let results: Vec<SearchItem> = search::query(&items, &query, Utc::now())
        .into_iter()
        .cloned()
        .collect();

    let mut human = HumanOutput::new(format!("simplr search: {} result(s)", results.len()));
    for item in &results {
        human.push_detail(format!("{} ({}) · {}", item.title, short_id(&item.id), item.summary));
    }
    if items.is_empty() {
        human.push_next_step("simplr maintain");
    }

    let data = SearchReport { query, results };
    emit_success(session.output, "search", &data, Some(&human))?;
    session.finish().await
}
