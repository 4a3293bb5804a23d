//! simplr profile command implementations.

use serde::Serialize;

use crate::cli::{Globals, Session};
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::profile::{load_persisted_profile, persist_profile, Profile, ProfilePartition};

#[derive(Serialize)]
struct ProfileShowReport {
    profile: Profile,
    persisted: Option<Profile>,
    tasks_key: String,
    categories_key: String,
    tasks: usize,
}

#[derive(Serialize)]
struct ProfileSwitchReport {
    previous: Profile,
    current: Profile,
    switched: bool,
    tasks: usize,
    badge: u32,
}

pub async fn run_show(globals: Globals) -> Result<()> {
    let session = Session::open(&globals)?;
    let profile = session.orchestrator.profile();
    let persisted = load_persisted_profile(&session.storage)?;

    let report = ProfileShowReport {
        profile,
        persisted,
        tasks_key: ProfilePartition::tasks_key(profile),
        categories_key: ProfilePartition::categories_key(profile),
        tasks: session.orchestrator.tasks().len(),
    };

    let mut human = HumanOutput::new(format!("simplr profile: {}", profile.display_name()));
    human.push_summary("tasks", report.tasks.to_string());
    human.push_summary("storage key", report.tasks_key.clone());
    if persisted != Some(profile) {
        human.push_warning("profile overridden for this invocation".to_string());
    }
    human.push_next_step("simplr profile switch <personal|work>");

    emit_success(session.output, "profile show", &report, Some(&human))?;
    session.finish().await
}

pub async fn run_switch(raw: String, globals: Globals) -> Result<()> {
    let target: Profile = raw.parse()?;
    let mut session = Session::open(&globals)?;
    let orchestrator = &mut session.orchestrator;
    let previous = orchestrator.profile();
    let switched = orchestrator.switch_profile(target).await?;
    if !switched {
        persist_profile(&session.storage, target)?;
    }
    let badge = orchestrator.refresh_badge().await;

    let header = if switched {
        format!(
            "simplr profile switch: {} -> {}",
            previous.display_name(),
            target.display_name()
        )
    } else {
        format!("simplr profile switch: already {}", target.display_name())
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("tasks", orchestrator.tasks().len().to_string());
    human.push_summary("badge", badge.to_string());

    let report = ProfileSwitchReport {
        previous,
        current: target,
        switched,
        tasks: orchestrator.tasks().len(),
        badge,
    };
    emit_success(session.output, "profile switch", &report, Some(&human))?;
    session.finish().await
}
