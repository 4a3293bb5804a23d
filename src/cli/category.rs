//! simplr category command implementations.

use serde::Serialize;

use crate::category::{Category, RepairReport};
use crate::cli::{resolve_category_id, Globals, Session};
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};

#[derive(Serialize)]
struct CategoryListReport {
    profile: String,
    categories: Vec<CategoryUsage>,
}

#[derive(Serialize)]
struct CategoryUsage {
    #[serde(flatten)]
    category: Category,
    tasks: usize,
}

#[derive(Serialize)]
struct CategoryReport {
    profile: String,
    category: Category,
}

#[derive(Serialize)]
struct RepairOutput {
    profile: String,
    #[serde(flatten)]
    report: RepairReport,
}

fn describe(category: &Category) -> String {
    let kind = if category.is_custom { "custom" } else { "built-in" };
    format!("{} [{}] {} ({kind})", category.name, category.color, category.id)
}

pub async fn run_list(globals: Globals) -> Result<()> {
    let session = Session::open(&globals)?;
    let orchestrator = &session.orchestrator;

    let categories: Vec<CategoryUsage> = orchestrator
        .categories()
        .iter()
        .map(|category| CategoryUsage {
            tasks: orchestrator
                .tasks()
                .iter()
                .filter(|task| task.category_id.as_deref() == Some(category.id.as_str()))
                .count(),
            category: category.clone(),
        })
        .collect();

    let mut human = HumanOutput::new(format!(
        "simplr categories ({})",
        orchestrator.profile().display_name()
    ));
    human.push_summary("categories", categories.len().to_string());
    for usage in &categories {
        human.push_detail(format!("{} · {} task(s)", describe(&usage.category), usage.tasks));
    }

    let data = CategoryListReport {
        profile: orchestrator.profile().to_string(),
        categories,
    };
    emit_success(session.output, "category list", &data, Some(&human))?;
    session.finish().await
}

pub async fn run_add(name: String, color: String, globals: Globals) -> Result<()> {
    let mut session = Session::open(&globals)?;
    let orchestrator = &mut session.orchestrator;
    let category = orchestrator.add_category(&name, &color)?;

    let mut human = HumanOutput::new(format!("simplr category add: {}", category.name));
    human.push_summary("id", category.id.clone());
    human.push_summary("color", category.color.clone());
    human.push_next_step(format!("simplr task assign \"{}\" <task>", category.name));

    let data = CategoryReport {
        profile: orchestrator.profile().to_string(),
        category,
    };
    emit_success(session.output, "category add", &data, Some(&human))?;
    session.finish().await
}

pub async fn run_rename(
    reference: String,
    name: String,
    color: Option<String>,
    globals: Globals,
) -> Result<()> {
    let mut session = Session::open(&globals)?;
    let orchestrator = &mut session.orchestrator;
    let id = resolve_category_id(orchestrator, &reference)?;
    let category = orchestrator.update_category(&id, Some(&name), color.as_deref())?;

    let mut human = HumanOutput::new(format!("simplr category rename: {}", category.name));
    human.push_detail(describe(&category));

    let data = CategoryReport {
        profile: orchestrator.profile().to_string(),
        category,
    };
    emit_success(session.output, "category rename", &data, Some(&human))?;
    session.finish().await
}

pub async fn run_rm(reference: String, globals: Globals) -> Result<()> {
    let mut session = Session::open(&globals)?;
    let orchestrator = &mut session.orchestrator;
    let id = resolve_category_id(orchestrator, &reference)?;
    let category = orchestrator.delete_category(&id)?;
    let orphaned = orchestrator
        .tasks()
        .iter()
        .filter(|task| task.category_id.as_deref() == Some(id.as_str()))
        .count();

    let mut human = HumanOutput::new(format!("simplr category rm: {}", category.name));
    human.push_summary("id", category.id.clone());
    if orphaned > 0 {
        human.push_summary("tasks now uncategorized", orphaned.to_string());
    }

    let data = CategoryReport {
        profile: orchestrator.profile().to_string(),
        category,
    };
    emit_success(session.output, "category rm", &data, Some(&human))?;
    session.finish().await
}

pub async fn run_repair(globals: Globals) -> Result<()> {
    let mut session = Session::open(&globals)?;
    let orchestrator = &mut session.orchestrator;
    let report = orchestrator.repair_categories()?;

    let header = if report.categories_fixed == 0 {
        "simplr category repair: nothing to repair".to_string()
    } else {
        format!(
            "simplr category repair: {} categor{} fixed",
            report.categories_fixed,
            if report.categories_fixed == 1 { "y" } else { "ies" }
        )
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("categories fixed", report.categories_fixed.to_string());
    human.push_summary("tasks rewritten", report.tasks_rewritten.to_string());

    let data = RepairOutput {
        profile: orchestrator.profile().to_string(),
        report,
    };
    emit_success(session.output, "category repair", &data, Some(&human))?;
    session.finish().await
}
