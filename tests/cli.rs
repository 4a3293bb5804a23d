mod support;

use chrono::{Duration, Utc};
use predicates::prelude::*;
use serde_json::Value;

use support::{json_output, simplr_cmd, TestData};

fn add_task(data: &TestData, args: &[&str]) -> Value {
    let output = data
        .cmd()
        .args(["task", "add"])
        .args(args)
        .arg("--json")
        .output()
        .expect("run task add");
    assert!(output.status.success(), "task add failed: {output:?}");
    json_output(&output)["data"]["task"].clone()
}

fn task_list(data: &TestData, extra: &[&str]) -> Value {
    let output = data
        .cmd()
        .args(["task", "list", "--json"])
        .args(extra)
        .output()
        .expect("run task list");
    assert!(output.status.success());
    json_output(&output)["data"].clone()
}

#[test]
fn help_lists_command_groups() {
    simplr_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("task"))
        .stdout(predicate::str::contains("category"))
        .stdout(predicate::str::contains("profile"))
        .stdout(predicate::str::contains("maintain"));
}

#[test]
fn task_add_json_envelope() {
    let data = TestData::init();
    let output = data
        .cmd()
        .args(["task", "add", "Buy oat milk", "--due", "today", "--category", "shopping", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let json = json_output(&output);
    assert_eq!(json["schema_version"], "simplr.v1");
    assert_eq!(json["command"], "task add");
    assert_eq!(json["status"], "success");
    let task = &json["data"]["task"];
    assert_eq!(task["title"], "Buy oat milk");
    assert_eq!(task["status"], "due_today");
    assert_eq!(task["categoryId"], "builtin.shopping");
    assert_eq!(task["category"]["name"], "Shopping");
    assert_eq!(json["data"]["profile"], "personal");

    let stored = data.read_json("tasks.json");
    assert_eq!(stored.as_array().map(Vec::len), Some(1));
}

#[test]
fn task_add_human_output() {
    let data = TestData::init();
    data.cmd()
        .args(["task", "add", "Water plants"])
        .assert()
        .success()
        .stdout(predicate::str::contains("simplr task add: Water plants"))
        .stdout(predicate::str::contains("simplr task list"));
}

#[test]
fn done_undo_and_rm_round_trip_through_storage() {
    let data = TestData::init();
    let id = add_task(&data, &["Renew passport"])["id"]
        .as_str()
        .expect("id")
        .to_string();
    let prefix = &id[..8];

    data.cmd().args(["task", "done", prefix]).assert().success();
    let listed = task_list(&data, &["--filter", "completed"]);
    assert_eq!(listed["tasks"][0]["completed"], true);
    assert!(listed["tasks"][0]["completedAt"].is_string());

    data.cmd().args(["task", "undo", prefix]).assert().success();
    let listed = task_list(&data, &["--filter", "all"]);
    assert_eq!(listed["tasks"][0]["completed"], false);
    assert!(listed["tasks"][0].get("completedAt").is_none());

    data.cmd().args(["task", "rm", &id]).assert().success();
    assert_eq!(task_list(&data, &[])["total"], 0);
}

#[test]
fn list_filter_is_remembered_per_profile() {
    let data = TestData::init();
    add_task(&data, &["open one"]);
    let done = add_task(&data, &["finished"])["id"].as_str().expect("id").to_string();
    data.cmd().args(["task", "done", &done]).assert().success();

    let active = task_list(&data, &["--filter", "active"]);
    assert_eq!(active["filter"], "active");
    assert_eq!(active["tasks"].as_array().map(Vec::len), Some(1));

    let again = task_list(&data, &[]);
    assert_eq!(again["filter"], "active");
    assert_eq!(again["total"], 2);

    let work = task_list(&data, &["--profile", "work"]);
    assert_eq!(work["filter"], "all");
}

#[test]
fn edit_sets_and_clears_fields() {
    let data = TestData::init();
    let id = add_task(&data, &["Draft", "--remind", "+2h", "--category", "work"])["id"]
        .as_str()
        .expect("id")
        .to_string();

    let output = data
        .cmd()
        .args(["task", "edit", &id, "--title", "Final", "--no-remind", "--no-category", "--json"])
        .output()
        .expect("run edit");
    assert!(output.status.success());
    let task = &json_output(&output)["data"]["task"];
    assert_eq!(task["title"], "Final");
    assert_eq!(task["hasReminder"], false);
    assert!(task.get("categoryId").is_none());

    let reminders = data.read_json("os/reminders.json");
    assert!(reminders.get(&id).is_none());

    data.cmd()
        .args(["task", "edit", &id])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("nothing to edit"));
}

#[test]
fn reminder_is_listed_and_cancelled_on_completion() {
    let data = TestData::init();
    let id = add_task(&data, &["Call dentist", "--remind", "+2h"])["id"]
        .as_str()
        .expect("id")
        .to_string();

    let output = data.cmd().args(["reminders", "--json"]).output().expect("run");
    assert!(output.status.success());
    let reminders = &json_output(&output)["data"]["reminders"];
    assert_eq!(reminders.as_array().map(Vec::len), Some(1));
    assert_eq!(reminders[0]["id"], id.as_str());
    assert_eq!(reminders[0]["title"], "Call dentist");
    assert_eq!(reminders[0]["body"], "Task reminder");
    assert_eq!(reminders[0]["in_profile"], true);

    data.cmd().args(["task", "done", &id]).assert().success();
    let output = data.cmd().args(["reminders", "--json"]).output().expect("run");
    assert_eq!(
        json_output(&output)["data"]["reminders"].as_array().map(Vec::len),
        Some(0)
    );
}

#[test]
fn past_reminder_warns_but_saves() {
    let data = TestData::init();
    let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
    let output = data
        .cmd()
        .args(["task", "add", "Too late", "--remind", &past, "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let json = json_output(&output);
    assert!(json["warnings"][0]
        .as_str()
        .expect("warning")
        .contains("in the past"));
    assert_eq!(task_list(&data, &[])["total"], 1);
}

#[test]
fn search_finds_indexed_tasks_by_prefix() {
    let data = TestData::init();
    add_task(&data, &["Buy oat milk", "--category", "shopping"]);
    add_task(&data, &["Call plumber"]);

    let output = data.cmd().args(["search", "oat", "--json"]).output().expect("run");
    assert!(output.status.success());
    let results = &json_output(&output)["data"]["results"];
    assert_eq!(results.as_array().map(Vec::len), Some(1));
    assert_eq!(results[0]["title"], "Buy oat milk");
    assert!(results[0]["summary"].as_str().expect("summary").ends_with("Shopping"));

    data.cmd()
        .args(["search", "shop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Buy oat milk"));
}

#[test]
fn badge_tracks_active_tasks() {
    let data = TestData::init();
    add_task(&data, &["undated"]);
    add_task(&data, &["later", "--due", "2999-01-01"]);
    assert_eq!(data.read_json("os/badge.json")["count"], 1);

    let output = data.cmd().args(["badge", "show", "--json"]).output().expect("run");
    let json = json_output(&output);
    assert_eq!(json["data"]["shown"], 1);
    assert_eq!(json["data"]["expected"], 1);

    data.write_file("os/badge.json", "{\"count\": 9, \"updated_at\": \"2026-01-01T00:00:00Z\"}")
        .expect("tamper badge");
    let output = data.cmd().args(["badge", "refresh", "--json"]).output().expect("run");
    assert!(output.status.success());
    assert_eq!(json_output(&output)["data"]["expected"], 1);
    assert_eq!(data.read_json("os/badge.json")["count"], 1);
}

#[test]
fn category_lifecycle_and_builtin_protection() {
    let data = TestData::init();
    data.cmd()
        .args(["category", "add", "Errands", "--color", "yellow"])
        .assert()
        .success();
    let id = add_task(&data, &["Post office", "--category", "errands"])["id"]
        .as_str()
        .expect("id")
        .to_string();

    data.cmd()
        .args(["category", "rename", "Errands", "Chores"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Chores"));
    let listed = task_list(&data, &[]);
    assert_eq!(listed["tasks"][0]["category"]["name"], "Chores");

    let output = data.cmd().args(["category", "list", "--json"]).output().expect("run");
    let categories = json_output(&output)["data"]["categories"].clone();
    let chores = categories
        .as_array()
        .expect("categories")
        .iter()
        .find(|category| category["name"] == "Chores")
        .expect("renamed category")
        .clone();
    assert_eq!(chores["tasks"], 1);
    assert_eq!(chores["isCustom"], true);

    data.cmd().args(["category", "rm", "Chores"]).assert().success();
    let listed = task_list(&data, &[]);
    assert_eq!(listed["tasks"][0]["id"], id.as_str());
    assert_eq!(listed["tasks"][0]["category"]["name"], "Uncategorized");

    data.cmd()
        .args(["category", "rm", "Work"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn profiles_keep_separate_task_lists() {
    let data = TestData::init();
    add_task(&data, &["personal errand", "--remind", "+3h"]);

    let output = data
        .cmd()
        .args(["profile", "switch", "work", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let json = json_output(&output);
    assert_eq!(json["data"]["previous"], "personal");
    assert_eq!(json["data"]["current"], "work");
    assert_eq!(json["data"]["switched"], true);
    assert_eq!(json["data"]["tasks"], 0);
    assert_eq!(data.read_json("os/badge.json")["count"], 0);
    assert_eq!(
        std::fs::read_to_string(data.path().join("active_profile"))
            .expect("active profile")
            .trim(),
        "work"
    );

    add_task(&data, &["work report"]);
    assert!(data.path().join("work_tasks.json").exists());
    assert_eq!(task_list(&data, &[])["tasks"][0]["title"], "work report");

    let output = data.cmd().args(["reminders", "--json"]).output().expect("run");
    let reminders = &json_output(&output)["data"]["reminders"];
    assert_eq!(reminders[0]["title"], "personal errand");
    assert_eq!(reminders[0]["in_profile"], false);

    let output = data
        .cmd()
        .args(["profile", "switch", "work", "--json"])
        .output()
        .expect("run");
    assert_eq!(json_output(&output)["data"]["switched"], false);

    let personal = task_list(&data, &["--profile", "personal"]);
    assert_eq!(personal["tasks"][0]["title"], "personal errand");
}

#[test]
fn unknown_profile_is_a_user_error() {
    let data = TestData::init();
    data.cmd()
        .args(["profile", "switch", "school"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn maintain_purges_expired_completed_tasks() {
    let data = TestData::init();
    let now = Utc::now();
    let tasks = serde_json::json!([
        {
            "id": "old-done",
            "title": "old",
            "completed": true,
            "createdAt": (now - Duration::days(20)).to_rfc3339(),
            "completedAt": (now - Duration::days(8)).to_rfc3339()
        },
        {
            "id": "fresh-done",
            "title": "fresh",
            "completed": true,
            "createdAt": (now - Duration::days(3)).to_rfc3339(),
            "completedAt": (now - Duration::days(1)).to_rfc3339()
        },
        {
            "id": "open",
            "title": "still open",
            "createdAt": (now - Duration::days(30)).to_rfc3339()
        }
    ]);
    data.write_file("tasks.json", &tasks.to_string()).expect("seed tasks");

    let output = data.cmd().args(["maintain", "--json"]).output().expect("run");
    assert!(output.status.success());
    let json = json_output(&output);
    assert_eq!(json["data"]["removed"], serde_json::json!(["old-done"]));
    assert_eq!(json["data"]["reindexed"], 2);
    assert_eq!(json["data"]["badge"], 1);

    let stored = data.read_json("tasks.json");
    let ids: Vec<&str> = stored
        .as_array()
        .expect("tasks")
        .iter()
        .filter_map(|task| task["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["fresh-done", "open"]);

    let index = data.read_json("os/search-index.json");
    assert!(index.get("old-done").is_none());
    assert!(index.get("open").is_some());
}

fn seed_completed(data: &TestData, days_ago: i64) {
    let now = Utc::now();
    let tasks = serde_json::json!([{
        "id": "done-task",
        "title": "done",
        "completed": true,
        "createdAt": (now - Duration::days(days_ago + 1)).to_rfc3339(),
        "completedAt": (now - Duration::days(days_ago)).to_rfc3339()
    }]);
    data.write_file("tasks.json", &tasks.to_string()).expect("seed tasks");
}

#[test]
fn retention_window_comes_from_config() {
    let data = TestData::init();
    data.write_config("[retention]\ncompleted_days = 1\n[badge]\ndebounce_ms = 10\n")
        .expect("config");
    seed_completed(&data, 2);

    data.cmd()
        .args(["maintain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 expired task(s) removed"));
}

#[test]
fn invalid_retention_keeps_default_window() {
    let data = TestData::init();
    data.write_config("[retention]\ncompleted_days = 0\n").expect("config");
    seed_completed(&data, 2);

    data.cmd()
        .args(["maintain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 expired task(s) removed"));
}

#[test]
fn invalid_config_falls_back_to_defaults() {
    let data = TestData::init();
    data.write_config("this = [not valid").expect("config");
    add_task(&data, &["still works"]);
    assert_eq!(task_list(&data, &[])["total"], 1);
}

#[test]
fn events_are_written_as_jsonl() {
    let data = TestData::init();
    let events_path = data.path().join("events.jsonl");
    let events_arg = events_path.to_string_lossy().to_string();

    data.cmd()
        .args(["--events", &events_arg, "task", "add", "Evented"])
        .assert()
        .success();

    let contents = std::fs::read_to_string(&events_path).expect("events file");
    let events: Vec<Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).expect("event json"))
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["schema_version"], "simplr.event.v1");
    assert_eq!(events[0]["event"], "task_created");
    assert_eq!(events[0]["profile"], "personal");
    assert_eq!(events[0]["data"]["title"], "Evented");
}

#[test]
fn unknown_task_reports_json_error() {
    let data = TestData::init();
    let output = data
        .cmd()
        .args(["task", "done", "does-not-exist", "--json"])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(2));
    let json = json_output(&output);
    assert_eq!(json["status"], "error");
    assert_eq!(json["command"], "task done");
    assert_eq!(json["error"]["code"], 2);
}

#[test]
fn checklist_items_toggle_by_index() {
    let data = TestData::init();
    let id = add_task(&data, &["Pack", "--check", "passport", "--quick", "snacks"])["id"]
        .as_str()
        .expect("id")
        .to_string();

    data.cmd().args(["task", "check", &id, "1"]).assert().success();
    data.cmd()
        .args(["task", "check", &id, "1", "--quick"])
        .assert()
        .success();

    let task = &task_list(&data, &[])["tasks"][0];
    assert_eq!(task["checklist"][0]["completed"], true);
    assert_eq!(task["quickList"][0]["completed"], true);
    assert!(task["quickList"][0]["completedAt"].is_string());

    data.cmd()
        .args(["task", "check", &id, "5"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn move_reorders_tasks() {
    let data = TestData::init();
    add_task(&data, &["first"]);
    let second = add_task(&data, &["second"])["id"].as_str().expect("id").to_string();

    data.cmd().args(["task", "move", &second, "1"]).assert().success();
    let listed = task_list(&data, &[]);
    assert_eq!(listed["tasks"][0]["title"], "second");
    assert_eq!(listed["tasks"][1]["title"], "first");
}
