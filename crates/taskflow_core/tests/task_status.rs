mod common;

use common::{context, count_rows, open_store, seed_project, seed_task, OWNER};
use taskflow_core::{
    CoreError, EngineConfig, FeedService, FeedSource, SameStatusPolicy, StatusTag, TaskNode,
    TaskPatch, TaskService, ValidationError,
};

fn status(value: &str) -> StatusTag {
    StatusTag::new(value).unwrap()
}

#[test]
fn status_change_appends_history_and_activity_log() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);
    let task = seed_task(
        &ctx,
        project_id,
        TaskNode::new("Build")
            .with_assignees([20])
            .with_status(status("IN_PROGRESS")),
    )
    .task;

    let updated = TaskService::new(ctx.clone())
        .change_status(task.task_id, status("DONE"), 20)
        .unwrap();
    assert_eq!(updated.status.as_str(), "DONE");

    let feeds = FeedService::new(ctx);
    let history = feeds
        .task_history(project_id, task.task_id, 20, None)
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_status.as_str(), "IN_PROGRESS");
    assert_eq!(history[0].new_status.as_str(), "DONE");
    assert_eq!(history[0].changed_by, Some(20));

    let feed = feeds
        .get_task_feed(project_id, task.task_id, 20, None)
        .unwrap();
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].source, FeedSource::Activity);
    assert_eq!(feed[0].kind, "status_changed");
    assert_eq!(feed[0].detail, "IN_PROGRESS → DONE");
    assert_eq!(feed[0].emp_id, Some(20));
    assert_eq!(feed[1].source, FeedSource::History);
    assert_eq!(feed[1].detail, "IN_PROGRESS → DONE");
}

#[test]
fn every_transition_records_its_prior_status() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);
    let task = seed_task(&ctx, project_id, TaskNode::new("Cycle")).task;
    let tasks = TaskService::new(ctx.clone());

    let path = ["TODO", "IN_PROGRESS", "REVIEW", "IN_PROGRESS", "DONE"];
    for next in path {
        tasks.change_status(task.task_id, status(next), OWNER).unwrap();
    }

    let history = FeedService::new(ctx)
        .task_history(project_id, task.task_id, OWNER, None)
        .unwrap();
    assert_eq!(history.len(), path.len());
    let mut transitions: Vec<(String, String)> = history
        .iter()
        .map(|h| (h.old_status.to_string(), h.new_status.to_string()))
        .collect();
    transitions.reverse();
    let expected: Vec<(String, String)> = ["PLANNED"]
        .iter()
        .chain(path.iter())
        .zip(path.iter())
        .map(|(old, new)| (old.to_string(), new.to_string()))
        .collect();
    assert_eq!(transitions, expected);
}

#[test]
fn same_status_is_recorded_by_default() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);
    let task = seed_task(&ctx, project_id, TaskNode::new("Idle")).task;

    TaskService::new(ctx)
        .change_status(task.task_id, StatusTag::planned(), OWNER)
        .unwrap();

    assert_eq!(
        count_rows(
            &conn,
            "SELECT COUNT(*) FROM task_history WHERE old_status = new_status;"
        ),
        1
    );
}

#[test]
fn same_status_is_a_no_op_under_skip_policy() {
    let conn = open_store();
    let config = EngineConfig {
        same_status_policy: SameStatusPolicy::Skip,
        ..EngineConfig::default()
    };
    let ctx = context(&conn).with_config(config).unwrap();
    let project_id = seed_project(&ctx, OWNER);
    let task = seed_task(&ctx, project_id, TaskNode::new("Idle")).task;

    let unchanged = TaskService::new(ctx)
        .change_status(task.task_id, StatusTag::planned(), OWNER)
        .unwrap();

    assert_eq!(unchanged, task);
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM task_history;"), 0);
    assert_eq!(
        count_rows(
            &conn,
            "SELECT COUNT(*) FROM activity_logs WHERE action = 'status_changed';"
        ),
        0
    );
}

#[test]
fn unknown_status_tags_are_accepted() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);
    let task = seed_task(&ctx, project_id, TaskNode::new("Vendor")).task;

    let blocked = status("BLOCKED_EXTERNAL");
    assert!(!blocked.is_known());
    let updated = TaskService::new(ctx)
        .change_status(task.task_id, blocked.clone(), OWNER)
        .unwrap();
    assert_eq!(updated.status, blocked);
}

#[test]
fn outsiders_cannot_change_status() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);
    let task = seed_task(&ctx, project_id, TaskNode::new("Guarded").with_assignees([20])).task;
    let tasks = TaskService::new(ctx);

    let err = tasks
        .change_status(task.task_id, status("DONE"), 21)
        .unwrap_err();
    assert!(matches!(err, CoreError::Permission(_)));
    assert_eq!(tasks.get_task(task.task_id, OWNER).unwrap().status, StatusTag::planned());
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM task_history;"), 0);
}

#[test]
fn progress_out_of_range_leaves_task_unchanged() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);
    let task = seed_task(&ctx, project_id, TaskNode::new("Measure").with_assignees([20])).task;
    let tasks = TaskService::new(ctx);

    tasks.change_progress(task.task_id, 40, 20).unwrap();
    let err = tasks.change_progress(task.task_id, 150, 20).unwrap_err();

    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::ProgressOutOfRange(150))
    ));
    assert_eq!(tasks.get_task(task.task_id, 20).unwrap().progress, 40);
    let detail: String = conn
        .query_row(
            "SELECT detail FROM activity_logs WHERE action = 'progress_changed';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(detail, "0% → 40%");
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM task_history;"), 0);
}

#[test]
fn field_update_of_status_skips_history_by_default() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);
    let task = seed_task(&ctx, project_id, TaskNode::new("Quiet")).task;

    let patch = TaskPatch {
        status: taskflow_core::FieldPatch::Set(status("DONE")),
        ..TaskPatch::default()
    };
    let updated = TaskService::new(ctx)
        .update_task(task.task_id, patch, OWNER)
        .unwrap();

    assert_eq!(updated.status.as_str(), "DONE");
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM task_history;"), 0);
    let detail: String = conn
        .query_row(
            "SELECT detail FROM activity_logs WHERE action = 'task_updated';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(detail, "status");
}

#[test]
fn field_update_of_status_records_history_when_configured() {
    let conn = open_store();
    let config = EngineConfig {
        history_on_field_update: true,
        ..EngineConfig::default()
    };
    let ctx = context(&conn).with_config(config).unwrap();
    let project_id = seed_project(&ctx, OWNER);
    let task = seed_task(&ctx, project_id, TaskNode::new("Loud")).task;

    let patch: TaskPatch = serde_json::from_str(r#"{"status": "REVIEW"}"#).unwrap();
    TaskService::new(ctx.clone())
        .update_task(task.task_id, patch, OWNER)
        .unwrap();

    let history = FeedService::new(ctx)
        .task_history(project_id, task.task_id, OWNER, None)
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].new_status.as_str(), "REVIEW");
    assert_eq!(
        count_rows(
            &conn,
            "SELECT COUNT(*) FROM activity_logs WHERE action = 'task_updated';"
        ),
        0
    );
}
