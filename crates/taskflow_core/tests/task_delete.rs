mod common;

use common::{context, count_rows, open_store, seed_project, seed_task, OWNER};
use rusqlite::Connection;
use taskflow_core::{
    CommentService, CoreError, FeedService, FeedSource, NotFound, StatusTag, TaskNode,
    TaskService,
};

fn snapshot(conn: &Connection) -> [i64; 4] {
    [
        count_rows(conn, "SELECT COUNT(*) FROM tasks;"),
        count_rows(conn, "SELECT COUNT(*) FROM task_members;"),
        count_rows(conn, "SELECT COUNT(*) FROM task_comments;"),
        count_rows(conn, "SELECT COUNT(*) FROM activity_logs;"),
    ]
}

#[test]
fn outsider_delete_is_rejected_without_changes() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);
    let task = seed_task(
        &ctx,
        project_id,
        TaskNode::new("Keep").with_assignees([20]).with_subtask(TaskNode::new("Child")),
    )
    .task;
    let before = snapshot(&conn);

    let err = TaskService::new(ctx)
        .delete_task(task.task_id, 99)
        .unwrap_err();

    assert!(matches!(err, CoreError::Permission(_)));
    assert_eq!(err.kind().http_status(), 403);
    assert_eq!(snapshot(&conn), before);
}

#[test]
fn deleting_a_root_removes_subtree_but_keeps_history() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);
    let tree = seed_task(
        &ctx,
        project_id,
        TaskNode::new("Root")
            .with_assignees([20])
            .with_subtask(TaskNode::new("Left").with_assignees([21]))
            .with_subtask(
                TaskNode::new("Right").with_subtask(TaskNode::new("Leaf").with_assignees([20, 22])),
            ),
    );
    let survivor = seed_task(&ctx, project_id, TaskNode::new("Survivor").with_assignees([21])).task;
    let leaf_id = tree.find_by_title("Leaf").unwrap().task.task_id;
    let left_id = tree.find_by_title("Left").unwrap().task.task_id;

    let tasks = TaskService::new(ctx.clone());
    CommentService::new(ctx.clone())
        .add_comment(left_id, 21, "looks good")
        .unwrap();
    tasks
        .change_status(leaf_id, StatusTag::new("DONE").unwrap(), 22)
        .unwrap();

    let deleted = tasks.delete_task(tree.task.task_id, OWNER).unwrap();

    assert_eq!(deleted, 4);
    let remaining = tasks.list_project_tasks(project_id, OWNER).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].task_id, survivor.task_id);
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM task_members;"), 1);
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM task_comments;"), 0);
    assert!(matches!(
        tasks.get_task(leaf_id, OWNER),
        Err(CoreError::NotFound(NotFound::Task(_)))
    ));

    let (history_task, changed_by, history_project): (Option<i64>, Option<i64>, Option<i64>) = conn
        .query_row(
            "SELECT task_id, changed_by, project_id FROM task_history;",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(history_task, None);
    assert_eq!(changed_by, Some(22));
    assert_eq!(history_project, Some(project_id));

    let feeds = FeedService::new(ctx);
    let history = feeds.project_history(project_id, OWNER, None).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].task_id, None);
    assert_eq!(history[0].new_status.as_str(), "DONE");

    let feed = feeds.get_project_feed(project_id, OWNER, None).unwrap();
    assert_eq!(feed[0].kind, "task_deleted");
    assert!(feed[0].detail.contains("Root"));
    assert!(feed
        .iter()
        .any(|entry| entry.source == FeedSource::History && entry.task_id.is_none()));
}

#[test]
fn assignee_can_delete_a_leaf_without_touching_parent() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);
    let tree = seed_task(
        &ctx,
        project_id,
        TaskNode::new("Parent").with_subtask(TaskNode::new("Leaf").with_assignees([20])),
    );
    let leaf_id = tree.find_by_title("Leaf").unwrap().task.task_id;
    let tasks = TaskService::new(ctx);

    assert_eq!(tasks.delete_task(leaf_id, 20).unwrap(), 1);

    let parent = tasks.get_task_tree(tree.task.task_id, OWNER).unwrap();
    assert!(parent.subtasks.is_empty());
    assert_eq!(
        count_rows(
            &conn,
            "SELECT COUNT(*) FROM activity_logs WHERE action = 'task_deleted' AND task_id IS NULL;"
        ),
        1
    );
}
