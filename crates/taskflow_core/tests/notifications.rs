mod common;

use common::{context, open_store, seed_project, OWNER};
use std::sync::{Arc, Mutex};
use taskflow_core::{
    CommentService, CoreError, FieldPatch, NewProject, Notification, NotificationEvent, Notifier,
    ProjectService, StatusTag, TaskNode, TaskPatch, TaskService,
};

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        self.sent.lock().unwrap().push(notification.clone());
    }
}

fn status(value: &str) -> StatusTag {
    StatusTag::new(value).unwrap()
}

#[test]
fn new_assignees_other_than_the_creator_are_notified() {
    let conn = open_store();
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = context(&conn).with_notifier(notifier.clone());
    let project_id = seed_project(&ctx, OWNER);

    let tree = TaskService::new(ctx)
        .create_task(
            project_id,
            OWNER,
            &TaskNode::new("Design")
                .with_assignees([OWNER, 21, 20])
                .with_subtask(TaskNode::new("Wireframes").with_assignees([21])),
            None,
        )
        .unwrap();

    let sent = notifier.take();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].recipients, vec![20, 21]);
    assert_eq!(sent[0].actor_id, OWNER);
    assert_eq!(sent[0].task_id, Some(tree.task.task_id));
    assert_eq!(
        sent[0].event,
        NotificationEvent::Assignment {
            title: "Design".to_string()
        }
    );
    assert_eq!(sent[1].recipients, vec![21]);
    assert_eq!(sent[1].task_id, Some(tree.subtasks[0].task.task_id));
}

#[test]
fn status_and_progress_changes_reach_the_other_assignees() {
    let conn = open_store();
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = context(&conn).with_notifier(notifier.clone());
    let project_id = seed_project(&ctx, OWNER);
    let tasks = TaskService::new(ctx);
    let task = tasks
        .create_task_tree(
            project_id,
            OWNER,
            &TaskNode::new("Ship").with_assignees([20, 21]),
            None,
        )
        .unwrap()
        .task;
    notifier.take();

    tasks
        .change_status(task.task_id, status("IN_PROGRESS"), 20)
        .unwrap();
    tasks.change_progress(task.task_id, 40, OWNER).unwrap();

    let sent = notifier.take();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].recipients, vec![21]);
    assert_eq!(
        sent[0].event,
        NotificationEvent::StatusChange {
            old_status: task.status.clone(),
            new_status: status("IN_PROGRESS"),
        }
    );
    assert_eq!(sent[1].recipients, vec![20, 21]);
    assert_eq!(
        sent[1].event,
        NotificationEvent::ProgressChange {
            old_progress: 0,
            new_progress: 40,
        }
    );
}

#[test]
fn update_notifies_added_assignees_and_progress() {
    let conn = open_store();
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = context(&conn).with_notifier(notifier.clone());
    let project_id = seed_project(&ctx, OWNER);
    let tasks = TaskService::new(ctx);
    let task = tasks
        .create_task_tree(
            project_id,
            OWNER,
            &TaskNode::new("Ship").with_assignees([20, 21]),
            None,
        )
        .unwrap()
        .task;
    notifier.take();

    let patch = TaskPatch {
        progress: FieldPatch::Set(75),
        ..TaskPatch::assignees([21, 22])
    };
    tasks.update_task(task.task_id, patch, 21).unwrap();

    let sent = notifier.take();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].recipients, vec![22]);
    assert!(matches!(sent[0].event, NotificationEvent::Assignment { .. }));
    assert_eq!(sent[1].recipients, vec![22]);
    assert_eq!(
        sent[1].event,
        NotificationEvent::ProgressChange {
            old_progress: 0,
            new_progress: 75,
        }
    );
}

#[test]
fn mentioned_employees_are_notified_once() {
    let conn = open_store();
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = context(&conn).with_notifier(notifier.clone());
    let project_id = seed_project(&ctx, OWNER);
    let task = TaskService::new(ctx.clone())
        .create_task_tree(
            project_id,
            OWNER,
            &TaskNode::new("Review").with_assignees([20]),
            None,
        )
        .unwrap()
        .task;
    notifier.take();

    let comment = CommentService::new(ctx)
        .add_comment(task.task_id, 20, "@20 asks @30 and @21, cc @30")
        .unwrap();

    let sent = notifier.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec![21, 30]);
    assert_eq!(sent[0].actor_id, 20);
    assert_eq!(
        sent[0].event,
        NotificationEvent::Mention {
            comment_id: comment.comment_id
        }
    );
}

#[test]
fn rejected_or_rolled_back_changes_notify_nobody() {
    let conn = open_store();
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = context(&conn).with_notifier(notifier.clone());
    let project_id = seed_project(&ctx, OWNER);
    let tasks = TaskService::new(ctx.clone());
    let task = tasks
        .create_task_tree(
            project_id,
            OWNER,
            &TaskNode::new("Ship").with_assignees([20, 21]),
            None,
        )
        .unwrap()
        .task;
    notifier.take();

    let err = tasks
        .change_status(task.task_id, status("DONE"), 99)
        .unwrap_err();
    assert!(matches!(err, CoreError::Permission(_)));

    let roots = [
        TaskNode::new("Valid").with_assignees([20]),
        TaskNode::new("   "),
    ];
    ProjectService::new(ctx)
        .create_project_with_tasks(OWNER, &NewProject::named("Gemini"), &[], &roots)
        .unwrap_err();

    assert!(notifier.take().is_empty());
}
