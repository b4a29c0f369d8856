mod common;

use common::{add_member, context, open_store, seed_project, seed_task, OWNER};
use taskflow_core::{
    CommentService, CoreError, EngineConfig, FeedService, FeedSource, MemberRole, NotFound,
    StatusTag, TaskNode, TaskService,
};

#[test]
fn feed_is_newest_first_across_sources() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);
    let task = seed_task(&ctx, project_id, TaskNode::new("Launch").with_assignees([20])).task;
    let comments = CommentService::new(ctx.clone());

    comments.add_comment(task.task_id, 20, "first").unwrap();
    TaskService::new(ctx.clone())
        .change_status(task.task_id, StatusTag::new("IN_PROGRESS").unwrap(), 20)
        .unwrap();
    comments.add_comment(task.task_id, 20, "second").unwrap();

    let feed = FeedService::new(ctx)
        .get_project_feed(project_id, 20, None)
        .unwrap();

    assert!(feed
        .windows(2)
        .all(|pair| pair[0].created_at >= pair[1].created_at));
    assert_eq!(feed[0].source, FeedSource::Comment);
    assert_eq!(feed[0].detail, "second");
    let kinds: Vec<(&str, FeedSource)> = feed
        .iter()
        .map(|entry| (entry.kind.as_str(), entry.source))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("commented", FeedSource::Comment),
            ("status_changed", FeedSource::Activity),
            ("status_changed", FeedSource::History),
            ("commented", FeedSource::Comment),
            ("project_created", FeedSource::Activity),
        ]
    );
    assert_eq!(feed[3].detail, "first");
}

#[test]
fn non_members_cannot_read_the_feed() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);
    let task = seed_task(&ctx, project_id, TaskNode::new("Secret")).task;
    let comments = CommentService::new(ctx.clone());
    for n in 0..5 {
        comments
            .add_comment(task.task_id, OWNER, &format!("note {n}"))
            .unwrap();
    }
    let feeds = FeedService::new(ctx);

    let err = feeds.get_project_feed(project_id, 99, None).unwrap_err();
    assert!(matches!(err, CoreError::Permission(_)));
    let err = feeds
        .get_task_feed(project_id, task.task_id, 99, None)
        .unwrap_err();
    assert!(matches!(err, CoreError::Permission(_)));
    let err = feeds.get_project_feed(404, OWNER, None).unwrap_err();
    assert!(matches!(err, CoreError::Permission(_)));
    let err = feeds.project_history(404, OWNER, None).unwrap_err();
    assert!(matches!(err, CoreError::Permission(_)));
}

#[test]
fn viewers_may_read_the_feed() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);
    add_member(&ctx, project_id, 40, MemberRole::Viewer);

    let feed = FeedService::new(ctx)
        .get_project_feed(project_id, 40, None)
        .unwrap();
    assert!(feed.len() >= 2);
}

#[test]
fn task_feed_is_narrowed_to_one_task() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);
    let other_project = seed_project(&ctx, OWNER);
    let first = seed_task(&ctx, project_id, TaskNode::new("First")).task;
    let second = seed_task(&ctx, project_id, TaskNode::new("Second")).task;
    let foreign = seed_task(&ctx, other_project, TaskNode::new("Foreign")).task;
    let comments = CommentService::new(ctx.clone());
    comments.add_comment(first.task_id, OWNER, "on first").unwrap();
    comments.add_comment(second.task_id, OWNER, "on second").unwrap();
    let feeds = FeedService::new(ctx);

    let feed = feeds
        .get_task_feed(project_id, first.task_id, OWNER, None)
        .unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].task_id, Some(first.task_id));
    assert_eq!(feed[0].detail, "on first");

    let err = feeds
        .get_task_feed(project_id, foreign.task_id, OWNER, None)
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::NotFound(NotFound::TaskInProject { .. })
    ));
}

#[test]
fn limits_are_defaulted_and_capped() {
    let conn = open_store();
    let config = EngineConfig {
        default_feed_limit: 3,
        max_feed_limit: 5,
        ..EngineConfig::default()
    };
    let ctx = context(&conn).with_config(config).unwrap();
    let project_id = seed_project(&ctx, OWNER);
    let task = seed_task(&ctx, project_id, TaskNode::new("Chatty")).task;
    let comments = CommentService::new(ctx.clone());
    for n in 0..8 {
        comments
            .add_comment(task.task_id, OWNER, &format!("comment {n}"))
            .unwrap();
    }
    let feeds = FeedService::new(ctx);

    assert_eq!(feeds.get_project_feed(project_id, OWNER, Some(2)).unwrap().len(), 2);
    assert_eq!(feeds.get_project_feed(project_id, OWNER, None).unwrap().len(), 3);
    assert_eq!(feeds.get_project_feed(project_id, OWNER, Some(0)).unwrap().len(), 3);
    let capped = feeds
        .get_project_feed(project_id, OWNER, Some(1_000))
        .unwrap();
    assert_eq!(capped.len(), 5);
    assert_eq!(capped[0].detail, "comment 7");
}

#[test]
fn mentions_appear_as_activity_entries() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);
    let task = seed_task(&ctx, project_id, TaskNode::new("Review").with_assignees([20])).task;

    CommentService::new(ctx.clone())
        .add_comment(task.task_id, OWNER, "@20 please check, cc @21 @20")
        .unwrap();

    let feed = FeedService::new(ctx)
        .get_task_feed(project_id, task.task_id, 20, None)
        .unwrap();
    let mentions: Vec<&str> = feed
        .iter()
        .filter(|entry| entry.kind == "mentioned")
        .map(|entry| entry.detail.as_str())
        .collect();
    assert_eq!(mentions.len(), 2);
    assert!(mentions.contains(&"@20"));
    assert!(mentions.contains(&"@21"));
    assert_eq!(feed.iter().filter(|entry| entry.kind == "commented").count(), 1);
}

#[test]
fn feed_entries_serialize_with_type_field() {
    let conn = open_store();
    let ctx = context(&conn);
    let project_id = seed_project(&ctx, OWNER);

    let feed = FeedService::new(ctx)
        .get_project_feed(project_id, OWNER, None)
        .unwrap();
    let json = serde_json::to_value(&feed[0]).unwrap();

    assert_eq!(json["type"], "project_created");
    assert_eq!(json["source"], "activity");
    assert_eq!(json["emp_id"], OWNER);
    assert!(json["task_id"].is_null());
}
