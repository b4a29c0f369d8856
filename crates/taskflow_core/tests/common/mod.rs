#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use rusqlite::Connection;
use std::sync::Arc;
use taskflow_core::{
    open_db_in_memory, CoreContext, ManualClock, MemberRole, NewProject, ProjectService, TaskNode,
    TaskService, TaskTree,
};

pub const OWNER: i64 = 10;

pub fn open_store() -> Connection {
    open_db_in_memory().unwrap()
}

/// Context whose clock advances one second per reading.
pub fn context(conn: &Connection) -> CoreContext<'_> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    CoreContext::new(conn).with_clock(Arc::new(ManualClock::stepping(start, 1_000)))
}

pub fn seed_project(ctx: &CoreContext<'_>, owner: i64) -> i64 {
    ProjectService::new(ctx.clone())
        .create_project(owner, &NewProject::named("Apollo"))
        .unwrap()
        .project_id
}

pub fn seed_task(ctx: &CoreContext<'_>, project_id: i64, node: TaskNode) -> TaskTree {
    TaskService::new(ctx.clone())
        .create_task_tree(project_id, OWNER, &node, None)
        .unwrap()
}

pub fn add_member(ctx: &CoreContext<'_>, project_id: i64, emp_id: i64, role: MemberRole) {
    ProjectService::new(ctx.clone())
        .add_member(project_id, OWNER, emp_id, role)
        .unwrap();
}

pub fn count_rows(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}
