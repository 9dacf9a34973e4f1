//! On-disk behaviour: reopening a database, config round-trips and the
//! shipped argon2 verifier

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use muster::{
    Actor, CalendarInput, Config, DeskDb, DeskError, NewTicket, ParentRef, RequestContext, Role,
    Services, Severity, TicketStatus,
};
use tempfile::TempDir;

fn open(config: &Config) -> Services {
    let db = Arc::new(DeskDb::open(&config.storage_dir).unwrap().with_default_timeout(config.op_timeout()));
    Services::new(db, config).unwrap()
}

fn spawn_report() -> NewTicket {
    NewTicket {
        category: "ServerAdmin".into(),
        title: "Broken Spawn".into(),
        body: "details".into(),
        severity: Severity::new(8).unwrap(),
        assignee: None,
    }
}

fn config_in(temp: &TempDir) -> Config {
    Config {
        storage_dir: temp.path().to_path_buf(),
        ..Config::default()
    }
}

#[test]
fn test_state_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

    let ticket_id = {
        let desk = open(&config);
        let root = desk.identity.register("root@example.org", "Root", "pw1").unwrap();
        let ctx = RequestContext::new(Actor::from(&root));

        let ticket = desk
            .tickets
            .create(
                &ctx,
                NewTicket {
                    category: "ServerAdmin".into(),
                    title: "Broken Spawn".into(),
                    body: "details".into(),
                    severity: Severity::new(8).unwrap(),
                    assignee: None,
                },
            )
            .unwrap();
        desk.tickets.resolve(&ctx, ticket.id).unwrap();
        desk.discussion.post(&ctx, ParentRef::Ticket(ticket.id), "fixed").unwrap();
        desk.calendar
            .upsert(
                &ctx,
                day,
                CalendarInput {
                    time: "20:00".into(),
                    timezone: Some("UTC".into()),
                    location: "Discord".into(),
                    mission_body: "CQB drills".into(),
                },
            )
            .unwrap();
        desk.calendar.rsvp(&ctx, day, "root@example.org").unwrap();
        ticket.id
    };

    let desk = open(&config);
    let root = desk.identity.authenticate("root@example.org", "pw1").unwrap();
    assert_eq!(root.role, Role::SuperAdmin);
    let ctx = RequestContext::new(Actor::from(&root));

    let ticket = desk.tickets.get(&ctx, ticket_id).unwrap();
    assert_eq!(ticket.status, TicketStatus::Resolved);
    assert_eq!(desk.discussion.list_for(&ctx, ParentRef::Ticket(ticket_id)).unwrap().len(), 1);

    let entry = desk.calendar.get(&ctx, day).unwrap();
    assert!(entry.attendance.contains("root@example.org"));
    assert_eq!(entry.timezone.as_deref(), Some("UTC"));
}

#[test]
fn test_wrong_secret_rejected_with_argon2() {
    let temp = TempDir::new().unwrap();
    let desk = open(&config_in(&temp));
    desk.identity.register("root@example.org", "Root", "pw1").unwrap();

    assert!(matches!(
        desk.identity.authenticate("root@example.org", "pw2"),
        Err(DeskError::InvalidCredentials)
    ));
}

#[test]
fn test_saved_config_drives_services() {
    let temp = TempDir::new().unwrap();
    let mut config = config_in(&temp);
    config.bootstrap_identifier = "armasupplyguy@example.org".into();
    config.first_account_is_admin = false;
    config.save(config.config_path()).unwrap();

    let loaded = Config::load(config.config_path()).unwrap();
    let desk = open(&loaded);

    let first = desk.identity.register("opa@example.org", "Op A", "pw").unwrap();
    assert_eq!(first.role, Role::Pending);

    let boss = desk
        .identity
        .register("ArmaSupplyGuy@example.org", "Supply", "pw")
        .unwrap();
    assert_eq!(boss.role, Role::SuperAdmin);
}

#[test]
fn test_deadline_bounds_wait_on_another_writer() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    let desk = open(&config);
    let root = desk.identity.register("root@example.org", "Root", "pw1").unwrap();
    let ctx = RequestContext::new(Actor::from(&root));

    // Another process holds the write lock
    let other = rusqlite::Connection::open(config.database_path()).unwrap();
    other.execute_batch("BEGIN IMMEDIATE").unwrap();

    let started = Instant::now();
    let result = desk
        .tickets
        .create(&ctx.clone().with_timeout(Duration::from_millis(100)), spawn_report());
    assert!(matches!(result, Err(DeskError::Timeout(_))), "{:?}", result);
    assert!(started.elapsed() < Duration::from_secs(2));

    other.execute_batch("ROLLBACK").unwrap();
    assert!(desk.tickets.create(&ctx, spawn_report()).is_ok());
}

#[test]
fn test_purge_failing_midway_keeps_ticket_and_discussion() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    let desk = open(&config);
    let root = desk.identity.register("root@example.org", "Root", "pw1").unwrap();
    let ctx = RequestContext::new(Actor::from(&root));

    let ticket = desk.tickets.create(&ctx, spawn_report()).unwrap();
    let parent = ParentRef::Ticket(ticket.id);
    desk.discussion.post(&ctx, parent, "investigating").unwrap();
    desk.discussion.post(&ctx, parent, "still broken").unwrap();

    // Discussion rows go first; the ticket delete then aborts
    let other = rusqlite::Connection::open(config.database_path()).unwrap();
    other
        .execute_batch(
            "CREATE TRIGGER hold_tickets BEFORE DELETE ON tickets
             BEGIN SELECT RAISE(ABORT, 'tickets are held'); END;",
        )
        .unwrap();

    let mut events = desk.events.subscribe();
    assert!(desk.tickets.purge(&ctx, ticket.id).is_err());
    assert!(events.try_recv().is_err());

    other.execute_batch("DROP TRIGGER hold_tickets").unwrap();
    assert_eq!(desk.tickets.get(&ctx, ticket.id).unwrap().id, ticket.id);
    assert_eq!(desk.discussion.list_for(&ctx, parent).unwrap().len(), 2);
}
