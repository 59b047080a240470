use quarry::{CompleteOptions, Engine, PutOptions, QuarryError};

fn put(engine: &Engine, now: f64, jid: &str) {
    engine
        .put(now, "q", jid, "K", "{}", 0.0, PutOptions::default())
        .unwrap();
}

#[test]
fn test_put_pop_complete_round_trip() {
    let engine = Engine::new();
    put(&engine, 100.0, "j1");

    let popped = engine.pop(101.0, "q", "w", 1).unwrap();
    assert_eq!(popped, vec!["j1"]);

    let doc = engine.get("j1").unwrap();
    assert_eq!(doc["state"], "running");
    assert_eq!(doc["worker"], "w");
    assert_eq!(doc["expires"], 161.0);

    let state = engine
        .complete(110.0, "j1", "w", "q", Some("{}"), CompleteOptions::default())
        .unwrap();
    assert_eq!(state, "complete");

    let doc = engine.get("j1").unwrap();
    assert_eq!(doc["state"], "complete");
    assert_eq!(doc["queue"], "");
    assert_eq!(doc["worker"], "");

    // History carries the full put <= popped <= completed trail.
    let history = doc["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["put"], 100.0);
    assert_eq!(history[0]["popped"], 101.0);
    assert_eq!(history[0]["completed"], 110.0);
    assert_eq!(history[0]["worker"], "w");
}

#[test]
fn test_complete_requires_running_state() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    let err = engine
        .complete(1.0, "j1", "w", "q", None, CompleteOptions::default())
        .unwrap_err();
    assert!(matches!(err, QuarryError::JobNotRunning { .. }));
}

#[test]
fn test_complete_fences_worker_and_queue() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    engine.pop(0.0, "q", "w", 1).unwrap();

    let err = engine
        .complete(1.0, "j1", "intruder", "q", None, CompleteOptions::default())
        .unwrap_err();
    assert!(matches!(err, QuarryError::WorkerMismatch { .. }));

    let err = engine
        .complete(1.0, "j1", "w", "other", None, CompleteOptions::default())
        .unwrap_err();
    assert!(matches!(err, QuarryError::QueueMismatch { .. }));

    // The failed attempts left the job untouched.
    assert_eq!(engine.get("j1").unwrap()["state"], "running");
}

#[test]
fn test_complete_with_next_advances_queue() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    engine.pop(1.0, "q", "w", 1).unwrap();

    let state = engine
        .complete(
            5.0,
            "j1",
            "w",
            "q",
            None,
            CompleteOptions {
                next: Some("later".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(state, "waiting");

    let doc = engine.get("j1").unwrap();
    assert_eq!(doc["state"], "waiting");
    assert_eq!(doc["queue"], "later");
    let history = doc["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1]["q"], "later");

    assert_eq!(engine.pop(6.0, "later", "w2", 1).unwrap(), vec!["j1"]);
}

#[test]
fn test_complete_with_next_restores_retry_budget() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    engine.pop(0.0, "q", "wA", 1).unwrap();

    // Lose one lease: reclamation spends a retry before wB takes over.
    assert_eq!(engine.pop(61.0, "q", "wB", 1).unwrap(), vec!["j1"]);
    assert_eq!(engine.get("j1").unwrap()["remaining"], 4);

    engine
        .complete(
            62.0,
            "j1",
            "wB",
            "q",
            None,
            CompleteOptions {
                next: Some("later".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    // The next queue sees a full budget, same as a fresh put.
    let doc = engine.get("j1").unwrap();
    assert_eq!(doc["queue"], "later");
    assert_eq!(doc["retries"], 5);
    assert_eq!(doc["remaining"], 5);
}

#[test]
fn test_complete_with_next_and_delay_schedules() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    engine.pop(1.0, "q", "w", 1).unwrap();

    let state = engine
        .complete(
            5.0,
            "j1",
            "w",
            "q",
            None,
            CompleteOptions {
                next: Some("later".to_string()),
                delay: 30.0,
                depends: Vec::new(),
            },
        )
        .unwrap();
    assert_eq!(state, "scheduled");
    assert!(engine.pop(10.0, "later", "w", 1).unwrap().is_empty());
    assert_eq!(engine.pop(36.0, "later", "w", 1).unwrap(), vec!["j1"]);
}

#[test]
fn test_complete_delay_without_next_is_rejected() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    engine.pop(1.0, "q", "w", 1).unwrap();
    let err = engine
        .complete(
            2.0,
            "j1",
            "w",
            "q",
            None,
            CompleteOptions {
                next: None,
                delay: 10.0,
                depends: Vec::new(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, QuarryError::InvalidArguments { .. }));
    assert_eq!(engine.get("j1").unwrap()["state"], "running");
}

#[test]
fn test_fail_moves_job_into_group() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    engine.pop(1.0, "q", "w", 1).unwrap();

    engine
        .fail(2.0, "j1", "w", "boom", "stack overflow", None)
        .unwrap();

    let doc = engine.get("j1").unwrap();
    assert_eq!(doc["state"], "failed");
    assert_eq!(doc["worker"], "");
    assert_eq!(doc["failure"]["group"], "boom");
    assert_eq!(doc["failure"]["message"], "stack overflow");
    assert_eq!(doc["failure"]["when"], 2.0);
    assert_eq!(doc["failure"]["worker"], "w");
    assert_eq!(doc["history"][0]["failed"], 2.0);

    let failed = engine.failed_info(None, 0, 25);
    assert_eq!(failed["boom"], 1);
    let group = engine.failed_info(Some("boom"), 0, 25);
    assert_eq!(group["total"], 1);
    assert_eq!(group["jobs"][0], "j1");

    // A failed job is not dispatchable.
    assert!(engine.pop(3.0, "q", "w", 1).unwrap().is_empty());
}

#[test]
fn test_fail_requires_lease() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    let err = engine.fail(1.0, "j1", "w", "boom", "nope", None).unwrap_err();
    assert!(matches!(err, QuarryError::JobNotRunning { .. }));

    engine.pop(1.0, "q", "w", 1).unwrap();
    let err = engine
        .fail(2.0, "j1", "other", "boom", "nope", None)
        .unwrap_err();
    assert!(matches!(err, QuarryError::WorkerMismatch { .. }));
}

#[test]
fn test_put_on_failed_job_revives_it() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    engine.pop(1.0, "q", "w", 1).unwrap();
    engine.fail(2.0, "j1", "w", "boom", "oops", None).unwrap();

    engine
        .put(3.0, "q2", "j1", "K", "{}", 0.0, PutOptions::default())
        .unwrap();
    let doc = engine.get("j1").unwrap();
    assert_eq!(doc["state"], "waiting");
    assert_eq!(doc["queue"], "q2");
    assert_eq!(doc["failure"], serde_json::json!({}));
    // The group emptied out with it.
    assert_eq!(engine.failed_info(None, 0, 25), serde_json::json!({}));
}

#[test]
fn test_retry_requeues_with_decrement() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    engine.pop(1.0, "q", "w", 1).unwrap();

    let remaining = engine.retry(2.0, "j1", "q", "w", 0.0).unwrap();
    assert_eq!(remaining, 4);
    let doc = engine.get("j1").unwrap();
    assert_eq!(doc["state"], "waiting");
    assert_eq!(doc["remaining"], 4);

    assert_eq!(engine.pop(3.0, "q", "w", 1).unwrap(), vec!["j1"]);
}

#[test]
fn test_retry_with_delay_schedules() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    engine.pop(1.0, "q", "w", 1).unwrap();
    engine.retry(2.0, "j1", "q", "w", 20.0).unwrap();

    assert_eq!(engine.get("j1").unwrap()["state"], "scheduled");
    assert!(engine.pop(10.0, "q", "w", 1).unwrap().is_empty());
    assert_eq!(engine.pop(23.0, "q", "w", 1).unwrap(), vec!["j1"]);
}

#[test]
fn test_retry_exhaustion_fails_job() {
    let engine = Engine::new();
    engine
        .put(
            0.0,
            "q",
            "j1",
            "K",
            "{}",
            0.0,
            PutOptions {
                retries: Some(0),
                ..Default::default()
            },
        )
        .unwrap();
    engine.pop(1.0, "q", "w", 1).unwrap();

    let remaining = engine.retry(2.0, "j1", "q", "w", 0.0).unwrap();
    assert_eq!(remaining, -1);
    let doc = engine.get("j1").unwrap();
    assert_eq!(doc["state"], "failed");
    assert_eq!(doc["failure"]["group"], "failed-retries-q");
}

#[test]
fn test_heartbeat_extends_lease() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    engine.pop(1.0, "q", "w", 1).unwrap();

    let expires = engine.heartbeat(30.0, "j1", "w", None).unwrap();
    assert_eq!(expires, 90.0);
    assert_eq!(engine.get("j1").unwrap()["expires"], 90.0);

    // The refreshed lease survives past the original expiry.
    assert!(engine.pop(62.0, "q", "thief", 1).unwrap().is_empty());
    assert_eq!(engine.get("j1").unwrap()["worker"], "w");
}

#[test]
fn test_heartbeat_honors_queue_override() {
    let engine = Engine::new();
    engine.config_set("q-heartbeat", "10");
    put(&engine, 0.0, "j1");
    engine.pop(0.0, "q", "w", 1).unwrap();
    assert_eq!(engine.get("j1").unwrap()["expires"], 10.0);
    assert_eq!(engine.heartbeat(5.0, "j1", "w", None).unwrap(), 15.0);
}

#[test]
fn test_heartbeat_fences_worker() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    engine.pop(1.0, "q", "w", 1).unwrap();
    let err = engine.heartbeat(2.0, "j1", "other", None).unwrap_err();
    assert!(matches!(err, QuarryError::WorkerMismatch { .. }));
}

#[test]
fn test_heartbeat_replaces_data() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    engine.pop(1.0, "q", "w", 1).unwrap();
    engine
        .heartbeat(2.0, "j1", "w", Some(r#"{"progress":50}"#))
        .unwrap();
    assert_eq!(engine.get("j1").unwrap()["data"], r#"{"progress":50}"#);
}

#[test]
fn test_put_revokes_running_lease() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    engine.pop(1.0, "q", "w", 1).unwrap();

    // Re-putting a leased job yanks it back from the worker.
    put(&engine, 2.0, "j1");
    let doc = engine.get("j1").unwrap();
    assert_eq!(doc["state"], "waiting");
    assert_eq!(doc["worker"], "");
    assert_eq!(doc["remaining"], 5);

    let err = engine
        .complete(3.0, "j1", "w", "q", None, CompleteOptions::default())
        .unwrap_err();
    assert!(matches!(err, QuarryError::JobNotRunning { .. }));
}

#[test]
fn test_put_is_idempotent_on_indices() {
    let engine = Engine::new();
    put(&engine, 0.0, "j1");
    engine
        .put(1.0, "q2", "j1", "K", "{}", 0.0, PutOptions::default())
        .unwrap();

    // The job lives in exactly the new queue.
    assert_eq!(engine.length("q"), 0);
    assert_eq!(engine.length("q2"), 1);
    assert_eq!(engine.pop(2.0, "q", "w", 10).unwrap().len(), 0);
    assert_eq!(engine.pop(2.0, "q2", "w", 10).unwrap(), vec!["j1"]);
}

#[test]
fn test_completed_history_count_retention() {
    let engine = Engine::new();
    engine.config_set("jobs-history-count", "1");
    for jid in ["j1", "j2"] {
        put(&engine, 0.0, jid);
    }
    engine.pop(1.0, "q", "w", 2).unwrap();
    engine
        .complete(2.0, "j1", "w", "q", None, CompleteOptions::default())
        .unwrap();
    engine
        .complete(3.0, "j2", "w", "q", None, CompleteOptions::default())
        .unwrap();

    // Only the newest completed job survives the cap.
    assert!(matches!(
        engine.get("j1").unwrap_err(),
        QuarryError::JobNotFound(_)
    ));
    assert_eq!(engine.get("j2").unwrap()["state"], "complete");
    assert_eq!(engine.jobs(3.0, "complete", "", 0, 25).unwrap(), vec!["j2"]);
}

#[test]
fn test_completed_history_window_retention() {
    let engine = Engine::new();
    engine.config_set("jobs-history", "100");
    put(&engine, 0.0, "j1");
    engine.pop(1.0, "q", "w", 1).unwrap();
    engine
        .complete(2.0, "j1", "w", "q", None, CompleteOptions::default())
        .unwrap();

    put(&engine, 200.0, "j2");
    engine.pop(200.0, "q", "w", 1).unwrap();
    engine
        .complete(201.0, "j2", "w", "q", None, CompleteOptions::default())
        .unwrap();

    assert!(engine.get("j1").is_err());
    assert!(engine.get("j2").is_ok());
}

#[test]
fn test_invalid_data_is_rejected_before_any_write() {
    let engine = Engine::new();
    let err = engine
        .put(0.0, "q", "j1", "K", "not json", 0.0, PutOptions::default())
        .unwrap_err();
    assert!(matches!(err, QuarryError::InvalidArguments { .. }));
    assert!(engine.get("j1").is_err());
    assert_eq!(engine.length("q"), 0);
}
