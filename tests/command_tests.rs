use quarry::{Engine, QuarryError};
use serde_json::{json, Value};

fn parse(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap()
}

#[test]
fn test_unknown_command() {
    let engine = Engine::new();
    let err = engine.command("frobnicate", &["1"]).unwrap_err();
    assert!(matches!(err, QuarryError::UnknownCommand(_)));
}

#[test]
fn test_now_is_validated() {
    let engine = Engine::new();
    assert!(matches!(
        engine.command("queues", &[]).unwrap_err(),
        QuarryError::InvalidNow(_)
    ));
    assert!(matches!(
        engine.command("queues", &["soon"]).unwrap_err(),
        QuarryError::InvalidNow(_)
    ));
    assert!(matches!(
        engine.command("queues", &["inf"]).unwrap_err(),
        QuarryError::InvalidNow(_)
    ));
}

#[test]
fn test_full_lifecycle_through_commands() {
    let engine = Engine::new();
    let jid = engine
        .command("put", &["100", "q", "j1", "K", "{}", "0"])
        .unwrap();
    assert_eq!(jid, "j1");

    let popped = engine.command("pop", &["101", "q", "w", "1"]).unwrap();
    assert_eq!(parse(&popped), json!(["j1"]));

    let expires = engine.command("heartbeat", &["110", "j1", "w"]).unwrap();
    assert_eq!(expires, "170");

    let state = engine
        .command("complete", &["120", "j1", "w", "q", "{}"])
        .unwrap();
    assert_eq!(state, "complete");

    let doc = parse(&engine.command("get", &["121", "j1"]).unwrap());
    assert_eq!(doc["state"], "complete");
    assert_eq!(doc["history"][0]["put"], 100.0);
}

#[test]
fn test_put_with_option_pairs() {
    let engine = Engine::new();
    engine
        .command(
            "put",
            &[
                "0", "q", "j1", "K", "{}", "0",
                "priority", "5",
                "tags", r#"["a","b"]"#,
                "retries", "2",
            ],
        )
        .unwrap();
    let doc = parse(&engine.command("get", &["1", "j1"]).unwrap());
    assert_eq!(doc["priority"], 5);
    assert_eq!(doc["tags"], json!(["a", "b"]));
    assert_eq!(doc["retries"], 2);

    let err = engine
        .command("put", &["0", "q", "j2", "K", "{}", "0", "color"])
        .unwrap_err();
    assert!(matches!(err, QuarryError::InvalidArguments { .. }));
    let err = engine
        .command("put", &["0", "q", "j2", "K", "{}", "0", "color", "red"])
        .unwrap_err();
    assert!(matches!(err, QuarryError::InvalidArguments { .. }));
}

#[test]
fn test_put_depends_pair_then_complete_chain() {
    let engine = Engine::new();
    engine.command("put", &["0", "q", "p", "K", "{}", "0"]).unwrap();
    engine
        .command(
            "put",
            &["1", "q", "c", "K", "{}", "0", "depends", r#"["p"]"#],
        )
        .unwrap();

    let popped = parse(&engine.command("pop", &["2", "q", "w", "5"]).unwrap());
    assert_eq!(popped, json!(["p"]));

    engine
        .command(
            "complete",
            &["3", "p", "w", "q", "{}", "next", "q2", "delay", "0"],
        )
        .unwrap();
    let doc = parse(&engine.command("get", &["4", "p"]).unwrap());
    assert_eq!(doc["queue"], "q2");
    assert_eq!(doc["state"], "waiting");

    let popped = parse(&engine.command("pop", &["5", "q", "w", "5"]).unwrap());
    assert_eq!(popped, json!(["c"]));
}

#[test]
fn test_peek_returns_documents() {
    let engine = Engine::new();
    engine.command("put", &["0", "q", "j1", "K", "{}", "0"]).unwrap();
    let docs = parse(&engine.command("peek", &["1", "q", "5"]).unwrap());
    assert_eq!(docs[0]["jid"], "j1");
    assert_eq!(docs[0]["state"], "waiting");
}

#[test]
fn test_retry_fail_and_unfail_commands() {
    let engine = Engine::new();
    engine.command("put", &["0", "q", "j1", "K", "{}", "0"]).unwrap();
    engine.command("pop", &["1", "q", "w", "1"]).unwrap();
    assert_eq!(engine.command("retry", &["2", "j1", "q", "w"]).unwrap(), "4");

    engine.command("pop", &["3", "q", "w", "1"]).unwrap();
    assert_eq!(
        engine
            .command("fail", &["4", "j1", "w", "boom", "went sideways"])
            .unwrap(),
        "j1"
    );

    let failed = parse(&engine.command("failed", &["5"]).unwrap());
    assert_eq!(failed["boom"], 1);
    let group = parse(&engine.command("failed", &["5", "boom"]).unwrap());
    assert_eq!(group["jobs"], json!(["j1"]));

    assert_eq!(engine.command("unfail", &["6", "q", "boom"]).unwrap(), "1");
    let doc = parse(&engine.command("get", &["7", "j1"]).unwrap());
    assert_eq!(doc["state"], "waiting");
}

#[test]
fn test_depends_command() {
    let engine = Engine::new();
    engine.command("put", &["0", "q", "p", "K", "{}", "0"]).unwrap();
    engine.command("put", &["1", "q", "c", "K", "{}", "0"]).unwrap();

    assert_eq!(engine.command("depends", &["2", "c", "on", "p"]).unwrap(), "1");
    let doc = parse(&engine.command("get", &["3", "c"]).unwrap());
    assert_eq!(doc["state"], "depends");

    assert_eq!(
        engine.command("depends", &["4", "c", "off", "all"]).unwrap(),
        "0"
    );
    let doc = parse(&engine.command("get", &["5", "c"]).unwrap());
    assert_eq!(doc["state"], "waiting");
}

#[test]
fn test_queue_admin_commands() {
    let engine = Engine::new();
    engine.command("put", &["0", "q", "j1", "K", "{}", "0"]).unwrap();

    assert_eq!(engine.command("pause", &["1", "q"]).unwrap(), "1");
    assert_eq!(
        parse(&engine.command("pop", &["2", "q", "w", "1"]).unwrap()),
        json!([])
    );
    assert_eq!(engine.command("unpause", &["3", "q"]).unwrap(), "1");

    let queues = parse(&engine.command("queues", &["4"]).unwrap());
    assert_eq!(queues[0]["name"], "q");
    assert_eq!(queues[0]["waiting"], 1);
    let one = parse(&engine.command("queues", &["4", "q"]).unwrap());
    assert_eq!(one["name"], "q");

    assert_eq!(engine.command("length", &["5", "q"]).unwrap(), "1");
}

#[test]
fn test_jobs_and_workers_commands() {
    let engine = Engine::new();
    engine.command("put", &["0", "q", "j1", "K", "{}", "0"]).unwrap();
    engine.command("pop", &["1", "q", "w", "1"]).unwrap();
    engine.command("complete", &["2", "j1", "w", "q", "{}"]).unwrap();

    let complete = parse(&engine.command("jobs", &["3", "complete"]).unwrap());
    assert_eq!(complete, json!(["j1"]));

    let workers = parse(&engine.command("workers", &["3"]).unwrap());
    assert_eq!(workers[0]["name"], "w");
    let detail = parse(&engine.command("workers", &["3", "w"]).unwrap());
    assert_eq!(detail["jobs"], json!([]));
}

#[test]
fn test_track_and_tag_commands() {
    let engine = Engine::new();
    engine.command("put", &["0", "q", "j1", "K", "{}", "0"]).unwrap();

    assert_eq!(engine.command("track", &["1", "track", "j1"]).unwrap(), "1");
    assert_eq!(engine.command("track", &["2", "track", "j1"]).unwrap(), "0");
    let info = parse(&engine.command("track", &["3"]).unwrap());
    assert_eq!(info["jobs"][0]["jid"], "j1");
    assert_eq!(
        engine.command("track", &["4", "untrack", "j1"]).unwrap(),
        "1"
    );

    let tags = engine.command("tag", &["5", "add", "j1", "red"]).unwrap();
    assert_eq!(parse(&tags), json!(["red"]));
    let hits = parse(&engine.command("tag", &["6", "get", "red"]).unwrap());
    assert_eq!(hits["total"], 1);
    let tags = engine.command("tag", &["7", "remove", "j1", "red"]).unwrap();
    assert_eq!(parse(&tags), json!([]));
}

#[test]
fn test_stats_command() {
    let engine = Engine::new();
    engine.command("put", &["100", "q", "j1", "K", "{}", "0"]).unwrap();
    engine.command("pop", &["101", "q", "w", "1"]).unwrap();
    engine.command("complete", &["110", "j1", "w", "q", "{}"]).unwrap();

    let stats = parse(&engine.command("stats", &["111", "q", "110"]).unwrap());
    assert_eq!(stats["wait"]["count"], 1);
    assert_eq!(stats["wait"]["mean"], 1.0);
    assert_eq!(stats["run"]["mean"], 9.0);
}

#[test]
fn test_recurring_commands() {
    let engine = Engine::new();
    let jid = engine
        .command(
            "recur",
            &["0", "q", "r", "K", "{}", "interval", "10", "0", "priority", "2"],
        )
        .unwrap();
    assert_eq!(jid, "r");

    let doc = parse(&engine.command("recur.get", &["1", "r"]).unwrap());
    assert_eq!(doc["state"], "recur");
    assert_eq!(doc["priority"], 2);

    engine
        .command("recur.update", &["2", "r", "interval", "50"])
        .unwrap();
    engine.command("recur.tag", &["3", "r", "nightly"]).unwrap();

    let popped = parse(&engine.command("pop", &["5", "q", "w", "1"]).unwrap());
    assert_eq!(popped, json!(["r-1"]));
    let spawned = parse(&engine.command("get", &["6", "r-1"]).unwrap());
    assert_eq!(spawned["tags"], json!(["nightly"]));

    engine.command("recur.untag", &["7", "r", "nightly"]).unwrap();
    assert_eq!(engine.command("unrecur", &["8", "r"]).unwrap(), "r");
    assert!(engine.command("recur.get", &["9", "r"]).is_err());
}

#[test]
fn test_config_commands() {
    let engine = Engine::new();
    assert_eq!(engine.command("config.get", &["0", "heartbeat"]).unwrap(), "60");

    engine.command("config.set", &["1", "heartbeat", "120"]).unwrap();
    assert_eq!(
        engine.command("config.get", &["2", "heartbeat"]).unwrap(),
        "120"
    );

    // Unknown keys are accepted and echoed.
    engine.command("config.set", &["3", "motd", "hello"]).unwrap();
    let all = parse(&engine.command("config.get", &["4"]).unwrap());
    assert_eq!(all["motd"], "hello");
    assert_eq!(all["jobs-history-count"], "50000");

    engine.command("config.unset", &["5", "heartbeat"]).unwrap();
    assert_eq!(
        engine.command("config.get", &["6", "heartbeat"]).unwrap(),
        "60"
    );

    assert_eq!(engine.command("config.get", &["7", "nope"]).unwrap(), "null");
}

#[test]
fn test_cancel_and_priority_commands() {
    let engine = Engine::new();
    engine.command("put", &["0", "q", "j1", "K", "{}", "0"]).unwrap();
    engine.command("put", &["1", "q", "j2", "K", "{}", "0"]).unwrap();

    assert_eq!(engine.command("priority", &["2", "j2", "9"]).unwrap(), "9");
    assert_eq!(engine.command("cancel", &["3", "j1"]).unwrap(), "1");
    assert_eq!(
        parse(&engine.command("pop", &["4", "q", "w", "5"]).unwrap()),
        json!(["j2"])
    );
}

#[test]
fn test_missing_positional_argument() {
    let engine = Engine::new();
    let err = engine.command("put", &["0", "q", "j1"]).unwrap_err();
    assert!(matches!(err, QuarryError::InvalidArguments { .. }));
    let err = engine.command("pop", &["0", "q"]).unwrap_err();
    assert!(matches!(err, QuarryError::InvalidArguments { .. }));
}
