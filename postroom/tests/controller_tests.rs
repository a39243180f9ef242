//! Configuration-to-engine tests for the postroom controller
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{io::Write, path::Path, sync::Arc, time::Duration};

use postroom::Postroom;
use postroom_common::{Envelope, MailAddress, Signal, State};
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes()).expect("Failed to write config");
    file
}

#[test]
fn test_sample_config_builds() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../postroom.config.ron");
    let manager = Postroom::load(&path)
        .expect("Sample config should parse")
        .engine()
        .expect("Sample config should build");

    let names: Vec<String> = manager
        .registry()
        .names()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(names, vec!["error", "local", "root", "spam", "transport"]);
}

#[test]
fn test_missing_file_is_reported() {
    let err = Postroom::load(Path::new("/nonexistent/postroom.config.ron")).unwrap_err();
    assert!(err.to_string().starts_with("Failed to read config from /nonexistent"));
}

#[test]
fn test_unknown_mailet_fails_to_build() {
    let file = write_config(
        r#"Postroom(
            postmaster: "postmaster@example.com",
            processors: [
                (name: "root", stages: [(mailet: "RemoteDelivery")]),
                (name: "error"),
            ],
        )"#,
    );

    let err = Postroom::load(file.path()).unwrap().engine().unwrap_err();
    assert_eq!(err.to_string(), "Failed to build processor 'root'");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_engine_routes_mail_until_held() {
    let file = write_config(
        r#"Postroom(
            postmaster: "postmaster@example.com",
            server_name: "mx.example.com",
            manager: (threads: 2, retry_delays: { "held": 3600 }),
            processors: [
                (name: "root", stages: [
                    (matcher: Some("HostIs=example.com"), mailet: "SetAttribute",
                     params: { "local": "true" }),
                    (mailet: "ToProcessor", params: { "processor": "held" }),
                ]),
                (name: "held"),
                (name: "error"),
            ],
        )"#,
    );

    let manager = Postroom::load(file.path()).unwrap().engine().unwrap();
    let spool = Arc::clone(manager.spool());

    let (sender, receiver) = broadcast::channel(4);
    let serving = tokio::spawn(Arc::clone(&manager).serve(receiver));

    let input = Envelope::new(
        Some(MailAddress::parse("sender@example.org").unwrap()),
        [
            MailAddress::parse("a@example.com").unwrap(),
            MailAddress::parse("b@example.net").unwrap(),
        ],
        "Subject: hello\r\n\r\nworld\r\n",
    )
    .unwrap();
    spool.store(&input).await.unwrap();

    let held = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let mut held = Vec::new();
            for id in spool.list().await.unwrap() {
                if let Ok(envelope) = spool.retrieve(&id).await
                    && *envelope.state() == State::new("held")
                {
                    held.push(envelope);
                }
            }
            if held.len() == 2 {
                return held;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Both envelopes should be held");

    let local: Vec<_> = held
        .iter()
        .filter(|e| e.attribute("local").is_some())
        .collect();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].recipients()[0].to_string(), "a@example.com");

    sender.send(Signal::Shutdown).unwrap();
    tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("Manager should stop")
        .unwrap();
}
