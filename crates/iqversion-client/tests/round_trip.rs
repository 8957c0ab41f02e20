//! Two connections wired back to back: one asks, the other answers.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use iqversion_client::{Connection, VersionRegistry, VersionSettings};
use iqversion_core::protocol::{Jid, SoftwareVersion, Stanza, VersionIq};
use iqversion_core::{ErrorCondition, VersionError};

/// Forward every frame queued on `rx` into `to`.
fn pump(mut rx: mpsc::Receiver<String>, to: Connection) {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            to.deliver(&frame);
        }
    });
}

fn answering(identity: Option<SoftwareVersion>) -> VersionSettings {
    VersionSettings {
        identity,
        request_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

#[tokio::test]
async fn query_resolves_against_responding_peer() {
    let reg = VersionRegistry::new(answering(Some(
        SoftwareVersion::new("Exodus", "0.7.0.4").with_os("Windows-XP 5.01.2600"),
    )));
    let (alice, alice_rx) = Connection::new(16);
    let (bob, bob_rx) = Connection::new(16);
    pump(alice_rx, bob.clone());
    pump(bob_rx, alice.clone());

    let asker = reg.instance_for(&alice);
    reg.instance_for(&bob);

    let v = asker
        .query_version(Jid::new("bob@example.com/desk").unwrap())
        .await
        .expect("version reply");
    assert_eq!(v.name.as_deref(), Some("Exodus"));
    assert_eq!(v.os.as_deref(), Some("Windows-XP 5.01.2600"));
    assert_eq!(asker.pending_requests(), 0);
    assert_eq!(asker.stats().requests_sent, 1);
}

#[tokio::test]
async fn silent_peer_times_out() {
    let reg = VersionRegistry::new(answering(None));
    let (alice, _alice_rx) = Connection::new(16);
    let asker = reg.instance_for(&alice);

    let err = asker
        .query_version_with_timeout(Jid::new("bob@example.com").unwrap(), Duration::from_millis(30))
        .await
        .unwrap_err();
    assert!(matches!(err, VersionError::Timeout));
    assert_eq!(asker.pending_requests(), 0);
    assert_eq!(asker.stats().requests_timed_out, 1);
}

#[tokio::test]
async fn unconfigured_peer_times_out() {
    let reg = VersionRegistry::new(answering(None));
    let (alice, alice_rx) = Connection::new(16);
    let (bob, bob_rx) = Connection::new(16);
    pump(alice_rx, bob.clone());
    pump(bob_rx, alice.clone());
    let asker = reg.instance_for(&alice);
    reg.instance_for(&bob);

    let err = asker
        .query_version(Jid::new("bob@example.com").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, VersionError::Timeout));
}

#[tokio::test]
async fn error_reply_surfaces_condition() {
    let reg = VersionRegistry::new(answering(None));
    let (alice, alice_rx) = Connection::new(16);
    let (bob, bob_rx) = Connection::new(16);
    pump(alice_rx, bob.clone());
    pump(bob_rx, alice.clone());

    // bob refuses instead of answering
    let bob_weak = bob.downgrade();
    bob.subscribe(
        iqversion_client::dispatch::StanzaFilter::version_query(),
        Arc::new(move |s: &Stanza| {
            if let (Some(q), Some(conn)) = (s.as_version(), bob_weak.upgrade()) {
                let _ = conn.send(&VersionIq::error_for(q, ErrorCondition::ServiceUnavailable));
            }
        }),
    );

    let asker = reg.instance_for(&alice);
    let err = asker
        .query_version(Jid::new("bob@example.com").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, VersionError::Remote(ErrorCondition::ServiceUnavailable)));
}

#[tokio::test]
async fn reply_from_wrong_sender_is_ignored() {
    let reg = VersionRegistry::new(answering(None));
    let (alice, mut alice_rx) = Connection::new(16);
    let asker = reg.instance_for(&alice);

    let task = {
        let asker = Arc::clone(&asker);
        tokio::spawn(async move {
            asker
                .query_version_with_timeout(
                    Jid::new("bob@example.com").unwrap(),
                    Duration::from_millis(100),
                )
                .await
        })
    };

    let frame = alice_rx.recv().await.unwrap();
    let request = Stanza::parse(&frame).unwrap().as_version().unwrap().clone();
    let mut forged = VersionIq::result_for(&request, SoftwareVersion::new("Evil", "6.6.6"));
    forged.from = Some(Jid::new("mallory@example.com").unwrap());
    alice.deliver(&forged.to_xml().unwrap());

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, VersionError::Timeout));
}

#[tokio::test]
async fn closed_connection_cannot_query() {
    let reg = VersionRegistry::new(answering(None));
    let (alice, _rx) = Connection::new(16);
    let asker = reg.instance_for(&alice);
    alice.close();

    let err = asker
        .query_version(Jid::new("bob@example.com").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, VersionError::NotConnected));
    assert!(reg.is_empty());
}

#[tokio::test]
async fn error_reply_without_echoed_query_surfaces_condition() {
    let reg = VersionRegistry::new(answering(None));
    let (alice, mut alice_rx) = Connection::new(16);
    let asker = reg.instance_for(&alice);

    let task = {
        let asker = Arc::clone(&asker);
        tokio::spawn(async move {
            asker
                .query_version_with_timeout(
                    Jid::new("juliet@capulet.com").unwrap(),
                    Duration::from_secs(5),
                )
                .await
        })
    };

    let frame = alice_rx.recv().await.unwrap();
    let request = Stanza::parse(&frame).unwrap().as_version().unwrap().clone();
    alice.deliver(&format!(
        "<iq type='error' id='{}' from='juliet@capulet.com'><error type='cancel'>\
         <service-unavailable xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error></iq>",
        request.id
    ));

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, VersionError::Remote(ErrorCondition::ServiceUnavailable)));
    assert_eq!(asker.pending_requests(), 0);
}

#[tokio::test]
async fn abandoned_queries_leave_nothing_pending() {
    let reg = VersionRegistry::new(answering(None));
    let (alice, _alice_rx) = Connection::new(16);
    let asker = reg.instance_for(&alice);

    for _ in 0..5 {
        let outer = tokio::time::timeout(
            Duration::from_millis(5),
            asker.query_version_with_timeout(
                Jid::new("bob@example.com").unwrap(),
                Duration::from_secs(60),
            ),
        )
        .await;
        assert!(outer.is_err(), "inner query must still be waiting");
    }
    assert_eq!(asker.pending_requests(), 0);
    assert_eq!(asker.stats().requests_sent, 5);
    assert_eq!(asker.stats().requests_timed_out, 0);

    let task = {
        let asker = Arc::clone(&asker);
        tokio::spawn(async move {
            asker
                .query_version_with_timeout(
                    Jid::new("bob@example.com").unwrap(),
                    Duration::from_secs(60),
                )
                .await
        })
    };
    while asker.pending_requests() == 0 {
        tokio::task::yield_now().await;
    }
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert_eq!(asker.pending_requests(), 0);
}
