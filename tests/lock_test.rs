//! Lock protocol integration tests.
//!
//! Tests:
//! - A handle is held from acquisition until release or lease expiry
//! - Racers whose writes land within the settle delay have a single winner
//! - Expired markers are taken over without a release
//! - Releasing someone else's lock does nothing

mod common;

use common::{SlowWrites, TestFixture, DAY, DB_KEY, MARKER_KEY, T0};
use std::sync::Arc;
use std::time::Duration;
use stratus::lock::{FileLock, LockMarker, MarkerLock};
use stratus::{Error, FileRef, SessionState};
use tokio_test::{assert_err, assert_ok};

fn marker_lock(fixture: &TestFixture) -> MarkerLock {
    MarkerLock::new(
        Arc::new(fixture.store.clone()),
        fixture.lease,
        fixture.clock.clone(),
    )
}

fn db_file(fixture: &TestFixture) -> FileRef {
    FileRef::shared(DB_KEY, fixture.cache_dir("lock").join("db.sqlite"))
}

#[tokio::test]
async fn test_is_held_until_release() {
    let fixture = TestFixture::new();
    let lock = marker_lock(&fixture);
    let file = db_file(&fixture);

    let mut handle = assert_ok!(lock.acquire(&file, "alice").await);
    assert!(lock.is_held(&handle));

    fixture.advance(3 * DAY);
    assert!(lock.is_held(&handle));

    assert_ok!(lock.release(&file, "alice").await);
    handle.mark_released();
    assert!(!lock.is_held(&handle));
    assert!(fixture.store.peek(MARKER_KEY).is_none());
}

#[tokio::test]
async fn test_is_held_ends_with_lease() {
    let fixture = TestFixture::new();
    let lock = marker_lock(&fixture);
    let file = db_file(&fixture);

    let handle = assert_ok!(lock.acquire(&file, "alice").await);
    fixture.advance(7 * DAY + Duration::from_millis(1));
    assert!(!lock.is_held(&handle));
}

const SETTLE: Duration = Duration::from_millis(200);

/// Lock for a racer whose marker writes take `delay` to land.
fn slow_marker_lock(fixture: &TestFixture, delay: Duration) -> MarkerLock {
    MarkerLock::new(
        Arc::new(SlowWrites::new(&fixture.store, delay)),
        fixture.lease.with_settle(SETTLE),
        fixture.clock.clone(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_racing_clients_have_one_winner() {
    for round in 0..10u64 {
        let fixture = TestFixture::new();
        let file = db_file(&fixture);
        // Write latencies spread over 0..150ms, all below the settle delay.
        let racers: Vec<_> = (0..5u64)
            .map(|i| {
                let delay = Duration::from_millis((round * 7 + i * 13) % 15 * 10);
                (format!("client-{round}-{i}"), slow_marker_lock(&fixture, delay))
            })
            .collect();

        let handles = futures::future::join_all(
            racers.iter().map(|(id, lock)| lock.acquire(&file, id)),
        )
        .await;

        let winners: Vec<_> = handles
            .into_iter()
            .map(|h| h.expect("acquire failed"))
            .filter(|h| h.acquired())
            .collect();
        assert_eq!(winners.len(), 1, "round {round}: expected a single winner");

        let marker = LockMarker::decode(&fixture.store.peek(MARKER_KEY).unwrap()).unwrap();
        assert_eq!(marker.holder, winners[0].holder());
    }
}

#[tokio::test(start_paused = true)]
async fn test_racing_sessions_have_one_checkout() {
    let mut fixture = TestFixture::new();
    fixture.lease = fixture.lease.with_settle(SETTLE);
    fixture.seed(b"shared").await;
    let mut alice = fixture.session("alice");
    let slow = Arc::new(SlowWrites::new(&fixture.store, Duration::from_millis(30)));
    let mut bob = fixture.session_on(slow, "bob");

    let (a, b) = tokio::join!(alice.checkout(), bob.checkout());

    // Bob's marker lands last and is the one both confirm reads see.
    assert!(assert_err!(a).is_lock_denied());
    assert_ok!(b);
    assert!(!alice.is_held());
    assert!(bob.is_held());
}

#[tokio::test]
async fn test_expiry_scenario() {
    let fixture = TestFixture::new();
    fixture.seed(b"v1").await;
    let mut alice = fixture.session("alice");
    let mut bob = fixture.session("bob");

    // A checks out at t=0.
    assert_ok!(alice.checkout().await);

    // B is denied at t=1 and told who holds the lock.
    fixture.advance(Duration::from_millis(1));
    let err = assert_err!(bob.checkout().await);
    match err {
        Error::LockDenied {
            holder,
            holder_name,
            remaining,
        } => {
            assert_eq!(holder, "alice");
            assert_eq!(holder_name.as_deref(), Some("'alice' (name: 'Alice Archer')"));
            assert!(remaining > 6 * DAY);
        }
        other => panic!("expected LockDenied, got {other}"),
    }
    assert_eq!(bob.state(), SessionState::Denied);

    // B succeeds once A's lease has run out, without A releasing.
    fixture.advance(7 * DAY);
    assert_ok!(bob.checkout().await);
    let info = bob.inspect().await.unwrap().unwrap();
    assert_eq!(info.holder, "bob");
    assert_eq!(info.acquired_at, T0 + 1 + 7 * DAY.as_millis() as i64);
}

#[tokio::test]
async fn test_denial_message_is_actionable() {
    let fixture = TestFixture::new();
    fixture.seed(b"v1").await;
    let mut alice = fixture.session("alice");
    assert_ok!(alice.checkout().await);

    fixture.advance(2 * DAY);
    let mut carol = fixture.session("carol");
    let message = carol.checkout().await.unwrap_err().to_string();
    assert!(message.contains("'alice' (name: 'Alice Archer') (uid: 'alice')"), "{message}");
    assert!(message.contains("5d 0h"), "{message}");
}

#[tokio::test]
async fn test_release_by_non_holder_is_noop() {
    let fixture = TestFixture::new();
    let lock = marker_lock(&fixture);
    let file = db_file(&fixture);

    // No marker at all.
    assert_ok!(lock.release(&file, "bob").await);

    assert_ok!(lock.acquire(&file, "alice").await);
    let before = fixture.store.peek(MARKER_KEY);
    assert_ok!(lock.release(&file, "bob").await);
    assert_eq!(fixture.store.peek(MARKER_KEY), before);
}

#[tokio::test]
async fn test_release_does_not_remove_successor_lock() {
    let fixture = TestFixture::new();
    fixture.seed(b"v1").await;
    let mut alice = fixture.session("alice");
    let mut bob = fixture.session("bob");

    assert_ok!(alice.checkout().await);
    fixture.advance(8 * DAY);
    assert_ok!(bob.checkout().await);

    // A comes back after its lease ran out; its release must not touch B's lock.
    assert_ok!(alice.release().await);
    assert_eq!(bob.inspect().await.unwrap().unwrap().holder, "bob");
    assert!(bob.is_held());
}
