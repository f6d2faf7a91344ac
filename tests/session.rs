//! Voice session integration tests
//!
//! Join rules against a mock voice gateway

use std::sync::Arc;
use std::time::{Duration, Instant};

use grouch::pipeline::{DropReason, Stage, UtteranceOutcome};
use grouch::session::{JoinError, ReceiverTracker, SessionManager, VoiceGateway};
use grouch::voice::{PlayerRegistry, UtteranceSegment};

mod common;

use common::{
    GatewayBehavior, MockGateway, ScriptedResponder, ScriptedSynthesizer, ScriptedTranscriber,
};

const GUILD: u64 = 100;
const CHANNEL: u64 = 200;

fn manager(gateway: &Arc<MockGateway>, timeout: Duration) -> SessionManager {
    SessionManager::new(
        Arc::clone(gateway) as Arc<dyn VoiceGateway>,
        Arc::new(PlayerRegistry::new()),
        timeout,
    )
}

#[tokio::test]
async fn test_join_outside_voice_makes_no_connection_attempt() {
    let gateway = MockGateway::new(GatewayBehavior::Ready);
    let sessions = manager(&gateway, Duration::from_secs(15));

    let result = sessions.join(GUILD, None).await;

    assert!(matches!(result, Err(JoinError::NotInVoice)));
    assert_eq!(gateway.join_count(), 0);
    assert!(gateway.left().is_empty());
    assert!(!sessions.players().contains(GUILD).await);
}

#[tokio::test]
async fn test_join_creates_player_once() {
    let gateway = MockGateway::new(GatewayBehavior::Ready);
    let sessions = manager(&gateway, Duration::from_secs(15));

    let first = sessions.join(GUILD, Some(CHANNEL)).await.unwrap();
    let second = sessions.join(GUILD, Some(CHANNEL)).await.unwrap();

    assert_eq!(first.channel_id, CHANNEL);
    assert!(first.player_created);
    assert!(!second.player_created);
    assert_eq!(gateway.join_count(), 2);
    assert_eq!(gateway.connection.subscription_count(), 1);
    assert_eq!(sessions.players().len().await, 1);
}

#[tokio::test]
async fn test_join_timeout_abandons_connection() {
    let gateway = MockGateway::new(GatewayBehavior::Hang);
    let sessions = manager(&gateway, Duration::from_millis(50));

    let result = sessions.join(GUILD, Some(CHANNEL)).await;

    assert!(matches!(result, Err(JoinError::NotReady(_))));
    assert_eq!(gateway.left(), vec![GUILD]);
    assert!(!sessions.players().contains(GUILD).await);
}

#[tokio::test]
async fn test_join_failure_abandons_connection() {
    let gateway = MockGateway::new(GatewayBehavior::Fail);
    let sessions = manager(&gateway, Duration::from_secs(15));

    let result = sessions.join(GUILD, Some(CHANNEL)).await;

    let Err(JoinError::NotReady(reason)) = result else {
        panic!("expected NotReady");
    };
    assert!(reason.contains("encryption"));
    assert_eq!(gateway.left(), vec![GUILD]);
}

#[tokio::test]
async fn test_leave_drops_player() {
    let gateway = MockGateway::new(GatewayBehavior::Ready);
    let sessions = manager(&gateway, Duration::from_secs(15));
    sessions.join(GUILD, Some(CHANNEL)).await.unwrap();

    tokio_test::assert_ok!(sessions.leave(GUILD).await);

    assert!(!sessions.players().contains(GUILD).await);
    assert_eq!(gateway.left(), vec![GUILD]);

    let again = sessions.join(GUILD, Some(CHANNEL)).await.unwrap();
    assert!(again.player_created);
}

#[tokio::test]
async fn test_sweep_idle_leaves_stale_guilds() {
    let gateway = MockGateway::new(GatewayBehavior::Ready);
    let sessions = manager(&gateway, Duration::from_secs(15));
    sessions.join(GUILD, Some(CHANNEL)).await.unwrap();

    let idle = Duration::from_secs(1800);
    assert!(sessions.sweep_idle(Instant::now(), idle).await.is_empty());

    let later = Instant::now() + idle + Duration::from_secs(1);
    assert_eq!(sessions.sweep_idle(later, idle).await, vec![GUILD]);
    assert_eq!(gateway.left(), vec![GUILD]);
    assert!(sessions.players().is_empty().await);
}

#[tokio::test]
async fn test_failed_rejoin_drops_stale_player() {
    let gateway = MockGateway::new(GatewayBehavior::Ready);
    let sessions = manager(&gateway, Duration::from_secs(15));
    assert!(sessions.join(GUILD, Some(CHANNEL)).await.unwrap().player_created);

    gateway.set_behavior(GatewayBehavior::Fail);
    assert!(sessions.join(GUILD, Some(CHANNEL)).await.is_err());
    assert_eq!(gateway.left(), vec![GUILD]);
    assert!(!sessions.players().contains(GUILD).await);

    gateway.set_behavior(GatewayBehavior::Ready);
    let again = sessions.join(GUILD, Some(CHANNEL)).await.unwrap();
    assert!(again.player_created);
}

#[tokio::test]
async fn test_late_utterance_after_leave_keeps_session_closed() {
    let gateway = MockGateway::new(GatewayBehavior::Ready);
    let sessions = manager(&gateway, Duration::from_secs(15));
    let pipeline = common::pipeline_with(
        Arc::clone(sessions.players()),
        ScriptedTranscriber::ok("бот, привет"),
        ScriptedResponder::ok("ну что ещё"),
        ScriptedSynthesizer::ok(&[1, 2, 3]),
    );
    sessions.join(GUILD, Some(CHANNEL)).await.unwrap();

    sessions.leave(GUILD).await.unwrap();
    let outcome = pipeline
        .handle_utterance(UtteranceSegment::new(GUILD, 7, vec![0u8; 10_000]))
        .await;

    assert_eq!(
        outcome,
        UtteranceOutcome::Dropped {
            stage: Stage::Playing,
            reason: DropReason::PlaybackFailed,
        }
    );
    assert!(!sessions.players().contains(GUILD).await);
    assert!(gateway.connection.played().is_empty());

    let again = sessions.join(GUILD, Some(CHANNEL)).await.unwrap();
    assert!(again.player_created);
}

#[tokio::test]
async fn test_sweep_then_rejoin_creates_player() {
    let gateway = MockGateway::new(GatewayBehavior::Ready);
    let sessions = manager(&gateway, Duration::from_secs(15));
    sessions.join(GUILD, Some(CHANNEL)).await.unwrap();

    let idle = Duration::from_secs(1800);
    let later = Instant::now() + idle + Duration::from_secs(1);
    assert_eq!(sessions.sweep_idle(later, idle).await, vec![GUILD]);

    let again = sessions.join(GUILD, Some(CHANNEL)).await.unwrap();
    assert!(again.player_created);
}

/// Stand-in for a songbird call
struct Call;

#[test]
fn test_receiver_attached_once_per_call() {
    let tracker = ReceiverTracker::new();
    let call = Arc::new(Call);

    assert!(tracker.needs_receiver(GUILD, &call));
    assert!(!tracker.needs_receiver(GUILD, &call));
    assert!(tracker.needs_receiver(GUILD + 1, &call));
}

#[test]
fn test_receiver_reattached_for_new_call() {
    let tracker = ReceiverTracker::new();
    let first = Arc::new(Call);
    assert!(tracker.needs_receiver(GUILD, &first));

    // same guild, call rebuilt after a leave while the old one is still alive
    let second = Arc::new(Call);
    assert!(tracker.needs_receiver(GUILD, &second));
    assert!(!tracker.needs_receiver(GUILD, &second));

    drop(first);
    drop(second);
    let third = Arc::new(Call);
    assert!(tracker.needs_receiver(GUILD, &third));
}

#[test]
fn test_forgotten_call_needs_receiver() {
    let tracker = ReceiverTracker::new();
    let call = Arc::new(Call);
    assert!(tracker.needs_receiver(GUILD, &call));

    tracker.forget(GUILD);
    assert!(tracker.needs_receiver(GUILD, &call));
}
