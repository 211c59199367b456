// File: presencebot-core/tests/session_tests.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use presencebot_common::models::PresenceConfig;
use presencebot_core::session::{Scheduled, Session, SessionState, Wake};
use presencebot_core::test_utils::helpers::{
    session_deps, test_credential, EchoImageResolver, FakeTransportFactory,
};

fn config(delay: u64) -> Arc<PresenceConfig> {
    let mut cfg = PresenceConfig::default_document();
    cfg.setup.delay = delay;
    cfg.slots.text_1 = vec!["{user:name} is live".into()];
    Arc::new(cfg)
}

#[tokio::test(start_paused = true)]
async fn overlapping_publishes_push_once() {
    let factory = FakeTransportFactory::slow(Duration::from_secs(2));
    let deps = session_deps(factory.clone(), Arc::new(EchoImageResolver));
    let session = Session::new("holder", test_credential(1), config(30), deps);
    session.open().await.expect("open");

    let (a, b) = tokio::join!(session.publish_now(), session.publish_now());
    let mut outcomes = [a.expect("first"), b.expect("second")];
    outcomes.sort();
    assert_eq!(outcomes, [false, true]);
    assert_eq!(factory.payloads().len(), 1);
    assert_eq!(session.publish_count(), 1);

    assert!(session.publish_now().await.expect("third"));
    assert_eq!(factory.payloads().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn tick_during_a_manual_publish_is_a_no_op() {
    let factory = FakeTransportFactory::slow(Duration::from_secs(2));
    let deps = session_deps(factory.clone(), Arc::new(EchoImageResolver));
    let session = Session::new("holder", test_credential(1), config(10), deps);
    session.open().await.expect("open");

    let manual = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.publish_now().await })
    };
    tokio::task::yield_now().await;

    let next = session.tick().await;
    assert_eq!(next, Scheduled::new(Wake::Publish, Duration::from_secs(10)));
    assert!(manual.await.expect("join").expect("publish"));
    assert_eq!(factory.payloads().len(), 1);
    assert_eq!(session.publish_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn stalled_cycle_retries_after_a_fixed_delay() {
    let factory = FakeTransportFactory::slow(Duration::from_secs(120));
    let deps = session_deps(factory.clone(), Arc::new(EchoImageResolver));
    let session = Session::new("holder", test_credential(1), config(10), deps);
    session.open().await.expect("open");

    let next = session.tick().await;
    assert_eq!(next, Scheduled::new(Wake::Publish, Duration::from_secs(30)));
    assert!(factory.payloads().is_empty());
    assert_eq!(session.publish_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn loop_publishes_on_its_interval() {
    let factory = FakeTransportFactory::healthy();
    let deps = session_deps(factory.clone(), Arc::new(EchoImageResolver));
    let session = Session::new("holder", test_credential(1), config(10), deps);
    session.start().await.expect("start");

    sleep(Duration::from_secs(25)).await;
    // t=0, t=10, t=20
    assert_eq!(factory.payloads().len(), 3);
    let payload = factory.last_payload().expect("payload");
    assert_eq!(payload.details.as_deref(), Some("tester is live"));
    assert_eq!(session.state(), SessionState::Publishing);

    session.stop().await;
    session.stop().await;
    assert_eq!(session.state(), SessionState::Terminated);
    sleep(Duration::from_secs(30)).await;
    assert_eq!(factory.payloads().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn short_delay_is_floored() {
    let factory = FakeTransportFactory::healthy();
    let deps = session_deps(factory.clone(), Arc::new(EchoImageResolver));
    let session = Session::new("holder", test_credential(1), config(1), deps);
    assert_eq!(session.publish_interval(), Duration::from_secs(5));
    session.start().await.expect("start");

    sleep(Duration::from_secs(12)).await;
    // t=0, t=5, t=10
    assert_eq!(factory.payloads().len(), 3);
    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_degradation_cools_down_then_recovers() {
    let factory = FakeTransportFactory::healthy_after(6);
    let deps = session_deps(factory.clone(), Arc::new(EchoImageResolver));
    let session = Session::new("holder", test_credential(1), config(10), deps);
    session.start().await.expect("start");

    // reconnects at t=10,20,30,40,50; the sixth detection at t=50 cools down
    sleep(Duration::from_secs(45)).await;
    assert_eq!(factory.created(), 5);
    assert_eq!(session.state(), SessionState::Reconnecting);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(factory.created(), 6);
    let snap = session.snapshot();
    assert_eq!(snap.state, SessionState::CoolingDown);
    assert_eq!(snap.restart_count, 5);
    assert!(snap.cooldown_until.is_some());
    assert!(factory.payloads().is_empty());

    sleep(Duration::from_secs(800)).await;
    assert_eq!(factory.created(), 6);

    sleep(Duration::from_secs(120)).await;
    assert_eq!(factory.created(), 7);
    let snap = session.snapshot();
    assert_eq!(snap.restart_count, 0);
    assert!(snap.cooldown_until.is_none());
    assert!(snap.publish_count >= 1);

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn high_latency_counts_as_degraded() {
    let factory = FakeTransportFactory::healthy();
    let deps = session_deps(factory.clone(), Arc::new(EchoImageResolver));
    let session = Session::new("holder", test_credential(1), config(10), deps);
    session.start().await.expect("start");
    sleep(Duration::from_secs(1)).await;
    assert_eq!(factory.payloads().len(), 1);

    factory.set_latency(Some(Duration::from_millis(6_000)));
    sleep(Duration::from_secs(10)).await;
    assert_eq!(session.snapshot().restart_count, 1);
    assert_eq!(factory.payloads().len(), 1);

    factory.set_latency(Some(Duration::from_millis(80)));
    sleep(Duration::from_secs(15)).await;
    assert_eq!(factory.created(), 2);
    assert_eq!(session.snapshot().restart_count, 0);
    assert!(factory.payloads().len() >= 2);

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn rejected_reconnect_terminates_the_session() {
    let factory = FakeTransportFactory::healthy_after(1);
    let deps = session_deps(factory.clone(), Arc::new(EchoImageResolver));
    let session = Session::new("holder", test_credential(1), config(10), deps);
    session.start().await.expect("start");

    factory.set_reject_auth(true);
    sleep(Duration::from_secs(15)).await;
    assert!(session.is_terminated());
    assert_eq!(factory.created(), 2);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(factory.created(), 2);
}
