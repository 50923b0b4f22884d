//! End-to-end lead flow over the mock notifier: dispatch, racing claims,
//! result submission.

use leadcall_core::testing::{MockNotifier, NotifierCall};
use leadcall_core::{
    ChannelId, ClaimAffordance, ClaimError, ClaimantId, ConversationState, LeadService,
    LeadStatus, MessageUpdate, Notifier, SharedSecret, SubscriberRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

const CHANNEL_A: ChannelId = ChannelId(-1001);
const CHANNEL_B: ChannelId = ChannelId(-1002);

fn service(mock: &Arc<MockNotifier>) -> LeadService {
    let registry = SubscriberRegistry::new(SharedSecret::new("open sesame"));
    registry
        .authorize(CHANNEL_A, "open sesame")
        .expect("channel A registers");
    registry
        .authorize(CHANNEL_B, "open sesame")
        .expect("channel B registers");
    let notifier: Arc<dyn Notifier> = mock.clone();
    LeadService::new(registry, notifier)
}

fn updates_for(mock: &MockNotifier, wanted: impl Fn(&MessageUpdate) -> bool) -> Vec<ChannelId> {
    let mut channels: Vec<ChannelId> = mock
        .updates()
        .into_iter()
        .filter_map(|call| match call {
            NotifierCall::Update {
                channel, update, ..
            } if wanted(&update) => Some(channel),
            _ => None,
        })
        .collect();
    channels.sort();
    channels
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn alice_is_claimed_once_and_resolved_everywhere() {
    let mock = Arc::new(MockNotifier::new());
    mock.set_latency(Duration::from_millis(2));
    let service = service(&mock);

    let lead_id = service.dispatcher().submit("Alice", "+1-555-0100").await;
    assert_eq!(lead_id, 0);
    let lead = service.store().lead(lead_id).expect("lead exists");
    assert_eq!(
        lead.handles.channels().collect::<Vec<_>>(),
        vec![CHANNEL_B, CHANNEL_A]
    );
    assert!(mock.sends().iter().all(|call| matches!(
        call,
        NotifierCall::Send { affordance: ClaimAffordance::Offer(0), .. }
    )));

    let barrier = Arc::new(Barrier::new(2));
    let contenders = [(ClaimantId(10), "User X"), (ClaimantId(20), "User Y")];
    let mut tasks = Vec::new();
    for (claimant, name) in contenders {
        let service = service.clone();
        let barrier = Arc::clone(&barrier);
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            (
                claimant,
                name,
                service.arbiter().claim(lead_id, claimant, name).await,
            )
        }));
    }

    let mut winner = None;
    for task in tasks {
        let (claimant, name, outcome) = task.await.expect("claim task joins");
        match outcome {
            Ok(session) => {
                assert!(winner.is_none(), "two claims succeeded");
                assert_eq!(session.state, ConversationState::AwaitingResult);
                winner = Some((claimant, name, session));
            }
            Err(err) => assert_eq!(err, ClaimError::AlreadyTaken(lead_id)),
        }
    }
    let (claimant, name, session) = winner.expect("one claim succeeded");

    assert_eq!(
        updates_for(&mock, |update| *update == MessageUpdate::DisableClaim),
        vec![CHANNEL_B, CHANNEL_A]
    );

    let done = service
        .conversation()
        .submit_result(&session, "Called back, interested")
        .await
        .expect("result saves");
    assert_eq!(done.state, ConversationState::Completed);

    let lead = service.store().lead(lead_id).expect("lead exists");
    assert_eq!(lead.status(), LeadStatus::Resolved);
    assert_eq!(lead.taken_by, Some(claimant));
    assert_eq!(lead.taker_display_name.as_deref(), Some(name));

    let finals = mock
        .updates()
        .into_iter()
        .filter_map(|call| match call {
            NotifierCall::Update {
                channel,
                update: MessageUpdate::ReplaceText(text),
                ..
            } => Some((channel, text)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(finals.len(), 2);
    for (_, text) in finals {
        assert!(text.contains("Alice"));
        assert!(text.contains(name));
        assert!(text.contains("Called back, interested"));
    }
}

#[tokio::test]
async fn claimant_can_take_a_new_lead_after_cancelling() {
    let mock = Arc::new(MockNotifier::new());
    let service = service(&mock);

    let first = service.dispatcher().submit("A", "1").await;
    let second = service.dispatcher().submit("B", "2").await;
    let claimant = ClaimantId(5);

    service
        .arbiter()
        .claim(first, claimant, "Eve")
        .await
        .expect("first claim wins");
    let busy = service
        .arbiter()
        .claim(second, claimant, "Eve")
        .await
        .expect_err("one session at a time");
    assert_eq!(
        busy,
        ClaimError::SessionActive {
            claimant,
            lead_id: first
        }
    );

    service
        .conversation()
        .cancel_for(claimant)
        .expect("cancel succeeds");
    let first_lead = service.store().lead(first).expect("lead exists");
    assert_eq!(first_lead.status(), LeadStatus::Claimed);
    assert_eq!(first_lead.result, None);

    service
        .arbiter()
        .claim(second, claimant, "Eve")
        .await
        .expect("free to claim again");
    let retry = service
        .arbiter()
        .claim(first, ClaimantId(6), "Mallory")
        .await
        .expect_err("cancelled lead stays claimed");
    assert_eq!(retry, ClaimError::AlreadyTaken(first));
}

#[tokio::test]
async fn failing_channel_never_blocks_the_rest() {
    let mock = Arc::new(MockNotifier::new());
    mock.fail_channel(CHANNEL_A);
    let service = service(&mock);

    let dispatched = service.dispatcher().dispatch("Alice", "1").await;
    assert_eq!(dispatched.report.delivered, vec![CHANNEL_B]);
    let lead = service
        .store()
        .lead(dispatched.lead_id)
        .expect("lead exists");
    assert_eq!(lead.handles.channels().collect::<Vec<_>>(), vec![CHANNEL_B]);

    let session = service
        .arbiter()
        .claim(dispatched.lead_id, ClaimantId(1), "X")
        .await
        .expect("claim wins");
    service
        .conversation()
        .submit_result(&session, "no answer")
        .await
        .expect("result saves");

    let touched = updates_for(&mock, |_| true);
    assert_eq!(touched, vec![CHANNEL_B, CHANNEL_B]);
}
