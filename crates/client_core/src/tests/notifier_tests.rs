use tokio::{sync::broadcast::error::TryRecvError, time::advance};

use super::*;

async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn success_notification_clears_after_its_fixed_delay() {
    let notifier = StatusNotifier::new();
    let mut updates = notifier.subscribe();

    notifier.success("Command encrypted!").await;
    assert_eq!(
        updates.recv().await.unwrap(),
        StatusUpdate::Shown {
            status: Status::Success,
            message: "Command encrypted!".into(),
        }
    );
    assert_eq!(notifier.current().await, Some(Status::Success));

    advance(SUCCESS_CLEAR_DELAY - Duration::from_millis(1)).await;
    settle().await;
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));

    advance(Duration::from_millis(2)).await;
    assert_eq!(updates.recv().await.unwrap(), StatusUpdate::Cleared);
    assert_eq!(notifier.current().await, None);
}

#[tokio::test(start_paused = true)]
async fn pending_persists_until_a_terminal_state_replaces_it() {
    let notifier = StatusNotifier::new();
    let mut updates = notifier.subscribe();

    notifier.pending("Processing...").await;
    let _ = updates.recv().await.unwrap();

    advance(Duration::from_secs(300)).await;
    settle().await;
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(notifier.current().await, Some(Status::Pending));

    notifier.error("Submission failed").await;
    assert_eq!(
        updates.recv().await.unwrap(),
        StatusUpdate::Shown {
            status: Status::Error,
            message: "Submission failed".into(),
        }
    );
    advance(ERROR_CLEAR_DELAY + Duration::from_millis(1)).await;
    assert_eq!(updates.recv().await.unwrap(), StatusUpdate::Cleared);
}

#[tokio::test(start_paused = true)]
async fn newer_notification_cancels_the_prior_clear_timer() {
    let notifier = StatusNotifier::new();
    let mut updates = notifier.subscribe();

    notifier.success("Command encrypted!").await;
    notifier.error("Decryption failed").await;
    let _ = updates.recv().await.unwrap();
    let _ = updates.recv().await.unwrap();

    // Past the success delay: the aborted success timer must not fire.
    advance(SUCCESS_CLEAR_DELAY + Duration::from_millis(500)).await;
    settle().await;
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(notifier.current().await, Some(Status::Error));

    advance(ERROR_CLEAR_DELAY).await;
    assert_eq!(updates.recv().await.unwrap(), StatusUpdate::Cleared);
    assert_eq!(notifier.current().await, None);
}
