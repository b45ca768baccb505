mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockConnection, confirmed_status, pending_status, test_signature};
use solana_hash::Hash;
use solana_keypair::Keypair;
use solana_signer::Signer;
use solana_system_interface::instruction as system_instruction;
use solana_transaction::versioned::VersionedTransaction;
use tx_lander::connection::{ConnectionError, ProviderConnection};
use tx_lander::{ConfirmationOptions, RetryPolicy, RetrySender, SenderError, TransactionBuilder};

fn transfer_transaction() -> anyhow::Result<VersionedTransaction> {
    let payer = Keypair::new();
    let recipient = solana_pubkey::Pubkey::new_unique();
    let transaction = TransactionBuilder::new(payer.pubkey())
        .add_instruction(system_instruction::transfer(&payer.pubkey(), &recipient, 1))
        .build_and_sign(Hash::new_from_array([9_u8; 32]), &[&payer])?;
    Ok(transaction)
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        deadline: Duration::from_secs(8),
        retry_interval: Duration::from_secs(1),
        poll_min_delay: Duration::from_millis(50),
        poll_max_delay: Duration::from_millis(200),
    }
}

fn sender_over(connections: Vec<Arc<MockConnection>>) -> anyhow::Result<RetrySender> {
    let connections = connections
        .into_iter()
        .map(|connection| connection as Arc<dyn ProviderConnection>)
        .collect();
    Ok(RetrySender::with_config(connections, ConfirmationOptions::default(), fast_policy())?)
}

#[tokio::test(start_paused = true)]
async fn confirms_after_polling_through_not_found() -> anyhow::Result<()> {
    let connection = Arc::new(
        MockConnection::new("http://primary")
            .script_status(Ok(None))
            .script_status(Ok(None))
            .script_status(Ok(Some(confirmed_status(42)))),
    );
    let sender = sender_over(vec![connection.clone()])?;

    let signature = sender.send(&transfer_transaction()?).await?;
    let confirmed = sender.try_confirm(None).await?;

    assert_eq!(confirmed.signature, signature);
    assert_eq!(confirmed.slot, 42);
    assert!(confirmed.err.is_none());
    assert!(sender.is_done());
    assert_eq!(connection.status_calls(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pending_status_keeps_polling_until_commitment_reached() -> anyhow::Result<()> {
    let connection = Arc::new(
        MockConnection::new("http://primary")
            .script_status(Ok(Some(pending_status(40))))
            .script_status(Ok(Some(confirmed_status(41)))),
    );
    let sender = sender_over(vec![connection.clone()])?;

    sender.send(&transfer_transaction()?).await?;
    let confirmed = sender.try_confirm(None).await?;

    assert_eq!(confirmed.slot, 41);
    assert_eq!(connection.status_calls(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn execution_error_is_a_confirmation_not_an_error() -> anyhow::Result<()> {
    let mut status = confirmed_status(50);
    status.err = Some(serde_json::json!({"InstructionError": [0, "Custom"]}));
    let connection =
        Arc::new(MockConnection::new("http://primary").script_status(Ok(Some(status))));
    let sender = sender_over(vec![connection])?;

    sender.send(&transfer_transaction()?).await?;
    let confirmed = sender.try_confirm(None).await?;

    assert_eq!(confirmed.slot, 50);
    assert!(confirmed.err.is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn confirmation_result_is_cached_and_idempotent() -> anyhow::Result<()> {
    let connection = Arc::new(
        MockConnection::new("http://primary").script_status(Ok(Some(confirmed_status(42)))),
    );
    let sender = sender_over(vec![connection.clone()])?;

    sender.send(&transfer_transaction()?).await?;
    let first = sender.try_confirm(None).await?;
    let calls_after_first = connection.status_calls();

    let second = sender.try_confirm(None).await?;
    assert_eq!(first, second);
    assert_eq!(connection.status_calls(), calls_after_first);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrent_confirm_callers_share_the_result() -> anyhow::Result<()> {
    let connection = Arc::new(
        MockConnection::new("http://primary").script_status(Ok(Some(confirmed_status(42)))),
    );
    let sender = Arc::new(sender_over(vec![connection])?);
    sender.send(&transfer_transaction()?).await?;

    let (first, second) = tokio::join!(sender.try_confirm(None), sender.try_confirm(None));
    let first = first?;
    let second = second?;
    assert_eq!(first, second);
    assert_eq!(first.slot, 42);
    Ok(())
}

#[tokio::test]
async fn confirm_before_send_is_a_usage_error() -> anyhow::Result<()> {
    let connection = Arc::new(MockConnection::new("http://primary"));
    let sender = sender_over(vec![connection.clone()])?;

    let result = sender.try_confirm(None).await;
    assert!(matches!(result, Err(SenderError::NotSent)));
    assert_eq!(connection.status_calls(), 0);
    assert_eq!(connection.send_calls(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn second_send_is_rejected() -> anyhow::Result<()> {
    let connection = Arc::new(MockConnection::new("http://primary"));
    let sender = sender_over(vec![connection])?;

    sender.send(&transfer_transaction()?).await?;
    let result = sender.send(&transfer_transaction()?).await;
    assert!(matches!(result, Err(SenderError::AlreadySent)));
    Ok(())
}

#[tokio::test]
async fn malformed_tracked_signature_never_touches_the_network() -> anyhow::Result<()> {
    let connection = Arc::new(MockConnection::new("http://primary"));
    let sender = sender_over(vec![connection.clone()])?;

    let result = sender.track_signature("definitely-not-base58!");
    assert!(matches!(result, Err(SenderError::InvalidSignature { .. })));
    assert_eq!(connection.status_calls(), 0);
    assert_eq!(connection.send_calls(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn tracked_signature_confirms_without_a_broadcast() -> anyhow::Result<()> {
    let connection = Arc::new(
        MockConnection::new("http://primary").script_status(Ok(Some(confirmed_status(7)))),
    );
    let sender = sender_over(vec![connection.clone()])?;

    let external = test_signature(5);
    let adopted = sender.track_signature(&external.to_string())?;
    assert_eq!(adopted, external);

    let confirmed = sender.try_confirm(None).await?;
    assert_eq!(confirmed.signature, external);
    assert_eq!(connection.send_calls(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn initial_send_failure_is_fatal_and_starts_no_retries() -> anyhow::Result<()> {
    let connection = Arc::new(MockConnection::new("http://primary").with_send_default(Err(
        ConnectionError::Rpc { code: -32002, message: "blockhash not found".into() },
    )));
    let sender = sender_over(vec![connection.clone()])?;

    let result = sender.send(&transfer_transaction()?).await;
    assert!(matches!(result, Err(SenderError::Send(_))));

    // No rebroadcast loop: the call count stays at the initial attempt.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(connection.send_calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn secondary_broadcast_failures_are_swallowed() -> anyhow::Result<()> {
    let primary = Arc::new(MockConnection::new("http://primary"));
    let secondary = Arc::new(MockConnection::new("http://secondary").with_send_default(Err(
        ConnectionError::Unavailable("overloaded".into()),
    )));
    let sender = sender_over(vec![primary.clone(), secondary.clone()])?;

    sender.send(&transfer_transaction()?).await?;
    tokio::task::yield_now().await;
    assert_eq!(primary.send_calls(), 1);
    assert_eq!(secondary.send_calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_secondary_does_not_delay_send() -> anyhow::Result<()> {
    let primary = Arc::new(MockConnection::new("http://primary"));
    let secondary =
        Arc::new(MockConnection::new("http://secondary").with_delay(Duration::from_secs(20)));
    let sender = sender_over(vec![primary.clone(), secondary.clone()])?;

    let started = tokio::time::Instant::now();
    sender.send(&transfer_transaction()?).await?;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(primary.send_calls(), 1);

    // The advisory broadcast still went out in the background.
    tokio::task::yield_now().await;
    assert_eq!(secondary.send_calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrent_sends_only_broadcast_once() -> anyhow::Result<()> {
    let connection =
        Arc::new(MockConnection::new("http://primary").with_delay(Duration::from_millis(100)));
    let sender = Arc::new(sender_over(vec![connection.clone()])?);
    let transaction = transfer_transaction()?;

    let (first, second) = tokio::join!(sender.send(&transaction), sender.send(&transaction));
    assert_ne!(first.is_ok(), second.is_ok());
    let rejected = [first, second].into_iter().find(Result::is_err);
    assert!(matches!(rejected, Some(Err(SenderError::AlreadySent))));
    assert_eq!(connection.send_calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rebroadcasts_until_confirmed() -> anyhow::Result<()> {
    let connection = Arc::new(MockConnection::new("http://primary"));
    let sender = sender_over(vec![connection.clone()])?;

    sender.send(&transfer_transaction()?).await?;
    assert_eq!(connection.send_calls(), 1);

    // Three retry intervals pass without a confirmation.
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert!(connection.send_calls() >= 3);

    sender.cancel();
    tokio::time::sleep(Duration::from_secs(3)).await;
    let after_cancel = connection.send_calls();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(connection.send_calls(), after_cancel);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rebroadcast_rejection_on_primary_halts_the_loop() -> anyhow::Result<()> {
    let connection = Arc::new(
        MockConnection::new("http://primary")
            .script_send(Ok(test_signature(1)))
            .with_send_default(Err(ConnectionError::Rpc {
                code: -32002,
                message: "blockhash expired".into(),
            })),
    );
    let sender = sender_over(vec![connection.clone()])?;

    sender.send(&transfer_transaction()?).await?;
    let started = tokio::time::Instant::now();
    let result = sender.try_confirm(None).await;

    assert!(matches!(result, Err(SenderError::NotConfirmed { .. })));
    assert!(sender.is_done());
    // The failed rebroadcast released the race well before the deadline.
    assert!(started.elapsed() < fast_policy().deadline);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn polling_budget_exhausts_into_not_confirmed() -> anyhow::Result<()> {
    let connection = Arc::new(MockConnection::new("http://primary"));
    let sender = sender_over(vec![connection.clone()])?;

    sender.send(&transfer_transaction()?).await?;
    let result = sender.try_confirm(None).await;

    assert!(matches!(result, Err(SenderError::NotConfirmed { .. })));
    assert!(connection.status_calls() > 1);
    assert!(sender.is_done());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn expiry_watchdog_gives_up_before_the_deadline() -> anyhow::Result<()> {
    let connection = Arc::new(MockConnection::new("http://primary").with_height(200));
    let sender = RetrySender::with_config(
        vec![connection as Arc<dyn ProviderConnection>],
        ConfirmationOptions::default(),
        RetryPolicy { deadline: Duration::from_secs(60), ..fast_policy() },
    )?;

    sender.send(&transfer_transaction()?).await?;
    let started = tokio::time::Instant::now();
    let result = sender.try_confirm(Some(100)).await;

    assert!(matches!(result, Err(SenderError::NotConfirmed { .. })));
    assert!(started.elapsed() < Duration::from_secs(60));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn expiry_watchdog_waits_while_height_is_below_expiry() -> anyhow::Result<()> {
    let connection = Arc::new(
        MockConnection::new("http://primary")
            .script_heights([90, 95])
            .with_height(101)
            .script_status(Ok(None))
            .script_status(Ok(Some(confirmed_status(60)))),
    );
    let sender = sender_over(vec![connection])?;

    sender.send(&transfer_transaction()?).await?;
    // Height only passes 100 on the third probe; polling wins first.
    let confirmed = sender.try_confirm(Some(100)).await?;
    assert_eq!(confirmed.slot, 60);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancel_releases_a_pending_confirmation() -> anyhow::Result<()> {
    let connection = Arc::new(MockConnection::new("http://primary"));
    let sender = Arc::new(sender_over(vec![connection])?);

    sender.send(&transfer_transaction()?).await?;

    let canceller = sender.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let started = tokio::time::Instant::now();
    let result = sender.try_confirm(None).await;
    assert!(matches!(result, Err(SenderError::NotConfirmed { .. })));
    assert!(started.elapsed() < fast_policy().deadline);
    assert!(sender.is_done());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn push_channel_wins_and_unregisters_on_drop() -> anyhow::Result<()> {
    let connection = Arc::new(
        MockConnection::new("http://primary").with_push_status(confirmed_status(77)),
    );
    let sender = sender_over(vec![connection.clone()])?;

    sender.send(&transfer_transaction()?).await?;
    let confirmed = sender.try_confirm(None).await?;

    assert_eq!(confirmed.slot, 77);
    assert_eq!(connection.subscribe_calls(), 1);
    // The subscription handle is consumed or dropped either way.
    assert_eq!(connection.unsubscribe_calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn disabled_push_channel_never_subscribes() -> anyhow::Result<()> {
    let connection = Arc::new(
        MockConnection::new("http://primary")
            .with_push_status(confirmed_status(1))
            .script_status(Ok(Some(confirmed_status(2)))),
    );
    let options = ConfirmationOptions { disable_push_channel: true, ..Default::default() };
    let sender = RetrySender::with_config(
        vec![connection.clone() as Arc<dyn ProviderConnection>],
        options,
        fast_policy(),
    )?;

    sender.send(&transfer_transaction()?).await?;
    let confirmed = sender.try_confirm(None).await?;

    assert_eq!(confirmed.slot, 2);
    assert_eq!(connection.subscribe_calls(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn first_provider_to_confirm_wins_across_connections() -> anyhow::Result<()> {
    let slow = Arc::new(
        MockConnection::new("http://slow")
            .with_delay(Duration::from_secs(30))
            .with_status_default(Ok(Some(confirmed_status(10)))),
    );
    let fast = Arc::new(
        MockConnection::new("http://fast").script_status(Ok(Some(confirmed_status(11)))),
    );
    let sender = sender_over(vec![slow, fast])?;

    sender.send(&transfer_transaction()?).await?;
    let confirmed = sender.try_confirm(None).await?;
    assert_eq!(confirmed.slot, 11);
    Ok(())
}

#[tokio::test]
async fn duplicate_endpoints_are_not_added_twice() -> anyhow::Result<()> {
    let primary = Arc::new(MockConnection::new("http://primary"));
    let sender = sender_over(vec![primary])?;

    assert_eq!(sender.connection_count(), 1);
    assert!(!sender.add_connection(Arc::new(MockConnection::new("http://primary"))));
    assert!(sender.add_connection(Arc::new(MockConnection::new("http://backup"))));
    assert_eq!(sender.connection_count(), 2);
    Ok(())
}

#[tokio::test]
async fn sender_requires_at_least_one_connection() {
    let result = RetrySender::new(Vec::new());
    assert!(matches!(result, Err(SenderError::NoConnections)));
}
