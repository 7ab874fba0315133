mod common;

use alloy::primitives::{utils::parse_ether, Address};
use common::{test_policy, TestEnvironment};
use key_custody::{ChainStage, WalletError};

#[tokio::test]
async fn test_underfunded_wallet_receives_one_top_up() -> anyhow::Result<()> {
    let env = TestEnvironment::new("1")?;
    let target = Address::repeat_byte(0x10);

    let result = env.manager.ensure_funded(target).await?;
    assert!(result.funded);
    assert_eq!(env.balance(target), test_policy().top_up_amount);

    // Second call sees a sufficient balance
    let again = env.manager.ensure_funded(target).await?;
    assert!(!again.funded);
    assert_eq!(env.chain.transfers_to(target).len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_funded_wallet_is_left_alone() -> anyhow::Result<()> {
    let env = TestEnvironment::new("1")?;
    let target = Address::repeat_byte(0x11);
    env.chain.credit(target, parse_ether("0.01")?);

    let result = env.manager.ensure_funded(target).await?;
    assert!(!result.funded);
    assert_eq!(result.prior_balance, parse_ether("0.01")?);
    assert!(env.chain.transfers().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_exhausted_sponsor() -> anyhow::Result<()> {
    let env = TestEnvironment::new("0.0001")?;

    let err = env
        .manager
        .ensure_funded(Address::repeat_byte(0x12))
        .await
        .unwrap_err();
    match err {
        WalletError::SponsorExhausted {
            sponsor, required, ..
        } => {
            assert_eq!(sponsor, env.operator);
            assert_eq!(required, test_policy().top_up_amount);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(env.chain.transfers().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unconfirmed_top_up_reports_funding_stage() -> anyhow::Result<()> {
    let env = TestEnvironment::new("1")?;
    env.chain.withhold_next_receipt();

    let err = env
        .manager
        .ensure_funded(Address::repeat_byte(0x13))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WalletError::ChainSubmissionFailed {
            stage: ChainStage::Funding,
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_top_ups_share_operator_nonce_sequence() -> anyhow::Result<()> {
    let env = TestEnvironment::new("1")?;
    let targets: Vec<Address> = (0..5u8).map(|i| Address::repeat_byte(0x20 + i)).collect();

    let results = futures::future::join_all(
        targets
            .iter()
            .map(|target| env.manager.ensure_funded(*target)),
    )
    .await;

    for result in results {
        assert!(result?.funded);
    }
    let transfers = env.chain.transfers();
    assert_eq!(transfers.len(), targets.len());
    let mut hashes: Vec<_> = transfers.iter().map(|t| t.tx_hash).collect();
    hashes.sort();
    hashes.dedup();
    assert_eq!(hashes.len(), targets.len());
    Ok(())
}
