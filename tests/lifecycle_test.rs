mod common;

use common::TestEnvironment;
use key_custody::shares::{combine, combine_for_address};
use key_custody::{ShareError, ShareStore, WalletError};

#[test]
fn test_create_persists_shares_and_returns_device_share() -> anyhow::Result<()> {
    let env = TestEnvironment::new("1")?;

    let wallet = env.manager.create_wallet("alice")?;
    let record = env.store.get("alice")?;
    assert_eq!(record.address, wallet.address);

    // Any two of the three shares reconstruct the same key
    let pairs = [
        [wallet.device_share.clone(), record.server_share.clone()],
        [wallet.device_share.clone(), record.recovery_share.clone()],
        [record.server_share.clone(), record.recovery_share.clone()],
    ];
    for pair in pairs {
        assert_eq!(combine(&pair)?.address()?, wallet.address);
    }

    let status = env.manager.check_status("alice")?;
    assert!(status.has_wallet);
    assert_eq!(status.address, Some(wallet.address));
    Ok(())
}

#[test]
fn test_second_create_keeps_first_wallet() -> anyhow::Result<()> {
    let env = TestEnvironment::new("1")?;
    let first = env.manager.create_wallet("alice")?;

    let err = env.manager.create_wallet("alice").unwrap_err();
    assert!(matches!(err, WalletError::WalletAlreadyExists(_)));
    assert_eq!(env.store.get_public_address("alice")?, first.address);
    Ok(())
}

#[test]
fn test_recovery_issues_new_device_share_for_same_address() -> anyhow::Result<()> {
    let env = TestEnvironment::new("1")?;
    let created = env.manager.create_wallet("alice")?;

    let recovered = env.manager.recover_wallet("alice")?;
    assert_eq!(recovered.address, created.address);
    assert_ne!(recovered.device_share, created.device_share);

    let record = env.store.get("alice")?;
    combine_for_address(
        &[recovered.device_share.clone(), record.server_share.clone()],
        created.address,
    )?;

    // Old device share belongs to a different split
    let err = combine_for_address(&[created.device_share, record.server_share], created.address)
        .unwrap_err();
    assert!(matches!(err, ShareError::ReconstructionMismatch(_)));
    Ok(())
}

#[test]
fn test_recovery_without_wallet() -> anyhow::Result<()> {
    let env = TestEnvironment::new("1")?;
    assert!(matches!(
        env.manager.recover_wallet("ghost"),
        Err(WalletError::NoWallet(_))
    ));
    let status = env.manager.check_status("ghost")?;
    assert!(!status.has_wallet);
    assert_eq!(status.address, None);
    Ok(())
}

#[test]
fn test_concurrent_recoveries_leave_consistent_record() -> anyhow::Result<()> {
    let env = TestEnvironment::new("1")?;
    let created = env.manager.create_wallet("alice")?;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let manager = env.manager.clone();
            std::thread::spawn(move || manager.recover_wallet("alice"))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert!(!winners.is_empty());
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, WalletError::ConcurrentUpdate { .. }));
    }

    // The stored pair always reconstructs the original key
    let record = env.store.get("alice")?;
    combine_for_address(
        &[record.server_share.clone(), record.recovery_share.clone()],
        created.address,
    )?;
    assert_eq!(record.generation as usize, 1 + winners.len());
    Ok(())
}

#[test]
fn test_provision_rotates_existing_wallet() -> anyhow::Result<()> {
    let env = TestEnvironment::new("1")?;

    let first = env.manager.provision("carol")?;
    assert!(!first.recovered);
    let second = env.manager.provision("carol")?;
    assert!(second.recovered);
    assert_eq!(second.wallet.address, first.wallet.address);
    assert_eq!(env.store.get("carol")?.generation, 2);
    Ok(())
}
