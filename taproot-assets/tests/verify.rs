mod common;

use anyhow::Result;
use bitcoin::Witness;
use taproot_assets::core::mock::{self, MintRequest, MockChain, MockOutput, MockVerifier, SendOptions};
use taproot_assets::core::verify::{proof, transition, ChainError, Error, GroupAllowList};
use taproot_assets::types::asset::{AssetVersion, PrevWitness};
use taproot_assets::types::error::Error as DecodeError;
use taproot_assets::types::file::{File, MAX_NESTING_DEPTH};
use taproot_assets::types::meta::{MetaReveal, MetaType};
use taproot_assets::types::proof::Proof;
use taproot_assets::verify::{verify_file, verify_files_parallel, BitcoinTaprootOps};

use common::{init_logging, key};

fn step_error(err: Error) -> (usize, proof::Error) {
    match err {
        Error::Step { index, source } => (index, source),
        other => panic!("expected a step error, got {other}"),
    }
}

#[test]
fn genesis_proof_verifies() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let meta = MetaReveal::new(MetaType::Json, br#"{"decimal_display":2}"#.to_vec());
    let genesis = mock::mint(&ops, &mut chain, &MintRequest::new("gold", 1000).meta(meta.clone()))?;

    let verifier = MockVerifier::new(&chain);
    let snapshot = verify_file(&File::from_proofs(&[genesis.clone()]), &verifier.ctx())?;
    assert_eq!(snapshot.asset.amount, 1000);
    assert_eq!(snapshot.out_point, genesis.out_point());
    assert_eq!(snapshot.anchor_block_height, 100);
    assert_eq!(snapshot.meta_reveal, Some(meta));
    assert!(!snapshot.is_burn);
    assert!(!snapshot.split_asset);
    Ok(())
}

#[test]
fn transfer_chain_survives_encoding() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let genesis = mock::mint(
        &ops,
        &mut chain,
        &MintRequest::new("silver", 50).version(AssetVersion::V1),
    )?;
    let to_bob = mock::transfer(&ops, &mut chain, &genesis, key(&ops, "bob"), SendOptions::default())?;
    let to_carol = mock::transfer(&ops, &mut chain, &to_bob, key(&ops, "carol"), SendOptions::default())?;

    let file = File::from_proofs(&[genesis, to_bob, to_carol.clone()]);
    let decoded = File::from_bytes(&file.encode())?;
    assert_eq!(decoded, file);

    let verifier = MockVerifier::new(&chain);
    let snapshot = verify_file(&decoded, &verifier.ctx())?;
    assert_eq!(snapshot.asset.script_key, key(&ops, "carol"));
    assert_eq!(snapshot.asset.amount, 50);
    assert_eq!(snapshot.out_point, to_carol.out_point());
    assert_eq!(snapshot.anchor_block_height, 102);
    Ok(())
}

#[test]
fn split_outputs_and_tombstone() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let genesis = mock::mint(&ops, &mut chain, &MintRequest::new("split", 1000))?;
    let partial = mock::split(&ops, &mut chain, &genesis, 400, key(&ops, "bob"))?;
    let full = mock::split(&ops, &mut chain, &genesis, 1000, key(&ops, "carol"))?;

    let verifier = MockVerifier::new(&chain);
    let ctx = verifier.ctx();

    let sent = verify_file(&File::from_proofs(&[genesis.clone(), partial.split]), &ctx)?;
    assert_eq!(sent.asset.amount, 400);
    assert!(sent.split_asset);

    let change = verify_file(&File::from_proofs(&[genesis.clone(), partial.root]), &ctx)?;
    assert_eq!(change.asset.amount, 600);
    assert!(!change.split_asset);

    let tombstone = verify_file(&File::from_proofs(&[genesis, full.root]), &ctx)?;
    assert!(tombstone.asset.is_tombstone());
    Ok(())
}

#[test]
fn burn_is_recognised() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let genesis = mock::mint(&ops, &mut chain, &MintRequest::new("burn", 1000))?;
    let burnt = mock::burn(&ops, &mut chain, &genesis, 300)?;

    let verifier = MockVerifier::new(&chain);
    let ctx = verifier.ctx();
    let burn = verify_file(&File::from_proofs(&[genesis.clone(), burnt.split]), &ctx)?;
    assert!(burn.is_burn);
    assert_eq!(burn.asset.amount, 300);

    let change = verify_file(&File::from_proofs(&[genesis, burnt.root]), &ctx)?;
    assert!(!change.is_burn);
    Ok(())
}

#[test]
fn merge_consumes_both_inputs() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let genesis = mock::mint(&ops, &mut chain, &MintRequest::new("merge", 1000))?;
    let parts = mock::split(&ops, &mut chain, &genesis, 250, key(&ops, "bob"))?;
    let other = File::from_proofs(&[genesis.clone(), parts.split]);
    let merged = mock::merge(&ops, &mut chain, &parts.root, &other, key(&ops, "dave"))?;

    let verifier = MockVerifier::new(&chain);
    let file = File::from_proofs(&[genesis, parts.root, merged]);
    let snapshot = verify_file(&File::from_bytes(&file.encode())?, &verifier.ctx())?;
    assert_eq!(snapshot.asset.amount, 1000);
    assert_eq!(snapshot.asset.script_key, key(&ops, "dave"));
    Ok(())
}

#[test]
fn grouped_asset_needs_known_group() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let genesis = mock::mint(&ops, &mut chain, &MintRequest::new("group", 10).grouped())?;
    let to_bob = mock::transfer(&ops, &mut chain, &genesis, key(&ops, "bob"), SendOptions::default())?;
    let group_key = genesis
        .asset
        .group_key
        .map(|group| group.group_pub_key)
        .expect("grouped mint");
    let file = File::from_proofs(&[genesis, to_bob]);

    let open = MockVerifier::new(&chain);
    verify_file(&file, &open.ctx())?;

    let allowed = MockVerifier::new(&chain).with_groups(GroupAllowList::new([group_key]));
    verify_file(&file, &allowed.ctx())?;

    let other = MockVerifier::new(&chain).with_groups(GroupAllowList::new([key(&ops, "other")]));
    let (index, source) = step_error(verify_file(&file, &other.ctx()).unwrap_err());
    assert_eq!(index, 0);
    assert!(matches!(
        source,
        proof::Error::UnknownGroup(ChainError::UnknownGroupKey(rejected)) if rejected == group_key
    ));
    Ok(())
}

#[test]
fn inflated_transfer_is_rejected() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let genesis = mock::mint(&ops, &mut chain, &MintRequest::new("inflate", 1000))?;

    let mut asset = genesis.asset.clone();
    asset.amount = 1001;
    asset.script_key = key(&ops, "mallory");
    asset.prev_witnesses = vec![PrevWitness {
        prev_id: Some(mock::prev_id(&genesis)),
        tx_witness: Witness::from_slice(&[[0x01u8; 64]]),
        split_commitment: None,
    }];
    let anchor = chain.anchor(
        &ops,
        &[genesis.out_point()],
        vec![
            MockOutput::assets(key(&ops, "mallory/internal"), vec![asset.clone()]),
            MockOutput::Bip86 {
                internal_key: key(&ops, "mallory/change"),
            },
        ],
    )?;
    let forged = anchor.proof(genesis.out_point(), 0, &asset)?;

    let verifier = MockVerifier::new(&chain);
    let err = verify_file(&File::from_proofs(&[genesis, forged]), &verifier.ctx()).unwrap_err();
    assert_eq!(err.failed_step(), Some(1));
    let (_, source) = step_error(err);
    assert!(matches!(
        source,
        proof::Error::Transition(transition::Error::AmountMismatch {
            inputs: 1000,
            outputs: 1001,
        })
    ));
    Ok(())
}

#[test]
fn broken_chains_report_failing_step() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let genesis = mock::mint(&ops, &mut chain, &MintRequest::new("order", 5))?;
    let first = mock::transfer(&ops, &mut chain, &genesis, key(&ops, "bob"), SendOptions::default())?;
    let second = mock::transfer(&ops, &mut chain, &first, key(&ops, "carol"), SendOptions::default())?;
    let verifier = MockVerifier::new(&chain);
    let ctx = verifier.ctx();

    let (index, source) =
        step_error(verify_file(&File::from_proofs(&[genesis.clone(), second.clone()]), &ctx).unwrap_err());
    assert_eq!(index, 1);
    assert!(matches!(source, proof::Error::PrevOutMismatch { .. }));

    let (index, source) = step_error(verify_file(&File::from_proofs(&[first.clone()]), &ctx).unwrap_err());
    assert_eq!(index, 0);
    assert!(matches!(source, proof::Error::GenesisRequired));

    let (index, source) = step_error(
        verify_file(&File::from_proofs(&[genesis.clone(), first, genesis]), &ctx).unwrap_err(),
    );
    assert_eq!(index, 2);
    assert!(matches!(source, proof::Error::UnexpectedGenesis));

    assert!(matches!(verify_file(&File::default(), &ctx), Err(Error::EmptyFile)));
    Ok(())
}

#[test]
fn headers_are_checked_against_the_chain() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let genesis = mock::mint(&ops, &mut chain, &MintRequest::new("fork", 5))?;

    let mut fork = MockChain::new();
    fork.mine_empty(3);
    let verifier = MockVerifier::new(&fork);
    let (index, source) =
        step_error(verify_file(&File::from_proofs(&[genesis]), &verifier.ctx()).unwrap_err());
    assert_eq!(index, 0);
    assert!(matches!(
        source,
        proof::Error::Chain(ChainError::ChainMismatch { height: 100, .. })
    ));
    Ok(())
}

#[test]
fn absolute_lock_times() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let genesis = mock::mint(&ops, &mut chain, &MintRequest::new("locked", 5))?;
    let send = |lock_time| SendOptions {
        lock_time,
        relative_lock_time: 0,
    };
    let by_height = mock::transfer(&ops, &mut chain, &genesis, key(&ops, "a"), send(101))?;
    let too_early = mock::transfer(&ops, &mut chain, &genesis, key(&ops, "b"), send(10_000))?;
    let by_time = mock::transfer(&ops, &mut chain, &genesis, key(&ops, "c"), send(1_700_000_000))?;
    let far_future =
        mock::transfer(&ops, &mut chain, &genesis, key(&ops, "d"), send(2_000_000_000))?;

    let verifier = MockVerifier::new(&chain);
    let ctx = verifier.ctx();
    verify_file(&File::from_proofs(&[genesis.clone(), by_height]), &ctx)?;
    verify_file(&File::from_proofs(&[genesis.clone(), by_time]), &ctx)?;

    for (locked, lock_time) in [(too_early, 10_000), (far_future, 2_000_000_000)] {
        let (index, source) =
            step_error(verify_file(&File::from_proofs(&[genesis.clone(), locked]), &ctx).unwrap_err());
        assert_eq!(index, 1);
        assert!(matches!(
            source,
            proof::Error::Transition(transition::Error::LockTimeNotReached { lock_time: l }) if l == lock_time
        ));
    }
    Ok(())
}

#[test]
fn relative_lock_time_counts_blocks_since_input() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let send = SendOptions {
        lock_time: 0,
        relative_lock_time: 3,
    };

    let early_genesis = mock::mint(&ops, &mut chain, &MintRequest::new("early", 5))?;
    let early = mock::transfer(&ops, &mut chain, &early_genesis, key(&ops, "bob"), send)?;

    let late_genesis = mock::mint(&ops, &mut chain, &MintRequest::new("late", 5))?;
    chain.mine_empty(3);
    let late = mock::transfer(&ops, &mut chain, &late_genesis, key(&ops, "bob"), send)?;

    let verifier = MockVerifier::new(&chain);
    let ctx = verifier.ctx();
    verify_file(&File::from_proofs(&[late_genesis, late]), &ctx)?;

    let (index, source) =
        step_error(verify_file(&File::from_proofs(&[early_genesis, early]), &ctx).unwrap_err());
    assert_eq!(index, 1);
    assert!(matches!(
        source,
        proof::Error::Transition(transition::Error::RelativeLockTimeNotReached {
            required: 3,
            elapsed: 1,
        })
    ));
    Ok(())
}

#[test]
fn deep_nesting_is_rejected() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let genesis = mock::mint(&ops, &mut chain, &MintRequest::new("nest", 5))?;

    let mut nested = genesis.clone();
    for _ in 0..=MAX_NESTING_DEPTH + 1 {
        let mut outer = genesis.clone();
        outer.additional_inputs = vec![File::from_proofs(&[nested])];
        nested = outer;
    }

    let verifier = MockVerifier::new(&chain);
    let err = verify_file(&File::from_proofs(&[nested]), &verifier.ctx()).unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(DecodeError::MaxNestingDepthExceeded(depth)) if depth == MAX_NESTING_DEPTH
    ));
    Ok(())
}

#[test]
fn independent_files_verify_in_parallel() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let mut files = Vec::new();
    for tag in ["a", "b", "c", "d"] {
        let genesis = mock::mint(&ops, &mut chain, &MintRequest::new(tag, 7))?;
        let sent = mock::transfer(&ops, &mut chain, &genesis, key(&ops, tag), SendOptions::default())?;
        files.push(File::from_proofs(&[genesis, sent]));
    }
    let broken = files[1].proofs()?.split_off(1);
    files.push(File::from_proofs(&broken));

    let verifier = MockVerifier::new(&chain);
    let results = verify_files_parallel(&ops, &files, &verifier.ctx());
    assert_eq!(results.len(), 5);
    for (result, tag) in results.iter().zip(["a", "b", "c", "d"]) {
        let snapshot = result.as_ref().expect("valid file");
        assert_eq!(snapshot.asset.script_key, key(&ops, tag));
    }
    assert_eq!(results[4].as_ref().map_err(Error::failed_step).unwrap_err(), Some(0));
    Ok(())
}

#[test]
fn unknown_odd_proof_fields_are_kept() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let plain = mock::mint(&ops, &mut chain, &MintRequest::new("odd", 5))?;
    let mut extended = plain.clone();
    extended.unknown_odd_types.insert(1001, b"future".to_vec());

    let decoded = Proof::from_bytes(&extended.encode())?;
    assert_eq!(decoded, extended);
    assert_eq!(decoded.unknown_odd_types.get(&1001), Some(&b"future".to_vec()));
    assert_ne!(
        File::from_proofs(&[plain]).encode(),
        File::from_proofs(&[decoded.clone()]).encode()
    );

    let snapshot = verify_file(&File::from_proofs(&[decoded]), &MockVerifier::new(&chain).ctx())?;
    assert_eq!(snapshot.asset.amount, 5);
    Ok(())
}
