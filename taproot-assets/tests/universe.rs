mod common;

use anyhow::Result;
use taproot_assets::core::mock::{self, MintRequest, MockChain, SendOptions};
use taproot_assets::types::proof::Proof;
use taproot_assets::universe::{
    diff_roots, fetch_all_roots, first_root_mismatch, roots_equal, Identifier, Multiverse,
    ProofType,
};
use taproot_assets::verify::BitcoinTaprootOps;

use common::{init_logging, key};

fn mints(tags: &[&str]) -> Result<Vec<Proof>> {
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    tags.iter()
        .map(|tag| Ok(mock::mint(&ops, &mut chain, &MintRequest::new(tag, 10))?))
        .collect()
}

#[tokio::test]
async fn truncated_listing_is_not_equal() -> Result<()> {
    init_logging();
    let proofs = mints(&["alpha", "beta", "gamma"])?;
    // Serves at most two roots per page.
    let universe = Multiverse::new(2);
    for proof in &proofs {
        universe.insert_proof(proof)?;
    }

    let full = fetch_all_roots(&universe, 10).await?;
    assert_eq!(full.len(), 3);
    assert_eq!(fetch_all_roots(&universe, 1).await?, full);

    let truncated = Multiverse::asset_roots(&universe, 0, 10)
        .into_iter()
        .map(|root| (root.id, root))
        .collect();
    assert!(!roots_equal(&full, &truncated));
    assert!(!roots_equal(&truncated, &full));
    assert!(roots_equal(&full, &full));

    let missing = first_root_mismatch(&full, &truncated).expect("one universe missing");
    assert!(!truncated.contains_key(&missing));
    assert_eq!(diff_roots(&truncated, &full), vec![missing]);
    assert!(diff_roots(&full, &truncated).is_empty());
    Ok(())
}

#[tokio::test]
async fn insertion_order_does_not_change_roots() -> Result<()> {
    init_logging();
    let proofs = mints(&["one", "two", "three", "four"])?;
    let forward = Multiverse::default();
    let backward = Multiverse::default();
    for proof in &proofs {
        forward.insert_proof(proof)?;
    }
    for proof in proofs.iter().rev() {
        backward.insert_proof(proof)?;
    }

    let a = fetch_all_roots(&forward, 3).await?;
    let b = fetch_all_roots(&backward, 3).await?;
    assert!(roots_equal(&a, &b));
    assert!(roots_equal(&b, &a));
    assert_eq!(forward.stats(), backward.stats());
    assert_eq!(forward.stats().num_assets, 4);
    Ok(())
}

#[tokio::test]
async fn stale_universe_is_the_only_diff() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let genesis = mock::mint(&ops, &mut chain, &MintRequest::new("stale", 50))?;
    let other = mock::mint(&ops, &mut chain, &MintRequest::new("fresh", 50))?;
    let sent = mock::transfer(&ops, &mut chain, &genesis, key(&ops, "dave"), SendOptions::default())?;

    let local = Multiverse::default();
    let remote = Multiverse::default();
    for proof in [&genesis, &other] {
        local.insert_proof(proof)?;
        remote.insert_proof(proof)?;
    }
    remote.insert_proof(&sent)?;

    let local_roots = fetch_all_roots(&local, 8).await?;
    let remote_roots = fetch_all_roots(&remote, 8).await?;
    let transfers = Identifier::for_proof(&sent);
    assert_eq!(transfers.proof_type, ProofType::Transfer);
    assert_eq!(diff_roots(&local_roots, &remote_roots), vec![transfers]);
    assert_eq!(first_root_mismatch(&local_roots, &remote_roots), Some(transfers));

    // Same leaf set, same roots.
    local.insert_proof(&sent)?;
    let local_roots = fetch_all_roots(&local, 8).await?;
    assert!(roots_equal(&local_roots, &remote_roots));
    Ok(())
}

#[test]
fn concurrent_inserts_match_sequential_ones() -> Result<()> {
    init_logging();
    let ops = BitcoinTaprootOps::new();
    let mut chain = MockChain::new();
    let genesis = mock::mint(&ops, &mut chain, &MintRequest::new("busy", 1000))?;
    let transfers = (0..8)
        .map(|i| {
            let recipient = key(&ops, &format!("recipient-{i}"));
            Ok(mock::transfer(&ops, &mut chain, &genesis, recipient, SendOptions::default())?)
        })
        .collect::<Result<Vec<_>>>()?;

    let concurrent = Multiverse::default();
    std::thread::scope(|scope| {
        for proof in &transfers {
            let concurrent = &concurrent;
            scope.spawn(move || concurrent.insert_proof(proof).map(|_| ()));
        }
    });
    let sequential = Multiverse::default();
    for proof in &transfers {
        sequential.insert_proof(proof)?;
    }

    let id = Identifier::for_proof(&transfers[0]);
    let concurrent_root = concurrent.root(&id).expect("transfer universe");
    let sequential_root = sequential.root(&id).expect("transfer universe");
    assert_eq!(concurrent_root.node, sequential_root.node);
    assert_eq!(concurrent_root.node.sum, 8 * 1000);
    assert_eq!(concurrent.stats().num_proofs, 8);
    assert_eq!(concurrent.leaf_keys(&id, 0, 100), sequential.leaf_keys(&id, 0, 100));
    Ok(())
}
