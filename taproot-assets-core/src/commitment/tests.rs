use super::*;
use alloc::string::ToString;
use bitcoin::{OutPoint, Txid};
use taproot_assets_types::asset::{AssetType, Genesis, GroupKey, COMPRESSED_KEY_LEN};

fn asset(tag: &str, key_byte: u8, amount: u64) -> Asset {
    let mut script_key = [key_byte; COMPRESSED_KEY_LEN];
    script_key[0] = 0x02;
    Asset {
        version: AssetVersion::V0,
        genesis: Genesis {
            first_prev_out: OutPoint {
                txid: Txid::from_byte_array([1u8; 32]),
                vout: 0,
            },
            tag: tag.to_string(),
            meta_hash: Sha256Hash::all_zeros(),
            output_index: 0,
            asset_type: AssetType::Normal,
        },
        amount,
        lock_time: 0,
        relative_lock_time: 0,
        prev_witnesses: vec![PrevWitness::genesis()],
        split_commitment_root: None,
        script_version: 0,
        script_key: SerializedKey(script_key),
        group_key: None,
        unknown_odd_types: UnknownOddTypes::new(),
    }
}

#[test]
fn leaf_script_layout_per_version() {
    let root = MssmtNode::leaf(b"root", 77);
    let legacy = TapCommitment {
        version: TapCommitmentVersion::V1,
        root,
    }
    .tap_leaf_script();
    assert_eq!(legacy.len(), TAPROOT_ASSET_COMMITMENT_SCRIPT_SIZE);
    assert_eq!(legacy[0], 1);
    assert!(is_taproot_asset_commitment_script(&legacy));

    let v2 = TapCommitment {
        version: TapCommitmentVersion::V2,
        root,
    }
    .tap_leaf_script();
    assert_eq!(v2[32], 2);
    assert_eq!(&v2[65..], &77u64.to_be_bytes());
    assert!(is_taproot_asset_commitment_script(&v2));
    assert!(!is_taproot_asset_commitment_script(&v2[1..]));
}

#[test]
fn sibling_preimages() {
    let leaf = TapscriptPreimage::from_leaf_script(0xc0, &[0x51]);
    assert!(tapscript_preimage_hash(&leaf).is_ok());

    let branch = TapscriptPreimage::from_branch([1u8; 32], [2u8; 32]);
    assert!(tapscript_preimage_hash(&branch).is_ok());

    let bad_version = TapscriptPreimage::from_leaf_script(0xc2, &[0x51]);
    assert_eq!(
        tapscript_preimage_hash(&bad_version),
        Err(Error::InvalidTapLeafScriptVersion)
    );

    let commitment_script = TapCommitment {
        version: TapCommitmentVersion::V0,
        root: MssmtNode::leaf(b"x", 1),
    }
    .tap_leaf_script();
    let disguised = TapscriptPreimage::from_leaf_script(0xc0, &commitment_script);
    assert_eq!(
        tapscript_preimage_hash(&disguised),
        Err(Error::TapscriptPreimageIsTapCommitment)
    );

    let mut truncated = TapscriptPreimage::from_leaf_script(0xc0, &[0x51, 0x52]);
    truncated.sibling_preimage.pop();
    assert_eq!(
        tapscript_preimage_hash(&truncated),
        Err(Error::InvalidTapLeafScriptLength)
    );
}

#[test]
fn inclusion_proof_recomputes_root() {
    let a = asset("alpha", 3, 100);
    let b = asset("beta", 4, 50);
    let mut a_second = asset("alpha", 5, 25);
    a_second.genesis = a.genesis.clone();

    let tree =
        TapCommitmentTree::from_assets(TapCommitmentVersion::V2, &[a.clone(), b.clone(), a_second])
            .unwrap();
    let commitment = tree.commitment();
    assert_eq!(commitment.root.sum, 175);

    let proof = tree.inclusion_proof(&a).unwrap();
    let derived = tap_commitment_from_inclusion(&proof, &a).unwrap().unwrap();
    assert_eq!(derived, commitment);

    // Any change to the asset breaks the proof.
    let mut forged = a.clone();
    forged.amount = 101;
    let derived = tap_commitment_from_inclusion(&proof, &forged).unwrap().unwrap();
    assert_ne!(derived, commitment);
}

#[test]
fn exclusion_proofs_for_absent_assets() {
    let a = asset("alpha", 3, 100);
    let tree = TapCommitmentTree::from_assets(TapCommitmentVersion::V2, &[a.clone()]).unwrap();
    let commitment = tree.commitment();

    // Different asset ID: no asset commitment exists under its tap key.
    let other = asset("gamma", 3, 1);
    let proof = tree.exclusion_proof(&other);
    assert!(proof.asset_proof.is_none());
    assert_eq!(tap_commitment_from_exclusion(&proof, &other).unwrap(), commitment);

    // Same asset ID, different script key: descends into the asset commitment.
    let mut sibling = asset("alpha", 9, 1);
    sibling.genesis = a.genesis.clone();
    let proof = tree.exclusion_proof(&sibling);
    assert!(proof.asset_proof.is_some());
    assert_eq!(tap_commitment_from_exclusion(&proof, &sibling).unwrap(), commitment);

    // An exclusion proof cannot be produced for a committed asset.
    let proof = tree.exclusion_proof(&a);
    assert_ne!(tap_commitment_from_exclusion(&proof, &a).unwrap(), commitment);
    assert!(matches!(
        tree.inclusion_proof(&other),
        Err(Error::AssetNotFound)
    ));
}

#[test]
fn grouped_assets_share_tap_key() {
    let group = GroupKey {
        group_pub_key: SerializedKey([0x03; COMPRESSED_KEY_LEN]),
    };
    let mut first = asset("first", 3, 10);
    first.group_key = Some(group);
    let mut second = asset("second", 4, 20);
    second.group_key = Some(group);

    let commitment = AssetCommitment::new(&[first.clone(), second]).unwrap();
    assert_eq!(commitment.sum(), 30);
    assert_eq!(commitment.assets().count(), 2);

    let ungrouped = asset("first", 3, 10);
    let mut single = AssetCommitment::new(&[first]).unwrap();
    assert_eq!(single.upsert(&ungrouped), Err(Error::TapKeyMismatch));
}

#[test]
fn split_tree_sums_inputs() {
    let root = asset("alpha", 3, 40);
    let mut recipient = asset("alpha", 4, 60);
    recipient.genesis = root.genesis.clone();

    let mut split = SplitCommitmentTree::new();
    split.insert(0, &root).unwrap();
    split.insert(1, &recipient).unwrap();
    let split_root = split.root();
    assert_eq!(split_root.sum, 100);

    let proof = split.proof(1, &recipient);
    let key = split_commitment_key(1, &recipient.id(), &recipient.script_key);
    assert_eq!(proof.root(&key, split_leaf(&recipient)).unwrap(), split_root);

    // The leaf ignores the witness, so the spent form of the output proves too.
    let mut with_witness = recipient.clone();
    with_witness.prev_witnesses.clear();
    assert_eq!(split_leaf(&with_witness), split_leaf(&recipient));

    // The wrong output index does not.
    let key = split_commitment_key(2, &recipient.id(), &recipient.script_key);
    assert_ne!(proof.root(&key, split_leaf(&recipient)).unwrap(), split_root);
}
