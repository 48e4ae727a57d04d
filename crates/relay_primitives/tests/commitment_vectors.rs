use relay_primitives::{Hash32, Header, MerkleError, commit, function_selector, keccak256};

fn chain(len: u64) -> Vec<Header> {
    (0..len)
        .map(|n| Header {
            number: n,
            timestamp: 1_700_000_000 + n * 12,
            prev_header_hash: keccak256(&n.to_be_bytes()),
            tx_root: Hash32([(n % 251) as u8; 32]),
            receipts_root: Hash32([0x5a; 32]),
        })
        .collect()
}

#[test]
fn keccak_matches_known_vectors() {
    assert_eq!(
        keccak256(b"").to_string(),
        "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
    );
    assert_eq!(function_selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
}

#[test]
fn commit_is_deterministic() {
    let headers = chain(37);
    assert_eq!(commit(&headers).unwrap(), commit(&headers.clone()).unwrap());
}

#[test]
fn permuted_ranges_commit_differently() {
    let headers = chain(8);
    let root = commit(&headers).unwrap();

    let mut swapped = headers.clone();
    swapped.swap(0, 1);
    assert_ne!(root, commit(&swapped).unwrap());

    let mut reversed = headers.clone();
    reversed.reverse();
    assert_ne!(root, commit(&reversed).unwrap());
}

#[test]
fn roots_depend_on_every_field() {
    let headers = chain(4);
    let root = commit(&headers).unwrap();

    let mut tampered = headers.clone();
    tampered[3].receipts_root = Hash32([0; 32]);
    assert_ne!(root, commit(&tampered).unwrap());

    let mut tampered = headers;
    tampered[2].timestamp += 1;
    assert_ne!(root, commit(&tampered).unwrap());
}

#[test]
fn empty_input_has_no_root() {
    assert_eq!(commit(&[]), Err(MerkleError::EmptyRange));
}
