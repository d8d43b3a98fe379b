use super::*;
use ::matches::assert_matches;
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use test_case::test_case;

fn store() -> DhtStore {
    hdht_trace::test_run().ok();
    DhtStore::test_in_mem("test").unwrap()
}

fn alice() -> PeerId {
    PeerId::with_data(b"alice")
}

fn hold(body: fn(HoldReq) -> Body, key: &EntryHash, related: Option<&EntryHash>) -> Message {
    Message::new(
        alice(),
        body(HoldReq {
            entry_hash: key.clone(),
            related_hash: related.cloned(),
        }),
    )
}

async fn put_live(s: &DhtStore, value: &[u8]) -> EntryHash {
    let key = EntryHash::with_data(value);
    s.put(
        Some(hold(Body::Put, &key, None)),
        "post",
        key.clone(),
        Some(alice()),
        value.to_vec(),
        EntryStatus::Live,
    )
    .await
    .unwrap();
    key
}

#[tokio::test(flavor = "multi_thread")]
async fn put_then_get_live() {
    let s = store();
    let key = put_live(&s, b"hello").await;

    let got = s.get(key.clone(), StatusMask::LIVE, GetMask::ALL).await.unwrap();
    assert_eq!(
        GetResult {
            entry: Some(b"hello".to_vec()),
            entry_type: Some("post".to_string()),
            sources: vec![alice()],
            status: EntryStatus::Live,
        },
        got
    );

    let got = s.get(key.clone(), StatusMask::DEFAULT, GetMask::DEFAULT).await.unwrap();
    assert_eq!(Some(b"hello".to_vec()), got.entry);
    assert_eq!(None, got.entry_type);
    assert!(got.sources.is_empty());

    assert_eq!(alice(), s.source(key.clone()).await.unwrap());
    s.exists(key, StatusMask::LIVE).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn put_del_get() {
    let s = store();
    let key = put_live(&s, b"hello").await;
    s.del(Some(hold(Body::Del, &key, None)), key.clone())
        .await
        .unwrap();

    assert_matches!(
        s.get(key.clone(), StatusMask::LIVE, GetMask::ALL).await,
        Err(StateError::HashNotFound)
    );
    assert_matches!(
        s.get(key.clone(), StatusMask::DEFAULT, GetMask::ALL).await,
        Err(StateError::HashDeleted)
    );
    let got = s.get(key.clone(), StatusMask::DELETED, GetMask::ALL).await.unwrap();
    assert_eq!(EntryStatus::Deleted, got.status);
    assert_matches!(
        s.exists(key, StatusMask::DEFAULT).await,
        Err(StateError::HashDeleted)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn put_mod_get() {
    let s = store();
    let k1 = put_live(&s, b"v1").await;
    let k2 = put_live(&s, b"v2").await;
    s.modify(Some(hold(Body::Mod, &k1, Some(&k2))), k1.clone(), k2.clone())
        .await
        .unwrap();

    match s.get(k1.clone(), StatusMask::DEFAULT, GetMask::ALL).await {
        Err(StateError::HashModified(new)) => assert_eq!(k2.to_string(), new.to_string()),
        other => panic!("expected HashModified, got {:?}", other),
    }

    let links = s
        .get_links(k1.clone(), SYS_TAG_REPLACED_BY, StatusMask::LIVE)
        .await
        .unwrap();
    assert_eq!(
        vec![TaggedHash {
            hash: k2.clone(),
            tag: SYS_TAG_REPLACED_BY.to_string(),
            source: Some(alice()),
        }],
        links
    );

    // forward-only: a deleted-after-modified entry stays modified
    s.del(Some(hold(Body::Del, &k1, None)), k1.clone()).await.unwrap();
    let got = s.get(k1, StatusMask::ANY, GetMask::ALL).await.unwrap();
    assert_eq!(EntryStatus::Modified, got.status);
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_is_its_own_error() {
    let s = store();
    let key = EntryHash::with_data(b"bad");
    s.put(None, "post", key.clone(), None, b"bad".to_vec(), EntryStatus::Rejected)
        .await
        .unwrap();
    assert_matches!(
        s.get(key.clone(), StatusMask::DEFAULT, GetMask::ALL).await,
        Err(StateError::HashRejected)
    );
    assert_matches!(
        s.get(key.clone(), StatusMask::LIVE, GetMask::ALL).await,
        Err(StateError::HashNotFound)
    );
    assert_matches!(s.source(key).await, Err(StateError::HashNotFound));
}

#[tokio::test(flavor = "multi_thread")]
async fn reput_keeps_status() {
    let s = store();
    let key = put_live(&s, b"hello").await;
    s.del(None, key.clone()).await.unwrap();
    s.put(None, "other", key.clone(), None, b"again".to_vec(), EntryStatus::Live)
        .await
        .unwrap();
    let got = s.get(key, StatusMask::ANY, GetMask::ALL).await.unwrap();
    assert_eq!(EntryStatus::Deleted, got.status);
    assert_eq!(Some(b"again".to_vec()), got.entry);
    assert_eq!(Some("other".to_string()), got.entry_type);
}

#[tokio::test(flavor = "multi_thread")]
async fn change_index_tracks_messages() {
    let s = store();
    assert_eq!(0, s.get_idx().await.unwrap());

    let key = EntryHash::with_data(b"hello");
    let m1 = hold(Body::Put, &key, None);
    s.put(Some(m1.clone()), "post", key.clone(), None, b"hello".to_vec(), EntryStatus::Live)
        .await
        .unwrap();
    assert_eq!(1, s.get_idx().await.unwrap());

    // no message, no change
    s.put(None, "post", key.clone(), None, b"hello".to_vec(), EntryStatus::Live)
        .await
        .unwrap();
    assert_eq!(1, s.get_idx().await.unwrap());

    let m2 = hold(Body::Del, &key, None);
    s.del(Some(m2.clone()), key.clone()).await.unwrap();
    assert_eq!(2, s.get_idx().await.unwrap());

    assert_eq!(m1, s.get_idx_message(1).await.unwrap());
    assert_eq!(m2, s.get_idx_message(2).await.unwrap());
    assert_matches!(
        s.get_idx_message(3).await,
        Err(StateError::NoSuchChangeIndex(3))
    );

    let puts = s.get_puts(2).await.unwrap();
    assert_eq!(vec![Put { idx: 2, message: m2.clone() }], puts);
    assert_eq!(2, s.get_puts(0).await.unwrap().len());
    assert!(s.get_puts(3).await.unwrap().is_empty());

    let f1 = m1.fingerprint().unwrap();
    assert!(s.have_fingerprint(f1.clone()).await.unwrap());
    assert_eq!(Some(1), s.get_fingerprint(f1).await.unwrap());
    assert_eq!(
        Some(2),
        s.get_fingerprint(m2.fingerprint().unwrap()).await.unwrap()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_message_is_applied_once() {
    let s = store();
    let key = EntryHash::with_data(b"hello");
    let m = hold(Body::Put, &key, None);
    s.put(Some(m.clone()), "post", key.clone(), None, b"hello".to_vec(), EntryStatus::Live)
        .await
        .unwrap();
    // same message, different payload: the second write is skipped whole
    s.put(Some(m.clone()), "post", key.clone(), None, b"other".to_vec(), EntryStatus::Live)
        .await
        .unwrap();
    assert_eq!(1, s.get_idx().await.unwrap());
    assert_eq!(Some(1), s.get_fingerprint(m.fingerprint().unwrap()).await.unwrap());
    let got = s.get(key, StatusMask::LIVE, GetMask::DEFAULT).await.unwrap();
    assert_eq!(Some(b"hello".to_vec()), got.entry);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_duplicate_link_is_applied_once() {
    let s = store();
    let base = put_live(&s, b"base").await;
    let target = EntryHash::with_data(b"target");
    let m = hold(Body::Link, &EntryHash::with_data(b"link"), Some(&base));

    let (r1, r2) = tokio::join!(
        s.put_link(Some(m.clone()), base.clone(), target.clone(), "foo"),
        s.put_link(Some(m.clone()), base.clone(), target.clone(), "foo"),
    );
    r1.unwrap();
    r2.unwrap();

    // one change for the base put, one for the link
    assert_eq!(2, s.get_idx().await.unwrap());
    assert_eq!(1, s.dump().await.unwrap().links.len());
}

#[tokio::test(flavor = "multi_thread")]
async fn links_in_first_association_order() {
    let s = store();
    let base = put_live(&s, b"base").await;
    let l1 = EntryHash::with_data(b"l1");
    let l2 = EntryHash::with_data(b"l2");
    let l3 = EntryHash::with_data(b"l3");

    s.put_link(None, base.clone(), l1.clone(), "foo").await.unwrap();
    s.put_link(None, base.clone(), l2.clone(), "foo").await.unwrap();
    s.put_link(None, base.clone(), l3.clone(), "bar").await.unwrap();

    let hashes = |v: Vec<TaggedHash>| v.into_iter().map(|t| t.hash).collect::<Vec<_>>();

    assert_eq!(
        vec![l1.clone(), l2.clone()],
        hashes(s.get_links(base.clone(), "foo", StatusMask::LIVE).await.unwrap())
    );

    let all = s.get_links(base.clone(), "", StatusMask::LIVE).await.unwrap();
    assert_eq!(
        vec![
            ("foo".to_string(), l1.clone()),
            ("foo".to_string(), l2.clone()),
            ("bar".to_string(), l3.clone())
        ],
        all.into_iter().map(|t| (t.tag, t.hash)).collect::<Vec<_>>()
    );

    // deleting l1 hides it from Live but keeps its place
    s.del_link(None, base.clone(), l1.clone(), "foo").await.unwrap();
    assert_eq!(
        vec![l2.clone()],
        hashes(s.get_links(base.clone(), "foo", StatusMask::LIVE).await.unwrap())
    );
    assert_eq!(
        vec![l1.clone()],
        hashes(s.get_links(base.clone(), "foo", StatusMask::DELETED).await.unwrap())
    );

    // re-adding resurrects it at its original position
    s.put_link(None, base.clone(), l1.clone(), "foo").await.unwrap();
    assert_eq!(
        vec![l1, l2],
        hashes(s.get_links(base, "foo", StatusMask::LIVE).await.unwrap())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn link_preconditions() {
    let s = store();
    let missing = EntryHash::with_data(b"missing");
    let target = EntryHash::with_data(b"target");
    assert_matches!(
        s.put_link(None, missing.clone(), target.clone(), "t").await,
        Err(StateError::HashNotFound)
    );
    assert_matches!(
        s.get_links(missing, "t", StatusMask::LIVE).await,
        Err(StateError::HashNotFound)
    );

    let base = put_live(&s, b"base").await;
    assert_matches!(
        s.del_link(None, base.clone(), target.clone(), "t").await,
        Err(StateError::LinkNotFound)
    );

    s.del(None, base.clone()).await.unwrap();
    assert_matches!(
        s.put_link(None, base, target, "t").await,
        Err(StateError::HashNotFound)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn link_source_and_hash_from_message() {
    let s = store();
    let base = put_live(&s, b"base").await;
    let target = EntryHash::with_data(b"target");
    let spec = LinkSpec {
        base: base.clone(),
        target: target.clone(),
        tag: "t".into(),
        action: LinkAction::Add,
    };
    let link_entry = spec.entry_hash().unwrap();
    let msg = hold(Body::Link, &link_entry, Some(&base));
    let before = s.get_idx().await.unwrap();
    s.put_link(Some(msg), base.clone(), target.clone(), "t")
        .await
        .unwrap();
    assert_eq!(before + 1, s.get_idx().await.unwrap());

    let links = s.get_links(base, "t", StatusMask::LIVE).await.unwrap();
    assert_eq!(Some(alice()), links[0].source);

    let dump = s.dump().await.unwrap();
    assert_eq!(1, dump.links.len());
    assert_eq!(target.to_string(), dump.links[0].target);
}

#[test_case(b"never" ; "get and del on unknown hash")]
fn unknown_hash(value: &[u8]) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let s = store();
        let key = EntryHash::with_data(value);
        assert_matches!(
            s.get(key.clone(), StatusMask::DEFAULT, GetMask::ALL).await,
            Err(StateError::HashNotFound)
        );
        assert_matches!(
            s.del(Some(hold(Body::Del, &key, None)), key.clone()).await,
            Err(StateError::HashNotFound)
        );
        assert_matches!(
            s.modify(None, key.clone(), key).await,
            Err(StateError::HashNotFound)
        );
        // failed mutations leave no change behind
        assert_eq!(0, s.get_idx().await.unwrap());
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn gossiper_cursor_is_monotonic() {
    let s = store();
    let bob = PeerId::with_data(b"bob");
    assert_eq!(None, s.get_gossiper(bob.clone()).await.unwrap());

    s.add_gossiper(bob.clone()).await.unwrap();
    assert_eq!(Some(0), s.get_gossiper(bob.clone()).await.unwrap());

    s.update_gossiper(bob.clone(), 5).await.unwrap();
    s.update_gossiper(bob.clone(), 3).await.unwrap();
    assert_eq!(Some(5), s.get_gossiper(bob.clone()).await.unwrap());

    s.add_gossiper(bob.clone()).await.unwrap();
    assert_eq!(Some(5), s.get_gossiper(bob.clone()).await.unwrap());
    assert_eq!(vec![(bob.clone(), 5)], s.get_gossipers().await.unwrap());

    s.delete_gossiper(bob.clone()).await.unwrap();
    assert!(s.get_gossipers().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn blocked_peers_are_not_gossipers() {
    let s = store();
    let mallory = PeerId::with_data(b"mallory");
    s.update_gossiper(mallory.clone(), 4).await.unwrap();

    s.add_to_list(
        PeerListType::Blocked,
        vec![PeerRecord {
            id: mallory.clone(),
            warrant: "spam".into(),
        }],
    )
    .await
    .unwrap();
    assert_eq!(None, s.get_gossiper(mallory.clone()).await.unwrap());
    assert!(s
        .is_in_list(PeerListType::Blocked, mallory.clone())
        .await
        .unwrap());

    s.update_gossiper(mallory.clone(), 9).await.unwrap();
    assert_eq!(None, s.get_gossiper(mallory.clone()).await.unwrap());

    assert_eq!(
        vec![PeerRecord {
            id: mallory,
            warrant: "spam".into()
        }],
        s.get_list(PeerListType::Blocked).await.unwrap()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn iterate_in_key_order() {
    let s = store();
    let mut keys = Vec::new();
    for v in [b"a", b"b", b"c", b"d"] {
        keys.push(put_live(&s, v).await);
    }
    keys.sort();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    let visited = s
        .iterate(move |e| {
            seen2.lock().unwrap().push(e.hash);
            true
        })
        .await
        .unwrap();
    assert_eq!(4, visited);
    assert_eq!(keys, *seen.lock().unwrap());

    let visited = s.iterate(|_| false).await.unwrap();
    assert_eq!(1, visited);
}

#[tokio::test(flavor = "multi_thread")]
async fn dump_to_json() {
    let s = store();
    let key = put_live(&s, b"hello").await;
    s.add_gossiper(PeerId::with_data(b"bob")).await.unwrap();
    let dump = s.dump().await.unwrap();
    assert_eq!(1, dump.idx);
    assert_eq!(key.to_string(), dump.entries[0].hash);
    assert_eq!(5, dump.entries[0].value_len);
    assert_eq!(1, dump.gossipers.len());
    let json = dump.to_json_pretty().unwrap();
    assert!(json.contains(&key.to_string()));
}
