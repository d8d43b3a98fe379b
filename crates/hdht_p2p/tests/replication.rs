mod common;

use common::*;
use hdht_p2p::prelude::*;
use matches::assert_matches;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;

fn put_body(hash: &EntryHash) -> Body {
    Body::Put(HoldReq {
        entry_hash: hash.clone(),
        related_hash: None,
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn changes_fan_out_to_every_peer() {
    let net = MemNetwork::new();
    let all = nodes(&net, 4).await;
    connect_all(&all).await;

    let hash = all[0].put(b"hello world").await;
    let author = all[0].id();

    let (peers, hash_ref) = (&all[1..], &hash);
    wait_for("every peer to hold the entry", move || async move {
        for n in peers {
            if n.dht.exists(hash_ref.clone(), StatusMask::LIVE).await.is_err() {
                return false;
            }
        }
        true
    })
    .await;

    for n in all.iter() {
        let got = n
            .dht
            .get(hash.clone(), StatusMask::LIVE, GetMask::ALL)
            .await
            .unwrap();
        assert_eq!(Some(b"hello world".to_vec()), got.entry);
        assert_eq!(Some("post".to_string()), got.entry_type);
        assert_eq!(vec![author.clone()], got.sources);
        assert_eq!(1, n.dht.store().get_idx().await.unwrap());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn publish_collects_signed_receipts() {
    let net = MemNetwork::new();
    let all = nodes(&net, 4).await;
    connect_all(&all).await;

    let (hash, msg) = all[0].put_quiet(b"receipted").await;
    let report = all[0].dht.publish(hash.clone(), &msg).await.unwrap();
    assert!(report.rejected.is_empty());
    assert_eq!(
        all[1..].iter().map(|n| n.id()).collect::<HashSet<_>>(),
        report.held.into_iter().collect::<HashSet<_>>()
    );

    // holding it again is acknowledged without a second change record
    let again = all[0].dht.publish(hash, &msg).await.unwrap();
    assert_eq!(3, again.held.len());
    for n in all[1..].iter() {
        assert_eq!(1, n.dht.store().get_idx().await.unwrap());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_changes_are_held_as_rejected() {
    let net = MemNetwork::new();
    let author = node(&net, "author").await;
    let strict = node_with(&net, "strict", quiet_tuning(), Arc::new(RejectBad)).await;
    let lax = node(&net, "lax").await;
    connect(&author, &strict).await;
    connect(&author, &lax).await;

    let hash = author.chain.commit("bad", b"spam".to_vec());
    let msg = Message::new(author.id(), put_body(&hash));
    author
        .dht
        .put(
            Some(msg.clone()),
            "bad".into(),
            hash.clone(),
            Some(author.id()),
            b"spam".to_vec(),
            EntryStatus::Live,
        )
        .await
        .unwrap();

    let report = author.dht.publish(hash.clone(), &msg).await.unwrap();
    assert_eq!(
        ChangeReport {
            held: vec![lax.id()],
            rejected: vec![strict.id()],
        },
        report
    );

    assert_matches!(
        strict
            .dht
            .get(hash.clone(), StatusMask::DEFAULT, GetMask::ALL)
            .await,
        Err(HdhtP2pError::State(StateError::HashRejected))
    );
    let got = strict
        .dht
        .get(hash.clone(), StatusMask::REJECTED, GetMask::ALL)
        .await
        .unwrap();
    assert_eq!(EntryStatus::Rejected, got.status);
    assert!(lax.dht.exists(hash, StatusMask::LIVE).await.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn change_delivered_twice_at_once_is_recorded_once() {
    let net = MemNetwork::new();
    let a = node(&net, "a").await;
    let b = node(&net, "b").await;

    let hash = EntryHash::with_data(b"doomed");
    a.dht
        .put(
            None,
            "post".into(),
            hash.clone(),
            Some(b.id()),
            b"doomed".to_vec(),
            EntryStatus::Live,
        )
        .await
        .unwrap();
    let del = Message::new(
        b.id(),
        Body::Del(HoldReq {
            entry_hash: hash.clone(),
            related_hash: None,
        }),
    );

    // a direct push and a gossip replay landing together
    let info = b.info();
    let (r1, r2) = tokio::join!(
        a.dht.apply_change(&del, &info),
        a.dht.apply_change(&del, &info),
    );
    assert_matches!(r1, Ok(HoldCode::Ok));
    assert_matches!(r2, Ok(HoldCode::Ok));

    assert_eq!(1, a.dht.store().get_idx().await.unwrap());
    assert_eq!(1, a.dht.store().get_puts(0).await.unwrap().len());
    assert_matches!(
        a.dht.exists(hash, StatusMask::LIVE).await,
        Err(HdhtP2pError::State(StateError::HashNotFound))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn locally_invalid_change_is_refused() {
    let net = MemNetwork::new();
    let strict = node_with(&net, "strict", quiet_tuning(), Arc::new(RejectBad)).await;

    let hash = strict.chain.commit("bad", b"nope".to_vec());
    assert_matches!(
        strict.dht.change(hash.clone(), put_body(&hash)).await,
        Err(HdhtP2pError::LocallyRejected)
    );
    let got = strict
        .dht
        .get(hash, StatusMask::REJECTED, GetMask::ALL)
        .await
        .unwrap();
    assert_eq!(EntryStatus::Rejected, got.status);
}

#[tokio::test(flavor = "multi_thread")]
async fn queries_are_not_changes() {
    let net = MemNetwork::new();
    let a = node(&net, "a").await;
    let hash = EntryHash::with_data(b"x");
    assert_matches!(
        a.dht
            .change(
                hash.clone(),
                Body::Get(GetReq {
                    hash,
                    status_mask: StatusMask::DEFAULT,
                    field_mask: GetMask::DEFAULT,
                }),
            )
            .await,
        Err(HdhtP2pError::UnexpectedMessageBodyType(MsgType::Get))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn deletes_and_modifications_follow_the_entry() {
    let net = MemNetwork::new();
    let a = node(&net, "a").await;
    let b = node(&net, "b").await;
    connect(&a, &b).await;

    let old = a.put(b"v1").await;
    let new = a.put(b"v2").await;
    a.dht
        .change(
            old.clone(),
            Body::Mod(HoldReq {
                entry_hash: old.clone(),
                related_hash: Some(new.clone()),
            }),
        )
        .await
        .unwrap();
    a.dht
        .change(
            new.clone(),
            Body::Del(HoldReq {
                entry_hash: new.clone(),
                related_hash: None,
            }),
        )
        .await
        .unwrap();

    let (b_ref, new_ref) = (&b, &new);
    wait_for("b to see the delete", move || async move {
        matches::matches!(
            b_ref
                .dht
                .exists(new_ref.clone(), StatusMask::DEFAULT)
                .await,
            Err(HdhtP2pError::State(StateError::HashDeleted))
        )
    })
    .await;
    assert_matches!(
        b.dht.get(old, StatusMask::DEFAULT, GetMask::ALL).await,
        Err(HdhtP2pError::State(StateError::HashModified(h))) if h == new
    );
    assert_eq!(4, b.dht.store().get_idx().await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn links_replicate() {
    let net = MemNetwork::new();
    let a = node(&net, "a").await;
    let b = node(&net, "b").await;
    connect(&a, &b).await;

    let base = a.put(b"base").await;
    let target = a.put(b"target").await;
    let link = |action| LinkSpec {
        base: base.clone(),
        target: target.clone(),
        tag: "likes".into(),
        action,
    };
    let link_body = |hash: &EntryHash| {
        Body::Link(HoldReq {
            entry_hash: hash.clone(),
            related_hash: Some(base.clone()),
        })
    };

    let add = a.chain.commit_link(&link(LinkAction::Add)).unwrap();
    a.dht.change(add.clone(), link_body(&add)).await.unwrap();

    let (b_ref, base_ref) = (&b, &base);
    wait_for("b to see the link", move || async move {
        b_ref
            .dht
            .get_links(base_ref.clone(), "likes".into(), StatusMask::LIVE)
            .await
            .map(|l| l.len() == 1)
            .unwrap_or(false)
    })
    .await;
    assert_eq!(
        vec![TaggedHash {
            hash: target.clone(),
            tag: "likes".into(),
            source: Some(a.id()),
        }],
        b.dht
            .get_links(base.clone(), "likes".into(), StatusMask::LIVE)
            .await
            .unwrap()
    );
    // the link entry itself is held too
    let entry = b
        .dht
        .get(add.clone(), StatusMask::LIVE, GetMask::ALL)
        .await
        .unwrap();
    assert_eq!(Some(LINK_ENTRY_TYPE.to_string()), entry.entry_type);

    let del = a.chain.commit_link(&link(LinkAction::Del)).unwrap();
    a.dht.change(del.clone(), link_body(&del)).await.unwrap();
    wait_for("b to see the link removed", move || async move {
        b_ref
            .dht
            .get_links(base_ref.clone(), "likes".into(), StatusMask::LIVE)
            .await
            .map(|l| l.is_empty())
            .unwrap_or(false)
    })
    .await;
    let deleted = b
        .dht
        .get_links(base, String::new(), StatusMask::DELETED)
        .await
        .unwrap();
    assert_eq!(vec![target], deleted.into_iter().map(|l| l.hash).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_changes_are_retried() {
    let net = MemNetwork::new();
    let a = node(&net, "a").await;
    let b = node(&net, "b").await;
    connect(&a, &b).await;

    let (hash, _) = a.put_quiet(b"late").await;
    a.dht
        .change(
            hash.clone(),
            Body::Del(HoldReq {
                entry_hash: hash.clone(),
                related_hash: None,
            }),
        )
        .await
        .unwrap();

    let b_ref = &b;
    wait_for("b to queue the delete", move || async move {
        b_ref.dht.retry_len() == 1
    })
    .await;
    assert_eq!(RetryOutcome::Requeued, b.dht.process_retry_once().await.unwrap());
    assert_eq!(1, b.dht.retry_len());

    b.dht
        .put(
            None,
            "post".into(),
            hash.clone(),
            Some(a.id()),
            b"late".to_vec(),
            EntryStatus::Live,
        )
        .await
        .unwrap();
    assert_eq!(RetryOutcome::Applied, b.dht.process_retry_once().await.unwrap());
    assert_eq!(RetryOutcome::Empty, b.dht.process_retry_once().await.unwrap());
    assert_matches!(
        b.dht.exists(hash, StatusMask::DEFAULT).await,
        Err(HdhtP2pError::State(StateError::HashDeleted))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn retries_give_up() {
    let net = MemNetwork::new();
    let a = node(&net, "a").await;
    let mut tuning = quiet_tuning();
    tuning.retry_max_attempts = 2;
    let b = node_with(&net, "b", tuning, Arc::new(AcceptAll)).await;
    connect(&a, &b).await;

    let (hash, _) = a.put_quiet(b"never").await;
    let msg = Message::new(
        a.id(),
        Body::Del(HoldReq {
            entry_hash: hash.clone(),
            related_hash: None,
        }),
    );
    a.dht.del(Some(msg.clone()), hash.clone()).await.unwrap();
    assert_matches!(
        a.dht.publish(hash, &msg).await,
        Err(HdhtP2pError::NoRemoteNodeAcceptedChange)
    );

    assert_eq!(1, b.dht.retry_len());
    assert_eq!(RetryOutcome::Requeued, b.dht.process_retry_once().await.unwrap());
    assert_eq!(RetryOutcome::Dropped, b.dht.process_retry_once().await.unwrap());
    assert_eq!(0, b.dht.retry_len());
}

#[tokio::test(flavor = "multi_thread")]
async fn blocked_peers_cannot_push_changes() {
    let net = MemNetwork::new();
    let a = node(&net, "a").await;
    let b = node(&net, "b").await;
    connect(&a, &b).await;
    a.dht.block_peer(b.id(), "forged receipts".into()).await.unwrap();
    assert!(a.dht.routing().find(&b.id()).is_none());

    let (hash, msg) = b.put_quiet(b"unwanted").await;
    assert_matches!(
        b.dht.publish(hash.clone(), &msg).await,
        Err(HdhtP2pError::NoRemoteNodeAcceptedChange)
    );
    assert_matches!(
        a.dht.exists(hash, StatusMask::ANY).await,
        Err(HdhtP2pError::State(StateError::HashNotFound))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn blocked_peers_stay_out_of_lookups_and_publish() {
    let net = MemNetwork::new();
    let all = nodes(&net, 3).await;
    connect_all(&all).await;
    let (a, b, c) = (&all[0], &all[1], &all[2]);
    a.dht.block_peer(c.id(), "forged receipts".into()).await.unwrap();

    // b still names c in its answers
    let near = a
        .dht
        .closest_peers(EntryHash::random().into(), 5)
        .await
        .unwrap();
    assert_eq!(vec![b.id()], near.into_iter().map(|p| p.id).collect::<Vec<_>>());
    assert!(a.dht.routing().find(&c.id()).is_none());

    let (hash, msg) = a.put_quiet(b"not for c").await;
    let report = a.dht.publish(hash.clone(), &msg).await.unwrap();
    assert_eq!(vec![b.id()], report.held);
    assert_matches!(
        c.dht.exists(hash, StatusMask::ANY).await,
        Err(HdhtP2pError::State(StateError::HashNotFound))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_peers_hold_nothing() {
    let net = MemNetwork::new();
    let a = node(&net, "a").await;
    let b = node(&net, "b").await;
    connect(&a, &b).await;
    net.set_online(&b.id(), false);

    let (hash, msg) = a.put_quiet(b"alone").await;
    assert_matches!(
        a.dht.publish(hash, &msg).await,
        Err(HdhtP2pError::NoRemoteNodeAcceptedChange)
    );
}
