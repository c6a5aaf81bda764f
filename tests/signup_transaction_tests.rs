// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-up transaction tests.
//!
//! The user row and avatar metadata commit together. The avatar object is
//! written before commit and stays behind when the commit fails.

use roost::db::UserRepository;
use roost::error::AuthError;

mod common;

#[tokio::test]
async fn test_failed_commit_leaves_no_user() {
    let mut h = common::harness();
    h.users.fail_commits(true);

    let err = h.auth.sign_up(common::alice_request()).await.unwrap_err();
    assert!(matches!(err, AuthError::Database(_)));

    assert_eq!(h.users.user_count(), 0);
    assert!(h
        .users
        .get_user_by_email("alice@x.com")
        .await
        .unwrap()
        .is_none());

    // Orphaned avatar object
    let keys = h.objects.keys();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].ends_with("/alice.svg"));

    // Nothing is announced for a user that was never created
    assert!(h.next_event().await.is_none());
}

#[tokio::test]
async fn test_sign_up_after_failed_commit() {
    let h = common::harness();
    h.users.fail_commits(true);
    assert!(h.auth.sign_up(common::alice_request()).await.is_err());

    h.users.fail_commits(false);
    let profile = h.auth.sign_up(common::alice_request()).await.unwrap();

    assert_eq!(h.users.user_count(), 1);
    assert!(h.users.media_for(profile.id).is_some());
    assert!(h
        .auth
        .sign_in(common::sign_in_request("alice@x.com", "Password1"))
        .await
        .is_ok());
}
