// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn valid_entries_decode() -> anyhow::Result<()> {
    let session = Session::new("ABC234".into(), "test".into());
    let json = serde_json::to_string(&session)?;
    let back: Session = decode("session", &json).ok_or_else(|| anyhow::anyhow!("lost"))?;
    assert_eq!(back.code, "ABC234");
    assert_eq!(back.name, "test");
    Ok(())
}

#[test]
fn corrupt_entries_read_as_absent() -> anyhow::Result<()> {
    // A corrupt record must look like a missing one to the caller, so the
    // requester sees "not found" rather than a store outage.
    assert!(decode::<Session>("session", "not-json").is_none());
    assert!(decode::<Session>("session", r#"{"code":42}"#).is_none());
    assert!(decode::<CredentialRecord>("credential", "{}").is_none());
    assert!(decode::<PendingAuth>("pending_auth", r#"{"code_verifier":"v"}"#).is_none());
    Ok(())
}

#[test]
fn key_prefixes_are_disjoint() -> anyhow::Result<()> {
    assert_eq!(session_key("ABC234"), "session:ABC234");
    assert_eq!(cred_key("tok-1"), "cred:tok-1");
    assert_eq!(alias_key("tok-1"), "cred_alias:tok-1");
    assert_eq!(user_key("user-1"), "cred_user:user-1");
    assert_eq!(pending_key("st-1"), "pending:st-1");
    Ok(())
}
