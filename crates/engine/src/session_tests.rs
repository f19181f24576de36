// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn generated_codes_use_unambiguous_alphabet() -> anyhow::Result<()> {
    for _ in 0..100 {
        let code = generate_code();
        assert_eq!(code.len(), CODE_LEN);
        assert!(is_valid_code(&code), "invalid code generated: {code}");
        for bad in ['0', 'O', '1', 'I', 'L'] {
            assert!(!code.contains(bad), "ambiguous char {bad} in {code}");
        }
    }
    Ok(())
}

#[test]
fn code_validation_rejects_wrong_shapes() -> anyhow::Result<()> {
    assert!(is_valid_code("ABC234"));
    assert!(!is_valid_code("abc234"));
    assert!(!is_valid_code("ABC23"));
    assert!(!is_valid_code("ABC2345"));
    assert!(!is_valid_code("ABC10O"));
    assert!(!is_valid_code(""));
    Ok(())
}

#[test]
fn elect_host_grants_when_no_host_connected() -> anyhow::Result<()> {
    let session = Session::new("ABC234".into(), "test".into());
    assert!(elect_host(&session, None));
    assert!(elect_host(&session, Some("tok-1")));
    Ok(())
}

#[test]
fn elect_host_requires_matching_credential_when_host_present() -> anyhow::Result<()> {
    let mut session = Session::new("ABC234".into(), "test".into());
    session.host_connection_id = "conn-1".into();
    session.host_credential_ref = "tok-1".into();

    assert!(elect_host(&session, Some("tok-1")), "same person on a new device");
    assert!(!elect_host(&session, Some("tok-2")), "impostor must not displace host");
    assert!(!elect_host(&session, None));
    Ok(())
}

#[test]
fn elect_host_denies_unauthenticated_claim_on_hosted_session() -> anyhow::Result<()> {
    let mut session = Session::new("ABC234".into(), "test".into());
    session.host_connection_id = "conn-1".into();
    // Host never linked a credential: nobody else can claim the seat.
    assert!(!elect_host(&session, Some("tok-2")));
    Ok(())
}

#[test]
fn sanitize_strips_control_and_zero_width() -> anyhow::Result<()> {
    assert_eq!(sanitize_display_name("  Alice  "), "Alice");
    assert_eq!(sanitize_display_name("Bob\u{200B}\u{FEFF}"), "Bob");
    assert_eq!(sanitize_display_name("Eve\x00\x1b[31m"), "Eve[31m");
    assert_eq!(sanitize_display_name(""), "Guest");
    assert_eq!(sanitize_display_name("\u{200B}\u{200C}"), "Guest");
    Ok(())
}

#[test]
fn sanitize_caps_length() -> anyhow::Result<()> {
    let long = "x".repeat(200);
    assert_eq!(sanitize_display_name(&long).len(), 32);
    Ok(())
}

#[test]
fn session_round_trips_through_json() -> anyhow::Result<()> {
    let mut session = Session::new("QRS789".into(), "road trip".into());
    session.external_playlist_ref = Some("pl-1".into());
    session.tracks = vec![
        Track {
            id: "i1".into(),
            external_id: "t1".into(),
            title: "first".into(),
            artist: "a".into(),
            album: String::new(),
            duration_secs: 180,
            album_art: String::new(),
        },
        Track {
            id: "i2".into(),
            external_id: "t2".into(),
            title: "second".into(),
            artist: "b".into(),
            album: "lp".into(),
            duration_secs: 200,
            album_art: "http://img".into(),
        },
    ];

    let json = serde_json::to_string(&session)?;
    let back: Session = serde_json::from_str(&json)?;

    assert_eq!(back.tracks, session.tracks, "track order and content preserved");
    assert_eq!(back.external_playlist_ref.as_deref(), Some("pl-1"));
    // Absent optionals stay absent, distinct from empty strings.
    assert!(back.external_playlist_url.is_none());
    assert!(!json.contains("external_playlist_url"));
    Ok(())
}

#[test]
fn external_description_includes_credits() -> anyhow::Result<()> {
    let mut session = Session::new("QRS789".into(), "road trip".into());
    assert_eq!(session.external_description(), "");

    session.contributors = vec!["Alice".into(), "Bob".into()];
    assert_eq!(session.external_description(), "With tracks from Alice, Bob");

    session.user_description = "summer mix".into();
    assert_eq!(
        session.external_description(),
        "summer mix\n\nWith tracks from Alice, Bob"
    );
    Ok(())
}
