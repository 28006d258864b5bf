use crate::{AdmissionDecision, KeyPrefix, RealmName, RealmUpdate, RespectfulError, Timespan};

#[test]
fn realm_name_rejects_empty() {
    assert!(matches!(
        RealmName::try_from(""),
        Err(RespectfulError::InvalidRealmName(_))
    ));
}

#[test]
fn realm_name_accepts_spaces_colons_and_unicode() {
    for name in ["TEST SPACED", "TEST ÉÉÉ", "api:v2", "glob*?[x]"] {
        let realm = RealmName::try_from(name).unwrap();
        assert_eq!(&*realm, name);
        assert_eq!(realm.to_string(), name);
    }
}

#[test]
fn timespan_try_from_validates_min_1() {
    let t = Timespan::try_from(1u64).unwrap();
    assert_eq!(*t, 1u64);

    assert!(matches!(
        Timespan::try_from(0u64),
        Err(RespectfulError::InvalidTimespan(_))
    ));
}

#[test]
fn timespan_try_from_validates_upper_bound() {
    assert_eq!(*Timespan::try_from(Timespan::MAX_SECS).unwrap(), Timespan::MAX_SECS);

    for too_long in [Timespan::MAX_SECS + 1, u64::MAX] {
        assert!(matches!(
            Timespan::try_from(too_long),
            Err(RespectfulError::InvalidTimespan(_))
        ));
    }
    assert_eq!(RealmUpdate::timespan(u64::MAX).valid_timespan(), None);
}

#[test]
fn key_prefix_validation() {
    assert_eq!(&*KeyPrefix::default(), "RespectfulRequester");
    assert_eq!(&*KeyPrefix::try_from("svc".to_string()).unwrap(), "svc");

    for bad in [String::new(), "a:b".to_string(), "x".repeat(256)] {
        assert!(matches!(
            KeyPrefix::try_from(bad),
            Err(RespectfulError::InvalidKeyPrefix(_))
        ));
    }
}

#[test]
fn realm_update_parse_drops_non_integers() {
    assert_eq!(
        RealmUpdate::parse(Some("FOO"), Some("BAR")),
        RealmUpdate::default()
    );
    assert_eq!(
        RealmUpdate::parse(Some(" 1000 "), Some("-3")),
        RealmUpdate::max_requests(1000)
    );
    assert_eq!(RealmUpdate::parse(None, Some("60")), RealmUpdate::timespan(60));
}

#[test]
fn realm_update_zero_timespan_is_not_valid() {
    assert_eq!(RealmUpdate::timespan(0).valid_timespan(), None);
    assert_eq!(
        RealmUpdate::timespan(5).valid_timespan(),
        Some(Timespan::try_from(5).unwrap())
    );
}

#[test]
fn error_messages_name_the_realms() {
    let err = RespectfulError::RateLimited {
        realms: vec![
            RealmName::try_from("a").unwrap(),
            RealmName::try_from("b").unwrap(),
        ],
    };
    assert_eq!(err.to_string(), "currently rate-limited on realm(s): a, b");

    let err = RespectfulError::UnknownRealm(RealmName::try_from("TEST123").unwrap());
    assert_eq!(err.to_string(), "realm 'TEST123' hasn't been registered");
}

#[test]
fn admission_decision_is_admitted() {
    assert!(AdmissionDecision::Admitted.is_admitted());
    assert!(!AdmissionDecision::Denied { realms: vec![] }.is_admitted());
}
