use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use sports_api_gate::{
    database::Database,
    errors::AuthError,
    models::SportScope,
    security::{generate_api_key, hash_api_key, KeyStore},
};

fn test_db(name: &str) -> Database {
    let test_db_dir = "tests/test_db";
    if !Path::new(test_db_dir).exists() {
        fs::create_dir_all(test_db_dir).expect("Failed to create test_db directory");
    }
    let db_path = format!("{}/{}.sqlite", test_db_dir, name);
    let _ = fs::remove_file(&db_path);
    Database::new(&db_path).expect("Failed to create test database")
}

#[test]
fn test_generated_key_format() {
    let generated = generate_api_key();

    // "sk_live_" + base64url(32 bytes, no padding)
    assert!(generated.plain.starts_with("sk_live_"));
    assert_eq!(generated.plain.len(), 8 + 43);
    assert_eq!(generated.prefix, &generated.plain[..12]);

    // Stored hash is the SHA-256 hex digest of the full plaintext.
    assert_eq!(generated.hash, hash_api_key(&generated.plain));
    assert_eq!(generated.hash.len(), 64);
    assert!(generated.hash.chars().all(|c| c.is_ascii_hexdigit()));

    // Two generations never collide.
    assert_ne!(generated.plain, generate_api_key().plain);
}

#[test]
fn test_resolve_known_key() {
    let store = KeyStore::new(test_db("keystore_resolve"));

    let scope = SportScope::from_tags(["soccer"]).expect("valid scope");
    let (generated, created) = store
        .create("Mobile App", scope, 100, None)
        .expect("Failed to create key");

    let resolved = store.resolve(&generated.plain).expect("Failed to resolve");
    assert_eq!(resolved.id, created.id);
    assert_eq!(resolved.name, "Mobile App");
    assert_eq!(resolved.rate_limit_per_minute, 100);
    assert!(resolved.sports.allows("soccer"));
    assert!(!resolved.sports.allows("basketball"));
    assert!(resolved.last_used_at.is_none());
}

#[test]
fn test_resolve_unknown_key() {
    let store = KeyStore::new(test_db("keystore_unknown"));
    match store.resolve("sk_live_definitely_not_issued") {
        Err(AuthError::NotFound) => {}
        other => panic!("Expected NotFound, got {:?}", other.map(|r| r.id)),
    }
}

#[test]
fn test_revocation_invalidates_cache() {
    // Long TTL so a stale cache entry would outlive the whole test if
    // revocation did not invalidate it explicitly.
    let store = KeyStore::with_cache_ttl(test_db("keystore_revoke"), Duration::from_secs(3600));

    let scope = SportScope::from_tags(["basketball"]).expect("valid scope");
    let (generated, created) = store
        .create("To Revoke", scope, 50, None)
        .expect("Failed to create key");

    // Populate the cache, then revoke.
    assert!(store.resolve(&generated.plain).is_ok());
    store.revoke(created.id).expect("Failed to revoke");

    match store.resolve(&generated.plain) {
        Err(AuthError::Revoked) => {}
        other => panic!("Expected Revoked, got {:?}", other.map(|r| r.id)),
    }
}

#[test]
fn test_expired_key_is_denied() {
    let store = KeyStore::new(test_db("keystore_expired"));

    let scope = SportScope::from_tags(["soccer"]).expect("valid scope");
    let expired_at = Utc::now() - ChronoDuration::minutes(5);
    let (generated, _) = store
        .create("Expired Key", scope, 100, Some(expired_at))
        .expect("Failed to create key");

    // is_active is still true; expiry wins anyway.
    match store.resolve(&generated.plain) {
        Err(AuthError::Expired) => {}
        other => panic!("Expected Expired, got {:?}", other.map(|r| r.id)),
    }
}

#[test]
fn test_scope_validation() {
    assert!(SportScope::from_tags(["soccer", "basketball"]).is_ok());
    assert_eq!(
        SportScope::from_tags(["*"]).expect("wildcard"),
        SportScope::Wildcard
    );
    // Wildcard anywhere in the list wins.
    assert_eq!(
        SportScope::from_tags(["soccer", "*"]).expect("wildcard"),
        SportScope::Wildcard
    );

    assert!(SportScope::from_tags(["tennis"]).is_err());
    assert!(SportScope::from_tags(Vec::<String>::new()).is_err());
}

#[test]
fn test_scope_json_roundtrip() {
    let scope = SportScope::from_tags(["soccer"]).expect("valid scope");
    assert_eq!(scope.to_json(), r#"["soccer"]"#);
    assert_eq!(SportScope::from_json(r#"["soccer"]"#).expect("parse"), scope);
    assert_eq!(
        SportScope::from_json(r#"["*"]"#).expect("parse"),
        SportScope::Wildcard
    );
}

#[test]
fn test_busy_storage_maps_to_unavailable() {
    let test_db_dir = "tests/test_db";
    if !Path::new(test_db_dir).exists() {
        fs::create_dir_all(test_db_dir).expect("Failed to create test_db directory");
    }
    let db_path = format!("{}/keystore_busy.sqlite", test_db_dir);
    let _ = fs::remove_file(&db_path);
    let store = KeyStore::new(Database::new(&db_path).expect("Failed to create test database"));

    let scope = SportScope::from_tags(["soccer"]).expect("valid scope");
    let (generated, _) = store
        .create("Blocked", scope, 100, None)
        .expect("Failed to create key");

    // An exclusive transaction from a second connection makes every read
    // hit SQLITE_BUSY once the busy timeout runs out.
    let blocker = rusqlite::Connection::open(&db_path).expect("Failed to open blocker");
    blocker
        .execute_batch("BEGIN EXCLUSIVE")
        .expect("Failed to lock database");

    match store.resolve(&generated.plain) {
        Err(AuthError::Unavailable) => {}
        other => panic!("Expected Unavailable, got {:?}", other.map(|r| r.id)),
    }

    // Once the lock clears, the same credential resolves normally.
    blocker.execute_batch("COMMIT").expect("Failed to unlock");
    assert!(store.resolve(&generated.plain).is_ok());
}

#[test]
fn test_zero_rate_limit_rejected() {
    let store = KeyStore::new(test_db("keystore_zero_limit"));
    let scope = SportScope::from_tags(["soccer"]).expect("valid scope");
    assert!(store.create("Zero", scope, 0, None).is_err());
}

#[test]
fn test_list_keys() {
    let store = KeyStore::new(test_db("keystore_list"));

    let scope = SportScope::from_tags(["soccer"]).expect("valid scope");
    store
        .create("First", scope.clone(), 100, None)
        .expect("Failed to create key");
    store
        .create("Second", SportScope::Wildcard, 200, None)
        .expect("Failed to create key");

    let keys = store.list().expect("Failed to list keys");
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0].name, "First");
    assert_eq!(keys[1].name, "Second");
    assert_eq!(keys[1].sports, SportScope::Wildcard);
}
