use spbackup::management::TokenStore;

#[tokio::test]
async fn test_save_and_load_token() {
    let dir = tempfile::tempdir().unwrap();
    let tokens = TokenStore::new(dir.path().join("nested/.token.json"));

    tokens.save(Some("abc")).await.unwrap();

    assert_eq!(tokens.load().await.token.as_deref(), Some("abc"));
    assert_eq!(tokens.token().await.as_deref(), Some("abc"));

    // Stored as a single JSON object
    let raw = std::fs::read_to_string(tokens.path()).unwrap();
    assert_eq!(raw, r#"{"token":"abc"}"#);
}

#[tokio::test]
async fn test_remove_nulls_token() {
    let dir = tempfile::tempdir().unwrap();
    let tokens = TokenStore::new(dir.path().join(".token.json"));
    tokens.save(Some("abc")).await.unwrap();

    tokens.remove().await.unwrap();

    assert!(tokens.token().await.is_none());
    let raw = std::fs::read_to_string(tokens.path()).unwrap();
    assert_eq!(raw, r#"{"token":null}"#);
}

#[tokio::test]
async fn test_remove_without_file_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let tokens = TokenStore::new(dir.path().join(".token.json"));

    tokens.remove().await.unwrap();

    assert!(!tokens.path().exists());
}

#[tokio::test]
async fn test_missing_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let tokens = TokenStore::new(dir.path().join("missing.json"));

    assert_eq!(tokens.load().await.token, None);
    assert!(tokens.token().await.is_none());
}

#[tokio::test]
async fn test_corrupt_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".token.json");
    std::fs::write(&path, "{not json").unwrap();

    let tokens = TokenStore::new(path);

    assert_eq!(tokens.load().await.token, None);
}

#[tokio::test]
async fn test_empty_token_is_not_usable() {
    let dir = tempfile::tempdir().unwrap();
    let tokens = TokenStore::new(dir.path().join(".token.json"));

    tokens.save(Some("")).await.unwrap();

    assert!(tokens.token().await.is_none());
}
