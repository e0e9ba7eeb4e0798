#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("delete error: {0}")]
    Delete(String),
    #[error("aggregate error: {0}")]
    Aggregate(String),
    #[error("payload error: {0}")]
    Payload(String),
}
