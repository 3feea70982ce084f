use serde::Deserialize;

/// Envelope of every Helix list response.
#[derive(Debug, Deserialize)]
pub(crate) struct HelixPage<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HelixGame {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HelixStream {
    pub user_login: String,
}
