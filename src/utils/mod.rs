pub mod time;

/// Random 21 char id used for rows and sessions.
pub fn longid() -> String {
    nanoid::nanoid!()
}

/// Random UUIDv4 share token.
pub fn share_token() -> String {
    uuid::Uuid::new_v4().to_string()
}
