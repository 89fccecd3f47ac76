use common::misc::ServerKind;

pub struct ServerCreateRequest {
    pub name: String,
    pub server_kind: ServerKind,
    pub base_url: String,
    pub credentials: String,
}
