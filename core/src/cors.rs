use actix_cors::Cors;
use actix_web::http::header;

/// Lets the admin dashboard call the API with its bearer token.
pub fn middleware(origin: &str) -> Cors {
    Cors::default()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
        .allowed_origin(origin)
        .max_age(3600)
}
