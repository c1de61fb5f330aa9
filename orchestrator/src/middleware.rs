/// Origins must be full `scheme://host[:port]` values.
pub fn cors(allowed_origins: &[String]) -> warp::cors::Builder {
    let builder = if allowed_origins.is_empty() {
        warp::cors().allow_any_origin()
    } else {
        warp::cors().allow_origins(allowed_origins.iter().map(String::as_str))
    };

    builder
        .allow_headers(vec![
            "User-Agent",
            "Sec-Fetch-Mode",
            "Referer",
            "Origin",
            "Access-Control-Request-Method",
            "Access-Control-Request-Headers",
            "Content-Type",
            "Authorization",
            "Accept",
            "Cache-Control",
            "Content-Length",
        ])
        .allow_methods(vec!["POST", "GET", "OPTIONS"])
}
