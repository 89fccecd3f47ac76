use middleware::ip::IpRateLimiter;

pub mod middleware {
    pub mod ip;
}

/// Per-client-IP limiter. A zero budget is raised to one request per second.
pub fn ip_middleware(permits_per_second: u32) -> IpRateLimiter {
    IpRateLimiter::new(permits_per_second)
}
