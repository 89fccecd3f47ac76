use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use common::error::AppError;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::keyed::DashMapStateStore,
};
use std::{
    future::Future,
    net::{IpAddr, Ipv4Addr},
    num::NonZeroU32,
    pin::Pin,
    rc::Rc,
    sync::Arc,
};

type IpLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

/// Limits each client IP separately. The limiter state is shared by all workers.
pub struct IpRateLimiter {
    limiter: Arc<IpLimiter>,
}

impl IpRateLimiter {
    pub fn new(permits_per_sec: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(permits_per_sec).unwrap_or(NonZeroU32::MIN));
        let limiter = Arc::new(RateLimiter::dashmap(quota));
        Self { limiter }
    }
}

impl Clone for IpRateLimiter {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for IpRateLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = IpRateLimiterService<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(IpRateLimiterService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct IpRateLimiterService<S> {
    service: Rc<S>,
    limiter: Arc<IpLimiter>,
}

impl<S, B> Service<ServiceRequest> for IpRateLimiterService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = Rc::clone(&self.service);
        let ip = req
            .peer_addr()
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let allowed = self.limiter.check_key(&ip).is_ok();

        Box::pin(async move {
            if allowed {
                srv.call(req).await.map(|res| res.map_into_boxed_body())
            } else {
                log::warn!("Rate limit hit for {}", ip);
                Ok(req.error_response(AppError::TooManyRequests(
                    "Too many requests. Please slow down.".to_string(),
                )))
            }
        })
    }
}
